//! 规则操作符、组合类型与数据类型定义
//!
//! 操作符是否适用于某数据类型，只由 [`DataType::supported_operators`] 一处决定。

use crate::error::FilterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 叶子规则操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorType {
    // 通用比较
    Equals,
    NotEquals,

    // 数值比较
    Greater,
    GreaterOrEquals,
    Lower,
    LowerOrEquals,

    // 字符串操作
    Is,
    Contains,
    BeginsWith,
    EndsWith,

    // 多值
    In,
    NotIn,

    // 过滤器引用
    IsPartOf,
    IsNotPartOf,
}

impl OperatorType {
    pub const ALL: [OperatorType; 14] = [
        Self::Equals,
        Self::NotEquals,
        Self::Greater,
        Self::GreaterOrEquals,
        Self::Lower,
        Self::LowerOrEquals,
        Self::Is,
        Self::Contains,
        Self::BeginsWith,
        Self::EndsWith,
        Self::In,
        Self::NotIn,
        Self::IsPartOf,
        Self::IsNotPartOf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "EQUALS",
            Self::NotEquals => "NOT_EQUALS",
            Self::Greater => "GREATER",
            Self::GreaterOrEquals => "GREATER_OR_EQUALS",
            Self::Lower => "LOWER",
            Self::LowerOrEquals => "LOWER_OR_EQUALS",
            Self::Is => "IS",
            Self::Contains => "CONTAINS",
            Self::BeginsWith => "BEGINS_WITH",
            Self::EndsWith => "ENDS_WITH",
            Self::In => "IN",
            Self::NotIn => "NOT_IN",
            Self::IsPartOf => "IS_PART_OF",
            Self::IsNotPartOf => "IS_NOT_PART_OF",
        }
    }

    /// 是否为多值操作符（使用 values 集合而非单值）
    pub fn is_multi_valued(&self) -> bool {
        matches!(
            self,
            Self::In | Self::NotIn | Self::IsPartOf | Self::IsNotPartOf
        )
    }
}

impl fmt::Display for OperatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 操作符名称不存在时按"不支持"处理，数据类型在调用方补全
impl FromStr for OperatorType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| FilterError::UnsupportedOperator {
                operator: s.to_string(),
                data_type: "UNKNOWN".to_string(),
            })
    }
}

/// 组合类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CombinatorType {
    And,
    Or,
}

impl CombinatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl fmt::Display for CombinatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CombinatorType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            other => Err(FilterError::UnsupportedCombinator(other.to_string())),
        }
    }
}

/// 规则数据类型
///
/// `Combinator` 仅作为存储行的判别值使用，叶子规则不会取该值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Combinator,
    String,
    Number,
    Enum,
    Boolean,
    FilterReference,
    Properties,
}

impl DataType {
    pub const ALL: [DataType; 7] = [
        Self::Combinator,
        Self::String,
        Self::Number,
        Self::Enum,
        Self::Boolean,
        Self::FilterReference,
        Self::Properties,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Combinator => "COMBINATOR",
            Self::String => "STRING",
            Self::Number => "NUMBER",
            Self::Enum => "ENUM",
            Self::Boolean => "BOOLEAN",
            Self::FilterReference => "FILTER_REFERENCE",
            Self::Properties => "PROPERTIES",
        }
    }

    /// 各数据类型允许的操作符
    pub fn supported_operators(&self) -> &'static [OperatorType] {
        use OperatorType::*;
        match self {
            Self::Combinator => &[],
            Self::String => &[Is, Contains, BeginsWith, EndsWith, In, NotIn],
            Self::Number => &[
                Equals,
                Greater,
                GreaterOrEquals,
                Lower,
                LowerOrEquals,
                In,
                NotIn,
            ],
            Self::Enum | Self::Boolean => &[Equals, NotEquals],
            Self::FilterReference => &[IsPartOf, IsNotPartOf],
            Self::Properties => &[In, NotIn],
        }
    }

    pub fn supports(&self, operator: OperatorType) -> bool {
        self.supported_operators().contains(&operator)
    }

    /// 校验操作符，不适用时返回 `UnsupportedOperator`
    pub fn check_operator(&self, operator: OperatorType) -> Result<(), FilterError> {
        if self.supports(operator) {
            Ok(())
        } else {
            Err(FilterError::UnsupportedOperator {
                operator: operator.to_string(),
                data_type: self.to_string(),
            })
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| FilterError::UnsupportedDataType(s.to_string()))
    }
}
