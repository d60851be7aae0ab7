//! 规则编译器
//!
//! 将 [`RuleDefinition`] 校验并编译成不可变的 [`ExpertRule`] 树。
//! 多值集合在此一次性推导，求值阶段不再解析字面量。

use crate::error::{FilterError, Result};
use crate::fields::FieldType;
use crate::models::{CombinatorRule, ExpertRule, LeafRule, LeafValue, RuleDefinition};
use crate::operators::{CombinatorType, DataType, OperatorType};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

/// 多值字面量的分隔符，同时也是持久化时的拼接符
pub const VALUE_DELIMITER: char = ',';

/// 规则编译器
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleCompiler;

impl RuleCompiler {
    pub fn new() -> Self {
        Self
    }

    /// 从 JSON 字符串编译规则树
    pub fn compile_from_json(&self, json: &str) -> Result<ExpertRule> {
        let definition: RuleDefinition = serde_json::from_str(json)?;
        self.compile(&definition)
    }

    /// 编译规则树
    pub fn compile(&self, definition: &RuleDefinition) -> Result<ExpertRule> {
        self.compile_node(definition, "root", &mut HashSet::new())
    }

    /// `seen` 收集整棵树已使用的节点 id，持久化时 id 必须在树内唯一
    fn compile_node(
        &self,
        definition: &RuleDefinition,
        path: &str,
        seen: &mut HashSet<Uuid>,
    ) -> Result<ExpertRule> {
        let id = definition.id.unwrap_or_else(Uuid::new_v4);
        if !seen.insert(id) {
            return Err(FilterError::invalid_definition(
                path,
                format!("规则 id {} 在树中重复", id),
            ));
        }

        if definition.is_combinator() {
            return self.compile_combinator(id, definition, path, seen);
        }

        if definition.rules.as_ref().is_some_and(|rules| !rules.is_empty()) {
            return Err(FilterError::invalid_definition(path, "叶子节点不能包含子规则"));
        }

        self.compile_leaf(id, definition, path).map(ExpertRule::Leaf)
    }

    fn compile_combinator(
        &self,
        id: Uuid,
        definition: &RuleDefinition,
        path: &str,
        seen: &mut HashSet<Uuid>,
    ) -> Result<ExpertRule> {
        if let Some(data_type) = definition.data_type.as_deref() {
            if data_type != DataType::Combinator.as_str() {
                return Err(FilterError::invalid_definition(
                    path,
                    format!("组合节点的 dataType 必须为 COMBINATOR，当前为 {}", data_type),
                ));
            }
        }

        let combinator: CombinatorType = definition
            .combinator
            .as_deref()
            .ok_or_else(|| FilterError::invalid_definition(path, "组合节点缺少 combinator"))?
            .parse()?;

        let rules = definition
            .rules
            .as_deref()
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, child)| self.compile_node(child, &format!("{}.rules[{}]", path, i), seen))
            .collect::<Result<Vec<_>>>()?;

        Ok(ExpertRule::Combinator(CombinatorRule {
            id,
            combinator,
            rules,
        }))
    }

    fn compile_leaf(&self, id: Uuid, definition: &RuleDefinition, path: &str) -> Result<LeafRule> {
        let data_type: DataType = definition
            .data_type
            .as_deref()
            .ok_or_else(|| FilterError::invalid_definition(path, "叶子节点缺少 dataType"))?
            .parse()?;

        let operator_name = definition
            .operator
            .as_deref()
            .ok_or_else(|| FilterError::invalid_definition(path, "叶子节点缺少 operator"))?;
        let operator: OperatorType =
            operator_name
                .parse()
                .map_err(|_| FilterError::UnsupportedOperator {
                    operator: operator_name.to_string(),
                    data_type: data_type.to_string(),
                })?;
        data_type.check_operator(operator)?;

        let field = definition
            .field
            .as_deref()
            .map(str::parse::<FieldType>)
            .transpose()?;
        let field = self.check_field(data_type, field, path)?;

        let value = match data_type {
            DataType::String => self.string_value(definition, operator, path)?,
            DataType::Number => self.number_value(definition, operator, field, path)?,
            DataType::Enum => LeafValue::Enum {
                value: self.required_literal(definition, path)?,
            },
            DataType::Boolean => {
                let literal = self.required_literal(definition, path)?;
                LeafValue::Boolean {
                    value: parse_bool(literal.trim()).ok_or_else(|| FilterError::InvalidValue {
                        field: field_label(field, data_type),
                        value: literal.clone(),
                        expected: "布尔值",
                    })?,
                }
            }
            DataType::FilterReference => self.filter_reference_value(definition, field, path)?,
            DataType::Properties => self.properties_value(definition, path)?,
            DataType::Combinator => {
                return Err(FilterError::invalid_definition(
                    path,
                    "叶子节点不能使用 COMBINATOR 数据类型",
                ));
            }
        };

        Ok(LeafRule {
            id,
            field,
            operator,
            value,
        })
    }

    /// 校验字段与数据类型的搭配，PROPERTIES 缺省为 FREE_PROPERTIES
    fn check_field(
        &self,
        data_type: DataType,
        field: Option<FieldType>,
        path: &str,
    ) -> Result<Option<FieldType>> {
        match (data_type, field) {
            (DataType::Properties, None) => Ok(Some(FieldType::FreeProperties)),
            (DataType::Properties, Some(f)) if !f.is_property_field() => Err(
                FilterError::invalid_definition(path, format!("PROPERTIES 规则不能使用字段 {}", f)),
            ),
            (DataType::FilterReference, f) => Ok(f),
            (DataType::Properties, f) => Ok(f),
            (_, None) => Err(FilterError::invalid_definition(
                path,
                format!("{} 规则缺少 field", data_type),
            )),
            (_, Some(f)) if f.is_property_field() => Err(FilterError::invalid_definition(
                path,
                format!("字段 {} 只能用于 PROPERTIES 规则", f),
            )),
            (_, f) => Ok(f),
        }
    }

    fn string_value(
        &self,
        definition: &RuleDefinition,
        operator: OperatorType,
        path: &str,
    ) -> Result<LeafValue> {
        if !operator.is_multi_valued() {
            let value = self.required_literal(definition, path)?;
            return Ok(LeafValue::String {
                lowered: Some(value.to_lowercase()),
                value: Some(value),
                values: BTreeSet::new(),
            });
        }

        if let Some(explicit) = &definition.values {
            for literal in explicit {
                let literal = canonical_literal(literal, path)?;
                if literal.contains(VALUE_DELIMITER) {
                    return Err(FilterError::invalid_definition(
                        path,
                        format!("值 '{}' 不能包含分隔符 '{}'", literal, VALUE_DELIMITER),
                    ));
                }
            }
        }

        let values: BTreeSet<String> = self.literals(definition, path)?.into_iter().collect();
        if values.is_empty() {
            return Err(FilterError::invalid_definition(
                path,
                format!("{} 需要至少一个值", operator),
            ));
        }

        Ok(LeafValue::String {
            value: None,
            lowered: None,
            values,
        })
    }

    fn number_value(
        &self,
        definition: &RuleDefinition,
        operator: OperatorType,
        field: Option<FieldType>,
        path: &str,
    ) -> Result<LeafValue> {
        let parse = |literal: &str| {
            literal
                .trim()
                .parse::<f64>()
                .map_err(|_| FilterError::InvalidValue {
                    field: field_label(field, DataType::Number),
                    value: literal.to_string(),
                    expected: "数值",
                })
        };

        if operator.is_multi_valued() {
            let values = self
                .literals(definition, path)?
                .iter()
                .map(|literal| parse(literal))
                .collect::<Result<Vec<_>>>()?;
            if values.is_empty() {
                return Err(FilterError::invalid_definition(
                    path,
                    format!("{} 需要至少一个值", operator),
                ));
            }
            Ok(LeafValue::Number {
                value: None,
                values,
            })
        } else {
            let literal = self.required_literal(definition, path)?;
            Ok(LeafValue::Number {
                value: Some(parse(&literal)?),
                values: Vec::new(),
            })
        }
    }

    fn filter_reference_value(
        &self,
        definition: &RuleDefinition,
        field: Option<FieldType>,
        path: &str,
    ) -> Result<LeafValue> {
        let mut filter_ids: Vec<Uuid> = Vec::new();
        for literal in self.literals(definition, path)? {
            let filter_id = Uuid::parse_str(&literal).map_err(|_| FilterError::InvalidValue {
                field: field_label(field, DataType::FilterReference),
                value: literal.clone(),
                expected: "过滤器 UUID",
            })?;
            if !filter_ids.contains(&filter_id) {
                filter_ids.push(filter_id);
            }
        }

        if filter_ids.is_empty() {
            return Err(FilterError::invalid_definition(
                path,
                "过滤器引用规则至少需要一个过滤器 id",
            ));
        }

        Ok(LeafValue::FilterReference { filter_ids })
    }

    fn properties_value(&self, definition: &RuleDefinition, path: &str) -> Result<LeafValue> {
        let property_name = definition
            .property_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                FilterError::invalid_definition(path, "PROPERTIES 规则缺少 propertyName")
            })?;

        let property_values = definition
            .property_values
            .clone()
            .filter(|values| !values.is_empty())
            .ok_or_else(|| {
                FilterError::invalid_definition(path, "PROPERTIES 规则至少需要一个 propertyValues")
            })?;

        Ok(LeafValue::Properties {
            property_name: property_name.to_string(),
            property_values,
        })
    }

    fn required_literal(&self, definition: &RuleDefinition, path: &str) -> Result<String> {
        definition
            .value
            .as_ref()
            .filter(|value| !value.is_null())
            .ok_or_else(|| FilterError::invalid_definition(path, "叶子节点缺少 value"))
            .and_then(|value| canonical_literal(value, path))
    }

    /// 多值字面量：显式 `values` 优先，否则按分隔符拆分 `value`
    fn literals(&self, definition: &RuleDefinition, path: &str) -> Result<Vec<String>> {
        let raw = match (&definition.values, &definition.value) {
            (Some(values), _) if !values.is_empty() => values
                .iter()
                .map(|value| canonical_literal(value, path))
                .collect::<Result<Vec<_>>>()?,
            (_, Some(value)) if !value.is_null() => canonical_literal(value, path)?
                .split(VALUE_DELIMITER)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        Ok(raw
            .iter()
            .map(|literal| literal.trim())
            .filter(|literal| !literal.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// 将 JSON 字面量规范化为字符串
fn canonical_literal(value: &Value, path: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(FilterError::invalid_definition(
            path,
            format!("不支持的字面量: {}", other),
        )),
    }
}

fn parse_bool(literal: &str) -> Option<bool> {
    if literal.eq_ignore_ascii_case("true") {
        Some(true)
    } else if literal.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn field_label(field: Option<FieldType>, data_type: DataType) -> String {
    field.map_or_else(|| data_type.to_string(), |f| f.to_string())
}
