//! 规则求值
//!
//! 深度优先、短路求值：AND 遇到第一个 false 即返回，OR 遇到第一个 true 即返回。
//! 任何叶子的错误都会沿组合链向上传播，不会被当作 false。

use crate::error::{FilterError, Result};
use crate::fields::FieldType;
use crate::models::{CombinatorRule, ExpertFilter, ExpertRule, LeafRule, LeafValue};
use crate::network::{EquipmentRef, Network};
use crate::operators::{CombinatorType, OperatorType};
use crate::registry::{FilterRegistry, ResolutionPath};
use crate::resolver::FieldResolver;
use std::collections::BTreeSet;
use tracing::trace;

/// 求值上下文
///
/// 持有字段解析器和过滤器注册表两个能力，以及当前的引用解析路径。
pub struct EvaluationContext<'a> {
    network: &'a Network,
    resolver: &'a dyn FieldResolver,
    registry: &'a dyn FilterRegistry,
    path: ResolutionPath,
}

impl<'a> EvaluationContext<'a> {
    /// 以网络模型本身作为字段解析器
    pub fn new(network: &'a Network, registry: &'a dyn FilterRegistry) -> Self {
        Self {
            network,
            resolver: network,
            registry,
            path: ResolutionPath::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: &'a dyn FieldResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_path(mut self, path: ResolutionPath) -> Self {
        self.path = path;
        self
    }

    pub fn network(&self) -> &'a Network {
        self.network
    }

    pub fn path(&self) -> &ResolutionPath {
        &self.path
    }
}

impl ExpertRule {
    /// 对单个设备求值
    pub fn evaluate(
        &self,
        equipment: EquipmentRef<'_>,
        ctx: &EvaluationContext<'_>,
    ) -> Result<bool> {
        match self {
            Self::Combinator(group) => evaluate_combinator(group, equipment, ctx),
            Self::Leaf(leaf) => evaluate_leaf(leaf, equipment, ctx),
        }
    }
}

impl ExpertFilter {
    /// 设备是否被过滤器选中，设备类型不符时直接返回 false
    pub fn matches(
        &self,
        equipment: EquipmentRef<'_>,
        ctx: &EvaluationContext<'_>,
    ) -> Result<bool> {
        if equipment.equipment_type() != self.equipment_type {
            return Ok(false);
        }
        self.rules.evaluate(equipment, ctx)
    }
}

fn evaluate_combinator(
    group: &CombinatorRule,
    equipment: EquipmentRef<'_>,
    ctx: &EvaluationContext<'_>,
) -> Result<bool> {
    match group.combinator {
        CombinatorType::And => {
            for child in &group.rules {
                if !child.evaluate(equipment, ctx)? {
                    trace!(rule_id = %child.id(), "AND 短路");
                    return Ok(false);
                }
            }
            Ok(true)
        }
        CombinatorType::Or => {
            for child in &group.rules {
                if child.evaluate(equipment, ctx)? {
                    trace!(rule_id = %child.id(), "OR 短路");
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn evaluate_leaf(
    leaf: &LeafRule,
    equipment: EquipmentRef<'_>,
    ctx: &EvaluationContext<'_>,
) -> Result<bool> {
    let operator = leaf.operator;
    match &leaf.value {
        LeafValue::String {
            lowered, values, ..
        } => {
            let actual = ctx.resolver.field_value(required_field(leaf)?, equipment)?;
            string_matches(leaf, operator, &actual, lowered.as_deref(), values)
        }
        LeafValue::Number { value, values } => {
            let field = required_field(leaf)?;
            let raw = ctx.resolver.field_value(field, equipment)?;
            let actual = raw.trim().parse::<f64>().map_err(|_| FilterError::InvalidValue {
                field: field.to_string(),
                value: raw.clone(),
                expected: "数值",
            })?;
            number_matches(leaf, operator, actual, *value, values)
        }
        LeafValue::Enum { value } => {
            let actual = ctx.resolver.field_value(required_field(leaf)?, equipment)?;
            match operator {
                OperatorType::Equals => Ok(actual == *value),
                OperatorType::NotEquals => Ok(actual != *value),
                _ => Err(unsupported(leaf)),
            }
        }
        LeafValue::Boolean { value } => {
            let field = required_field(leaf)?;
            let raw = ctx.resolver.field_value(field, equipment)?;
            let actual = raw.parse::<bool>().map_err(|_| FilterError::InvalidValue {
                field: field.to_string(),
                value: raw.clone(),
                expected: "布尔值",
            })?;
            match operator {
                OperatorType::Equals => Ok(actual == *value),
                OperatorType::NotEquals => Ok(actual != *value),
                _ => Err(unsupported(leaf)),
            }
        }
        LeafValue::FilterReference { filter_ids } => {
            let mut member = false;
            for filter_id in filter_ids {
                if ctx
                    .registry
                    .resolve_membership(*filter_id, equipment.id(), ctx.network, &ctx.path)?
                {
                    member = true;
                    break;
                }
            }
            match operator {
                OperatorType::IsPartOf => Ok(member),
                OperatorType::IsNotPartOf => Ok(!member),
                _ => Err(unsupported(leaf)),
            }
        }
        LeafValue::Properties {
            property_name,
            property_values,
        } => {
            let actual = ctx
                .resolver
                .property_value(required_field(leaf)?, property_name, equipment)?
                .map(|v| v.to_lowercase());
            let found = actual.is_some_and(|actual| {
                property_values
                    .iter()
                    .any(|candidate| candidate.to_lowercase() == actual)
            });
            match operator {
                OperatorType::In => Ok(found),
                OperatorType::NotIn => Ok(!found),
                _ => Err(unsupported(leaf)),
            }
        }
    }
}

fn string_matches(
    leaf: &LeafRule,
    operator: OperatorType,
    actual: &str,
    lowered: Option<&str>,
    values: &BTreeSet<String>,
) -> Result<bool> {
    match operator {
        OperatorType::In => return Ok(values.contains(actual)),
        OperatorType::NotIn => return Ok(!values.contains(actual)),
        _ => {}
    }

    let expected = lowered.ok_or_else(|| missing_value(leaf))?;
    let actual = actual.to_lowercase();
    match operator {
        OperatorType::Is => Ok(actual == expected),
        OperatorType::Contains => Ok(actual.contains(expected)),
        OperatorType::BeginsWith => Ok(actual.starts_with(expected)),
        OperatorType::EndsWith => Ok(actual.ends_with(expected)),
        _ => Err(unsupported(leaf)),
    }
}

fn number_matches(
    leaf: &LeafRule,
    operator: OperatorType,
    actual: f64,
    expected: Option<f64>,
    values: &[f64],
) -> Result<bool> {
    match operator {
        OperatorType::In => return Ok(values.contains(&actual)),
        OperatorType::NotIn => return Ok(!values.contains(&actual)),
        _ => {}
    }

    let expected = expected.ok_or_else(|| missing_value(leaf))?;
    match operator {
        OperatorType::Equals => Ok(actual == expected),
        OperatorType::Greater => Ok(actual > expected),
        OperatorType::GreaterOrEquals => Ok(actual >= expected),
        OperatorType::Lower => Ok(actual < expected),
        OperatorType::LowerOrEquals => Ok(actual <= expected),
        _ => Err(unsupported(leaf)),
    }
}

fn required_field(leaf: &LeafRule) -> Result<FieldType> {
    leaf.field.ok_or_else(|| FilterError::InvalidDefinition {
        path: leaf.id.to_string(),
        message: format!("{} 规则缺少 field", leaf.data_type()),
    })
}

fn missing_value(leaf: &LeafRule) -> FilterError {
    FilterError::InvalidDefinition {
        path: leaf.id.to_string(),
        message: format!("{} 需要单个 value", leaf.operator),
    }
}

fn unsupported(leaf: &LeafRule) -> FilterError {
    FilterError::UnsupportedOperator {
        operator: leaf.operator.to_string(),
        data_type: leaf.data_type().to_string(),
    }
}
