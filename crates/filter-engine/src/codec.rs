//! 规则树的邻接表编码
//!
//! 每个节点一行，通过 `parent_id` 指向父节点，`position` 保存兄弟顺序。
//! PROPERTIES 叶子的取值列表存放在辅助行中，其余多值叶子用 `,` 拼接到 `value` 列。

use crate::compiler::{RuleCompiler, VALUE_DELIMITER};
use crate::error::{FilterError, Result};
use crate::models::{ExpertRule, LeafValue, RuleDefinition};
use crate::operators::DataType;
use crate::resolver::format_number;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// 规则行
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RuleRow {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub position: i32,
    pub data_type: String,
    pub combinator: Option<String>,
    pub field: Option<String>,
    pub operator: Option<String>,
    pub value: Option<String>,
    pub property_name: Option<String>,
}

/// PROPERTIES 叶子的取值行
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PropertyValueRow {
    pub rule_id: Uuid,
    pub position: i32,
    pub value: String,
}

/// 编码结果，规则行按先序排列，父节点总在子节点之前
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedTree {
    pub rules: Vec<RuleRow>,
    pub property_values: Vec<PropertyValueRow>,
}

pub struct TreeCodec;

impl TreeCodec {
    pub fn encode(rule: &ExpertRule) -> EncodedTree {
        let mut encoded = EncodedTree::default();
        encode_node(rule, None, 0, &mut encoded);
        encoded
    }

    /// 从行重建规则树
    ///
    /// 孤儿行、多个根、重复 id、循环都会返回 `MalformedTree`，不会无限递归。
    pub fn decode(rules: &[RuleRow], property_values: &[PropertyValueRow]) -> Result<ExpertRule> {
        let mut by_id: HashMap<Uuid, &RuleRow> = HashMap::with_capacity(rules.len());
        for row in rules {
            if by_id.insert(row.id, row).is_some() {
                return Err(FilterError::MalformedTree(format!("重复的规则 id: {}", row.id)));
            }
        }

        let mut roots = rules.iter().filter(|row| row.parent_id.is_none());
        let root = roots
            .next()
            .ok_or_else(|| FilterError::MalformedTree("缺少根节点".to_string()))?;
        if let Some(extra) = roots.next() {
            return Err(FilterError::MalformedTree(format!(
                "存在多个根节点: {} 和 {}",
                root.id, extra.id
            )));
        }

        let mut children: HashMap<Uuid, Vec<&RuleRow>> = HashMap::new();
        for row in rules {
            if let Some(parent_id) = row.parent_id {
                if !by_id.contains_key(&parent_id) {
                    return Err(FilterError::MalformedTree(format!(
                        "孤儿行 {}: 父节点 {} 不存在",
                        row.id, parent_id
                    )));
                }
                children.entry(parent_id).or_default().push(row);
            }
        }
        for siblings in children.values_mut() {
            siblings.sort_by_key(|row| row.position);
        }

        let mut values: HashMap<Uuid, Vec<&PropertyValueRow>> = HashMap::new();
        for value in property_values {
            match by_id.get(&value.rule_id) {
                Some(row) if row.data_type == DataType::Properties.as_str() => {
                    values.entry(value.rule_id).or_default().push(value);
                }
                Some(row) => {
                    return Err(FilterError::MalformedTree(format!(
                        "规则 {} 的数据类型为 {}，不能有属性取值行",
                        row.id, row.data_type
                    )));
                }
                None => {
                    return Err(FilterError::MalformedTree(format!(
                        "属性取值行指向不存在的规则 {}",
                        value.rule_id
                    )));
                }
            }
        }
        for list in values.values_mut() {
            list.sort_by_key(|value| value.position);
        }

        let mut decoder = Decoder {
            children: &children,
            values: &values,
            visited: HashSet::with_capacity(rules.len()),
        };
        let definition = decoder.definition(root)?;

        if decoder.visited.len() != rules.len() {
            return Err(FilterError::MalformedTree(format!(
                "{} 行无法从根节点到达（存在循环）",
                rules.len() - decoder.visited.len()
            )));
        }

        RuleCompiler::new().compile(&definition)
    }
}

struct Decoder<'a> {
    children: &'a HashMap<Uuid, Vec<&'a RuleRow>>,
    values: &'a HashMap<Uuid, Vec<&'a PropertyValueRow>>,
    visited: HashSet<Uuid>,
}

impl Decoder<'_> {
    fn definition(&mut self, row: &RuleRow) -> Result<RuleDefinition> {
        if !self.visited.insert(row.id) {
            return Err(FilterError::MalformedTree(format!(
                "规则 {} 被重复访问（存在循环）",
                row.id,
            )));
        }

        let children_by_parent = self.children;
        let children = children_by_parent.get(&row.id);
        let is_combinator = row.data_type == DataType::Combinator.as_str();

        if !is_combinator && children.is_some() {
            return Err(FilterError::MalformedTree(format!("叶子规则 {} 存在子行", row.id)));
        }

        let rules = match children {
            Some(children) => Some(
                children
                    .iter()
                    .map(|child| self.definition(child))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None if is_combinator => Some(Vec::new()),
            None => None,
        };

        let property_values = self
            .values
            .get(&row.id)
            .map(|list| list.iter().map(|v| v.value.clone()).collect());

        Ok(RuleDefinition {
            id: Some(row.id),
            combinator: row.combinator.clone(),
            data_type: Some(row.data_type.clone()),
            field: row.field.clone(),
            operator: row.operator.clone(),
            value: row.value.clone().map(Value::String),
            values: None,
            property_name: row.property_name.clone(),
            property_values,
            rules,
        })
    }
}

fn encode_node(rule: &ExpertRule, parent_id: Option<Uuid>, position: i32, out: &mut EncodedTree) {
    match rule {
        ExpertRule::Combinator(group) => {
            out.rules.push(RuleRow {
                id: group.id(),
                parent_id,
                position,
                data_type: DataType::Combinator.to_string(),
                combinator: Some(group.combinator().to_string()),
                field: None,
                operator: None,
                value: None,
                property_name: None,
            });
            for (i, child) in group.rules().iter().enumerate() {
                encode_node(child, Some(group.id()), i as i32, out);
            }
        }
        ExpertRule::Leaf(leaf) => {
            let mut row = RuleRow {
                id: leaf.id(),
                parent_id,
                position,
                data_type: leaf.data_type().to_string(),
                combinator: None,
                field: leaf.field().map(|f| f.to_string()),
                operator: Some(leaf.operator().to_string()),
                value: None,
                property_name: None,
            };
            let multi = leaf.operator().is_multi_valued();

            match leaf.value() {
                LeafValue::String { value, values, .. } => {
                    row.value = if multi {
                        Some(join(values.iter().cloned()))
                    } else {
                        value.clone()
                    };
                }
                LeafValue::Number { value, values } => {
                    row.value = if multi {
                        Some(join(values.iter().map(|v| format_number(*v))))
                    } else {
                        value.map(format_number)
                    };
                }
                LeafValue::Enum { value } => row.value = Some(value.clone()),
                LeafValue::Boolean { value } => row.value = Some(value.to_string()),
                LeafValue::FilterReference { filter_ids } => {
                    row.value = Some(join(filter_ids.iter().map(Uuid::to_string)));
                }
                LeafValue::Properties {
                    property_name,
                    property_values,
                } => {
                    row.property_name = Some(property_name.clone());
                    out.property_values
                        .extend(property_values.iter().enumerate().map(|(i, value)| {
                            PropertyValueRow {
                                rule_id: leaf.id(),
                                position: i as i32,
                                value: value.clone(),
                            }
                        }));
                }
            }
            out.rules.push(row);
        }
    }
}

fn join(values: impl Iterator<Item = String>) -> String {
    let separator = VALUE_DELIMITER.to_string();
    values.collect::<Vec<_>>().join(separator.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldType;
    use crate::operators::OperatorType;

    fn sample_tree() -> ExpertRule {
        RuleDefinition::and(vec![
            RuleDefinition::leaf(
                DataType::String,
                FieldType::Country,
                OperatorType::In,
                "FR, BE ,DE",
            ),
            RuleDefinition::or(vec![
                RuleDefinition::leaf(
                    DataType::Number,
                    FieldType::TargetP,
                    OperatorType::Lower,
                    12.5,
                ),
                RuleDefinition::leaf(
                    DataType::Number,
                    FieldType::NominalVoltage,
                    OperatorType::NotIn,
                    "63,90",
                ),
                RuleDefinition::properties(
                    FieldType::SubstationProperties,
                    OperatorType::NotIn,
                    "zone",
                    vec!["south".to_string(), "east".to_string(), "a,b".to_string()],
                ),
            ]),
            RuleDefinition::leaf(
                DataType::Boolean,
                FieldType::Connected,
                OperatorType::Equals,
                true,
            ),
            RuleDefinition::filter_reference(
                OperatorType::IsPartOf,
                &[Uuid::new_v4(), Uuid::new_v4()],
            ),
            RuleDefinition::and(vec![]),
        ])
        .try_into()
        .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let tree = sample_tree();
        let encoded = TreeCodec::encode(&tree);

        assert_eq!(encoded.rules.len(), tree.node_count());
        assert_eq!(encoded.property_values.len(), 3);

        let decoded = TreeCodec::decode(&encoded.rules, &encoded.property_values).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn test_pre_order_and_positions() {
        let encoded = TreeCodec::encode(&sample_tree());
        let rows = &encoded.rules;

        assert!(rows[0].parent_id.is_none());
        assert_eq!(rows[0].data_type, "COMBINATOR");
        assert_eq!(rows[1].value.as_deref(), Some("BE,DE,FR"));
        assert_eq!(rows[2].combinator.as_deref(), Some("OR"));
        assert_eq!(rows[3].value.as_deref(), Some("12.5"));
        assert_eq!(rows[3].position, 0);
        assert_eq!(rows[5].position, 2);
        assert_eq!(rows[5].property_name.as_deref(), Some("zone"));
        assert!(rows[5].value.is_none());

        let seen: HashSet<Uuid> = rows.iter().map(|r| r.id).collect();
        for (i, row) in rows.iter().enumerate() {
            if let Some(parent_id) = row.parent_id {
                let parent_index = rows.iter().position(|r| r.id == parent_id).unwrap();
                assert!(parent_index < i);
            }
        }
        assert_eq!(seen.len(), rows.len());
    }

    #[test]
    fn test_decode_restores_child_order() {
        let tree = sample_tree();
        let mut encoded = TreeCodec::encode(&tree);
        encoded.rules.reverse();
        encoded.property_values.reverse();

        let decoded = TreeCodec::decode(&encoded.rules, &encoded.property_values).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn test_orphan_row() {
        let mut encoded = TreeCodec::encode(&sample_tree());
        encoded.rules[3].parent_id = Some(Uuid::new_v4());

        let err = TreeCodec::decode(&encoded.rules, &encoded.property_values).unwrap_err();
        assert_eq!(err.code(), "MALFORMED_TREE");
        assert!(err.to_string().contains("孤儿行"));
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut encoded = TreeCodec::encode(&sample_tree());
        // OR 节点挂到自己的子节点下，脱离根
        let or_id = encoded.rules[2].id;
        let child_id = encoded.rules[3].id;
        encoded.rules[2].parent_id = Some(child_id);
        encoded.rules[3].data_type = "COMBINATOR".to_string();
        encoded.rules[3].combinator = Some("AND".to_string());
        assert_eq!(encoded.rules[3].parent_id, Some(or_id));

        let err = TreeCodec::decode(&encoded.rules, &encoded.property_values).unwrap_err();
        assert_eq!(err.code(), "MALFORMED_TREE");
    }

    #[test]
    fn test_missing_and_multiple_roots() {
        let mut encoded = TreeCodec::encode(&sample_tree());

        let mut no_root = encoded.rules.clone();
        no_root.remove(0);
        assert_eq!(
            TreeCodec::decode(&no_root, &[]).unwrap_err().code(),
            "MALFORMED_TREE"
        );

        encoded.rules[1].parent_id = None;
        let err = TreeCodec::decode(&encoded.rules, &encoded.property_values).unwrap_err();
        assert!(err.to_string().contains("多个根节点"));
    }

    #[test]
    fn test_duplicate_ids() {
        let mut encoded = TreeCodec::encode(&sample_tree());
        encoded.rules[4].id = encoded.rules[3].id;

        let err = TreeCodec::decode(&encoded.rules, &encoded.property_values).unwrap_err();
        assert!(err.to_string().contains("重复"));
    }

    #[test]
    fn test_property_values_on_wrong_row() {
        let mut encoded = TreeCodec::encode(&sample_tree());
        encoded.property_values[0].rule_id = encoded.rules[1].id;

        let err = TreeCodec::decode(&encoded.rules, &encoded.property_values).unwrap_err();
        assert_eq!(err.code(), "MALFORMED_TREE");
    }

    #[test]
    fn test_invalid_operator_row_surfaces() {
        let mut encoded = TreeCodec::encode(&sample_tree());
        encoded.rules[7].operator = Some("EQUALS".to_string());

        let err = TreeCodec::decode(&encoded.rules, &encoded.property_values).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_OPERATOR");
    }
}
