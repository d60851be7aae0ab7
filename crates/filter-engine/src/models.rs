//! 过滤器领域模型
//!
//! 规则树是一个不可变的标签联合：组合节点（AND/OR）或叶子节点。
//! 构造只能经由 [`RuleCompiler`](crate::compiler::RuleCompiler)，编辑即重建。

use crate::compiler::RuleCompiler;
use crate::error::FilterError;
use crate::fields::FieldType;
use crate::network::EquipmentType;
use crate::operators::{CombinatorType, DataType, OperatorType};
use crate::resolver::format_number;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

/// 规则定义（提交或导入时的原始 JSON 形态）
///
/// 所有枚举字段保留为字符串，由编译器统一校验并给出带路径的错误。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combinator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RuleDefinition>>,
}

impl RuleDefinition {
    pub fn combinator(combinator: CombinatorType, rules: Vec<RuleDefinition>) -> Self {
        Self {
            combinator: Some(combinator.to_string()),
            data_type: Some(DataType::Combinator.to_string()),
            rules: Some(rules),
            ..Default::default()
        }
    }

    pub fn and(rules: Vec<RuleDefinition>) -> Self {
        Self::combinator(CombinatorType::And, rules)
    }

    pub fn or(rules: Vec<RuleDefinition>) -> Self {
        Self::combinator(CombinatorType::Or, rules)
    }

    /// 单值叶子
    pub fn leaf(
        data_type: DataType,
        field: FieldType,
        operator: OperatorType,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            data_type: Some(data_type.to_string()),
            field: Some(field.to_string()),
            operator: Some(operator.to_string()),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// 过滤器引用叶子
    pub fn filter_reference(operator: OperatorType, filter_ids: &[Uuid]) -> Self {
        Self {
            data_type: Some(DataType::FilterReference.to_string()),
            field: Some(FieldType::Id.to_string()),
            operator: Some(operator.to_string()),
            values: Some(
                filter_ids
                    .iter()
                    .map(|id| Value::String(id.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    /// 属性叶子
    pub fn properties(
        field: FieldType,
        operator: OperatorType,
        property_name: impl Into<String>,
        property_values: Vec<String>,
    ) -> Self {
        Self {
            data_type: Some(DataType::Properties.to_string()),
            field: Some(field.to_string()),
            operator: Some(operator.to_string()),
            property_name: Some(property_name.into()),
            property_values: Some(property_values),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// 是否描述组合节点
    pub fn is_combinator(&self) -> bool {
        self.combinator.is_some()
            || self.data_type.as_deref() == Some(DataType::Combinator.as_str())
    }
}

/// 规则节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleDefinition", into = "RuleDefinition")]
pub enum ExpertRule {
    Combinator(CombinatorRule),
    Leaf(LeafRule),
}

/// 组合节点
#[derive(Debug, Clone, PartialEq)]
pub struct CombinatorRule {
    pub(crate) id: Uuid,
    pub(crate) combinator: CombinatorType,
    pub(crate) rules: Vec<ExpertRule>,
}

impl CombinatorRule {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn combinator(&self) -> CombinatorType {
        self.combinator
    }

    pub fn rules(&self) -> &[ExpertRule] {
        &self.rules
    }
}

/// 叶子节点
#[derive(Debug, Clone, PartialEq)]
pub struct LeafRule {
    pub(crate) id: Uuid,
    pub(crate) field: Option<FieldType>,
    pub(crate) operator: OperatorType,
    pub(crate) value: LeafValue,
}

impl LeafRule {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn field(&self) -> Option<FieldType> {
        self.field
    }

    pub fn operator(&self) -> OperatorType {
        self.operator
    }

    pub fn value(&self) -> &LeafValue {
        &self.value
    }

    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }
}

/// 叶子的取值形态，多值集合在编译时一次性推导完成
#[derive(Debug, Clone, PartialEq)]
pub enum LeafValue {
    String {
        value: Option<String>,
        /// 小写形式，用于大小写不敏感比较
        lowered: Option<String>,
        values: BTreeSet<String>,
    },
    Number {
        value: Option<f64>,
        values: Vec<f64>,
    },
    Enum {
        value: String,
    },
    Boolean {
        value: bool,
    },
    FilterReference {
        filter_ids: Vec<Uuid>,
    },
    Properties {
        property_name: String,
        property_values: Vec<String>,
    },
}

impl LeafValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::String { .. } => DataType::String,
            Self::Number { .. } => DataType::Number,
            Self::Enum { .. } => DataType::Enum,
            Self::Boolean { .. } => DataType::Boolean,
            Self::FilterReference { .. } => DataType::FilterReference,
            Self::Properties { .. } => DataType::Properties,
        }
    }
}

impl ExpertRule {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Combinator(c) => c.id,
            Self::Leaf(l) => l.id,
        }
    }

    pub fn is_combinator(&self) -> bool {
        matches!(self, Self::Combinator(_))
    }

    /// 子节点，仅组合节点有
    pub fn children(&self) -> Option<&[ExpertRule]> {
        match self {
            Self::Combinator(c) => Some(&c.rules),
            Self::Leaf(_) => None,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Combinator(_) => DataType::Combinator,
            Self::Leaf(l) => l.data_type(),
        }
    }

    /// 树中的节点总数
    pub fn node_count(&self) -> usize {
        match self {
            Self::Combinator(c) => 1 + c.rules.iter().map(ExpertRule::node_count).sum::<usize>(),
            Self::Leaf(_) => 1,
        }
    }

    /// 树中使用的全部字段
    pub fn referenced_fields(&self) -> BTreeSet<FieldType> {
        let mut fields = BTreeSet::new();
        self.visit_leaves(&mut |leaf| {
            if let Some(field) = leaf.field {
                fields.insert(field);
            }
        });
        fields
    }

    /// 树中引用的全部过滤器
    pub fn referenced_filters(&self) -> BTreeSet<Uuid> {
        let mut filters = BTreeSet::new();
        self.visit_leaves(&mut |leaf| {
            if let LeafValue::FilterReference { filter_ids } = &leaf.value {
                filters.extend(filter_ids.iter().copied());
            }
        });
        filters
    }

    fn visit_leaves(&self, visitor: &mut impl FnMut(&LeafRule)) {
        match self {
            Self::Combinator(c) => {
                for child in &c.rules {
                    child.visit_leaves(visitor);
                }
            }
            Self::Leaf(l) => visitor(l),
        }
    }
}

impl TryFrom<RuleDefinition> for ExpertRule {
    type Error = FilterError;

    fn try_from(definition: RuleDefinition) -> Result<Self, Self::Error> {
        RuleCompiler::new().compile(&definition)
    }
}

fn number_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(format_number(value)))
}

impl From<ExpertRule> for RuleDefinition {
    fn from(rule: ExpertRule) -> Self {
        match rule {
            ExpertRule::Combinator(c) => RuleDefinition::combinator(
                c.combinator,
                c.rules.into_iter().map(RuleDefinition::from).collect(),
            )
            .with_id(c.id),
            ExpertRule::Leaf(leaf) => {
                let multi = leaf.operator.is_multi_valued();
                let mut definition = RuleDefinition {
                    id: Some(leaf.id),
                    data_type: Some(leaf.data_type().to_string()),
                    field: leaf.field.map(|f| f.to_string()),
                    operator: Some(leaf.operator.to_string()),
                    ..Default::default()
                };
                match leaf.value {
                    LeafValue::String { value, values, .. } => {
                        if multi {
                            definition.values =
                                Some(values.into_iter().map(Value::String).collect());
                        } else {
                            definition.value = value.map(Value::String);
                        }
                    }
                    LeafValue::Number { value, values } => {
                        if multi {
                            definition.values =
                                Some(values.into_iter().map(number_value).collect());
                        } else {
                            definition.value = value.map(number_value);
                        }
                    }
                    LeafValue::Enum { value } => definition.value = Some(Value::String(value)),
                    LeafValue::Boolean { value } => definition.value = Some(Value::Bool(value)),
                    LeafValue::FilterReference { filter_ids } => {
                        definition.values = Some(
                            filter_ids
                                .iter()
                                .map(|id| Value::String(id.to_string()))
                                .collect(),
                        );
                    }
                    LeafValue::Properties {
                        property_name,
                        property_values,
                    } => {
                        definition.property_name = Some(property_name);
                        definition.property_values = Some(property_values);
                    }
                }
                definition
            }
        }
    }
}

/// 过滤器元数据，列表查询时无需加载规则树
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FilterMetadata {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default = "Utc::now")]
    pub creation_date: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modification_date: DateTime<Utc>,
}

impl FilterMetadata {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            creation_date: now,
            modification_date: now,
        }
    }
}

impl Default for FilterMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// 专家过滤器：元数据 + 设备类型 + 规则树
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpertFilter {
    #[serde(flatten)]
    pub metadata: FilterMetadata,
    pub equipment_type: EquipmentType,
    pub rules: ExpertRule,
}

impl ExpertFilter {
    pub fn new(equipment_type: EquipmentType, rules: ExpertRule) -> Self {
        Self {
            metadata: FilterMetadata::new(),
            equipment_type,
            rules,
        }
    }

    pub fn id(&self) -> Uuid {
        self.metadata.id
    }

    /// 以新规则树生成新的过滤器版本，保留 id 和创建时间
    pub fn with_rules(&self, rules: ExpertRule) -> Self {
        Self {
            metadata: FilterMetadata {
                modification_date: Utc::now(),
                ..self.metadata.clone()
            },
            equipment_type: self.equipment_type,
            rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_json() -> serde_json::Value {
        json!({
            "id": "8a1f2c3e-0000-4000-8000-000000000001",
            "equipmentType": "GENERATOR",
            "rules": {
                "combinator": "AND",
                "dataType": "COMBINATOR",
                "rules": [
                    {
                        "dataType": "STRING",
                        "field": "COUNTRY",
                        "operator": "IS",
                        "value": "FR"
                    },
                    {
                        "dataType": "NUMBER",
                        "field": "TARGET_P",
                        "operator": "GREATER_OR_EQUALS",
                        "value": 50
                    }
                ]
            }
        })
    }

    #[test]
    fn test_filter_deserialization() {
        let filter: ExpertFilter = serde_json::from_value(sample_json()).unwrap();

        assert_eq!(
            filter.id().to_string(),
            "8a1f2c3e-0000-4000-8000-000000000001"
        );
        assert_eq!(filter.equipment_type, EquipmentType::Generator);
        assert!(filter.rules.is_combinator());
        assert_eq!(filter.rules.children().unwrap().len(), 2);
        assert_eq!(filter.rules.node_count(), 3);
    }

    #[test]
    fn test_rule_serialization_keeps_ids() {
        let filter: ExpertFilter = serde_json::from_value(sample_json()).unwrap();

        let json = serde_json::to_string_pretty(&filter).unwrap();
        let parsed: ExpertFilter = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.rules, filter.rules);
        assert_eq!(parsed.metadata, filter.metadata);
    }

    #[test]
    fn test_referenced_fields_and_filters() {
        let referenced = Uuid::new_v4();
        let rule: ExpertRule = RuleDefinition::or(vec![
            RuleDefinition::leaf(DataType::String, FieldType::Country, OperatorType::Is, "FR"),
            RuleDefinition::filter_reference(OperatorType::IsPartOf, &[referenced]),
        ])
        .try_into()
        .unwrap();

        assert_eq!(
            rule.referenced_fields(),
            BTreeSet::from([FieldType::Id, FieldType::Country])
        );
        assert_eq!(rule.referenced_filters(), BTreeSet::from([referenced]));
    }

    #[test]
    fn test_leaf_has_no_children() {
        let rule: ExpertRule =
            RuleDefinition::leaf(
                DataType::Enum,
                FieldType::EnergySource,
                OperatorType::Equals,
                "HYDRO",
            )
                .try_into()
                .unwrap();

        assert!(!rule.is_combinator());
        assert!(rule.children().is_none());
        assert_eq!(rule.data_type(), DataType::Enum);
    }

    #[test]
    fn test_with_rules_keeps_identity() {
        let original: ExpertFilter = serde_json::from_value(sample_json()).unwrap();
        let rules: ExpertRule = RuleDefinition::and(vec![]).try_into().unwrap();

        let edited = original.with_rules(rules.clone());

        assert_eq!(edited.id(), original.id());
        assert_eq!(edited.metadata.creation_date, original.metadata.creation_date);
        assert!(edited.metadata.modification_date >= original.metadata.modification_date);
        assert_eq!(edited.rules, rules);
        assert_eq!(original.rules.node_count(), 3);
    }
}
