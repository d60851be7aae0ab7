//! 过滤器引擎错误类型

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("不支持的操作符: {operator} 不适用于数据类型 {data_type}")]
    UnsupportedOperator {
        operator: String,
        data_type: String,
    },

    #[error("不支持的组合类型: {0}")]
    UnsupportedCombinator(String),

    #[error("不支持的数据类型: {0}")]
    UnsupportedDataType(String),

    #[error("未知字段: {0}")]
    UnknownField(String),

    #[error("字段 {field} 不适用于设备类型 {equipment_type}")]
    FieldNotApplicable {
        field: String,
        equipment_type: String,
    },

    #[error("规则定义无效 ({path}): {message}")]
    InvalidDefinition { path: String, message: String },

    #[error("无效的值: 字段 {field} 的值 '{value}' 不是合法的{expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error("未知设备类型: {0}")]
    UnknownEquipmentType(String),

    #[error("设备不存在: {equipment_type} id={id}")]
    EquipmentNotFound { equipment_type: String, id: String },

    #[error("检测到过滤器循环引用: {filter_id} 已在解析路径 [{path}] 中")]
    ReferenceCycle { filter_id: Uuid, path: String },

    #[error("过滤器引用层级超过上限 {max_depth}")]
    ReferenceDepthExceeded { max_depth: usize },

    #[error("引用的过滤器不存在: {0}")]
    UnresolvedReference(Uuid),

    #[error("过滤器未找到: {0}")]
    FilterNotFound(Uuid),

    #[error("规则树结构损坏: {0}")]
    MalformedTree(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl FilterError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedOperator { .. } => "UNSUPPORTED_OPERATOR",
            Self::UnsupportedCombinator(_) => "UNSUPPORTED_COMBINATOR",
            Self::UnsupportedDataType(_) => "UNSUPPORTED_DATA_TYPE",
            Self::UnknownField(_) => "UNKNOWN_FIELD",
            Self::FieldNotApplicable { .. } => "FIELD_NOT_APPLICABLE",
            Self::InvalidDefinition { .. } => "INVALID_DEFINITION",
            Self::InvalidValue { .. } => "INVALID_VALUE",
            Self::UnknownEquipmentType(_) => "UNKNOWN_EQUIPMENT_TYPE",
            Self::EquipmentNotFound { .. } => "EQUIPMENT_NOT_FOUND",
            Self::ReferenceCycle { .. } => "REFERENCE_CYCLE",
            Self::ReferenceDepthExceeded { .. } => "REFERENCE_DEPTH_EXCEEDED",
            Self::UnresolvedReference(_) => "UNRESOLVED_REFERENCE",
            Self::FilterNotFound(_) => "FILTER_NOT_FOUND",
            Self::MalformedTree(_) => "MALFORMED_TREE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Migration(_) => "MIGRATION_ERROR",
            Self::JsonError(_) => "JSON_ERROR",
        }
    }

    /// 是否为可重试错误（引擎内部从不重试，由调用方决定）
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    pub(crate) fn invalid_definition(path: &str, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
