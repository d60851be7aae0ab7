//! 专家过滤器规则引擎
//!
//! 从电网模型中按规则树筛选设备，支持：
//! - JSON 规则定义的编译与校验
//! - 按数据类型分派的算子求值（短路 AND/OR）
//! - 过滤器间的相互引用与环检测
//! - 规则树与邻接表行之间的编解码及 PostgreSQL 持久化

pub mod codec;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod fields;
pub mod models;
pub mod network;
pub mod operators;
pub mod registry;
pub mod repository;
pub mod resolver;
pub mod store;

pub use codec::{EncodedTree, PropertyValueRow, RuleRow, TreeCodec};
pub use compiler::RuleCompiler;
pub use error::{FilterError, Result};
pub use evaluator::EvaluationContext;
pub use executor::{FilterExecutor, FilterMatchResult};
pub use fields::FieldType;
pub use models::{ExpertFilter, ExpertRule, FilterMetadata, LeafValue, RuleDefinition};
pub use network::{EquipmentRef, EquipmentType, Network, NetworkData};
pub use operators::{CombinatorType, DataType, OperatorType};
pub use registry::{FilterRegistry, MatchSession, ResolutionPath};
pub use repository::FilterRepository;
pub use resolver::FieldResolver;
pub use store::{FilterStore, FilterStoreStats};
