//! 过滤器存储管理
//!
//! 使用 DashMap 提供线程安全的过滤器缓存，支持过滤器的加载、更新、删除和批量操作。
//! 存储本身也是一个不带缓存的 [`FilterRegistry`]。

use crate::error::{FilterError, Result};
use crate::evaluator::EvaluationContext;
use crate::models::{ExpertFilter, FilterMetadata};
use crate::network::Network;
use crate::registry::{DEFAULT_MAX_REFERENCE_DEPTH, FilterRegistry, ResolutionPath};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 过滤器存储
#[derive(Clone)]
pub struct FilterStore {
    filters: Arc<DashMap<Uuid, Arc<ExpertFilter>>>,
    max_reference_depth: usize,
}

impl FilterStore {
    pub fn new() -> Self {
        Self {
            filters: Arc::new(DashMap::new()),
            max_reference_depth: DEFAULT_MAX_REFERENCE_DEPTH,
        }
    }

    /// 设置过滤器引用链的最大深度
    pub fn with_max_reference_depth(mut self, max_reference_depth: usize) -> Self {
        self.max_reference_depth = max_reference_depth;
        self
    }

    pub fn max_reference_depth(&self) -> usize {
        self.max_reference_depth
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// 加载过滤器，同 id 的旧版本会被替换
    #[instrument(
        skip(self, filter),
        fields(filter_id = %filter.id(), equipment_type = %filter.equipment_type)
    )]
    pub fn load(&self, filter: ExpertFilter) -> Result<()> {
        let filter_id = filter.id();

        // 直接自引用在加载时即可判定
        if filter.rules.referenced_filters().contains(&filter_id) {
            return Err(FilterError::ReferenceCycle {
                filter_id,
                path: filter_id.to_string(),
            });
        }

        self.filters.insert(filter_id, Arc::new(filter));

        info!("过滤器已加载: {}", filter_id);
        Ok(())
    }

    /// 从 JSON 字符串加载过滤器
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<Uuid> {
        let filter: ExpertFilter = serde_json::from_str(json)?;
        let filter_id = filter.id();
        self.load(filter)?;
        Ok(filter_id)
    }

    /// 更新过滤器
    #[instrument(skip(self, filter), fields(filter_id = %filter.id()))]
    pub fn update(&self, filter: ExpertFilter) -> Result<()> {
        let filter_id = filter.id();

        if !self.filters.contains_key(&filter_id) {
            warn!("更新不存在的过滤器: {}", filter_id);
            return Err(FilterError::FilterNotFound(filter_id));
        }

        self.load(filter)
    }

    /// 删除过滤器
    #[instrument(skip(self))]
    pub fn delete(&self, filter_id: Uuid) -> Result<()> {
        if self.filters.remove(&filter_id).is_some() {
            info!("过滤器已删除: {}", filter_id);
            Ok(())
        } else {
            warn!("删除不存在的过滤器: {}", filter_id);
            Err(FilterError::FilterNotFound(filter_id))
        }
    }

    pub fn get(&self, filter_id: Uuid) -> Option<Arc<ExpertFilter>> {
        self.filters.get(&filter_id).map(|f| Arc::clone(f.value()))
    }

    pub fn contains(&self, filter_id: Uuid) -> bool {
        self.filters.contains_key(&filter_id)
    }

    /// 获取所有过滤器 ID（有序）
    pub fn list_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.filters.iter().map(|f| *f.key()).collect();
        ids.sort();
        ids
    }

    /// 获取所有过滤器的元数据，按创建时间排序
    pub fn list_metadata(&self) -> Vec<FilterMetadata> {
        let mut metadata: Vec<FilterMetadata> =
            self.filters.iter().map(|f| f.metadata.clone()).collect();
        metadata.sort_by(|a, b| {
            a.creation_date
                .cmp(&b.creation_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        metadata
    }

    /// 批量加载过滤器，失败的条目记录日志后跳过
    #[instrument(skip(self, filters))]
    pub fn load_batch(&self, filters: Vec<ExpertFilter>) -> Result<Vec<Uuid>> {
        let mut loaded_ids = Vec::with_capacity(filters.len());
        let mut errors = Vec::new();

        for filter in filters {
            let filter_id = filter.id();
            match self.load(filter) {
                Ok(()) => loaded_ids.push(filter_id),
                Err(e) => errors.push((filter_id, e)),
            }
        }

        if !errors.is_empty() {
            warn!("批量加载部分失败: {:?}", errors);
        }

        info!("批量加载完成: {} 成功, {} 失败", loaded_ids.len(), errors.len());
        Ok(loaded_ids)
    }

    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.filters.len();
        self.filters.clear();
        info!("已清空 {} 个过滤器", count);
    }

    pub fn stats(&self) -> FilterStoreStats {
        let filters_count = self.filters.len();
        let total_rule_nodes: usize = self.filters.iter().map(|f| f.rules.node_count()).sum();

        FilterStoreStats {
            filters_count,
            total_rule_nodes,
            avg_nodes_per_filter: if filters_count > 0 {
                total_rule_nodes as f64 / filters_count as f64
            } else {
                0.0
            },
        }
    }

    /// 查找被引用的过滤器并进入解析路径
    pub(crate) fn enter_reference(
        &self,
        filter_id: Uuid,
        path: &ResolutionPath,
    ) -> Result<(Arc<ExpertFilter>, ResolutionPath)> {
        let path = path.enter(filter_id, self.max_reference_depth)?;
        let filter = self
            .get(filter_id)
            .ok_or(FilterError::UnresolvedReference(filter_id))?;
        Ok((filter, path))
    }
}

impl Default for FilterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterRegistry for FilterStore {
    fn resolve_membership(
        &self,
        filter_id: Uuid,
        equipment_id: &str,
        network: &Network,
        path: &ResolutionPath,
    ) -> Result<bool> {
        let (filter, path) = self.enter_reference(filter_id, path)?;

        let Some(equipment) = network.equipment(filter.equipment_type, equipment_id) else {
            debug!(%filter_id, equipment_id, "设备不在被引用过滤器的范围内");
            return Ok(false);
        };

        let ctx = EvaluationContext::new(network, self).with_path(path);
        filter.rules.evaluate(equipment, &ctx)
    }
}

/// 过滤器存储统计信息
#[derive(Debug, Clone)]
pub struct FilterStoreStats {
    pub filters_count: usize,
    /// 所有过滤器规则树的节点总数
    pub total_rule_nodes: usize,
    pub avg_nodes_per_filter: f64,
}
