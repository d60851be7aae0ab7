//! 过滤器引用解析
//!
//! FILTER_REFERENCE 叶子通过 [`FilterRegistry`] 回调引擎求值被引用的过滤器。
//! 解析路径 [`ResolutionPath`] 随递归传递，用于检测循环引用和限制深度。

use crate::error::{FilterError, Result};
use crate::evaluator::EvaluationContext;
use crate::network::Network;
use crate::store::FilterStore;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// 引用链的默认最大深度
pub const DEFAULT_MAX_REFERENCE_DEPTH: usize = 16;

/// 正在解析的过滤器链，从最外层过滤器开始
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionPath(Vec<Uuid>);

impl ResolutionPath {
    /// 以正在求值的顶层过滤器为起点
    pub fn root(filter_id: Uuid) -> Self {
        Self(vec![filter_id])
    }

    /// 进入被引用的过滤器，返回延长后的路径
    pub fn enter(&self, filter_id: Uuid, max_depth: usize) -> Result<Self> {
        if self.contains(filter_id) {
            return Err(FilterError::ReferenceCycle {
                filter_id,
                path: self.to_string(),
            });
        }
        if self.0.len() >= max_depth {
            return Err(FilterError::ReferenceDepthExceeded { max_depth });
        }

        let mut ids = self.0.clone();
        ids.push(filter_id);
        Ok(Self(ids))
    }

    pub fn contains(&self, filter_id: Uuid) -> bool {
        self.0.contains(&filter_id)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn ids(&self) -> &[Uuid] {
        &self.0
    }
}

impl std::fmt::Display for ResolutionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<String> = self.0.iter().map(Uuid::to_string).collect();
        f.write_str(&ids.join(" -> "))
    }
}

/// 过滤器注册表：回答"设备是否被某个过滤器选中"
#[cfg_attr(test, mockall::automock)]
pub trait FilterRegistry: Send + Sync {
    fn resolve_membership(
        &self,
        filter_id: Uuid,
        equipment_id: &str,
        network: &Network,
        path: &ResolutionPath,
    ) -> Result<bool>;
}

/// 单次求值请求内的注册表
///
/// 每个被引用过滤器在同一网络上的命中集合只计算一次，可在并行求值中共享。
pub struct MatchSession<'a> {
    store: &'a FilterStore,
    network: &'a Network,
    cache: DashMap<Uuid, Arc<HashSet<String>>>,
}

impl<'a> MatchSession<'a> {
    pub fn new(store: &'a FilterStore, network: &'a Network) -> Self {
        Self {
            store,
            network,
            cache: DashMap::new(),
        }
    }

    pub fn store(&self) -> &'a FilterStore {
        self.store
    }

    pub fn network(&self) -> &'a Network {
        self.network
    }

    /// 已缓存的过滤器数量
    pub fn cached_filters(&self) -> usize {
        self.cache.len()
    }

    fn match_set(&self, filter_id: Uuid, path: &ResolutionPath) -> Result<Arc<HashSet<String>>> {
        let (filter, path) = self.store.enter_reference(filter_id, path)?;

        // 不持有 DashMap 的读锁进入递归
        let cached = self.cache.get(&filter_id).map(|set| Arc::clone(set.value()));
        if let Some(set) = cached {
            return Ok(set);
        }

        let ctx = EvaluationContext::new(self.network, self).with_path(path);
        let mut matched = HashSet::new();
        for equipment in self.network.equipments(filter.equipment_type) {
            if filter.rules.evaluate(equipment, &ctx)? {
                matched.insert(equipment.id().to_string());
            }
        }

        debug!(%filter_id, matched = matched.len(), "被引用过滤器命中集合已计算");
        let set = Arc::new(matched);
        Ok(Arc::clone(
            self.cache.entry(filter_id).or_insert(set).value(),
        ))
    }
}

impl FilterRegistry for MatchSession<'_> {
    fn resolve_membership(
        &self,
        filter_id: Uuid,
        equipment_id: &str,
        network: &Network,
        path: &ResolutionPath,
    ) -> Result<bool> {
        // 缓存只对会话自身的网络有效
        if !std::ptr::eq(network, self.network) {
            return self
                .store
                .resolve_membership(filter_id, equipment_id, network, path);
        }

        Ok(self.match_set(filter_id, path)?.contains(equipment_id))
    }
}
