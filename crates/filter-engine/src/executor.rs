//! 过滤器执行器
//!
//! 在网络模型中某类设备的全部候选上求值一个过滤器，返回命中的设备 id。
//! 规则树不可变，候选之间互不影响，可直接用 rayon 并行。

use crate::error::{FilterError, Result};
use crate::evaluator::EvaluationContext;
use crate::models::ExpertFilter;
use crate::network::{EquipmentRef, EquipmentType, Network};
use crate::registry::{FilterRegistry, MatchSession, ResolutionPath};
use crate::store::FilterStore;
use grid_shared::observability::metrics;
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// 过滤器求值结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterMatchResult {
    pub filter_id: Uuid,
    pub equipment_type: EquipmentType,
    /// 命中的设备 id，保持模型顺序
    pub matched_ids: Vec<String>,
    pub evaluated_count: usize,
    pub evaluation_time_ms: i64,
}

/// 过滤器执行器
#[derive(Debug, Clone, Copy)]
pub struct FilterExecutor {
    parallel: bool,
}

impl FilterExecutor {
    pub fn new() -> Self {
        Self { parallel: false }
    }

    /// 是否在候选设备间并行求值
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// 执行单个过滤器
    #[instrument(
        skip(self, filter, network, registry),
        fields(filter_id = %filter.id(), equipment_type = %filter.equipment_type)
    )]
    pub fn execute(
        &self,
        filter: &ExpertFilter,
        network: &Network,
        registry: &dyn FilterRegistry,
    ) -> Result<FilterMatchResult> {
        let start = Instant::now();
        let candidates = network.equipments(filter.equipment_type);
        let ctx = EvaluationContext::new(network, registry)
            .with_path(ResolutionPath::root(filter.id()));

        let outcome = self.matching_ids(filter, &candidates, &ctx);
        let elapsed = start.elapsed();
        metrics::record_filter_evaluation(
            filter.equipment_type.as_str(),
            if outcome.is_ok() { "success" } else { "error" },
            elapsed.as_secs_f64(),
        );

        let matched_ids = outcome.inspect_err(|e| warn!("过滤器求值失败: {}", e))?;
        info!(
            matched = matched_ids.len(),
            evaluated = candidates.len(),
            "过滤器求值完成"
        );

        Ok(FilterMatchResult {
            filter_id: filter.id(),
            equipment_type: filter.equipment_type,
            matched_ids,
            evaluated_count: candidates.len(),
            evaluation_time_ms: elapsed.as_millis() as i64,
        })
    }

    /// 在同一个会话中执行多个过滤器，被引用过滤器的命中集合共享缓存
    #[instrument(skip(self, store, network), fields(count = filter_ids.len()))]
    pub fn execute_all(
        &self,
        filter_ids: &[Uuid],
        store: &FilterStore,
        network: &Network,
    ) -> Result<Vec<FilterMatchResult>> {
        let session = MatchSession::new(store, network);

        filter_ids
            .iter()
            .map(|&filter_id| {
                let filter = store
                    .get(filter_id)
                    .ok_or(FilterError::FilterNotFound(filter_id))?;
                self.execute(&filter, network, &session)
            })
            .collect()
    }

    fn matching_ids(
        &self,
        filter: &ExpertFilter,
        candidates: &[EquipmentRef<'_>],
        ctx: &EvaluationContext<'_>,
    ) -> Result<Vec<String>> {
        let check = |equipment: &EquipmentRef<'_>| -> Result<Option<String>> {
            Ok(filter
                .rules
                .evaluate(*equipment, ctx)?
                .then(|| equipment.id().to_string()))
        };

        let matched: Vec<Option<String>> = if self.parallel {
            candidates.par_iter().map(check).collect::<Result<_>>()?
        } else {
            candidates.iter().map(check).collect::<Result<_>>()?
        };

        Ok(matched.into_iter().flatten().collect())
    }
}

impl Default for FilterExecutor {
    fn default() -> Self {
        Self::new()
    }
}
