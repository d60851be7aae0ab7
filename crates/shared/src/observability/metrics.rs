//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use crate::config::ObservabilityConfig;
use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl MetricsHandle {
    pub fn shutdown(self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出，启动 `/metrics` 与 `/health` 端点
pub async fn init(config: &ObservabilityConfig, service_name: &str) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "filter_evaluations_total",
        "Total number of expert filter evaluations"
    );
    metrics::describe_histogram!(
        "filter_evaluation_duration_seconds",
        "Expert filter evaluation duration in seconds"
    );
    metrics::describe_counter!("filters_loaded_total", "Total number of filters loaded");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// 记录一次过滤器求值
#[inline]
pub fn record_filter_evaluation(equipment_type: &str, status: &str, duration_secs: f64) {
    metrics::counter!(
        "filter_evaluations_total",
        "equipment_type" => equipment_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "filter_evaluation_duration_seconds",
        "equipment_type" => equipment_type.to_string()
    )
    .record(duration_secs);
}

/// 记录加载的过滤器数量
#[inline]
pub fn record_filters_loaded(source: &str, count: usize) {
    metrics::counter!("filters_loaded_total", "source" => source.to_string())
        .increment(count as u64);
}
