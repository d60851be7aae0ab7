//! 专家过滤器批处理命令行
//!
//! 从数据库或 JSON 文件加载过滤器，在网络模型上求值并以 JSON 输出命中结果。

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use filter_engine::{ExpertFilter, FilterExecutor, FilterRepository, FilterStore, Network};
use grid_shared::config::AppConfig;
use grid_shared::database::Database;
use grid_shared::observability::{self, metrics};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

const SERVICE_NAME: &str = "filter-engine";

#[derive(Parser, Debug)]
#[command(name = "filter-engine", version, about = "Expert filter rule engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 在网络模型上求值过滤器
    Evaluate {
        /// 网络模型 JSON 文件，缺省时使用 engine.network_path
        #[arg(long)]
        network: Option<PathBuf>,
        /// 只求值指定的过滤器，缺省为全部
        #[arg(long = "filter")]
        filters: Vec<Uuid>,
        /// 从 JSON 文件加载过滤器而不是数据库
        #[arg(long)]
        filters_file: Option<PathBuf>,
    },
    /// 将 JSON 文件中的过滤器写入数据库
    Import {
        #[arg(long)]
        file: PathBuf,
    },
    /// 列出数据库中的过滤器元数据
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig {
            service_name: SERVICE_NAME.to_string(),
            ..AppConfig::default()
        }
    });

    let _guard = observability::init(&config.observability, &config.service_name).await?;
    info!(environment = %config.environment, "Starting {}", config.service_name);

    match cli.command {
        Command::Evaluate {
            network,
            filters,
            filters_file,
        } => evaluate(&config, network, &filters, filters_file.as_deref()).await,
        Command::Import { file } => import(&config, &file).await,
        Command::List => list(&config).await,
    }
}

async fn evaluate(
    config: &AppConfig,
    network_path: Option<PathBuf>,
    filter_ids: &[Uuid],
    filters_file: Option<&Path>,
) -> Result<()> {
    let network_path = network_path
        .or_else(|| config.engine.network_path.as_ref().map(PathBuf::from))
        .context("No network model given; use --network or engine.network_path")?;

    let network_json = std::fs::read_to_string(&network_path)
        .with_context(|| format!("Failed to read network {}", network_path.display()))?;
    let network = Network::from_json(&network_json)
        .with_context(|| format!("Failed to parse network {}", network_path.display()))?;

    let store = FilterStore::new().with_max_reference_depth(config.engine.max_reference_depth);
    let (source, filters) = match filters_file {
        Some(path) => ("file", read_filters(path)?),
        None => ("database", load_from_database(config).await?),
    };
    let loaded = store.load_batch(filters)?;
    metrics::record_filters_loaded(source, loaded.len());

    let ids = if filter_ids.is_empty() {
        store.list_ids()
    } else {
        filter_ids.to_vec()
    };

    let stats = store.stats();
    info!(
        filters = stats.filters_count,
        rule_nodes = stats.total_rule_nodes,
        requested = ids.len(),
        parallel = config.engine.parallel,
        "Evaluating filters"
    );

    let executor = FilterExecutor::new().with_parallel(config.engine.parallel);
    let results = executor.execute_all(&ids, &store, &network)?;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

async fn import(config: &AppConfig, file: &Path) -> Result<()> {
    let filters = read_filters(file)?;
    if filters.is_empty() {
        bail!("No filters found in {}", file.display());
    }

    let db = Database::connect(&config.database).await?;
    let repository = FilterRepository::new(db.pool().clone());
    repository.migrate().await?;

    // 先在内存中校验引用关系，避免写入带自引用的过滤器
    let store = FilterStore::new().with_max_reference_depth(config.engine.max_reference_depth);
    let mut imported = Vec::new();
    for filter in filters {
        let filter_id = filter.id();
        if let Err(e) = store.load(filter.clone()) {
            warn!(filter_id = %filter_id, error = %e, "Skipping invalid filter");
            continue;
        }
        match repository.create(&filter).await {
            Ok(()) => imported.push(filter_id),
            Err(e) => warn!(filter_id = %filter_id, error = %e, "Failed to import filter"),
        }
    }

    metrics::record_filters_loaded("import", imported.len());
    info!("Imported {} filters from {}", imported.len(), file.display());
    println!("{}", serde_json::to_string_pretty(&imported)?);

    db.close().await;
    Ok(())
}

async fn list(config: &AppConfig) -> Result<()> {
    let db = Database::connect(&config.database).await?;
    let repository = FilterRepository::new(db.pool().clone());
    repository.migrate().await?;

    let metadata = repository.list_metadata().await?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);

    db.close().await;
    Ok(())
}

async fn load_from_database(config: &AppConfig) -> Result<Vec<ExpertFilter>> {
    let db = Database::connect(&config.database).await?;
    let repository = FilterRepository::new(db.pool().clone());
    repository.migrate().await?;

    let filters = repository.load_all().await?;
    info!("Loaded {} filters from database", filters.len());

    db.close().await;
    Ok(filters)
}

/// 读取过滤器文件，接受单个过滤器或过滤器数组
fn read_filters(path: &Path) -> Result<Vec<ExpertFilter>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read filters {}", path.display()))?;

    let value: serde_json::Value = serde_json::from_str(&json)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    let filters = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };

    Ok(filters)
}
