use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use msgq_channel::AdapterRegistry;
use msgq_queue::{BrokerQueue, QueueHandle, TableQueue};
use msgq_server_lifecycle::LifeCycle;
use msgq_store::Store;
use msgq_throttle::QuotaCache;

use msgqd::config::Config;
use msgqd::logging::{DiagnosticFormat, LoggingConfig};
use msgqd::state::AppState;
use msgqd::{consumer, panic, scheduled, timer};

/// Priority message dispatch daemon.
#[derive(Debug, Parser)]
#[command(about, version)]
struct Opt {
    /// TOML config file to load.
    #[arg(long, default_value = "/etc/msgqd/config.toml")]
    config: PathBuf,

    /// Directory where diagnostic log files will be placed.
    ///
    /// If omitted, diagnostics print to stderr.
    #[arg(long)]
    diag_log_dir: Option<PathBuf>,

    /// How diagnostic logs render.
    #[arg(long, default_value = "full")]
    diag_format: DiagnosticFormat,
}

fn main() -> anyhow::Result<()> {
    let opts = Opt::parse();
    panic::register_panic_hook();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(opts))
}

async fn run(opts: Opt) -> anyhow::Result<()> {
    let config = Config::load(&opts.config)?;

    LoggingConfig {
        log_dir: opts.diag_log_dir.clone(),
        diag_format: opts.diag_format,
        filter_env_var: "MSGQD_LOG",
        default_filter: "msgqd=info,msgq_queue=info,msgq_lock=info,msgq_throttle=info",
    }
    .init()?;

    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;

    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    msgq_throttle::use_redis(redis_conn.clone());

    let queue = if config.mysql_as_mq {
        QueueHandle::Table(TableQueue::new(store.clone()))
    } else {
        let broker = BrokerQueue::new(&config.kafka_brokers, &config.kafka_group_id)?;
        QueueHandle::Broker(Arc::new(broker))
    };

    // Concrete vendor adapters (SMTP/SMS gateway/chat bot API) are out
    // of scope for this crate; an embedder registers them on this
    // registry before traffic starts flowing. Left empty, dispatch
    // fails closed with `ChannelUnsupported` for any channel no one has
    // wired up yet.
    let adapters = AdapterRegistry::new();

    let state = Arc::new(AppState {
        config,
        store,
        queue,
        adapters,
        quota_cache: QuotaCache::new(std::time::Duration::from_secs(30)),
        redis: redis_conn,
    });

    let mut lifecycle = LifeCycle::new();

    let mut tasks = consumer::spawn_all(state.clone());
    tasks.push(tokio::spawn(scheduled::run(state.clone())));
    tasks.push(tokio::spawn(timer::run(state.clone())));

    lifecycle.wait_for_shutdown().await;
    for task in tasks {
        task.abort();
    }
    Ok(())
}
