use clap::{Parser, Subcommand};
use likebridge::{
    broker::{EventBroker, InMemoryBroker, RedisStreamBroker},
    cache::CounterSyncConsumer,
    config::{Config, ConfigLoader, ConfigValidator, CounterSinkKind, LikeStrategy, LogFormat},
    dlq::{DeadLetterQueue, DlqStorage, InMemoryDlqStorage, RedisDlqStorage},
    error::{
        retry::{with_retry, RetryConfig},
        Result,
    },
    health::{BrokerHealthCheck, HealthRegistry, HealthStatus, KvHealthCheck, StoreHealthCheck},
    jobs::{self, LedgerSyncJob, ReconciliationJob},
    kv::{KeyScheme, KeyValueStore, RedisKvStore},
    processor::LikeEventProcessor,
    store::{LikeStore, PostgresLikeStore},
    LikeBridgeError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "likebridge",
    version = env!("CARGO_PKG_VERSION"),
    about = "Like-counter synchronization and reconciliation engine",
    long_about = None
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "LIKEBRIDGE_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the configuration
    #[arg(short, long, env = "LIKEBRIDGE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background workers: like event processor, counter sync
    /// consumer, ledger sync and daily reconciliation. Like requests and
    /// counter increments come from processes embedding the library.
    Run {
        /// Validate configuration without starting
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate configuration
    Validate,
    /// Generate sample configuration
    GenerateSample,
    /// Run one reconciliation sweep and exit
    ReconcileOnce,
    /// Show version information
    Version,
}

/// Adapters built from configuration
struct Adapters {
    kv: Arc<RedisKvStore>,
    store: Arc<dyn LikeStore>,
    broker: Arc<dyn EventBroker>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::GenerateSample) => {
            println!("{}", ConfigLoader::generate_sample());
            return Ok(());
        }
        Some(Commands::Version) => {
            print_version_info();
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config, cli.log_level.as_deref());
    info!("LikeBridge v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::Validate) => {
            info!("Validating configuration...");
            validate_config(&config)?;
            info!("Configuration is valid");
            Ok(())
        }
        Some(Commands::Run { dry_run: true }) => {
            info!("Running in dry-run mode");
            validate_config(&config)?;
            info!("Dry run completed successfully");
            Ok(())
        }
        Some(Commands::ReconcileOnce) => {
            validate_config(&config)?;
            reconcile_once(config).await
        }
        _ => {
            validate_config(&config)?;
            run_service(config).await
        }
    }
}

fn init_tracing(config: &Config, level_override: Option<&str>) {
    use tracing_subscriber::fmt::time::ChronoLocal;

    let filter = config.logging.filter(level_override);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let timer = ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string());

    match config.logging.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_timer(timer)
                .with_target(true)
                .with_thread_names(true);
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .init();
        }
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_ansi(true)
                .with_target(false)
                .fmt_fields(tracing_subscriber::fmt::format::DefaultFields::new())
                .event_format(CustomFormatter);
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .init();
        }
    }
}

// Level-coloured single-line output with the thread tag
struct CustomFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for CustomFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        use tracing_subscriber::fmt::time::{ChronoLocal, FormatTime};

        let timer = ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string());
        timer.format_time(&mut writer)?;
        write!(writer, " ")?;

        match *event.metadata().level() {
            tracing::Level::ERROR => write!(writer, "\x1b[31mERROR\x1b[0m")?,
            tracing::Level::WARN => write!(writer, "\x1b[33m WARN\x1b[0m")?,
            tracing::Level::INFO => write!(writer, " INFO")?,
            tracing::Level::DEBUG => write!(writer, "\x1b[36mDEBUG\x1b[0m")?,
            tracing::Level::TRACE => write!(writer, "\x1b[35mTRACE\x1b[0m")?,
        }

        let current_thread = std::thread::current();
        let name = current_thread.name().unwrap_or("unnamed");
        let name = if name.len() > 8 { &name[name.len() - 8..] } else { name };
        write!(writer, " [{:8}] ", name)?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

fn validate_config(config: &Config) -> Result<()> {
    let report = ConfigValidator::new(config.clone()).validate()?;
    report.print();

    if !report.is_valid() {
        return Err(LikeBridgeError::Validation(
            "Configuration validation failed. See errors above.".to_string(),
        ));
    }

    info!("  Application: {}", config.app.name);
    info!("  Instance ID: {}", config.app.instance_id);
    info!("  Strategy: {}", config.like_service.strategy.as_str());
    info!("  Broker backend: {}", config.broker.backend);
    Ok(())
}

fn consumer_name(config: &Config) -> String {
    config
        .broker
        .consumer_name
        .clone()
        .unwrap_or_else(|| format!("{}-{}", config.app.name, config.app.instance_id))
}

async fn connect_adapters(config: &Config) -> Result<Adapters> {
    let retry = RetryConfig::from(&config.error_handling.retry);
    let kv = Arc::new(
        with_retry(&retry, "connect to redis", || RedisKvStore::connect(&config.redis)).await?,
    );

    let broker: Arc<dyn EventBroker> = match config.broker.backend.as_str() {
        "memory" => {
            warn!("Using the in-memory broker; events do not survive a restart");
            Arc::new(InMemoryBroker::from_config(&config.broker))
        }
        _ => Arc::new(RedisStreamBroker::connect(kv.client().clone(), &config.broker).await?),
    };

    let store = Arc::new(
        with_retry(&retry, "connect to postgres", || PostgresLikeStore::connect(&config.database))
            .await?,
    );
    if config.database.ensure_schema {
        store.ensure_schema().await?;
    }

    Ok(Adapters {
        kv,
        store,
        broker,
    })
}

async fn check_health(adapters: &Adapters) -> Result<()> {
    let registry = HealthRegistry::new();
    registry
        .register(Box::new(KvHealthCheck::new(adapters.kv.clone())))
        .await;
    registry
        .register(Box::new(BrokerHealthCheck::new(adapters.broker.clone())))
        .await;
    registry
        .register(Box::new(StoreHealthCheck::new(adapters.store.clone())))
        .await;

    let health = registry.get_system_health().await;
    for (name, result) in &health.components {
        info!(
            "  {}: {:?}{}",
            name,
            result.status,
            result
                .message
                .as_deref()
                .map(|message| format!(" ({})", message))
                .unwrap_or_default()
        );
    }
    if health.status == HealthStatus::Unhealthy {
        return Err(LikeBridgeError::Validation(
            "Startup checks failed. See component status above.".to_string(),
        ));
    }
    Ok(())
}

fn reconciliation_job(config: &Config, adapters: &Adapters) -> ReconciliationJob {
    ReconciliationJob::new(
        adapters.kv.clone(),
        adapters.store.clone(),
        adapters.broker.clone(),
        KeyScheme::new(config.like_service.relation_key_prefix.clone()),
        config.broker.like_topic.clone(),
    )
    .with_scan_count(config.redis.scan_count)
    .with_retry(RetryConfig::from(&config.error_handling.retry))
}

async fn reconcile_once(config: Config) -> Result<()> {
    let adapters = connect_adapters(&config).await?;
    check_health(&adapters).await?;
    let report = reconciliation_job(&config, &adapters).run_once().await?;
    println!(
        "Scanned {} actors, emitted {} corrections, {} failures in {:?}",
        report.actors_scanned, report.corrections_emitted, report.failures, report.duration
    );
    Ok(())
}

async fn run_service(config: Config) -> Result<()> {
    info!("Starting LikeBridge");

    let adapters = connect_adapters(&config).await?;
    check_health(&adapters).await?;

    let kv: Arc<dyn KeyValueStore> = adapters.kv.clone();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    let dlq_storage: Arc<dyn DlqStorage> = match config.broker.dead_letter.storage.as_str() {
        "memory" => Arc::new(InMemoryDlqStorage::new()),
        _ => Arc::new(RedisDlqStorage::new(
            adapters.kv.connection(),
            format!("{}:dlq", config.broker.stream_prefix),
        )),
    };
    let dlq = Arc::new(
        DeadLetterQueue::new(dlq_storage)
            .with_forwarding(adapters.broker.clone(), config.broker.dead_letter.topic.clone()),
    );

    // Like event processor
    let processor = LikeEventProcessor::new(adapters.store.clone(), dlq, &config.broker);
    let broker = adapters.broker.clone();
    let name = consumer_name(&config);
    let rx = shutdown_rx.clone();
    handles.push((
        "like event processor",
        tokio::spawn(async move {
            if let Err(e) = processor.run(broker, name, rx).await {
                error!("Like event processor failed: {}", e);
            }
        }),
    ));

    // Counter records published by embedded counter caches
    if config.counter_cache.sink == CounterSinkKind::Broker {
        let consumer = CounterSyncConsumer::new(
            kv.clone(),
            config.broker.counter_topic.clone(),
            Duration::from_secs(config.counter_cache.remote_ttl_secs),
            config.broker.counter_batch.clone(),
        );
        let broker = adapters.broker.clone();
        let subscription = config.broker.counter_subscription.clone();
        let name = consumer_name(&config);
        let rx = shutdown_rx.clone();
        handles.push((
            "counter sync consumer",
            tokio::spawn(async move {
                if let Err(e) = consumer.run(broker, subscription, name, rx).await {
                    error!("Counter sync consumer failed: {}", e);
                }
            }),
        ));
    }

    // Ledger sync for the atomic-script strategy
    if config.like_service.strategy == LikeStrategy::AtomicScript || config.ledger_sync.always_enabled {
        let job = LedgerSyncJob::new(
            kv.clone(),
            adapters.store.clone(),
            KeyScheme::new(config.like_service.relation_key_prefix.clone()),
            config.like_service.ledger_slice_secs,
        )
        .with_scan_count(config.redis.scan_count);
        let initial_delay = Duration::from_millis(config.ledger_sync.initial_delay_ms);
        let interval = Duration::from_millis(config.ledger_sync.interval_ms);
        let job = Arc::new(job);
        let rx = shutdown_rx.clone();
        handles.push((
            "ledger sync",
            tokio::spawn(async move {
                jobs::run_periodic("ledger sync", initial_delay, interval, rx, move || {
                    let job = job.clone();
                    async move {
                        if let Err(e) = job.run_once().await {
                            error!("Ledger sync failed: {}", e);
                        }
                    }
                })
                .await;
            }),
        ));
    }

    // Daily reconciliation
    if config.reconciliation.enabled {
        let job = Arc::new(reconciliation_job(&config, &adapters));
        let (hour, minute) = (config.reconciliation.hour, config.reconciliation.minute);
        let rx = shutdown_rx.clone();
        handles.push((
            "reconciliation",
            tokio::spawn(async move {
                jobs::run_daily("reconciliation", hour, minute, rx, move || {
                    let job = job.clone();
                    async move {
                        if let Err(e) = job.run_once().await {
                            error!("Reconciliation sweep failed: {}", e);
                        }
                    }
                })
                .await;
            }),
        ));
    }

    info!("{} background workers running", handles.len());
    info!("Press Ctrl+C to stop");

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }

    info!("Stopping background tasks...");
    let _ = shutdown_tx.send(true);

    for (name, handle) in handles {
        match tokio::time::timeout(Duration::from_secs(30), handle).await {
            Ok(Ok(())) => info!("Stopped {}", name),
            Ok(Err(e)) => error!("{} task panicked: {}", name, e),
            Err(_) => warn!("{} did not stop within 30s", name),
        }
    }

    match likebridge::metrics::gather_metrics() {
        Ok(text) => debug!("Final metrics:\n{}", text),
        Err(e) => warn!("Unable to render metrics: {}", e),
    }

    info!("Service stopped");
    Ok(())
}

fn print_version_info() {
    println!("LikeBridge v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Like-counter synchronization across Redis, an event log and PostgreSQL");
    println!("License: MIT");
}
