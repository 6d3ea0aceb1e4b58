use std::{process, sync::Arc};

use ordercache::{
    application::{
        error::AppError,
        ingest::{IngestPipeline, RetryPolicy},
        orders::OrderService,
        repos::CacheLedgerRepo,
    },
    cache::{CacheConfig, OrderCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        listener::ChannelListener,
        telemetry,
    },
};
use sqlx::PgPool;
use tokio::{signal, sync::mpsc, task::JoinHandle};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Finish(_) => run_finish(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_and_migrate(&settings).await?;
    let repositories = Arc::new(PostgresRepositories::new(pool.clone()));

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = Arc::new(
        OrderCache::bootstrap(&cache_config, repositories.clone(), repositories.as_ref()).await,
    );
    let orders = Arc::new(OrderService::new(
        cache.clone(),
        repositories.clone(),
        cache_config.repopulate_on_read,
    ));

    let (sender, receiver) = mpsc::channel(settings.ingest.queue_depth.get());
    let pipeline = IngestPipeline::new(
        repositories.clone(),
        repositories.clone(),
        cache.clone(),
        RetryPolicy::from(&settings.ingest),
    );
    let pipeline_handle = tokio::spawn(async move { pipeline.run(receiver).await });
    let listener_handle = spawn_listener(pool, &settings.ingest.channel, sender);

    let state = HttpState {
        orders,
        db: repositories,
    };
    let result = serve_http(&settings, state).await;

    // Dropping the listener closes the queue; the pipeline drains what is left.
    listener_handle.abort();
    let _ = listener_handle.await;
    match tokio::time::timeout(settings.server.graceful_shutdown, pipeline_handle).await {
        Ok(Ok(())) => info!("ingestion pipeline drained"),
        Ok(Err(err)) => error!(error = %err, "ingestion pipeline task failed"),
        Err(_) => warn!(
            timeout_secs = settings.server.graceful_shutdown.as_secs(),
            "ingestion pipeline did not drain before the shutdown timeout"
        ),
    }

    if cache_config.clear_ledger_on_shutdown {
        cache.finish().await;
    }

    result
}

async fn run_finish(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect(&settings).await?;
    let repositories = PostgresRepositories::new(pool);
    let instance_key = &settings.cache.instance_key;

    let removed = repositories.clear_ledger(instance_key).await?;
    info!(instance_key = %instance_key, removed, "cache ledger cleared");
    Ok(())
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    connect_and_migrate(&settings).await?;
    info!("database migrations applied");
    Ok(())
}

async fn connect(settings: &config::Settings) -> Result<PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))
}

async fn connect_and_migrate(settings: &config::Settings) -> Result<PgPool, AppError> {
    let pool = connect(settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    Ok(pool)
}

fn spawn_listener(pool: PgPool, channel: &str, sender: mpsc::Sender<String>) -> JoinHandle<()> {
    let listener = ChannelListener::new(pool, channel);
    tokio::spawn(async move {
        if let Err(err) = listener.run(sender).await {
            error!(error = %err, "ingestion listener stopped");
        }
    })
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "http server listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
