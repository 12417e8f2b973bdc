//! Outreach Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use outreach_agent::FollowUpScheduler;
use outreach_config::{load_settings, Settings};
use outreach_llm::LlmFactory;
use outreach_server::{create_router, init_metrics, AppState, InMemorySessionRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("OUTREACH_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            // Tracing not yet initialized
            eprintln!(
                "Loaded configuration from files (env: {})",
                env.as_deref().unwrap_or("default")
            );
            settings
        }
        Err(e) => {
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        }
    };

    init_tracing(&config);

    tracing::info!("Starting Outreach Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_path = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    if let Err(e) = config.validate() {
        if config.environment.is_strict() {
            return Err(anyhow::anyhow!("Invalid configuration: {}", e));
        }
        tracing::warn!(error = %e, "Configuration validation failed, continuing");
    }

    let stores = outreach_persistence::init(&config.persistence)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize persistence: {}", e))?;
    tracing::info!(
        enabled = config.persistence.enabled,
        keyspace = %config.persistence.keyspace,
        "Record stores initialized"
    );

    let llm = LlmFactory::create(&config.llm)
        .map_err(|e| anyhow::anyhow!("Failed to create LLM backend: {}", e))?;
    if !llm.is_available().await {
        tracing::warn!(
            model = llm.model_name(),
            endpoint = %config.llm.endpoint,
            "LLM backend not reachable; calls will end with an apology until it is"
        );
    }

    let registry = Arc::new(
        InMemorySessionRegistry::from_config(&config.server)
            .with_scheduler(FollowUpScheduler::new(stores.clone())),
    );
    let cleanup_shutdown = registry.start_cleanup_task();

    let mut state = AppState::with_registry(config.clone(), llm, stores, registry);
    if config.observability.metrics_enabled {
        match init_metrics() {
            Ok(handle) => {
                tracing::info!("Initialized Prometheus metrics at /metrics");
                state = state.with_metrics(handle);
            }
            Err(e) => tracing::warn!(error = %e, "Metrics disabled"),
        }
    }

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], config.server.port)));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = cleanup_shutdown.send(true);
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("outreach={},tower_http=debug", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
