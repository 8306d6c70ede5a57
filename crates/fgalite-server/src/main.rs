use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use fgalite_core::model::{
    AuthorizationModel, ModelLimits, model_from_json, parse_model, validate_model,
};
use fgalite_server::cli::{Cli, Command};
use fgalite_server::config::{AppConfig, LogFormat};
use fgalite_server::metrics::Metrics;
use fgalite_server::rest;
use fgalite_server::service::AuthzService;
use fgalite_storage::InMemoryStoreFactory;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command {
        Some(Command::ValidateModel { file }) => {
            run_validate_model(&file, &config.to_model_limits())
        }
        Some(Command::Serve) | None => run_serve(config).await,
    }
}

/// Parses a model file (JSON when it starts with `{`, DSL otherwise) and
/// prints every validation problem.
fn run_validate_model(path: &Path, limits: &ModelLimits) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;
    let model: AuthorizationModel = if source.trim_start().starts_with('{') {
        model_from_json(&source)?
    } else {
        parse_model(&source)?
    };

    match validate_model(&model, limits) {
        Ok(()) => {
            println!(
                "{}: valid ({} types)",
                path.display(),
                model.type_definitions.len()
            );
            Ok(())
        }
        Err(errors) => {
            for error in &errors {
                println!("{}: {error}", path.display());
            }
            Err(format!("{} validation error(s)", errors.len()).into())
        }
    }
}

async fn run_serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr: std::net::SocketAddr = config.http_addr().parse()?;
    tracing::info!(
        %addr,
        max_depth = config.engine.max_depth,
        strict_writes = config.tuples.strict_writes,
        "starting fgalite server"
    );

    let metrics = Arc::new(Metrics::new());
    let service = Arc::new(
        AuthzService::new(
            Arc::new(InMemoryStoreFactory::new()),
            config.to_engine_config(),
            config.to_model_limits(),
            config.to_tuple_limits(),
        )
        .with_metrics(Arc::clone(&metrics)),
    );
    let router = rest::create_router(rest::AppState { service, metrics });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => { tracing::info!("received SIGINT"); }
                _ = sigterm.recv() => { tracing::info!("received SIGTERM"); }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler, using SIGINT only");
            let _ = ctrl_c.await;
            tracing::info!("received SIGINT");
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received SIGINT");
    }
}
