//! # Nimbus Plugin Host
//!
//! Boots a plugin runtime from configuration, restores installed plugins
//! and keeps them alive until the process is asked to stop.

use nimbus_config::{AppConfig, ConfigLoader};
use nimbus_core::{init_tracing, NimbusResult, TelemetryConfig};
use nimbus_plugin_runtime::PluginEngine;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match load_config().await {
        Ok(config) => config,
        Err(e) => {
            let _ = init_tracing(&TelemetryConfig::default());
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config.observability.telemetry()) {
        eprintln!("{e}");
    }

    info!("Starting Nimbus plugin host...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        error!("Application error: {}", e);
        std::process::exit(1);
    }
}

async fn load_config() -> NimbusResult<AppConfig> {
    let loader = ConfigLoader::from_default_location()?;
    Ok(loader.get().await)
}

async fn run(config: AppConfig) -> NimbusResult<()> {
    info!(
        environment = %config.app.environment,
        persistence = config.persistence.enabled,
        compiler = %config.compiler.endpoint,
        "Configuration loaded"
    );

    let engine = PluginEngine::from_config(&config)?;
    engine.initialize().await?;

    for plugin in engine.loaded_plugins() {
        info!(
            plugin_id = %plugin.id(),
            version = %plugin.manifest().version,
            origin = ?plugin.origin(),
            sandboxed = plugin.is_sandboxed(),
            "Plugin loaded"
        );
    }
    info!(
        plugins = engine.installed_plugins().len(),
        languages = engine.languages().len(),
        commands = engine.commands().len(),
        "Plugin host ready"
    );

    shutdown_signal().await;

    engine.shutdown().await?;
    info!("Plugin host shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
