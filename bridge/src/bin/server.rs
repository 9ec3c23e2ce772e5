use std::sync::Arc;

use chatterbox_audio::CommandLineBackend;
use chatterbox_bridge::{start_server, BridgeConfig, BridgeError};
use chatterbox_core::{
    CommandDispatcher, HostPlatform, ModelController, ShutdownSignal, SynthesisBackend,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional
    let _ = dotenvy::dotenv();

    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,chatterbox_core=info,chatterbox_bridge=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = BridgeConfig::load();
    let addr = cfg.server.addr()?;

    let backend = Arc::new(CommandLineBackend::new(Some(cfg.engine.clone())));
    let platform = HostPlatform::detect();
    let availability = backend.availability().await;

    info!(target: "bridge", "Chatterbox TTS Server");
    info!(target: "bridge", os = %platform.os, arch = %platform.arch, "Platform");
    match &availability {
        Ok(a) => info!(target: "bridge", backend = %backend.name(), available = a.is_ready(), "Synthesis backend"),
        Err(e) => warn!(target: "bridge", error = %e, "Synthesis backend probe failed"),
    }

    let controller = Arc::new(ModelController::new(backend).with_platform(platform));
    let shutdown = ShutdownSignal::new();
    let dispatcher = Arc::new(
        CommandDispatcher::new(controller, shutdown.clone())
            .with_grace(cfg.server.shutdown_grace()),
    );

    // SIGINT / SIGTERM take the same graceful path as the shutdown command
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match wait_for_os_signal().await {
            Ok(()) => {
                info!(target: "bridge", "Shutting down gracefully...");
                signal_shutdown.trigger();
            }
            Err(e) => warn!(target: "bridge", error = %e, "Failed to install signal handlers"),
        }
    });

    info!(target: "bridge", %addr, "Starting Chatterbox HTTP bridge");
    start_server(addr, dispatcher, shutdown).await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_os_signal() -> Result<(), BridgeError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map_err(BridgeError::from),
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> Result<(), BridgeError> {
    tokio::signal::ctrl_c().await.map_err(BridgeError::from)
}
