// # hostprovd - Hosting Provisioning Daemon
//
// This is a thin integration layer: all verification and provisioning logic
// lives in hostprov-core.
//
// The hostprovd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the DNS backend and command executor into a Provisioner
// 4. Serving the HTTP API until SIGINT/SIGTERM
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Verification
// - `HOSTPROV_VERIFICATION_TOKEN`: Token domains publish in a TXT record (required)
// - `HOSTPROV_SERVER_IP`: IPv4 address domains must point at (required)
//
// ### Layout
// - `HOSTPROV_HOSTING_ROOT`: Parent of all document roots (default /var/www)
// - `HOSTPROV_SITES_AVAILABLE` / `HOSTPROV_SITES_ENABLED`: Proxy config directories
// - `HOSTPROV_STAGING_DIR`: Where virtual hosts are rendered before activation
// - `HOSTPROV_PHP_FPM_SOCKET`: FastCGI socket of the application runtime
//
// ### Provisioning
// - `HOSTPROV_BUNDLE_URL`: Software bundle to install
// - `HOSTPROV_RUNTIME_USER` / `HOSTPROV_RUNTIME_GROUP`: Owner of document roots
// - `HOSTPROV_PERMISSION_MODE`: Octal mode applied recursively
// - `HOSTPROV_PROXY_SERVICE`: Service reloaded after config changes
// - `HOSTPROV_ACME_CLIENT` / `HOSTPROV_ADMIN_CONTACT`: Certificate issuance
// - `HOSTPROV_PRIVILEGE_WRAPPER`: Program prefixed to every command (e.g. sudo)
// - `HOSTPROV_ISSUE_CERTIFICATE`: Append certificate issuance to every install
// - `HOSTPROV_<STEP>_TIMEOUT_SECS`: DOWNLOAD, EXTRACT, PERMISSIONS, RELOAD, CERTIFICATE
//
// ### DNS
// - `HOSTPROV_DNS_NAMESERVERS`: Comma-separated resolver addresses
// - `HOSTPROV_DNS_TIMEOUT_SECS`: Per-query timeout
//
// ### Daemon
// - `HOSTPROV_LISTEN_ADDR`: Socket address to serve on (default 127.0.0.1:8080)
// - `HOSTPROV_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export HOSTPROV_VERIFICATION_TOKEN=hostprov-verify-7f3a
// export HOSTPROV_SERVER_IP=203.0.113.10
// export HOSTPROV_PRIVILEGE_WRAPPER=sudo
//
// hostprovd
// ```

mod config;
mod error;
mod routes;

use anyhow::Result;
use hostprov_core::{Provisioner, SystemExecutor};
use hostprov_dns_hickory::HickoryLookup;
use std::future::IntoFuture;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long in-flight requests get to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum HostprovExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<HostprovExitCode> for ExitCode {
    fn from(code: HostprovExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return HostprovExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return HostprovExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HostprovExitCode::ConfigError.into();
    }

    info!("Starting hostprovd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HostprovExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            HostprovExitCode::RuntimeError
        } else {
            HostprovExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let lookup = Arc::new(HickoryLookup::new(&config.dns));
    let executor = Arc::new(SystemExecutor::new());
    let provisioner = Provisioner::new(config.hosting, lookup, executor)?;

    info!(
        hosting_root = %provisioner.config().hosting_root.display(),
        server_ip = %provisioner.config().server_ip,
        issue_certificate = provisioner.config().issue_certificate,
        "Provisioner ready"
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening");

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(
        axum::serve(listener, routes::router(provisioner))
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .into_future(),
    );

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);
    let _ = stop_tx.send(());

    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(joined) => joined??,
        Err(_) => warn!(
            "In-flight requests still running after {:?}, exiting anyway",
            SHUTDOWN_GRACE
        ),
    }

    info!("Shutting down daemon");
    Ok(())
}

/// Wait for SIGTERM or SIGINT
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
