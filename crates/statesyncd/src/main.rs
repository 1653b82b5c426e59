// # statesyncd - State Synchronization Daemon
//
// The statesyncd daemon is a thin integration layer:
// 1. Reading configuration from environment variables
// 2. Initializing the runtime and tracing
// 3. Wiring a value source into the synchronizer
// 4. Running until a shutdown signal arrives
//
// All synchronization logic lives in statesync-core; do not add retry or
// publication behavior here.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Value Source
// - `STATESYNC_SOURCE_URL`: Base URL of the HTTP value source (required)
//
// ### Identity
// - `STATESYNC_IDENTITY`: Identity to synchronize for (optional; without
//   it the daemon idles until reconfigured)
//
// ### Engine
// - `STATESYNC_CONFIG_FILE`: Path to an optional JSON rendition of the
//   synchronizer configuration (backoff, retry bound, channel capacity)
//
// ### Logging
// - `STATESYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export STATESYNC_SOURCE_URL=https://api.example.com/accounts
// export STATESYNC_IDENTITY=acct-1234
// export STATESYNC_LOG_LEVEL=debug
//
// statesyncd
// ```

use anyhow::Result;
use statesync_core::traits::ValueSource;
use statesync_core::{StateSynchronizer, SyncConfig};
use std::env;
use std::process::ExitCode;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    source_url: String,
    identity: Option<String>,
    config_file: Option<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            source_url: env::var("STATESYNC_SOURCE_URL")?,
            identity: env::var("STATESYNC_IDENTITY").ok(),
            config_file: env::var("STATESYNC_CONFIG_FILE").ok(),
            log_level: env::var("STATESYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.source_url.is_empty() {
            anyhow::bail!(
                "STATESYNC_SOURCE_URL is required. \
                Set it via: export STATESYNC_SOURCE_URL=https://api.example.com/accounts"
            );
        }

        if !self.source_url.starts_with("https://") && !self.source_url.starts_with("http://") {
            anyhow::bail!(
                "STATESYNC_SOURCE_URL must use HTTP or HTTPS scheme. Got: {}",
                self.source_url
            );
        }

        if self.source_url.starts_with("http://") {
            eprintln!(
                "WARNING: STATESYNC_SOURCE_URL uses HTTP (not HTTPS). \
                      This is less secure. Consider using HTTPS."
            );
        }

        if let Some(ref identity) = self.identity
            && identity.is_empty()
        {
            anyhow::bail!("STATESYNC_IDENTITY must not be empty when set; unset it to idle");
        }

        if let Some(ref path) = self.config_file
            && !std::path::Path::new(path).exists()
        {
            anyhow::bail!("STATESYNC_CONFIG_FILE does not exist: {}", path);
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "STATESYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Assemble the synchronizer configuration
    fn sync_config(&self) -> Result<SyncConfig> {
        let config = match &self.config_file {
            Some(path) => SyncConfig::from_json_file(path)?,
            None => SyncConfig::default(),
        };

        Ok(config)
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DaemonExitCode::ConfigError.into();
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
        return DaemonExitCode::ConfigError.into();
    }

    info!("Starting statesyncd daemon");

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => DaemonExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {}", e);
                DaemonExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let sync_config = config.sync_config()?;
    let source = build_source(&config)?;

    let (synchronizer, mut events) = StateSynchronizer::<String>::new(source, sync_config)?;

    // Surface synchronizer events in the log
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Synchronizer event: {:?}", event);
        }
    });

    // Log every published change
    synchronizer.subscribe("statesyncd", |value: &Option<String>| match value {
        Some(value) => info!("Synchronized value changed: {}", value),
        None => info!("Synchronized value cleared"),
    });

    match &config.identity {
        Some(identity) => {
            info!("Synchronizing for identity: {}", identity);
            synchronizer.set_identity(Some(identity.clone())).await;
        }
        None => {
            info!("No identity configured, idling until shutdown");
        }
    }

    let signal_name = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal_name);

    synchronizer.shutdown().await;
    info!("Daemon stopped");

    Ok(())
}

/// Construct the value source selected at build time
fn build_source(config: &Config) -> Result<Box<dyn ValueSource<Value = String>>> {
    #[cfg(feature = "http")]
    {
        info!("Value source: {}", config.source_url);
        return Ok(Box::new(statesync_source_http::HttpValueSource::new(
            &config.source_url,
        )));
    }

    #[cfg(not(feature = "http"))]
    {
        let _ = config;
        anyhow::bail!("statesyncd was built without a value source; enable the 'http' feature")
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
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

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
