//! torshift
//!
//! Restarts the Tor service on a fixed interval and verifies the resulting
//! exit address through the SOCKS proxy.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use torshift_core::config::load_settings;
use torshift_core::tracing_init::{DEFAULT_LOG_FILE, default_filter, init_tracing};
use torshift_core::{ExhaustedPolicy, RestartWait, RotationConfig, Settings};
use torshift_daemon::identity::{HttpProbe, IdentityVerifier};
use torshift_daemon::rotation::{EXIT_FAILURE, EXIT_VERIFICATION_FAILED, RotationLoop};
use torshift_daemon::service::{ProxyService, SystemdService};
use torshift_daemon::signals::spawn_signal_listener;

#[derive(Parser, Debug)]
#[command(name = "torshift")]
#[command(version, about = "torshift - rotate the Tor exit identity on a fixed interval")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Seconds between identity rotations (default 60)
    #[arg(
        short = 't',
        long,
        env = "TORSHIFT_INTERVAL",
        allow_negative_numbers = true,
        global = true
    )]
    interval: Option<i64>,

    /// Proxy the probe is routed through (default socks5h://127.0.0.1:9050)
    #[arg(long, env = "TORSHIFT_PROXY", global = true)]
    proxy: Option<String>,

    /// JSON endpoint echoing the caller's address (default https://httpbin.org/ip)
    #[arg(long, env = "TORSHIFT_PROBE_URL", global = true)]
    probe_url: Option<String>,

    /// Field of the probe response holding the address (default "origin")
    #[arg(long, env = "TORSHIFT_ADDRESS_FIELD", global = true)]
    address_field: Option<String>,

    /// systemd unit of the proxy daemon (default "tor")
    #[arg(long, env = "TORSHIFT_SERVICE", global = true)]
    service: Option<String>,

    /// What to do when every verification attempt fails: exit or skip
    #[arg(long, env = "TORSHIFT_ON_EXHAUSTED", global = true)]
    on_exhausted: Option<ExhaustedPolicy>,

    /// Whether the next verification waits for the restart: detached or await
    #[arg(long, env = "TORSHIFT_RESTART_WAIT", global = true)]
    restart_wait: Option<RestartWait>,

    /// Seconds to wait for outstanding restarts on shutdown (default 30)
    #[arg(long, env = "TORSHIFT_SHUTDOWN_TIMEOUT", global = true)]
    shutdown_timeout: Option<u64>,

    /// JSON settings file (default ~/.config/torshift/settings.json if present)
    #[arg(long, env = "TORSHIFT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Service control program with `systemctl`-compatible arguments
    #[arg(
        long,
        default_value = "systemctl",
        env = "TORSHIFT_SYSTEMCTL",
        global = true,
        hide = true
    )]
    systemctl: String,

    /// Log file receiving a plain-text copy of every log line
    #[arg(long, default_value = DEFAULT_LOG_FILE, env = "TORSHIFT_LOG_FILE", global = true)]
    log_file: PathBuf,

    /// Log to stdout only.
    #[arg(long, env = "TORSHIFT_NO_LOG_FILE", global = true)]
    no_log_file: bool,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "TORSHIFT_LOG_LEVEL", global = true)]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "TORSHIFT_LOG_JSON", global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Rotate the identity on a fixed interval until interrupted (default)
    Run,
    /// Probe the current exit address once and print it
    Check,
    /// Restart the proxy service once and wait for it
    Restart,
}

impl Args {
    /// Command-line and environment layer of the settings hierarchy.
    fn settings(&self) -> Settings {
        Settings {
            interval_secs: self.interval,
            proxy: self.proxy.clone(),
            probe_url: self.probe_url.clone(),
            address_field: self.address_field.clone(),
            service: self.service.clone(),
            on_exhausted: self.on_exhausted,
            restart_wait: self.restart_wait,
            shutdown_timeout_secs: self.shutdown_timeout,
        }
    }
}

#[tokio::main]
#[allow(clippy::print_stderr)]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_file = (!args.no_log_file).then_some(args.log_file.as_path());
    if let Err(e) = init_tracing(&default_filter(&args.log_level), args.log_json, log_file) {
        eprintln!("torshift: {e}");
        return ExitCode::from(EXIT_FAILURE);
    }

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = match load_settings(args.config.as_deref())
        .and_then(|file| file.merge(args.settings()).resolve())
    {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Ok(ExitCode::from(EXIT_FAILURE));
        }
    };
    let service =
        Arc::new(SystemdService::new(config.service.clone()).with_program(&args.systemctl));

    match args.command.unwrap_or(Command::Run) {
        Command::Run => rotate(config, service).await,
        Command::Check => check(&config).await,
        Command::Restart => restart(service).await,
    }
}

async fn rotate(
    config: RotationConfig,
    service: Arc<SystemdService>,
) -> anyhow::Result<ExitCode> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        interval_secs = config.interval().as_secs(),
        proxy = %config.proxy,
        probe_url = %config.probe.url,
        service = %config.service,
        "Starting torshift"
    );

    let probe = HttpProbe::new(&config.proxy, &config.probe)?;
    let cancel = CancellationToken::new();
    let _signals = spawn_signal_listener(cancel.clone())?;

    let rotation = match RotationLoop::start(config, service, probe, cancel) {
        Ok(rotation) => rotation,
        Err(e) => {
            error!(error = %e, "Preflight check failed");
            return Ok(ExitCode::from(e.exit_code()));
        }
    };

    #[cfg(unix)]
    notify(sd_notify::NotifyState::Ready);
    let result = rotation.run().await;
    #[cfg(unix)]
    notify(sd_notify::NotifyState::Stopping);

    match result {
        Ok(_) => {
            info!("torshift stopped");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "Rotation loop failed");
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}

#[allow(clippy::print_stdout)]
async fn check(config: &RotationConfig) -> anyhow::Result<ExitCode> {
    let probe = HttpProbe::new(&config.proxy, &config.probe)?;
    let verifier = IdentityVerifier::new(probe, config.retry);

    match verifier.verify().await {
        Ok(result) => {
            println!("{}", result.address);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "Exit address verification failed");
            Ok(ExitCode::from(EXIT_VERIFICATION_FAILED))
        }
    }
}

async fn restart(service: Arc<SystemdService>) -> anyhow::Result<ExitCode> {
    info!(service = service.name(), "Restarting proxy service");
    let svc = Arc::clone(&service);
    match tokio::task::spawn_blocking(move || svc.restart()).await? {
        Ok(()) => {
            info!(service = service.name(), "Proxy service restarted");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(service = service.name(), error = %e, "Proxy service restart failed");
            Ok(ExitCode::from(EXIT_FAILURE))
        }
    }
}

/// Report state to systemd. A no-op when not running under systemd.
#[cfg(unix)]
fn notify(state: sd_notify::NotifyState<'_>) {
    if let Err(e) = sd_notify::notify(false, &[state]) {
        warn!(error = %e, "Failed to notify systemd");
    }
}
