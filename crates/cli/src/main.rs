use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tickgrab_core::api::HttpTicketingApi;
use tickgrab_core::driver::{PageDriver, WebDriverClient};
use tickgrab_core::notify::create_notifiers;
use tickgrab_core::{
    create_browser_adapter, create_event_system, load_config, validate_config, AcquisitionMachine,
    ApiSiteAdapter, Config, EventStore, LoggingConfig, RunOutcome, SanitizedConfig, SiteAdapter,
    SiteMode, SqliteEventStore,
};

/// Exit code for a run cancelled by a signal (128 + SIGINT).
const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "tickgrab", version, about = "Grab a concert ticket the moment seats open up")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "TICKGRAB_CONFIG", default_value = "tickgrab.toml")]
    config: PathBuf,

    /// Id of the event to acquire (defaults to the first configured event)
    #[arg(long)]
    concert: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // The log file location comes from the config, so load it before tracing is up.
    let config = load(&args);
    let logging = config.as_ref().ok().map(|c| &c.logging);
    let _log_guard = init_tracing(&args, logging);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(args, config).await {
        Ok(outcome) => ExitCode::from(exit_code(&outcome)),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Install console logging plus, when enabled, a per-run log file.
///
/// The returned guard flushes the file writer on drop and must live until exit.
fn init_tracing(args: &Args, logging: Option<&LoggingConfig>) -> Option<WorkerGuard> {
    let default_filter = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let mut file_error = None;
    let (file_writer, guard) = match logging.filter(|l| l.file_enabled) {
        Some(logging) => match log_file_appender(logging) {
            Ok(appender) => {
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (Some(writer), Some(guard))
            }
            Err(e) => {
                file_error = Some(format!("{:?}: {}", logging.dir, e));
                (None, None)
            }
        },
        None => (None, None),
    };

    let console_json = args.json_logs.then(|| tracing_subscriber::fmt::layer().json());
    let console_text = (!args.json_logs).then(|| tracing_subscriber::fmt::layer());
    let file = file_writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_json)
        .with(console_text)
        .with(file)
        .init();

    if let Some(e) = file_error {
        warn!("Log file disabled, could not create it in {}", e);
    }
    guard
}

/// Appender for `<dir>/tickgrab_<YYYYmmdd_HHMMSS>.log`, creating `dir` if needed.
fn log_file_appender(logging: &LoggingConfig) -> Result<RollingFileAppender, InitError> {
    let prefix = format!("tickgrab_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"));
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(&logging.dir)
}

/// Load and validate the configuration, applying command line overrides.
fn load(args: &Args) -> Result<Config> {
    let mut config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    if args.headless {
        config.browser.headless = true;
    }
    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

async fn run(args: Args, config: Config) -> Result<RunOutcome> {
    info!("Loaded configuration from {:?}", args.config);
    let config_json = serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!("Configuration loaded (hash {})", &config_hash[..16]);
    tracing::debug!("Configuration: {}", config_json);

    // Pick the event and its site
    let target = config
        .select_event(args.concert.as_deref())
        .cloned()
        .ok_or_else(|| match &args.concert {
            Some(id) => anyhow!("Event {:?} not found in configuration", id),
            None => anyhow!("No events configured"),
        })?;
    let (site, site_config) = config
        .site_for(&target)
        .map(|(site, cfg)| (site, cfg.clone()))
        .ok_or_else(|| anyhow!("No site configuration for event {}", target.id))?;
    info!("Target: {} on {} ({:?} mode)", target.label(), site, site_config.mode);

    // Event journal and notifications. Set up before the browser session:
    // nothing between `connect` and `close` below may return early.
    let store: Option<Arc<dyn EventStore>> = if config.journal.enabled {
        let store = SqliteEventStore::new(&config.journal.path).with_context(|| {
            format!("Failed to open event journal {:?}", config.journal.path)
        })?;
        info!("Event journal: {:?}", config.journal.path);
        Some(Arc::new(store) as Arc<dyn EventStore>)
    } else {
        None
    };
    let notifiers = create_notifiers(&config.notification).context("Failed to set up notifications")?;
    let (events, writer) = create_event_system(store, notifiers, config.journal.buffer_size);
    let writer_handle = tokio::spawn(writer.run());

    // Build the site adapter
    let mut session: Option<Arc<WebDriverClient>> = None;
    let adapter: Arc<dyn SiteAdapter> = match site_config.mode {
        SiteMode::Browser => {
            let driver = Arc::new(
                WebDriverClient::connect(&config.browser)
                    .await
                    .with_context(|| {
                        format!("Failed to open a browser session at {}", config.browser.webdriver_url)
                    })?,
            );
            info!("Browser session {} ready", driver.session_id());
            session = Some(Arc::clone(&driver));
            create_browser_adapter(
                site,
                &site_config,
                &config.browser,
                driver as Arc<dyn PageDriver>,
            )
        }
        SiteMode::Api => {
            let api = HttpTicketingApi::new(site, &site_config)
                .context("Failed to create ticketing API client")?;
            Arc::new(ApiSiteAdapter::new(site, Arc::new(api), target.clone())) as Arc<dyn SiteAdapter>
        }
    };

    // Cancel the run on Ctrl+C / SIGTERM
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let machine = AcquisitionMachine::new(
        adapter,
        target,
        config.user.clone(),
        config.acquisition.clone(),
    )
    .with_events(events);
    let run = machine.run(cancel).await;

    if let Some(driver) = session {
        if let Err(e) = driver.close().await {
            warn!("Failed to close browser session: {}", e);
        }
    }

    // The machine holds the last EventHandle; dropping it closes the writer's channel.
    drop(machine);
    join_writer(writer_handle).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&run).context("Failed to render run summary")?
    );

    run.outcome
        .ok_or_else(|| anyhow!("Run {} ended without an outcome", run.id))
}

/// Wait for the event writer to drain; a panicked writer is logged, not propagated.
async fn join_writer(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        warn!("Event writer task failed: {}", e);
    }
}

fn exit_code(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Success { .. } => 0,
        RunOutcome::Failed { .. } => 1,
        RunOutcome::Cancelled => EXIT_CANCELLED,
    }
}

/// Cancel `cancel` on Ctrl+C or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
    info!("Shutdown requested, cancelling run");
    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickgrab_core::FailureReason;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            exit_code(&RunOutcome::Success {
                order_ref: "o-1".to_string()
            }),
            0
        );
        assert_eq!(
            exit_code(&RunOutcome::failed(FailureReason::LoginFailed, "nope")),
            1
        );
        assert_eq!(exit_code(&RunOutcome::Cancelled), 130);
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["tickgrab"]).unwrap();
        assert!(args.concert.is_none());
        assert!(!args.headless);
        assert!(!args.debug);
    }

    #[test]
    fn test_args_flags() {
        let args = Args::try_parse_from([
            "tickgrab",
            "--config",
            "/etc/tickgrab.toml",
            "--concert",
            "c-42",
            "--headless",
            "--debug",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/tickgrab.toml"));
        assert_eq!(args.concert.as_deref(), Some("c-42"));
        assert!(args.headless);
        assert!(args.debug);
    }

    fn write_config(dir: &std::path::Path, extra: &str) -> PathBuf {
        let path = dir.join("tickgrab.toml");
        let body = format!(
            r#"
[user]
username = "fan"
password = "pw"

[browser]
webdriver_url = "http://127.0.0.1:9"

[ticketing]
default_site = "interpark"

[ticketing.sites.interpark]
login_url = "https://interpark.example/login"

[[events]]
id = "c-1"
url = "https://interpark.example/c-1"
{}
"#,
            extra
        );
        std::fs::write(&path, body).unwrap();
        path
    }

    fn args_for(path: &std::path::Path) -> Args {
        Args::try_parse_from(["tickgrab", "--config", path.to_str().unwrap()]).unwrap()
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = args_for(&dir.path().join("absent.toml"));
        assert!(load(&args).is_err());
    }

    #[test]
    fn test_headless_flag_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "");
        let args = Args::try_parse_from([
            "tickgrab",
            "--config",
            path.to_str().unwrap(),
            "--headless",
        ])
        .unwrap();
        assert!(load(&args).unwrap().browser.headless);
    }

    #[tokio::test]
    async fn test_journal_failure_stops_before_browser_session() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("missing").join("journal.db");
        let path = write_config(
            dir.path(),
            &format!("\n[journal]\npath = {:?}\n", journal.to_str().unwrap()),
        );
        let args = args_for(&path);
        let config = load(&args).unwrap();

        let err = run(args, config).await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Failed to open event journal"), "{}", message);
        assert!(!message.contains("browser session"), "{}", message);
    }

    #[tokio::test]
    async fn test_panicked_writer_is_logged_not_propagated() {
        let handle = tokio::spawn(async { panic!("writer blew up") });
        join_writer(handle).await;
    }

    #[test]
    fn test_log_file_is_created_in_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logging = LoggingConfig {
            file_enabled: true,
            dir: dir.path().join("logs"),
        };

        let _appender = log_file_appender(&logging).unwrap();

        let names: Vec<String> = std::fs::read_dir(&logging.dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("tickgrab_"));
        assert!(names[0].ends_with(".log"));
    }
}
