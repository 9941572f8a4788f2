#![forbid(unsafe_code)]

//! `course-sentinel`: course portal monitor binary.
//!
//! Bootstraps configuration and secrets, opens the document store, starts
//! the portal helper and the Telegram gateway, then runs check cycles on a
//! fixed interval until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use course_sentinel::calendar::JalaliCalendar;
use course_sentinel::clock::system_clock;
use course_sentinel::config::GlobalConfig;
use course_sentinel::deadline::DeadlineTracker;
use course_sentinel::messaging::telegram::TelegramGateway;
use course_sentinel::messaging::MessagingGateway;
use course_sentinel::monitor::{Collaborators, HttpFileFetcher, Monitor};
use course_sentinel::persistence::db;
use course_sentinel::persistence::document_repo::DocumentRepo;
use course_sentinel::portal::PortalHelper;
use course_sentinel::scheduler::{shutdown_monitor, QuietHours, Scheduler};
use course_sentinel::session::captcha::CaptchaBroker;
use course_sentinel::session::retry::RetryPolicy;
use course_sentinel::session::SessionManager;
use course_sentinel::{AppError, Result};

/// How long shutdown waits for an in-flight cycle.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "course-sentinel", about = "Course portal monitor", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let config = GlobalConfig::load_from_path(&args.config)?;
    init_tracing(args.log_format, config.debug)?;
    info!("course-sentinel bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(config, args.once))
}

async fn run(mut config: GlobalConfig, once: bool) -> Result<()> {
    // ── Secrets ─────────────────────────────────────────
    config.load_credentials().await?;
    let config = Arc::new(config);
    info!(courses = config.courses.len(), "configuration loaded");

    // ── Store ───────────────────────────────────────────
    let db = Arc::new(db::connect(&config.db_path).await?);
    let repo = DocumentRepo::new(db);
    info!(path = %config.db_path.display(), "database connected");

    // ── Collaborators ───────────────────────────────────
    let clock = system_clock();
    let tracker =
        DeadlineTracker::new(config.utc_offset()?)?.with_calendar(Arc::new(JalaliCalendar));
    let helper = Arc::new(PortalHelper::new(&config.browser));
    let gateway: Arc<dyn MessagingGateway> = Arc::new(TelegramGateway::new(
        &config.telegram,
        config.browser.proxy.as_deref(),
    )?);
    let fetcher = Arc::new(HttpFileFetcher::new(&config)?);

    let captcha_timeout = match config.session.captcha_timeout_seconds {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let captcha = CaptchaBroker::new(
        Arc::clone(&gateway),
        config.telegram.admin_chat_id.clone(),
        Duration::from_secs(config.session.captcha_poll_seconds),
        Duration::from_secs(config.session.captcha_reply_window_seconds),
        captcha_timeout,
        Arc::clone(&clock),
    );
    let retry = RetryPolicy::new(
        config.session.login_attempts,
        Duration::from_secs(config.session.retry_backoff_seconds),
    );
    let session = SessionManager::new(
        helper.clone(),
        captcha,
        config.portal.clone(),
        config.credentials.clone(),
        retry,
    );

    let deps = Collaborators {
        config: Arc::clone(&config),
        browser: helper.clone(),
        extractor: helper,
        gateway,
        fetcher,
        repo,
        tracker,
        clock: Arc::clone(&clock),
    };
    let mut monitor = Monitor::load(session, deps).await?;
    info!("monitor state loaded");

    if once {
        let result = monitor.run_cycle().await;
        if let Err(err) = monitor.shutdown().await {
            warn!(%err, "failed to close browsing context");
        }
        let report = result?;
        info!(?report, "single cycle finished");
        return Ok(());
    }

    // ── Scheduler ───────────────────────────────────────
    let monitor = Arc::new(Mutex::new(monitor));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&monitor),
        QuietHours::from_config(&config)?,
        clock,
    ));
    let ct = CancellationToken::new();
    let scheduler_handle = scheduler.spawn(config.check_interval(), ct.clone());
    info!(
        interval_minutes = config.check_interval_minutes,
        "scheduler started"
    );

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    if let Err(err) = scheduler_handle.await {
        error!(%err, "scheduler task failed");
    }
    shutdown_monitor(&monitor, SHUTDOWN_GRACE).await;
    info!("course-sentinel shut down");

    Ok(())
}

fn init_tracing(log_format: LogFormat, debug: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}
