use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use signup_wizard::config::ServiceConfig;
use signup_wizard::store::{Database, LibSqlBackend, SettingsRecordStore};
use signup_wizard::wizard::{
    SettingsSession, SignupRouteState, StepHistory, SystemClock, WizardDeps, WizardOrchestrator,
    signup_routes,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("Invalid SIGNUP_* environment")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(config.log_dir.as_deref())?;

    eprintln!("📝 Signup Wizard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/signup", config.port);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   User: {}\n", config.user_id);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── Wizard ───────────────────────────────────────────────────────────
    let deps = WizardDeps {
        store: Arc::new(SettingsRecordStore::new(Arc::clone(&db), &config.user_id)),
        session: Arc::new(SettingsSession::new(Arc::clone(&db), &config.user_id)),
        router: Arc::new(StepHistory::new()),
        clock: Arc::new(SystemClock),
        rules: config.rules,
    };
    let orchestrator = Arc::new(WizardOrchestrator::new(deps));
    orchestrator.mount(None).await;

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = signup_routes(SignupRouteState { orchestrator }, config.cors_any);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Signup wizard server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

/// Console logging, plus a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(false);

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "signup-wizard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(guard)
}
