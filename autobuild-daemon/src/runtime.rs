use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use autobuild_core::{Config, LogFormat, SelfUpdateConfig};
use autobuild_sync::{process, ProcessMode};

use crate::error::{io_err, DaemonError};
use crate::self_update::{self_update, SelfUpdateOutcome};

/// What one repository did during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoSummary {
    pub name: String,
    pub ok: bool,
    pub outcome: String,
}

/// One polling tick, logged at info level when it completes.
#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
    pub repos: Vec<RepoSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_update: Option<String>,
}

impl TickSummary {
    pub fn failures(&self) -> usize {
        self.repos.iter().filter(|r| !r.ok).count()
    }
}

/// Start the scheduler and block the current thread until Ctrl-C.
pub fn start_blocking(config: Config) -> Result<(), DaemonError> {
    build_runtime()?.block_on(run(config))
}

/// Run exactly one tick on a fresh runtime.
pub fn once_blocking(config: Config) -> Result<TickSummary, DaemonError> {
    build_runtime()?.block_on(run_once(config))
}

fn build_runtime() -> Result<tokio::runtime::Runtime, DaemonError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))
}

/// Poll every `config.interval()` until Ctrl-C.
pub async fn run(config: Config) -> Result<(), DaemonError> {
    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received ctrl-c, shutting down");
                Ok(())
            }
            Err(err) => Err(DaemonError::Signal(err)),
        }
    };
    run_until(config, shutdown).await.map(|_| ())
}

/// Poll until `shutdown` resolves. Returns the number of ticks run.
///
/// The first tick fires immediately. A tick that overruns the interval
/// delays the next one; missed ticks are never queued up.
pub async fn run_until<F>(config: Config, shutdown: F) -> Result<u64, DaemonError>
where
    F: Future<Output = Result<(), DaemonError>>,
{
    drive(config, shutdown, tick_blocking).await
}

/// The scheduler loop with the tick body supplied by the caller. A tick
/// that dies (panics) is logged and the loop carries on.
async fn drive<F, T>(config: Config, shutdown: F, tick: T) -> Result<u64, DaemonError>
where
    F: Future<Output = Result<(), DaemonError>>,
    T: Fn(&Config, bool) -> TickSummary + Clone + Send + 'static,
{
    let config = Arc::new(config);
    let mut interval = tokio::time::interval(config.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    tracing::info!(
        repos = config.repos.len(),
        interval_secs = config.interval().as_secs(),
        self_update = config.enabled_self_update().is_some(),
        "scheduler started"
    );

    let mut ticks = 0u64;
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            _ = interval.tick() => {
                let with_self_update = self_update_due(&config, ticks == 0);
                match run_tick(config.clone(), with_self_update, tick.clone()).await {
                    Ok(summary) => log_summary(&summary),
                    Err(err) => {
                        tracing::error!(error = %err, "tick aborted, waiting for the next one");
                    }
                }
                ticks += 1;
            }
        }
    }
    Ok(ticks)
}

/// Run a single tick, including self-update when it is enabled.
pub async fn run_once(config: Config) -> Result<TickSummary, DaemonError> {
    let with_self_update = config.enabled_self_update().is_some();
    let summary = run_tick(Arc::new(config), with_self_update, tick_blocking).await?;
    log_summary(&summary);
    Ok(summary)
}

fn self_update_due(config: &Config, first_tick: bool) -> bool {
    config
        .enabled_self_update()
        .map_or(false, |su| !first_tick || su.run_on_startup)
}

async fn run_tick<T>(
    config: Arc<Config>,
    with_self_update: bool,
    tick: T,
) -> Result<TickSummary, DaemonError>
where
    T: Fn(&Config, bool) -> TickSummary + Send + 'static,
{
    tokio::task::spawn_blocking(move || tick(&config, with_self_update))
        .await
        .map_err(|err| DaemonError::Join {
            task: "tick",
            message: err.to_string(),
        })
}

/// All repositories in order, then the self-update. Failures are logged
/// and recorded in the summary, never propagated.
pub fn tick_blocking(config: &Config, with_self_update: bool) -> TickSummary {
    let started_at = Utc::now();
    let started = Instant::now();

    let repos = config
        .repos
        .iter()
        .map(|repo| match process(repo, ProcessMode::IfChanged) {
            Ok(outcome) => RepoSummary {
                name: repo.name.to_string(),
                ok: true,
                outcome: outcome.label(),
            },
            Err(err) => {
                tracing::error!(repo = %repo.name, error = %err, "repository cycle failed");
                RepoSummary {
                    name: repo.name.to_string(),
                    ok: false,
                    outcome: format!("failed: {err}"),
                }
            }
        })
        .collect();

    let self_update = match config.enabled_self_update() {
        Some(su) if with_self_update => Some(run_self_update(su)),
        _ => None,
    };

    TickSummary {
        started_at,
        duration_ms: started.elapsed().as_millis(),
        repos,
        self_update,
    }
}

fn run_self_update(su: &SelfUpdateConfig) -> String {
    match self_update(su) {
        Ok(SelfUpdateOutcome::UpToDate { .. }) => "up-to-date".to_string(),
        Err(err) => {
            tracing::error!(
                repo = SelfUpdateConfig::NAME,
                error = %err,
                "self-update failed, continuing on the current binary"
            );
            format!("failed: {err}")
        }
    }
}

fn log_summary(summary: &TickSummary) {
    let outcomes = summary
        .repos
        .iter()
        .map(|r| format!("{}={}", r.name, r.outcome))
        .collect::<Vec<_>>()
        .join(", ");
    tracing::info!(
        started_at = %summary.started_at.to_rfc3339(),
        duration_ms = summary.duration_ms as u64,
        failures = summary.failures(),
        self_update = summary.self_update.as_deref().unwrap_or("skipped"),
        "tick complete: [{outcomes}]"
    );
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
/// Calling it twice is harmless.
pub fn init_tracing(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = match format {
        LogFormat::Text => fmt().with_env_filter(filter).with_target(false).try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use autobuild_core::{Auth, CommandSpec, RepoName, RepositoryConfig};
    use tempfile::TempDir;

    fn broken_repo(root: &TempDir, name: &str) -> RepositoryConfig {
        RepositoryConfig {
            name: RepoName::from(name),
            url: root.path().join("missing-upstream").display().to_string(),
            branch: "main".to_string(),
            auth: Auth::None,
            clone_dir: root.path().join(name),
            source_dir: None,
            output_dir: root.path().join("out"),
            build_cmd: vec![CommandSpec::Shell("true".to_string())],
            restart_cmd: None,
            artifact_name: None,
        }
    }

    fn self_update_section(run_on_startup: bool) -> SelfUpdateConfig {
        SelfUpdateConfig {
            enable: true,
            url: "unused".to_string(),
            branch: "main".to_string(),
            auth: Auth::None,
            clone_dir: PathBuf::from("/nonexistent/src"),
            source_dir: None,
            output_dir: PathBuf::from("/nonexistent/bin"),
            build_cmd: vec![],
            artifact_name: None,
            run_on_startup,
        }
    }

    #[test]
    fn failing_repositories_are_summarised_not_propagated() {
        let root = TempDir::new().unwrap();
        let config = Config {
            repos: vec![broken_repo(&root, "a"), broken_repo(&root, "b")],
            ..Config::default()
        };
        let summary = tick_blocking(&config, false);
        assert_eq!(summary.repos.len(), 2);
        assert_eq!(summary.failures(), 2);
        assert_eq!(summary.repos[0].name, "a");
        assert!(summary.repos[1].outcome.starts_with("failed:"));
        assert!(summary.self_update.is_none());
    }

    #[test]
    fn self_update_schedule_respects_run_on_startup() {
        let mut config = Config {
            self_update: Some(self_update_section(false)),
            ..Config::default()
        };
        assert!(!self_update_due(&config, true));
        assert!(self_update_due(&config, false));

        config.self_update = Some(self_update_section(true));
        assert!(self_update_due(&config, true));

        if let Some(su) = config.self_update.as_mut() {
            su.enable = false;
        }
        assert!(!self_update_due(&config, false));
    }

    #[test]
    fn summary_serializes_with_timestamp() {
        let summary = tick_blocking(&Config::default(), false);
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["started_at"].is_string());
        assert_eq!(json["repos"], serde_json::json!([]));
        assert!(json.get("self_update").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_immediate_and_interval_is_respected() {
        let config = Config {
            interval_minutes: 5,
            ..Config::default()
        };
        let shutdown = async {
            tokio::time::sleep(Duration::from_secs(11 * 60)).await;
            Ok(())
        };
        let ticks = run_until(config, shutdown).await.unwrap();
        assert_eq!(ticks, 3, "ticks at 0, 5 and 10 minutes");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_second_tick_stops_after_one() {
        let shutdown = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        };
        let ticks = run_until(Config::default(), shutdown).await.unwrap();
        assert_eq!(ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_panicking_tick_does_not_stop_the_scheduler() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let tick = move |config: &Config, with_self_update: bool| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("build tool crashed");
            }
            tick_blocking(config, with_self_update)
        };
        let config = Config {
            interval_minutes: 5,
            ..Config::default()
        };
        let shutdown = async {
            tokio::time::sleep(Duration::from_secs(11 * 60)).await;
            Ok(())
        };

        let ticks = drive(config, shutdown, tick).await.unwrap();
        assert_eq!(ticks, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn run_once_returns_the_summary() {
        let root = TempDir::new().unwrap();
        let config = Config {
            repos: vec![broken_repo(&root, "svc")],
            ..Config::default()
        };
        let summary = run_once(config).await.unwrap();
        assert_eq!(summary.repos.len(), 1);
        assert!(!summary.repos[0].ok);
    }
}
