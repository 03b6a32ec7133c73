use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use repograph_core::{
    App, CleanupOutcome, Config, Repository, RepositoryStore, RunOptions, RunReport, ScanStatus,
    resolve_config_path,
};
use repograph_scheduler::SyncScheduler;
use repograph_vcs::VcsProvider;
use repograph_vcs::redact::redact_credentials;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Parser)]
#[command(
    name = "repograph",
    about = "Keeps a code knowledge graph in sync with remote git repositories"
)]
#[command(version, propagate_version = true)]
struct Cli {
    /// Config file (defaults to $REPOGRAPH_CONFIG, then config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a repository
    Add {
        id: String,
        /// Remote URL, or a local path / local:// URL
        url: String,
        /// Branch to track (defaults to the remote's default branch)
        #[arg(short, long)]
        branch: Option<String>,
        /// Minutes between remote checks; 0 disables background sync
        #[arg(long)]
        sync_interval: Option<u32>,
        /// Register even if the remote cannot be reached now
        #[arg(long)]
        no_verify: bool,
    },

    /// Remove a repository with its graph and checkout
    Remove { id: String },

    /// List registered repositories
    List,

    /// Run the indexing pipeline for one repository
    Index {
        id: String,
        /// Re-index even if HEAD matches the last indexed commit
        #[arg(long)]
        force: bool,
        /// Do not notify the search indexer
        #[arg(long)]
        skip_notify: bool,
    },

    /// Show the status of a repository
    Status { id: String },

    /// Run one sync cycle against every due repository
    Sync,

    /// Poll remotes and re-index drifted repositories until interrupted
    Daemon,

    /// Query the search indexer
    Search {
        query: String,
        /// Restrict results to one repository
        #[arg(long)]
        repo: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let app = App::build(config).await?;

    match cli.command {
        Commands::Add {
            id,
            url,
            branch,
            sync_interval,
            no_verify,
        } => add(&app, id, url, branch, sync_interval, no_verify).await,
        Commands::Remove { id } => {
            let outcome = app.orchestrator.delete_repository(&id).await?;
            match outcome {
                CleanupOutcome::Quarantined { to } => println!(
                    "removed {id}; checkout could not be deleted and was moved to {}",
                    to.display()
                ),
                _ => println!("removed {id}"),
            }
            Ok(())
        }
        Commands::List => list(&app, cli.json).await,
        Commands::Index {
            id,
            force,
            skip_notify,
        } => {
            let report = app
                .orchestrator
                .run_index(
                    &id,
                    RunOptions {
                        force,
                        skip_external_notify: skip_notify,
                    },
                )
                .await?;
            print_report(&report, cli.json)?;
            if !report.succeeded() {
                bail!("indexing {id} failed");
            }
            Ok(())
        }
        Commands::Status { id } => {
            let status = app.orchestrator.get_status(&id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!(
                    "{id}: {} ({}%) {}",
                    status.status, status.progress.percent, status.progress.step
                );
                if let Some(sha) = &status.last_indexed_sha {
                    println!("  last indexed: {sha}");
                }
                if let Some(err) = &status.last_index_error {
                    println!("  last error:   {err}");
                }
                for ns in &status.namespaces {
                    println!("  namespace {} -> {}", ns.name, ns.root_path);
                }
            }
            Ok(())
        }
        Commands::Sync => {
            let scheduler = SyncScheduler::from_config(
                &app.config.sync,
                Arc::clone(&app.repos),
                app.providers.clone(),
            );
            let outcome = scheduler.run_cycle().await;
            println!(
                "checked {}, changed {}, failed {}",
                outcome.checked.len(),
                outcome.changed.len(),
                outcome.failed.len()
            );
            for id in &outcome.changed {
                println!("  {id}: new commits, pending re-index");
            }
            for id in &outcome.failed {
                println!("  {id}: remote check failed");
            }
            Ok(())
        }
        Commands::Daemon => daemon(app).await,
        Commands::Search { query, repo } => {
            let hits = app.orchestrator.search(&query, repo.as_deref()).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("no results");
            } else {
                for hit in hits {
                    let line = hit.line.map(|l| format!(":{l}")).unwrap_or_default();
                    println!("{}  {}{line}", hit.repo_id, hit.path);
                    if let Some(snippet) = hit.snippet {
                        println!("    {}", snippet.trim());
                    }
                }
            }
            Ok(())
        }
    }
}

async fn add(
    app: &App,
    id: String,
    url: String,
    branch: Option<String>,
    sync_interval: Option<u32>,
    no_verify: bool,
) -> anyhow::Result<()> {
    let provider = app.providers.provider_for(&url);
    if !no_verify && !provider.validate_access(&url).await {
        bail!(
            "cannot access {} via {}; pass --no-verify to register anyway",
            redact_credentials(&url),
            provider.name()
        );
    }

    let minutes = sync_interval.unwrap_or(app.config.sync.default_repo_interval_minutes);
    let mut repo = Repository::new(&id, &url).with_sync(minutes > 0, minutes);
    if let Some(branch) = branch {
        repo = repo.with_branch(branch);
    }
    app.repos
        .insert(&repo)
        .await
        .with_context(|| format!("failed to register {id}"))?;
    println!("registered {id} ({})", provider.name());
    Ok(())
}

async fn list(app: &App, json: bool) -> anyhow::Result<()> {
    let repos = app.repos.list().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&repos)?);
        return Ok(());
    }
    for repo in repos {
        let sha = repo
            .last_indexed_sha
            .as_deref()
            .map_or("-", |s| &s[..s.len().min(12)]);
        println!(
            "{:<24} {:<20} {:<12} {}",
            repo.id,
            repo.status.as_str(),
            sha,
            redact_credentials(&repo.url)
        );
    }
    Ok(())
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let sha = report.commit_sha.as_deref().unwrap_or("-");
    if report.unchanged {
        println!("{}: already indexed at {sha}", report.repo_id);
    } else {
        println!(
            "{}: {} at {sha} ({} namespaces, {} files, {} symbols, {} skipped) in {}ms",
            report.repo_id,
            report.status,
            report.namespaces,
            report.files,
            report.symbols,
            report.skipped_files,
            report.elapsed_ms
        );
    }
    for stage in report.stages.iter().filter(|s| !s.ok) {
        println!("  {} failed: {}", stage.stage.as_str(), stage.detail);
    }
    if let Some(err) = &report.error {
        println!("  error: {err}");
    }
    Ok(())
}

async fn daemon(app: App) -> anyhow::Result<()> {
    if !app.config.sync.enabled {
        bail!("sync is disabled; set [sync] enabled = true to run the daemon");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let (changed_tx, mut changed_rx) = mpsc::channel::<String>(64);
    let backlog = enqueue_backlog(Arc::clone(&app.repos), changed_tx.clone());

    let scheduler = Arc::new(
        SyncScheduler::from_config(&app.config.sync, Arc::clone(&app.repos), app.providers.clone())
            .with_changed_sender(changed_tx),
    );
    let scheduler_task = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx.clone()));

    let mut shutdown = shutdown_rx;
    loop {
        tokio::select! {
            Some(id) = changed_rx.recv() => {
                let orchestrator = Arc::clone(&app.orchestrator);
                tokio::spawn(async move {
                    match orchestrator.run_index(&id, RunOptions::default()).await {
                        Ok(report) if report.succeeded() => tracing::info!(
                            repo_id = %id,
                            files = report.files,
                            symbols = report.symbols,
                            unchanged = report.unchanged,
                            "background index finished"
                        ),
                        Ok(report) => tracing::warn!(
                            repo_id = %id,
                            error = report.error.as_deref().unwrap_or("unknown"),
                            "background index failed"
                        ),
                        Err(e) => tracing::warn!(repo_id = %id, "background index failed: {e}"),
                    }
                });
            }
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    drop(changed_rx);
    backlog.abort();
    scheduler_task.await.context("scheduler task panicked")?;
    tracing::info!("daemon stopped");
    Ok(())
}

/// Queue every repository left `PENDING` by an earlier process. Runs on its own task: the
/// dispatch loop must already be draining `tx` when the backlog exceeds the channel capacity.
fn enqueue_backlog(
    repos: Arc<dyn RepositoryStore>,
    tx: mpsc::Sender<String>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let pending = match repos.list().await {
            Ok(all) => all
                .into_iter()
                .filter(|r| r.status == ScanStatus::Pending)
                .map(|r| r.id),
            Err(e) => {
                tracing::warn!("could not load pending repositories: {e}");
                return 0;
            }
        };
        let mut queued = 0;
        for id in pending {
            if tx.send(id).await.is_err() {
                break;
            }
            queued += 1;
        }
        tracing::info!(queued, "pending backlog queued");
        queued
    })
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_index_flags() {
        let cli = Cli::try_parse_from(["repograph", "index", "app", "--force", "--skip-notify"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Index {
                force: true,
                skip_notify: true,
                ..
            }
        ));
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli =
            Cli::try_parse_from(["repograph", "status", "app", "--config", "/etc/rg.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/etc/rg.toml")));
    }

    #[test]
    fn add_accepts_branch_and_interval() {
        let cli = Cli::try_parse_from([
            "repograph",
            "add",
            "app",
            "https://github.com/acme/app",
            "--branch",
            "develop",
            "--sync-interval",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Add {
                branch,
                sync_interval,
                ..
            } => {
                assert_eq!(branch.as_deref(), Some("develop"));
                assert_eq!(sync_interval, Some(30));
            }
            _ => panic!("expected add"),
        }
    }

    #[tokio::test]
    async fn backlog_larger_than_channel_does_not_block() {
        let store = repograph_core::SqliteRepositoryStore::open(":memory:")
            .await
            .unwrap();
        for i in 0..100 {
            store
                .insert(&Repository::new(format!("r{i}"), "/srv/none"))
                .await
                .unwrap();
        }
        store
            .mark_indexed("r0", "abc", chrono::Utc::now())
            .await
            .unwrap();
        let repos: Arc<dyn RepositoryStore> = Arc::new(store);

        let (tx, mut rx) = mpsc::channel(4);
        let handle = enqueue_backlog(repos, tx);

        let mut received = Vec::new();
        while received.len() < 99 {
            let id = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
                .await
                .expect("backlog stalled")
                .unwrap();
            received.push(id);
        }
        assert_eq!(handle.await.unwrap(), 99);
        assert!(!received.contains(&"r0".to_owned()));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn backlog_stops_when_dispatch_loop_is_gone() {
        let store = repograph_core::SqliteRepositoryStore::open(":memory:")
            .await
            .unwrap();
        for i in 0..10 {
            store
                .insert(&Repository::new(format!("r{i}"), "/srv/none"))
                .await
                .unwrap();
        }
        let (tx, rx) = mpsc::channel(2);
        drop(rx);
        let queued = enqueue_backlog(Arc::new(store), tx).await.unwrap();
        assert_eq!(queued, 0);
    }
}
