//! Pipeline state machine.
//!
//! `PENDING → CLONING → UPLOADING → SCANNING_NAMESPACES → PARSING_FILES → GENERATING_GRAPH →
//! INDEXING → COMPLETED`, with `ERROR` reachable from every step. Each transition is persisted to
//! the repository record and mirrored into the in-memory progress tracker. Runs for the same
//! repository id are serialized; distinct ids proceed independently.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use repograph_graph::{RepoMeta, SnapshotWriter};
use repograph_index::{CodeNamespace, ParseOutput};
use repograph_vcs::ProviderFactory;
use repograph_vcs::remote::RemoteRef;
use serde::Serialize;

use crate::checkout::{Checkout, CheckoutManager, CleanupOutcome};
use crate::error::{PipelineError, Result};
use crate::external::{
    IndexNotification, MirrorStore, NoopMirror, NoopSearchIndexer, SearchHit, SearchIndexer,
};
use crate::locks::RepoLocks;
use crate::pipeline::{Stage, StageOutcome};
use crate::progress::{Progress, ProgressTracker};
use crate::repository::{Repository, RepositoryStore, ScanStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Re-run every stage even if HEAD matches the last indexed commit.
    pub force: bool,
    pub skip_external_notify: bool,
}

/// Result of one `run_index` call. A failed run is reported here, not as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub repo_id: String,
    pub status: ScanStatus,
    pub commit_sha: Option<String>,
    /// HEAD matched the last indexed commit; nothing was rewritten.
    pub unchanged: bool,
    pub namespaces: usize,
    pub files: usize,
    pub symbols: usize,
    pub skipped_files: usize,
    pub stages: Vec<StageOutcome>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl RunReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == ScanStatus::Completed
    }
}

/// Persisted state plus live or derived progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStatus {
    pub repo_id: String,
    pub status: ScanStatus,
    pub progress: Progress,
    /// `progress` comes from an active or recently finished run rather than the stored status.
    pub live: bool,
    pub last_indexed_sha: Option<String>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub last_index_error: Option<String>,
    pub last_synced_sha: Option<String>,
    pub namespaces: Vec<CodeNamespace>,
}

#[derive(Debug, Default)]
struct RunState {
    stages: Vec<StageOutcome>,
    commit_sha: Option<String>,
    unchanged: bool,
    namespaces: usize,
    files: usize,
    symbols: usize,
    skipped_files: usize,
}

pub struct Orchestrator {
    repos: Arc<dyn RepositoryStore>,
    providers: ProviderFactory,
    checkouts: CheckoutManager,
    graph: SnapshotWriter,
    search: Arc<dyn SearchIndexer>,
    mirror: Arc<dyn MirrorStore>,
    locks: RepoLocks,
    progress: ProgressTracker,
    fatal: HashSet<Stage>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("checkouts", &self.checkouts)
            .field("graph", &self.graph)
            .field("search", &self.search.name())
            .field("mirror", &self.mirror.name())
            .field("fatal", &self.fatal)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        repos: Arc<dyn RepositoryStore>,
        providers: ProviderFactory,
        checkouts: CheckoutManager,
        graph: SnapshotWriter,
    ) -> Self {
        Self {
            repos,
            providers,
            checkouts,
            graph,
            search: Arc::new(NoopSearchIndexer),
            mirror: Arc::new(NoopMirror),
            locks: RepoLocks::new(),
            progress: ProgressTracker::new(Duration::from_secs(30)),
            fatal: Stage::DEFAULT_FATAL.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn with_search(mut self, search: Arc<dyn SearchIndexer>) -> Self {
        self.search = search;
        self
    }

    #[must_use]
    pub fn with_mirror(mut self, mirror: Arc<dyn MirrorStore>) -> Self {
        self.mirror = mirror;
        self
    }

    #[must_use]
    pub fn with_progress_retention(mut self, retention: Duration) -> Self {
        self.progress = ProgressTracker::new(retention);
        self
    }

    /// Stages whose failure aborts a run. Checkout is always fatal.
    #[must_use]
    pub fn with_fatal_stages(mut self, stages: &[Stage]) -> Self {
        self.fatal = stages.iter().copied().collect();
        self.fatal.insert(Stage::Checkout);
        self
    }

    #[must_use]
    pub fn repositories(&self) -> &Arc<dyn RepositoryStore> {
        &self.repos
    }

    #[must_use]
    pub fn graph(&self) -> &SnapshotWriter {
        &self.graph
    }

    #[must_use]
    pub fn locks(&self) -> &RepoLocks {
        &self.locks
    }

    fn is_fatal(&self, stage: Stage) -> bool {
        self.fatal.contains(&stage)
    }

    /// Run the indexing pipeline for `repo_id`, waiting behind any run already in flight for
    /// the same id.
    ///
    /// Stage failures are persisted as `ERROR` and returned inside the report.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if the repository is unknown, or a store error if
    /// the metadata store cannot be read.
    pub async fn run_index(&self, repo_id: &str, opts: RunOptions) -> Result<RunReport> {
        let _guard = self.locks.acquire(repo_id).await;
        let started = Instant::now();

        let repo = self
            .repos
            .get(repo_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(repo_id.to_owned()))?;

        self.progress.begin(repo_id);
        tracing::info!(
            repo_id,
            url = %repograph_vcs::redact::redact_credentials(&repo.url),
            force = opts.force,
            "index run started"
        );

        let mut state = RunState::default();
        let result = self.execute(&repo, opts, &mut state).await;

        let error = match result {
            Ok(()) => {
                self.progress.update(repo_id, ScanStatus::Completed, None);
                tracing::info!(
                    repo_id,
                    files = state.files,
                    symbols = state.symbols,
                    unchanged = state.unchanged,
                    "index run completed"
                );
                None
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(repo_id, "index run failed: {message}");
                if let Err(store_err) = self.repos.mark_failed(repo_id, &message).await {
                    tracing::error!(repo_id, "could not persist run failure: {store_err}");
                }
                self.progress
                    .update(repo_id, ScanStatus::Error, Some(message.clone()));
                Some(message)
            }
        };
        self.progress.schedule_eviction(repo_id);

        Ok(RunReport {
            repo_id: repo_id.to_owned(),
            status: if error.is_none() {
                ScanStatus::Completed
            } else {
                ScanStatus::Error
            },
            commit_sha: state.commit_sha,
            unchanged: state.unchanged,
            namespaces: state.namespaces,
            files: state.files,
            symbols: state.symbols,
            skipped_files: state.skipped_files,
            stages: state.stages,
            error,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    async fn execute(&self, repo: &Repository, opts: RunOptions, state: &mut RunState) -> Result<()> {
        let repo_id = repo.id.as_str();

        self.enter(repo_id, Stage::Checkout).await?;
        let checkout = match self.checkout(repo).await {
            Ok(c) => c,
            Err(e) => {
                state.stages.push(StageOutcome::failed(Stage::Checkout, e.to_string()));
                return Err(e);
            }
        };
        state.stages.push(StageOutcome::ok(
            Stage::Checkout,
            format!("{} at {}", checkout.branch, checkout.head_sha),
        ));
        state.commit_sha = Some(checkout.head_sha.clone());

        if !opts.force
            && repo.status != ScanStatus::Error
            && repo.last_indexed_sha.as_deref() == Some(checkout.head_sha.as_str())
        {
            tracing::info!(repo_id, sha = %checkout.head_sha, "commit already indexed, skipping");
            state.unchanged = true;
            self.repos
                .mark_indexed(repo_id, &checkout.head_sha, Utc::now())
                .await?;
            return Ok(());
        }

        self.mirror_stage(repo_id, &checkout, state).await?;

        self.enter(repo_id, Stage::Namespaces).await?;
        let namespaces = match self.namespaces(repo_id, &checkout.local_path).await {
            Ok(ns) => {
                let names: Vec<&str> = ns.iter().map(|n| n.name.as_str()).collect();
                state
                    .stages
                    .push(StageOutcome::ok(Stage::Namespaces, names.join(", ")));
                ns
            }
            Err(e) => {
                self.stage_failed(repo_id, Stage::Namespaces, e, state)?;
                vec![CodeNamespace::root()]
            }
        };
        state.namespaces = namespaces.len();

        self.enter(repo_id, Stage::Parse).await?;
        let parsed = match self
            .parse(repo_id, &checkout.local_path, &namespaces)
            .await
        {
            Ok(out) => {
                state.stages.push(StageOutcome::ok(
                    Stage::Parse,
                    format!(
                        "{} files, {} symbols, {} skipped",
                        out.files.len(),
                        out.symbols.len(),
                        out.skipped.len()
                    ),
                ));
                self.progress.note(
                    repo_id,
                    format!("{} files, {} symbols", out.files.len(), out.symbols.len()),
                );
                out
            }
            Err(e) => {
                self.stage_failed(repo_id, Stage::Parse, e, state)?;
                ParseOutput::default()
            }
        };
        state.skipped_files = parsed.skipped.len();

        self.enter(repo_id, Stage::Graph).await?;
        let meta = RepoMeta {
            id: repo_id.to_owned(),
            name: repo_name(&repo.url),
            url: repograph_vcs::redact::redact_credentials(&repo.url).into_owned(),
            branch: checkout.branch.clone(),
            commit_sha: checkout.head_sha.clone(),
            indexed_at: Utc::now(),
        };
        match self
            .graph
            .write_snapshot(&meta, &namespaces, &parsed.files, &parsed.symbols)
            .await
        {
            Ok(report) => {
                state.files = report.files;
                state.symbols = report.symbols;
                state.stages.push(StageOutcome::ok(
                    Stage::Graph,
                    format!(
                        "{} namespaces, {} files, {} symbols in {} batches",
                        report.namespaces, report.files, report.symbols, report.batches
                    ),
                ));
            }
            Err(e) => self.stage_failed(repo_id, Stage::Graph, e.into(), state)?,
        }

        if opts.skip_external_notify {
            state
                .stages
                .push(StageOutcome::skipped(Stage::SearchNotify, "disabled for this run"));
        } else if !self.search.enabled() {
            state
                .stages
                .push(StageOutcome::skipped(Stage::SearchNotify, "no search indexer configured"));
        } else {
            self.enter(repo_id, Stage::SearchNotify).await?;
            let notification = IndexNotification {
                repo_id: repo_id.to_owned(),
                commit_sha: checkout.head_sha.clone(),
                branch: checkout.branch.clone(),
                local_path: checkout.local_path.clone(),
                files: state.files,
                symbols: state.symbols,
            };
            match self.search.notify(&notification).await {
                Ok(()) => state
                    .stages
                    .push(StageOutcome::ok(Stage::SearchNotify, self.search.name())),
                Err(e) => self.stage_failed(repo_id, Stage::SearchNotify, e.into(), state)?,
            }
        }

        self.repos
            .mark_indexed(repo_id, &checkout.head_sha, Utc::now())
            .await?;
        Ok(())
    }

    async fn enter(&self, repo_id: &str, stage: Stage) -> Result<()> {
        let status = stage.status();
        self.repos.set_status(repo_id, status).await?;
        self.progress.update(repo_id, status, None);
        tracing::debug!(repo_id, %stage, "stage started");
        Ok(())
    }

    /// Record a failed stage; the error is handed back when the stage is fatal.
    fn stage_failed(
        &self,
        repo_id: &str,
        stage: Stage,
        err: PipelineError,
        state: &mut RunState,
    ) -> Result<()> {
        state.stages.push(StageOutcome::failed(stage, err.to_string()));
        if self.is_fatal(stage) {
            return Err(err);
        }
        tracing::warn!(repo_id, %stage, "best-effort stage failed: {err}");
        self.progress.note(repo_id, format!("{stage} failed: {err}"));
        Ok(())
    }

    async fn checkout(&self, repo: &Repository) -> Result<Checkout> {
        let provider = self.providers.provider_for(&repo.url);
        Ok(self
            .checkouts
            .ensure_checkout(&provider, &repo.id, &repo.url, repo.branch.as_deref())
            .await?)
    }

    async fn mirror_stage(
        &self,
        repo_id: &str,
        checkout: &Checkout,
        state: &mut RunState,
    ) -> Result<()> {
        if !self.mirror.enabled() {
            state
                .stages
                .push(StageOutcome::skipped(Stage::Mirror, "no mirror configured"));
            return Ok(());
        }
        self.enter(repo_id, Stage::Mirror).await?;
        match self.mirror.upload(repo_id, &checkout.local_path).await {
            Ok(report) => {
                state.stages.push(StageOutcome::ok(
                    Stage::Mirror,
                    format!("{} files, {} bytes", report.files, report.bytes),
                ));
                Ok(())
            }
            Err(e) => self.stage_failed(repo_id, Stage::Mirror, e.into(), state),
        }
    }

    async fn namespaces(&self, repo_id: &str, path: &Path) -> Result<Vec<CodeNamespace>> {
        let dir = path.to_path_buf();
        let namespaces = tokio::task::spawn_blocking(move || repograph_index::detect_namespaces(&dir))
            .await
            .map_err(|e| PipelineError::Stage {
                stage: Stage::Namespaces,
                message: e.to_string(),
            })??;
        self.repos.set_namespaces(repo_id, &namespaces).await?;
        tracing::debug!(repo_id, count = namespaces.len(), "namespaces detected");
        Ok(namespaces)
    }

    async fn parse(
        &self,
        repo_id: &str,
        path: &Path,
        namespaces: &[CodeNamespace],
    ) -> Result<ParseOutput> {
        let (id, dir, ns) = (repo_id.to_owned(), path.to_path_buf(), namespaces.to_vec());
        let out = tokio::task::spawn_blocking(move || {
            repograph_index::parse_repository(&id, &dir, &ns)
        })
        .await
        .map_err(|e| PipelineError::Stage {
            stage: Stage::Parse,
            message: e.to_string(),
        })??;
        for skipped in &out.skipped {
            tracing::debug!(repo_id, path = %skipped.path, reason = ?skipped.reason, "file skipped");
        }
        Ok(out)
    }

    /// Persisted status plus live progress when a run is active or recently finished, otherwise
    /// progress derived from the stored status alone.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if the repository is unknown.
    pub async fn get_status(&self, repo_id: &str) -> Result<RepoStatus> {
        let repo = self
            .repos
            .get(repo_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(repo_id.to_owned()))?;
        let live = self.progress.get(repo_id);
        Ok(RepoStatus {
            repo_id: repo.id,
            status: repo.status,
            live: live.is_some(),
            progress: live.unwrap_or_else(|| Progress::from_status(repo.status)),
            last_indexed_sha: repo.last_indexed_sha,
            last_indexed_at: repo.last_indexed_at,
            last_index_error: repo.last_index_error,
            last_synced_sha: repo.last_synced_sha,
            namespaces: repo.namespaces,
        })
    }

    /// Remove a repository's graph, checkout, mirror copy and metadata record.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] for an unknown id; graph, checkout cleanup and store
    /// failures abort the deletion with the record still present.
    pub async fn delete_repository(&self, repo_id: &str) -> Result<CleanupOutcome> {
        let _guard = self.locks.acquire(repo_id).await;
        if self.repos.get(repo_id).await?.is_none() {
            return Err(PipelineError::NotFound(repo_id.to_owned()));
        }

        self.graph.delete_repo(repo_id).await?;
        let outcome = self.checkouts.delete_checkout(repo_id).await?;
        if self.mirror.enabled()
            && let Err(e) = self.mirror.remove(repo_id).await
        {
            tracing::warn!(repo_id, "mirror copy not removed: {e}");
        }
        self.repos.delete(repo_id).await?;
        tracing::info!(repo_id, "repository deleted");
        Ok(outcome)
    }

    /// Read-only passthrough to the search collaborator.
    ///
    /// # Errors
    ///
    /// Returns an error if no search indexer is configured or the query fails.
    pub async fn search(&self, query: &str, repo_id: Option<&str>) -> Result<Vec<SearchHit>> {
        Ok(self.search.search(query, repo_id).await?)
    }
}

/// Display name for the repository node: the last path segment of the URL without `.git`.
fn repo_name(url: &str) -> String {
    if let Ok(remote) = RemoteRef::parse(url) {
        return remote.name().to_owned();
    }
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_owned()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use repograph_graph::InMemoryGraphStore;
    use repograph_vcs::git::GitCli;
    use repograph_vcs::VcsConfig;

    use super::*;
    use crate::checkout::CheckoutSettings;
    use crate::error::ExternalError;
    use crate::external::MirrorReport;
    use crate::repository::SqliteRepositoryStore;
    use crate::test_support::{commit, init_origin};

    type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

    struct Fixture {
        _tmp: tempfile::TempDir,
        origin: std::path::PathBuf,
        graph: Arc<InMemoryGraphStore>,
        orchestrator: Orchestrator,
    }

    async fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let origin = tmp.path().join("origin");
        init_origin(
            &GitCli::default(),
            &origin,
            &[
                ("services/api/main.go", "package main\n\nfunc Serve() {\n}\n"),
                (
                    "services/web/app.ts",
                    "export class App {\n  render() {\n    return 1;\n  }\n}\n",
                ),
            ],
        )
        .await;

        let repos = Arc::new(SqliteRepositoryStore::open(":memory:").await.unwrap());
        let url = format!("local://{}", origin.display());
        repos.insert(&Repository::new("r1", url)).await.unwrap();

        let graph = Arc::new(InMemoryGraphStore::default());
        let orchestrator = Orchestrator::new(
            repos,
            ProviderFactory::new(VcsConfig::default(), GitCli::default()),
            CheckoutManager::new(
                tmp.path().join("checkouts"),
                CheckoutSettings {
                    cleanup_backoff: Duration::from_millis(1),
                    ..CheckoutSettings::default()
                },
            ),
            SnapshotWriter::new(graph.clone()),
        );
        Fixture {
            _tmp: tmp,
            origin,
            graph,
            orchestrator,
        }
    }

    struct FailingMirror;

    impl MirrorStore for FailingMirror {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn upload(
            &self,
            _repo_id: &str,
            _local_path: &Path,
        ) -> BoxFuture<'_, std::result::Result<MirrorReport, ExternalError>> {
            Box::pin(async { Err(ExternalError::Disabled("ftp")) })
        }

        fn remove(&self, _repo_id: &str) -> BoxFuture<'_, std::result::Result<(), ExternalError>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Default)]
    struct CountingSearch {
        notified: AtomicUsize,
    }

    impl SearchIndexer for CountingSearch {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn notify(
            &self,
            _notification: &IndexNotification,
        ) -> BoxFuture<'_, std::result::Result<(), ExternalError>> {
            self.notified.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }

        fn search(
            &self,
            _query: &str,
            _repo_id: Option<&str>,
        ) -> BoxFuture<'_, std::result::Result<Vec<SearchHit>, ExternalError>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    #[test]
    fn repo_name_from_urls() {
        assert_eq!(repo_name("https://github.com/acme/widgets.git"), "widgets");
        assert_eq!(repo_name("local:///srv/repos/app/"), "app");
        assert_eq!(repo_name("/srv/repos/tool.git"), "tool");
    }

    #[tokio::test]
    async fn unknown_repository_is_not_found() {
        let f = fixture().await;
        let err = f
            .orchestrator
            .run_index("ghost", RunOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(f.orchestrator.get_status("ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn full_run_then_idempotent_rerun() {
        let f = fixture().await;
        let report = f
            .orchestrator
            .run_index("r1", RunOptions::default())
            .await
            .unwrap();
        assert!(report.succeeded(), "{report:?}");
        assert_eq!(report.namespaces, 2);
        assert_eq!(report.files, 2);
        assert!(!report.unchanged);

        let status = f.orchestrator.get_status("r1").await.unwrap();
        assert_eq!(status.status, ScanStatus::Completed);
        assert_eq!(status.last_indexed_sha, report.commit_sha);
        assert_eq!(status.namespaces.len(), 2);
        assert!(status.live);
        assert_eq!(status.progress.percent, 100);

        let writes = f.graph.mutations();
        let again = f
            .orchestrator
            .run_index("r1", RunOptions::default())
            .await
            .unwrap();
        assert!(again.succeeded());
        assert!(again.unchanged);
        assert_eq!((again.files, again.symbols), (0, 0));
        assert_eq!(f.graph.mutations(), writes);

        let forced = f
            .orchestrator
            .run_index(
                "r1",
                RunOptions {
                    force: true,
                    ..RunOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(!forced.unchanged);
        assert!(f.graph.mutations() > writes);
    }

    #[tokio::test]
    async fn new_commit_is_reindexed() {
        let f = fixture().await;
        let first = f
            .orchestrator
            .run_index("r1", RunOptions::default())
            .await
            .unwrap();
        commit(
            &GitCli::default(),
            &f.origin,
            "services/api/health.go",
            "package main\n\nfunc Health() {\n}\n",
        )
        .await;

        let second = f
            .orchestrator
            .run_index("r1", RunOptions::default())
            .await
            .unwrap();
        assert!(!second.unchanged);
        assert_ne!(first.commit_sha, second.commit_sha);
        assert_eq!(second.files, 3);
        assert_eq!(f.graph.files("r1").len(), 3);
    }

    #[tokio::test]
    async fn checkout_failure_marks_error() {
        let f = fixture().await;
        f.orchestrator
            .repositories()
            .insert(&Repository::new("broken", "local:///definitely/missing/repo").with_branch("main"))
            .await
            .unwrap();

        let report = f
            .orchestrator
            .run_index("broken", RunOptions::default())
            .await
            .unwrap();
        assert_eq!(report.status, ScanStatus::Error);
        assert!(report.error.as_deref().unwrap().contains("broken"));
        assert!(!report.stages[0].ok);

        let status = f.orchestrator.get_status("broken").await.unwrap();
        assert_eq!(status.status, ScanStatus::Error);
        assert!(status.last_index_error.is_some());
        assert_eq!(status.progress.percent, 0);
    }

    #[tokio::test]
    async fn best_effort_stages_do_not_abort() {
        let search = Arc::new(CountingSearch::default());
        let f = fixture().await;
        let orchestrator = f
            .orchestrator
            .with_mirror(Arc::new(FailingMirror))
            .with_search(search.clone());

        let report = orchestrator
            .run_index("r1", RunOptions::default())
            .await
            .unwrap();
        assert!(report.succeeded(), "{report:?}");
        let mirror = report.stages.iter().find(|s| s.stage == Stage::Mirror).unwrap();
        assert!(!mirror.ok);
        assert_eq!(search.notified.load(Ordering::SeqCst), 1);

        orchestrator
            .run_index(
                "r1",
                RunOptions {
                    force: true,
                    skip_external_notify: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(search.notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mirror_can_be_made_fatal() {
        let f = fixture().await;
        let orchestrator = f
            .orchestrator
            .with_mirror(Arc::new(FailingMirror))
            .with_fatal_stages(&[Stage::Mirror]);

        let report = orchestrator
            .run_index("r1", RunOptions::default())
            .await
            .unwrap();
        assert_eq!(report.status, ScanStatus::Error);
        assert_eq!(report.stages.last().unwrap().stage, Stage::Mirror);
    }

    #[tokio::test]
    async fn delete_removes_everything() {
        let f = fixture().await;
        f.orchestrator
            .run_index("r1", RunOptions::default())
            .await
            .unwrap();
        let outcome = f.orchestrator.delete_repository("r1").await.unwrap();
        assert!(matches!(outcome, CleanupOutcome::Removed { .. }));
        assert!(f.graph.repository("r1").is_none());
        assert!(f.graph.files("r1").is_empty());
        assert!(f.orchestrator.repositories().get("r1").await.unwrap().is_none());
        assert!(f.orchestrator.delete_repository("r1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn search_without_indexer_is_an_error() {
        let f = fixture().await;
        let err = f.orchestrator.search("App", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::External(ExternalError::Disabled(_))));
    }

    #[tokio::test]
    async fn checkout_stays_fatal() {
        let f = fixture().await;
        let orchestrator = f.orchestrator.with_fatal_stages(&[]);
        assert!(orchestrator.is_fatal(Stage::Checkout));
        assert!(!orchestrator.is_fatal(Stage::Graph));
    }
}
