use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use boca_core::{ApiErrorClass, BocaClient, BocaError};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use super::archive::{self, FetchOutcome};
use super::catalog::{CatalogCache, CatalogSummary};
use super::decoration::{Decoration, DecorationEngine};
use super::mirror::{MirrorNode, MirrorTree, RunEntry};
use super::paths::{self, PathError};
use super::transfer::TransferError;
use super::uploader::{self, SubmissionProfile};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("authentication expired; a new token is required")]
    AuthExpired,
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(#[source] BocaError),
    #[error("archive of problem {problem} declares no statement file")]
    MissingDescriptor { problem: String },
    #[error("file system conflict at {}: {source}", .path.display())]
    FileSystemConflict {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("no catalog entry for {}", .0.display())]
    NotInCatalog(PathBuf),
}

impl SyncError {
    pub(crate) fn fs(path: &Path) -> impl FnOnce(io::Error) -> SyncError {
        let path = path.to_path_buf();
        move |source| SyncError::FileSystemConflict { path, source }
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

impl From<BocaError> for SyncError {
    fn from(err: BocaError) -> Self {
        match err.classification() {
            ApiErrorClass::AuthExpired => Self::AuthExpired,
            ApiErrorClass::Unavailable => Self::CatalogUnavailable(err),
        }
    }
}

impl From<TransferError> for SyncError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Api(err) => err.into(),
            TransferError::Io { path, source } => Self::FileSystemConflict { path, source },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    TreeChanged,
    AuthRequired,
}

/// Outcome of one `synchronize` call. Leaf failures are collected here, never returned early.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub synchronized: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, SyncError)>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Downloaded(path) => self.synchronized.push(path),
            FetchOutcome::AlreadyPresent(path) => self.skipped.push(path),
        }
    }

    fn fail(&mut self, path: &Path, err: SyncError) {
        warn!(path = %path.display(), error = %err, "synchronization failed");
        self.failures.push((path.to_path_buf(), err));
    }
}

pub struct SyncEngine {
    client: RwLock<BocaClient>,
    catalog: Arc<CatalogCache>,
    mirror: MirrorTree,
    decorations: Arc<DecorationEngine>,
    profile: SubmissionProfile,
    auth_required: AtomicBool,
    listeners: Mutex<Vec<mpsc::UnboundedSender<SyncEvent>>>,
}

impl SyncEngine {
    pub fn new(client: BocaClient, mirror_root: PathBuf) -> Self {
        let catalog = Arc::new(CatalogCache::new());
        Self {
            client: RwLock::new(client),
            mirror: MirrorTree::new(mirror_root, Arc::clone(&catalog)),
            catalog,
            decorations: Arc::new(DecorationEngine::new()),
            profile: SubmissionProfile::default(),
            auth_required: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn with_profile(mut self, profile: SubmissionProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn catalog(&self) -> &Arc<CatalogCache> {
        &self.catalog
    }

    pub fn mirror(&self) -> &MirrorTree {
        &self.mirror
    }

    pub fn decorations(&self) -> &Arc<DecorationEngine> {
        &self.decorations
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(tx);
        }
        rx
    }

    pub fn is_auth_required(&self) -> bool {
        self.auth_required.load(Ordering::SeqCst)
    }

    /// Installs a fresh bearer token and reopens catalog access.
    pub async fn reauthenticate(&self, token: impl Into<String>) {
        let mut client = self.client.write().await;
        *client = client.with_token(token);
        self.auth_required.store(false, Ordering::SeqCst);
        info!("bearer token replaced");
    }

    pub async fn reload(&self) -> Result<CatalogSummary, SyncError> {
        let result = match self.client().await {
            Ok(client) => self.catalog.reload(&client).await.map_err(SyncError::from),
            Err(err) => Err(err),
        };
        match &result {
            Ok(summary) => info!(
                contests = summary.contests,
                problems = summary.problems,
                runs = summary.runs,
                failed = summary.failed_fetches,
                "catalog reloaded"
            ),
            Err(err) => self.observe(err),
        }
        self.emit(SyncEvent::TreeChanged);
        result
    }

    pub async fn invalidate(&self) {
        self.catalog.invalidate().await;
        self.decorations.clear().await;
        self.emit(SyncEvent::TreeChanged);
    }

    /// Children of `parent` (the contests when `None`), each decorated as it is produced.
    pub async fn expand(&self, parent: Option<&MirrorNode>) -> Vec<MirrorNode> {
        let nodes = self.mirror.children(parent).await;
        for node in &nodes {
            self.decorations
                .set(node.path(), Decoration::derive(node.exists(), node.subject()))
                .await;
        }
        nodes
    }

    pub async fn runs(&self, problem: &MirrorNode) -> Vec<RunEntry> {
        let runs = self.mirror.runs(problem).await;
        for run in &runs {
            self.decorations
                .set(&run.path, Decoration::derive(run.exists, run.subject()))
                .await;
        }
        runs
    }

    /// Re-fetches the runs of a problem so rejudged verdicts and new submissions show up.
    pub async fn refresh_runs(&self, problem: &MirrorNode) -> Result<Vec<RunEntry>, SyncError> {
        let MirrorNode::Problem {
            contest,
            contest_number,
            number,
            name,
            path,
            ..
        } = problem
        else {
            return Ok(Vec::new());
        };
        let client = self.client().await?;
        let runs = match client.list_runs(*contest_number, *number).await {
            Ok(runs) => runs,
            Err(err) => {
                let err = SyncError::from(err);
                self.observe(&err);
                return Err(err);
            }
        };
        if !self.catalog.merge_runs(contest, name, runs).await {
            return Err(SyncError::NotInCatalog(path.clone()));
        }
        // solved may have flipped
        self.redecorate(path).await;
        Ok(self.runs(problem).await)
    }

    /// Brings the subtree of `node` (or every contest) onto disk. Always ends with a
    /// `TreeChanged` event, whatever failed on the way.
    pub async fn synchronize(&self, node: Option<&MirrorNode>) -> SyncReport {
        let mut report = SyncReport::default();
        if self.is_auth_required() {
            let path = node.map_or(self.mirror.root(), MirrorNode::path);
            report.fail(path, SyncError::AuthExpired);
        } else {
            match node {
                None => {
                    for contest in self.mirror.children(None).await {
                        self.sync_contest(&contest, &mut report).await;
                    }
                }
                Some(node @ MirrorNode::Contest { .. }) => {
                    self.sync_contest(node, &mut report).await
                }
                Some(node @ MirrorNode::Problem { .. }) => {
                    self.sync_problem(node, &mut report).await
                }
                Some(MirrorNode::File { path, .. }) => self.sync_file(path, &mut report).await,
            }
        }
        debug!(
            synchronized = report.synchronized.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "synchronize finished"
        );
        self.emit(SyncEvent::TreeChanged);
        report
    }

    pub async fn submit_run(&self, resource: &Path) -> Result<u32, SyncError> {
        let client = self.client().await?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let result =
            uploader::submit_run(&client, &self.catalog, self.profile, resource, now).await;
        if let Err(err) = &result {
            self.observe(err);
        }
        result
    }

    async fn sync_contest(&self, contest: &MirrorNode, report: &mut SyncReport) {
        if let Err(err) = ensure_dir(contest.path()).await {
            report.fail(contest.path(), err);
            return;
        }
        for problem in self.mirror.children(Some(contest)).await {
            self.sync_problem(&problem, report).await;
        }
        self.redecorate(contest.path()).await;
    }

    async fn sync_problem(&self, node: &MirrorNode, report: &mut SyncReport) {
        let MirrorNode::Problem {
            contest, name, path, ..
        } = node
        else {
            return;
        };
        if let Err(err) = ensure_dir(path).await {
            report.fail(path, err);
            return;
        }
        let Some((_, entry)) = self.catalog.problem(contest, name).await else {
            report.fail(path, SyncError::NotInCatalog(path.clone()));
            return;
        };

        let statement = match self.client().await {
            Ok(client) => archive::fetch_problem_statement(&client, &entry.problem, path).await,
            Err(err) => Err(err),
        };
        match statement {
            Ok(outcome) => report.record(outcome),
            Err(err) => {
                self.observe(&err);
                report.fail(path, err);
                // the problem directory is gone; its runs have nowhere to go
                self.redecorate(path).await;
                return;
            }
        }

        for run in entry.runs_by_date() {
            let client = match self.client().await {
                Ok(client) => client,
                Err(err) => {
                    report.fail(path, err);
                    break;
                }
            };
            match archive::fetch_run_file(&client, &entry.problem, run, path).await {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    self.observe(&err);
                    report.fail(&paths::run_dir(path, run.runnumber), err);
                }
            }
        }
        self.redecorate(path).await;
    }

    async fn sync_file(&self, file: &Path, report: &mut SyncReport) {
        let lineage = match paths::file_lineage(file) {
            Ok(lineage) => lineage,
            Err(err) => {
                report.fail(file, err.into());
                return;
            }
        };
        match self.mirror.node_for_path(&lineage.problem_dir).await {
            Some(problem) => self.sync_problem(&problem, report).await,
            None => report.fail(file, SyncError::NotInCatalog(lineage.problem_dir)),
        }
    }

    /// Re-derives the decorations of the node at `path` and of whatever hangs below a problem.
    async fn redecorate(&self, path: &Path) {
        let Some(node) = self.mirror.node_for_path(path).await else {
            return;
        };
        self.decorations
            .set(node.path(), Decoration::derive(node.exists(), node.subject()))
            .await;
        if matches!(node, MirrorNode::Problem { .. }) {
            self.expand(Some(&node)).await;
            self.runs(&node).await;
        }
    }

    async fn client(&self) -> Result<BocaClient, SyncError> {
        if self.is_auth_required() {
            return Err(SyncError::AuthExpired);
        }
        Ok(self.client.read().await.clone())
    }

    fn observe(&self, err: &SyncError) {
        if err.is_auth_expired() && !self.auth_required.swap(true, Ordering::SeqCst) {
            warn!("bearer token rejected; catalog access suspended until re-authentication");
            self.emit(SyncEvent::AuthRequired);
        }
    }

    fn emit(&self, event: SyncEvent) {
        let Ok(mut listeners) = self.listeners.lock() else {
            return;
        };
        listeners.retain(|tx| tx.send(event).is_ok());
    }
}

async fn ensure_dir(path: &Path) -> Result<(), SyncError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SyncError::FileSystemConflict {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "not a directory"),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => tokio::fs::create_dir_all(path)
            .await
            .map_err(SyncError::fs(path)),
        Err(err) => Err(SyncError::fs(path)(err)),
    }
}
