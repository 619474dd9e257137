use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use boca_core::{BocaClient, Problem, Run};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::engine::SyncError;
use super::mirror::is_file;
use super::paths;
use super::transfer::stream_to_path;

pub const DESCRIPTION_DIR: &str = "description";
pub const MANIFEST_NAME: &str = "problem.info";
const STAGING_PREFIX: &str = ".boca-staging-";
const ARCHIVE_NAME: &str = "archive.zip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    AlreadyPresent(PathBuf),
    Downloaded(PathBuf),
}

impl FetchOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::AlreadyPresent(path) | Self::Downloaded(path) => path,
        }
    }
}

/// Value of the `descfile=<name>` directive of a `problem.info` manifest.
pub fn parse_descfile(manifest: &str) -> Option<String> {
    manifest
        .lines()
        .filter_map(|line| line.trim().strip_prefix("descfile="))
        .map(str::trim)
        .filter(|name| {
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
                && paths::is_safe_component(name)
        })
        .last()
        .map(str::to_string)
}

/// Downloads, unpacks and places the statement file of `problem` into `target_dir`.
///
/// When the declared input file is already present nothing is fetched. Any failure after the
/// staging directory exists removes `target_dir` entirely; the staging directory itself is
/// removed on every path out of this function.
pub async fn fetch_problem_statement(
    client: &BocaClient,
    problem: &Problem,
    target_dir: &Path,
) -> Result<FetchOutcome, SyncError> {
    if let Some(name) = problem.probleminputfilename.as_deref()
        && paths::is_safe_component(name)
    {
        let artifact = target_dir.join(name);
        if is_file(&artifact).await {
            debug!(path = %artifact.display(), "statement already present");
            return Ok(FetchOutcome::AlreadyPresent(artifact));
        }
    }

    match stage_statement(client, problem, target_dir).await {
        Ok(path) => {
            info!(
                contest = problem.contestnumber,
                problem = problem.problemnumber,
                path = %path.display(),
                "statement downloaded"
            );
            Ok(FetchOutcome::Downloaded(path))
        }
        Err(err) => {
            warn!(
                contest = problem.contestnumber,
                problem = problem.problemnumber,
                error = %err,
                "statement download failed; removing problem directory"
            );
            if let Err(cleanup) = tokio::fs::remove_dir_all(target_dir).await
                && cleanup.kind() != io::ErrorKind::NotFound
            {
                warn!(path = %target_dir.display(), error = %cleanup, "cleanup failed");
            }
            Err(err)
        }
    }
}

async fn stage_statement(
    client: &BocaClient,
    problem: &Problem,
    target_dir: &Path,
) -> Result<PathBuf, SyncError> {
    tokio::fs::create_dir_all(target_dir)
        .await
        .map_err(SyncError::fs(target_dir))?;
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(target_dir)
        .map_err(SyncError::fs(target_dir))?;

    let archive = staging.path().join(ARCHIVE_NAME);
    let stream = client
        .fetch_problem_archive(problem.contestnumber, problem.problemnumber)
        .await?;
    stream_to_path(stream, &archive).await?;
    extract_archive(archive, staging.path().to_path_buf()).await?;

    let description = staging.path().join(DESCRIPTION_DIR);
    let manifest_path = description.join(MANIFEST_NAME);
    let manifest = match tokio::fs::read_to_string(&manifest_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(SyncError::MissingDescriptor {
                problem: problem.problemname.clone(),
            });
        }
        Err(err) => return Err(SyncError::fs(&manifest_path)(err)),
    };
    let name = parse_descfile(&manifest).ok_or_else(|| SyncError::MissingDescriptor {
        problem: problem.problemname.clone(),
    })?;

    let source = description.join(&name);
    let target = target_dir.join(&name);
    tokio::fs::rename(&source, &target)
        .await
        .map_err(SyncError::fs(&source))?;

    if let Err(err) = staging.close() {
        warn!(error = %err, "failed to remove staging directory");
    }
    Ok(target)
}

async fn extract_archive(archive: PathBuf, destination: PathBuf) -> Result<usize, SyncError> {
    let dest = destination.clone();
    tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
        .await
        .map_err(|err| SyncError::fs(&destination)(io::Error::other(err)))?
}

fn extract_zip(archive_path: &Path, destination: &Path) -> Result<usize, SyncError> {
    let file = File::open(archive_path).map_err(SyncError::fs(archive_path))?;
    let mut archive = ZipArchive::new(file)?;
    let mut extracted = 0;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out_path = destination.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(SyncError::fs(&out_path))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(SyncError::fs(parent))?;
        }
        let mut out = File::create(&out_path).map_err(SyncError::fs(&out_path))?;
        io::copy(&mut entry, &mut out).map_err(SyncError::fs(&out_path))?;
        extracted += 1;
    }
    Ok(extracted)
}

/// Mirrors one submitted run to `<problem_dir>/Runs/<runnumber>/<runfilename>`.
pub async fn fetch_run_file(
    client: &BocaClient,
    problem: &Problem,
    run: &Run,
    problem_dir: &Path,
) -> Result<FetchOutcome, SyncError> {
    let file_name = paths::checked_component(&run.runfilename)?;
    let run_dir = paths::run_dir(problem_dir, run.runnumber);
    let target = run_dir.join(file_name);
    if is_file(&target).await {
        return Ok(FetchOutcome::AlreadyPresent(target));
    }

    let result = async {
        let stream = client
            .fetch_run_archive(problem.contestnumber, problem.problemnumber, run.runnumber)
            .await?;
        stream_to_path(stream, &target).await?;
        Ok::<_, SyncError>(())
    }
    .await;

    match result {
        Ok(()) => {
            debug!(run = run.runnumber, path = %target.display(), "run file downloaded");
            Ok(FetchOutcome::Downloaded(target))
        }
        Err(err) => {
            warn!(run = run.runnumber, error = %err, "run download failed");
            let _ = tokio::fs::remove_dir_all(&run_dir).await;
            Err(err)
        }
    }
}
