use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::catalog::{CatalogCache, ContestEntry, ProblemEntry};
use super::decoration::Subject;
use super::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Contest,
    Problem,
    File,
}

/// Local projection of one catalog entity. `exists` is a snapshot taken when the node was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorNode {
    Contest {
        number: u32,
        name: String,
        path: PathBuf,
        exists: bool,
    },
    Problem {
        contest: String,
        contest_number: u32,
        number: u32,
        name: String,
        path: PathBuf,
        exists: bool,
        solved: bool,
        color: Option<String>,
    },
    File {
        name: String,
        path: PathBuf,
        exists: bool,
    },
}

impl MirrorNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Contest { .. } => NodeKind::Contest,
            Self::Problem { .. } => NodeKind::Problem,
            Self::File { .. } => NodeKind::File,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Contest { name, .. } | Self::Problem { name, .. } | Self::File { name, .. } => {
                name
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Contest { path, .. } | Self::Problem { path, .. } | Self::File { path, .. } => {
                path
            }
        }
    }

    pub fn exists(&self) -> bool {
        match self {
            Self::Contest { exists, .. }
            | Self::Problem { exists, .. }
            | Self::File { exists, .. } => *exists,
        }
    }

    pub fn subject(&self) -> Subject<'_> {
        match self {
            Self::Problem { solved, color, .. } => Subject::Problem {
                solved: *solved,
                color: color.as_deref(),
            },
            Self::Contest { .. } | Self::File { .. } => Subject::Plain,
        }
    }
}

/// A mirrored run file under `<problem>/Runs/<runnumber>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEntry {
    pub number: u32,
    pub file_name: String,
    pub path: PathBuf,
    pub exists: bool,
    pub accepted: bool,
    pub verdict: String,
}

impl RunEntry {
    pub fn subject(&self) -> Subject<'_> {
        Subject::Run {
            accepted: self.accepted,
            verdict: &self.verdict,
        }
    }
}

pub async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

pub async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct MirrorTree {
    root: PathBuf,
    catalog: Arc<CatalogCache>,
}

impl MirrorTree {
    pub fn new(root: PathBuf, catalog: Arc<CatalogCache>) -> Self {
        Self { root, catalog }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &Arc<CatalogCache> {
        &self.catalog
    }

    pub async fn children(&self, parent: Option<&MirrorNode>) -> Vec<MirrorNode> {
        match parent {
            None => {
                let mut nodes = Vec::new();
                for entry in self.catalog.contests().await {
                    nodes.push(self.contest_node(&entry).await);
                }
                nodes
            }
            Some(MirrorNode::Contest { name, path, .. }) => {
                let Some(entry) = self.catalog.contest(name).await else {
                    return Vec::new();
                };
                let mut nodes = Vec::new();
                for problem in &entry.problems {
                    nodes.push(problem_node(&entry, problem, path.join(problem.name())).await);
                }
                nodes
            }
            Some(MirrorNode::Problem {
                contest, name, path, ..
            }) => {
                let Some((_, problem)) = self.catalog.problem(contest, name).await else {
                    return Vec::new();
                };
                match problem.problem.probleminputfilename.as_deref() {
                    Some(file) if paths::is_safe_component(file) => {
                        let file_path = path.join(file);
                        vec![MirrorNode::File {
                            name: file.to_string(),
                            exists: is_file(&file_path).await,
                            path: file_path,
                        }]
                    }
                    _ => Vec::new(),
                }
            }
            Some(MirrorNode::File { .. }) => Vec::new(),
        }
    }

    /// Run files known for a problem node, oldest submission first.
    pub async fn runs(&self, problem: &MirrorNode) -> Vec<RunEntry> {
        let MirrorNode::Problem {
            contest, name, path, ..
        } = problem
        else {
            return Vec::new();
        };
        let Some(entry) = self.catalog.contest(contest).await else {
            return Vec::new();
        };
        let Some(problem) = entry.problem(name) else {
            return Vec::new();
        };
        let mut runs = Vec::new();
        for run in problem.runs_by_date() {
            if !paths::is_safe_component(&run.runfilename) {
                continue;
            }
            let run_path = paths::run_dir(path, run.runnumber).join(&run.runfilename);
            runs.push(RunEntry {
                number: run.runnumber,
                file_name: run.runfilename.clone(),
                exists: is_file(&run_path).await,
                path: run_path,
                accepted: run.verdict().is_accepted(),
                verdict: entry.verdict_text(run.runanswer),
            });
        }
        runs
    }

    /// Maps a local path under the mirror root back onto the node it mirrors.
    pub async fn node_for_path(&self, path: &Path) -> Option<MirrorNode> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        match parts.as_slice() {
            [contest] => {
                let entry = self.catalog.contest(contest).await?;
                Some(self.contest_node(&entry).await)
            }
            [contest, problem] => {
                let entry = self.catalog.contest(contest).await?;
                let problem_entry = entry.problem(problem)?;
                let path = paths::problem_dir(&self.root, contest, problem);
                Some(problem_node(&entry, problem_entry, path).await)
            }
            [contest, problem, file] => {
                let entry = self.catalog.contest(contest).await?;
                let problem_entry = entry.problem(problem)?;
                let path = paths::problem_dir(&self.root, contest, problem);
                let parent = problem_node(&entry, problem_entry, path).await;
                self.children(Some(&parent))
                    .await
                    .into_iter()
                    .find(|node| node.name() == file)
            }
            _ => None,
        }
    }

    async fn contest_node(&self, entry: &ContestEntry) -> MirrorNode {
        let path = paths::contest_dir(&self.root, entry.name());
        MirrorNode::Contest {
            number: entry.contest.contestnumber,
            name: entry.name().to_string(),
            exists: is_dir(&path).await,
            path,
        }
    }
}

async fn problem_node(contest: &ContestEntry, problem: &ProblemEntry, path: PathBuf) -> MirrorNode {
    MirrorNode::Problem {
        contest: contest.name().to_string(),
        contest_number: contest.contest.contestnumber,
        number: problem.problem.problemnumber,
        name: problem.name().to_string(),
        exists: is_dir(&path).await,
        path,
        solved: problem.solved(),
        color: problem.problem.problemcolorname.clone(),
    }
}
