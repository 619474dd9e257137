use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio::sync::{RwLock, mpsc};

pub const UNSYNCHRONIZED_COLOR: &str = "boca.red";
pub const ACCEPTED_COLOR: &str = "boca.correctAnswer";
pub const REJECTED_COLOR: &str = "boca.incorrectAnswer";
const DEFAULT_PROBLEM_COLOR: &str = "boca.problem";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Badge {
    Unsynchronized,
    Solved,
    Unsolved,
    Accepted,
    Rejected,
}

impl Badge {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Unsynchronized => "⚠",
            Self::Solved => "⚑",
            Self::Unsolved => "⚐",
            Self::Accepted => "✓",
            Self::Rejected => "☓",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub badge: Badge,
    pub color: String,
    pub tooltip: Option<String>,
}

/// What a decorated path stands for, as far as badges are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject<'a> {
    Plain,
    Problem { solved: bool, color: Option<&'a str> },
    Run { accepted: bool, verdict: &'a str },
}

impl Decoration {
    pub fn unsynchronized() -> Self {
        Self {
            badge: Badge::Unsynchronized,
            color: UNSYNCHRONIZED_COLOR.to_string(),
            tooltip: Some("Unsynchronized".to_string()),
        }
    }

    pub fn problem(solved: bool, color: Option<&str>) -> Self {
        Self {
            badge: if solved { Badge::Solved } else { Badge::Unsolved },
            color: color
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(|c| format!("boca.{}", c.to_lowercase()))
                .unwrap_or_else(|| DEFAULT_PROBLEM_COLOR.to_string()),
            tooltip: None,
        }
    }

    pub fn run(accepted: bool, verdict: &str) -> Self {
        let (badge, color) = if accepted {
            (Badge::Accepted, ACCEPTED_COLOR)
        } else {
            (Badge::Rejected, REJECTED_COLOR)
        };
        Self {
            badge,
            color: color.to_string(),
            tooltip: Some(verdict.to_string()),
        }
    }

    /// A missing local copy outranks every solved/verdict badge.
    pub fn derive(exists: bool, subject: Subject<'_>) -> Option<Self> {
        if !exists {
            return Some(Self::unsynchronized());
        }
        match subject {
            Subject::Plain => None,
            Subject::Problem { solved, color } => Some(Self::problem(solved, color)),
            Subject::Run { accepted, verdict } => Some(Self::run(accepted, verdict)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecorationChanged {
    pub path: PathBuf,
}

/// One decoration per path; subscribers hear about a path only when its badge changes.
#[derive(Debug, Default)]
pub struct DecorationEngine {
    records: RwLock<HashMap<PathBuf, Decoration>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<DecorationChanged>>>,
}

impl DecorationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DecorationChanged> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Stores `decoration` for `path` (removing the record on `None`). Returns whether the
    /// badge changed, which is also when subscribers are notified.
    pub async fn set(&self, path: &Path, decoration: Option<Decoration>) -> bool {
        let changed = {
            let mut records = self.records.write().await;
            let previous = records.get(path).map(|d| d.badge);
            let next = decoration.as_ref().map(|d| d.badge);
            match decoration {
                Some(decoration) => {
                    records.insert(path.to_path_buf(), decoration);
                }
                None => {
                    records.remove(path);
                }
            }
            previous != next
        };
        if changed {
            self.notify(path);
        }
        changed
    }

    pub async fn get(&self, path: &Path) -> Option<Decoration> {
        self.records.read().await.get(path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn clear(&self) {
        let paths: Vec<PathBuf> = self.records.write().await.drain().map(|(p, _)| p).collect();
        for path in paths {
            self.notify(&path);
        }
    }

    fn notify(&self, path: &Path) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|tx| {
            tx.send(DecorationChanged {
                path: path.to_path_buf(),
            })
            .is_ok()
        });
    }
}
