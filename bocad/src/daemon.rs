use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use boca_core::{BocaClient, TokenClient};
use tracing::info;

use crate::sync::decoration::DecorationEngine;
use crate::sync::engine::{SyncEngine, SyncReport};
use crate::sync::mirror::MirrorNode;
use crate::sync::uploader::{DEFAULT_LANGUAGE, DEFAULT_USER_NUMBER, SubmissionProfile};

const DEFAULT_MIRROR_DIR_NAME: &str = "BOCA";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenSource {
    Bearer(String),
    Credentials { name: String, credential: String },
}

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub api_uri: String,
    pub mirror_root: PathBuf,
    pub token: TokenSource,
    pub profile: SubmissionProfile,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        Self::from_lookup(|name| std::env::var(name).ok(), &home)
    }

    pub fn from_lookup<F>(lookup: F, home: &Path) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_uri = lookup("BOCA_API_URI")
            .filter(|value| !value.trim().is_empty())
            .context("BOCA_API_URI is not set")?;
        let mirror_root = lookup("BOCA_MIRROR_DIR")
            .filter(|value| !value.trim().is_empty())
            .map(|value| expand_with_home(&value, home))
            .unwrap_or_else(|| home.join(DEFAULT_MIRROR_DIR_NAME));
        let token = token_source(&lookup)?;
        let profile = SubmissionProfile {
            user_number: read_u32(&lookup, "BOCA_USER_NUMBER", DEFAULT_USER_NUMBER),
            language: read_u32(&lookup, "BOCA_LANGUAGE", DEFAULT_LANGUAGE),
        };

        Ok(Self {
            api_uri,
            mirror_root,
            token,
            profile,
        })
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    engine: SyncEngine,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.mirror_root)
            .await
            .with_context(|| format!("failed to create mirror root at {:?}", config.mirror_root))?;

        let token = resolve_token(&config).await?;
        let client = BocaClient::new(&config.api_uri, token).context("invalid BOCA_API_URI")?;
        let engine =
            SyncEngine::new(client, config.mirror_root.clone()).with_profile(config.profile);
        let summary = engine.reload().await.context("failed to load contest catalog")?;
        info!(
            mirror_root = %config.mirror_root.display(),
            contests = summary.contests,
            problems = summary.problems,
            "catalog ready"
        );

        Ok(Self { config, engine })
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Synchronizes the node mirrored at `path`, or the whole mirror when `path` is `None`.
    /// Relative paths are taken relative to the mirror root.
    pub async fn sync(&self, path: Option<&Path>) -> anyhow::Result<SyncReport> {
        let node = match path {
            None => None,
            Some(path) => {
                let absolute = self.config.mirror_root.join(path);
                let node = self
                    .engine
                    .mirror()
                    .node_for_path(&absolute)
                    .await
                    .with_context(|| format!("{} is not part of the mirror", absolute.display()))?;
                Some(node)
            }
        };
        Ok(self.engine.synchronize(node.as_ref()).await)
    }

    pub async fn submit(&self, file: &Path) -> anyhow::Result<u32> {
        let absolute = self.config.mirror_root.join(file);
        self.engine
            .submit_run(&absolute)
            .await
            .with_context(|| format!("failed to submit {}", absolute.display()))
    }

    /// Indented listing of the mirror with each path's badge.
    pub async fn render_tree(&self) -> String {
        let decorations = self.engine.decorations();
        let mut out = String::new();
        for contest in self.engine.expand(None).await {
            push_line(&mut out, 0, &contest, decorations).await;
            for problem in self.engine.expand(Some(&contest)).await {
                push_line(&mut out, 1, &problem, decorations).await;
                for file in self.engine.expand(Some(&problem)).await {
                    push_line(&mut out, 2, &file, decorations).await;
                }
                for run in self.engine.runs(&problem).await {
                    let badge = badge_for(decorations, &run.path).await;
                    let _ = writeln!(
                        out,
                        "{}{badge} Runs/{}/{}",
                        indent(2),
                        run.number,
                        run.file_name
                    );
                }
            }
        }
        out
    }
}

async fn push_line(
    out: &mut String,
    depth: usize,
    node: &MirrorNode,
    decorations: &DecorationEngine,
) {
    let badge = badge_for(decorations, node.path()).await;
    let _ = writeln!(out, "{}{badge} {}", indent(depth), node.name());
}

include!("daemon_helpers.rs");

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
