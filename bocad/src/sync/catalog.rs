use std::collections::BTreeMap;

use boca_core::{Answer, BocaClient, BocaError, Contest, Problem, Run};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::paths::is_safe_component;

/// Contest number the server reserves for its own bookkeeping.
pub const SYSTEM_CONTEST: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemEntry {
    pub problem: Problem,
    pub runs: BTreeMap<u32, Run>,
}

impl ProblemEntry {
    pub fn new(problem: Problem) -> Self {
        Self {
            problem,
            runs: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.problem.problemname
    }

    /// Derived on every call from the current run set.
    pub fn solved(&self) -> bool {
        self.runs.values().any(|run| run.verdict().is_accepted())
    }

    pub fn runs_by_date(&self) -> Vec<&Run> {
        let mut runs: Vec<&Run> = self.runs.values().collect();
        runs.sort_by_key(|run| (run.rundate, run.runnumber));
        runs
    }

    pub fn merge_runs(&mut self, runs: impl IntoIterator<Item = Run>) {
        for run in runs {
            self.runs.insert(run.runnumber, run);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContestEntry {
    pub contest: Contest,
    pub answers: Vec<Answer>,
    pub problems: Vec<ProblemEntry>,
}

impl ContestEntry {
    pub fn new(contest: Contest) -> Self {
        Self {
            contest,
            answers: Vec::new(),
            problems: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.contest.contestname
    }

    pub fn problem(&self, name: &str) -> Option<&ProblemEntry> {
        self.problems.iter().find(|entry| entry.name() == name)
    }

    pub fn problem_mut(&mut self, name: &str) -> Option<&mut ProblemEntry> {
        self.problems.iter_mut().find(|entry| entry.name() == name)
    }

    /// Verdict label for a run answer code; empty when the contest defines none.
    pub fn verdict_text(&self, code: u32) -> String {
        self.answers
            .iter()
            .find(|answer| answer.answernumber == code)
            .map(|answer| answer.runanswer.clone())
            .unwrap_or_default()
    }

    fn upsert_problem(&mut self, entry: ProblemEntry) {
        match self.problem_mut(entry.name()) {
            Some(existing) => *existing = entry,
            None => self.problems.push(entry),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogSummary {
    pub contests: usize,
    pub problems: usize,
    pub runs: usize,
    pub failed_fetches: usize,
}

/// Session view of the remote catalog, keyed by the names used as directory names.
#[derive(Debug, Default)]
pub struct CatalogCache {
    contests: RwLock<Vec<ContestEntry>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the whole catalog and swaps it in. Fetch failures below the contest list are
    /// contained to their subtree; an expired token aborts the reload.
    pub async fn reload(&self, client: &BocaClient) -> Result<CatalogSummary, BocaError> {
        let (contests, summary) = fetch_catalog(client).await?;
        self.replace(contests).await;
        Ok(summary)
    }

    pub async fn invalidate(&self) {
        self.contests.write().await.clear();
    }

    pub async fn replace(&self, contests: Vec<ContestEntry>) {
        let mut deduped: Vec<ContestEntry> = Vec::with_capacity(contests.len());
        for entry in contests {
            match deduped.iter_mut().find(|e| e.name() == entry.name()) {
                Some(existing) => *existing = entry,
                None => deduped.push(entry),
            }
        }
        *self.contests.write().await = deduped;
    }

    pub async fn contests(&self) -> Vec<ContestEntry> {
        self.contests.read().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.contests.read().await.is_empty()
    }

    pub async fn contest(&self, name: &str) -> Option<ContestEntry> {
        self.contests
            .read()
            .await
            .iter()
            .find(|entry| entry.name() == name)
            .cloned()
    }

    pub async fn problem(&self, contest: &str, problem: &str) -> Option<(Contest, ProblemEntry)> {
        let contests = self.contests.read().await;
        let entry = contests.iter().find(|entry| entry.name() == contest)?;
        let problem = entry.problem(problem)?.clone();
        Some((entry.contest.clone(), problem))
    }

    pub async fn contest_number(&self, name: &str) -> Option<u32> {
        self.contest(name).await.map(|c| c.contest.contestnumber)
    }

    pub async fn problem_number(&self, contest: &str, problem: &str) -> Option<u32> {
        self.problem(contest, problem)
            .await
            .map(|(_, p)| p.problem.problemnumber)
    }

    /// Returns false when the problem is no longer in the catalog.
    pub async fn merge_runs(&self, contest: &str, problem: &str, runs: Vec<Run>) -> bool {
        let mut contests = self.contests.write().await;
        let Some(entry) = contests
            .iter_mut()
            .find(|entry| entry.name() == contest)
            .and_then(|entry| entry.problem_mut(problem))
        else {
            return false;
        };
        entry.merge_runs(runs);
        true
    }
}

fn keep_contest(contest: &Contest) -> bool {
    if contest.contestnumber == SYSTEM_CONTEST {
        return false;
    }
    if !is_safe_component(&contest.contestname) {
        warn!(
            contest = contest.contestnumber,
            name = %contest.contestname,
            "skipping contest whose name cannot be a directory"
        );
        return false;
    }
    true
}

fn keep_problem(problem: &Problem) -> bool {
    if problem.fake {
        return false;
    }
    if !is_safe_component(&problem.problemname) {
        warn!(
            contest = problem.contestnumber,
            problem = problem.problemnumber,
            name = %problem.problemname,
            "skipping problem whose name cannot be a directory"
        );
        return false;
    }
    true
}

fn contain(
    err: BocaError,
    what: &str,
    summary: &mut CatalogSummary,
) -> Result<(), BocaError> {
    if err.is_auth_expired() {
        return Err(err);
    }
    warn!(error = %err, what, "catalog fetch failed");
    summary.failed_fetches += 1;
    Ok(())
}

pub async fn fetch_catalog(
    client: &BocaClient,
) -> Result<(Vec<ContestEntry>, CatalogSummary), BocaError> {
    let mut summary = CatalogSummary::default();
    let mut entries = Vec::new();

    for contest in client.list_contests().await? {
        if !keep_contest(&contest) {
            continue;
        }
        let number = contest.contestnumber;
        let mut entry = ContestEntry::new(contest);

        match client.list_answers(number).await {
            Ok(answers) => entry.answers = answers,
            Err(err) => contain(err, "answers", &mut summary)?,
        }

        match client.list_problems(number).await {
            Ok(problems) => {
                for problem in problems.into_iter().filter(keep_problem) {
                    let mut problem_entry = ProblemEntry::new(problem);
                    let problem_number = problem_entry.problem.problemnumber;
                    match client.list_runs(number, problem_number).await {
                        Ok(runs) => problem_entry.merge_runs(runs),
                        Err(err) => contain(err, "runs", &mut summary)?,
                    }
                    summary.runs += problem_entry.runs.len();
                    summary.problems += 1;
                    entry.upsert_problem(problem_entry);
                }
            }
            Err(err) => contain(err, "problems", &mut summary)?,
        }

        debug!(
            contest = number,
            problems = entry.problems.len(),
            "catalog contest loaded"
        );
        summary.contests += 1;
        entries.push(entry);
    }

    Ok((entries, summary))
}
