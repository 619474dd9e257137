use std::path::Path;

use boca_core::{BocaClient, Contest, RunSubmission};
use tracing::info;

use super::catalog::CatalogCache;
use super::engine::SyncError;
use super::paths::{self, PathError};

pub const DEFAULT_USER_NUMBER: u32 = 1001;
pub const DEFAULT_LANGUAGE: u32 = 1;

/// Fixed submitter attributes attached to every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionProfile {
    pub user_number: u32,
    pub language: u32,
}

impl Default for SubmissionProfile {
    fn default() -> Self {
        Self {
            user_number: DEFAULT_USER_NUMBER,
            language: DEFAULT_LANGUAGE,
        }
    }
}

pub fn submission_metadata(
    contest: &Contest,
    profile: SubmissionProfile,
    now: i64,
) -> RunSubmission {
    RunSubmission {
        runsitenumber: contest.contestmainsite,
        usernumber: profile.user_number,
        rundate: now,
        runlangnumber: profile.language,
        rundatediff: now - contest.conteststartdate,
    }
}

/// Posts `resource` as a run of the problem whose directory contains it.
pub async fn submit_run(
    client: &BocaClient,
    catalog: &CatalogCache,
    profile: SubmissionProfile,
    resource: &Path,
    now: i64,
) -> Result<u32, SyncError> {
    let lineage = paths::file_lineage(resource)?;
    let (contest, problem) = catalog
        .problem(&lineage.contest, &lineage.problem)
        .await
        .ok_or_else(|| SyncError::NotInCatalog(lineage.problem_dir.clone()))?;
    let file_name = resource
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| PathError::MissingLineage {
            kind: "file",
            path: resource.to_path_buf(),
        })?;
    let body = tokio::fs::read(resource)
        .await
        .map_err(SyncError::fs(resource))?;

    let metadata = submission_metadata(&contest, profile, now);
    let run = client
        .submit_run(
            contest.contestnumber,
            problem.problem.problemnumber,
            &metadata,
            &file_name,
            body,
        )
        .await?;
    info!(
        run,
        contest = contest.contestnumber,
        problem = problem.problem.problemnumber,
        "run submitted"
    );
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::catalog::{ContestEntry, ProblemEntry};
    use serde_json::json;
    use tempfile::tempdir;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const T0: i64 = 1_700_000_000;

    fn contest() -> Contest {
        serde_json::from_value(json!({
            "contestnumber": 1,
            "contestname": "OBI",
            "contestmainsite": 2,
            "conteststartdate": T0
        }))
        .unwrap()
    }

    async fn catalog() -> CatalogCache {
        let mut entry = ContestEntry::new(contest());
        entry.problems.push(ProblemEntry::new(
            serde_json::from_value(json!({
                "contestnumber": 1,
                "problemnumber": 3,
                "problemname": "A"
            }))
            .unwrap(),
        ));
        let cache = CatalogCache::new();
        cache.replace(vec![entry]).await;
        cache
    }

    #[test]
    fn metadata_measures_time_since_contest_start() {
        let metadata = submission_metadata(&contest(), SubmissionProfile::default(), T0 + 120);
        assert_eq!(metadata.rundatediff, 120);
        assert_eq!(metadata.rundate, T0 + 120);
        assert_eq!(metadata.runsitenumber, 2);
        assert_eq!(metadata.usernumber, DEFAULT_USER_NUMBER);
        assert_eq!(metadata.runlangnumber, DEFAULT_LANGUAGE);
    }

    #[tokio::test]
    async fn submits_file_of_problem_directory() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contest/1/problem/3/run"))
            .and(header("authorization", "Bearer t"))
            .and(body_string_contains("\"rundatediff\":120"))
            .and(body_string_contains("filename=\"sol.c\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "runnumber": 17 })))
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempdir().unwrap();
        let problem_dir = dir.path().join("OBI/A");
        std::fs::create_dir_all(&problem_dir).unwrap();
        std::fs::write(problem_dir.join("sol.c"), b"int main(){}").unwrap();
        let client = BocaClient::new(&server.uri(), "t").unwrap();

        let run = submit_run(
            &client,
            &catalog().await,
            SubmissionProfile::default(),
            &problem_dir.join("sol.c"),
            T0 + 120,
        )
        .await
        .unwrap();

        assert_eq!(run, 17);
    }

    #[tokio::test]
    async fn unknown_lineage_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "runnumber": 1 })))
            .expect(0)
            .mount(&server)
            .await;
        let dir = tempdir().unwrap();
        let stray = dir.path().join("Elsewhere/Z");
        std::fs::create_dir_all(&stray).unwrap();
        std::fs::write(stray.join("sol.c"), b"x").unwrap();
        let client = BocaClient::new(&server.uri(), "t").unwrap();

        let err = submit_run(
            &client,
            &catalog().await,
            SubmissionProfile::default(),
            &stray.join("sol.c"),
            T0,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::NotInCatalog(_)));
    }

    #[tokio::test]
    async fn rejected_submission_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contest/1/problem/3/run"))
            .respond_with(ResponseTemplate::new(413))
            .mount(&server)
            .await;
        let dir = tempdir().unwrap();
        let problem_dir = dir.path().join("OBI/A");
        std::fs::create_dir_all(&problem_dir).unwrap();
        std::fs::write(problem_dir.join("sol.c"), b"x").unwrap();
        let client = BocaClient::new(&server.uri(), "t").unwrap();

        let err = submit_run(
            &client,
            &catalog().await,
            SubmissionProfile::default(),
            &problem_dir.join("sol.c"),
            T0,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::CatalogUnavailable(_)));
    }
}
