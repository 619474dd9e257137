use std::io::{Cursor, Write};
use std::path::Path;

use bocad::daemon::{DaemonConfig, DaemonRuntime, TokenSource};
use bocad::sync::uploader::SubmissionProfile;
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

fn statement_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in [
        ("description/problem.info", &b"basename=A\ndescfile=a.pdf\n"[..]),
        ("description/a.pdf", &b"%PDF-1.4"[..]),
        ("output/1", &b"42\n"[..]),
    ] {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

async fn get(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_contest(server: &MockServer) {
    let ok = |body: serde_json::Value| ResponseTemplate::new(200).set_body_json(body);
    get(
        server,
        "/contest",
        ok(json!([
            { "contestnumber": 0, "contestname": "system" },
            { "contestnumber": 1, "contestname": "OBI", "contestmainsite": 1,
              "conteststartdate": 1_700_000_000 }
        ])),
    )
    .await;
    get(
        server,
        "/contest/1/problem",
        ok(json!([
            { "contestnumber": 1, "problemnumber": 1, "problemname": "A",
              "probleminputfilename": "a.pdf", "problemcolorname": "Green" },
            { "contestnumber": 1, "problemnumber": 9, "problemname": "Placeholder", "fake": true }
        ])),
    )
    .await;
    get(
        server,
        "/contest/1/answer",
        ok(json!([
            { "answernumber": 1, "runanswer": "YES" },
            { "answernumber": 7, "runanswer": "NO - Wrong answer" }
        ])),
    )
    .await;
    get(
        server,
        "/contest/1/problem/1/run",
        ok(json!([
            { "runnumber": 5, "runanswer": 1, "rundate": 1_700_000_050, "runfilename": "a.c" },
            { "runnumber": 6, "runanswer": 7, "rundate": 1_700_000_090, "runfilename": "b.c" }
        ])),
    )
    .await;
    get(
        server,
        "/contest/1/problem/1/file",
        ResponseTemplate::new(200).set_body_bytes(statement_zip()),
    )
    .await;
    get(
        server,
        "/contest/1/problem/1/run/5/file",
        ResponseTemplate::new(200).set_body_string("int main(){return 0;}"),
    )
    .await;
    get(
        server,
        "/contest/1/problem/1/run/6/file",
        ResponseTemplate::new(200).set_body_string("int main(){return 1;}"),
    )
    .await;
}

async fn runtime(server: &MockServer, root: &Path) -> DaemonRuntime {
    DaemonRuntime::bootstrap(DaemonConfig {
        api_uri: server.uri(),
        mirror_root: root.to_path_buf(),
        token: TokenSource::Bearer("team-token".to_string()),
        profile: SubmissionProfile::default(),
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn sync_then_tree_reflects_verdicts() {
    let server = MockServer::start().await;
    mount_contest(&server).await;
    let dir = tempdir().unwrap();
    let runtime = runtime(&server, dir.path()).await;

    let report = runtime.sync(None).await.unwrap();

    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(std::fs::read(dir.path().join("OBI/A/a.pdf")).unwrap(), b"%PDF-1.4");
    assert!(!dir.path().join("OBI/A/output").exists());
    assert!(!dir.path().join("system").exists());
    assert!(!dir.path().join("OBI/Placeholder").exists());

    let tree = runtime.render_tree().await;
    assert_eq!(
        tree,
        "  OBI\n  ⚑ A\n      a.pdf\n    ✓ Runs/5/a.c\n    ☓ Runs/6/b.c\n"
    );
}

#[tokio::test]
async fn sync_of_problem_path_mirrors_its_runs() {
    let server = MockServer::start().await;
    mount_contest(&server).await;
    let dir = tempdir().unwrap();
    let runtime = runtime(&server, dir.path()).await;

    let report = runtime.sync(Some(Path::new("OBI/A"))).await.unwrap();

    assert_eq!(report.synchronized.len(), 3);
    assert!(dir.path().join("OBI/A/Runs/6/b.c").is_file());
}

#[tokio::test]
async fn submit_posts_run_from_problem_directory() {
    let server = MockServer::start().await;
    mount_contest(&server).await;
    Mock::given(method("POST"))
        .and(path("/contest/1/problem/1/run"))
        .and(body_string_contains("\"usernumber\":1001"))
        .and(body_string_contains("name=\"runfile\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "runnumber": 12 })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();
    let runtime = runtime(&server, dir.path()).await;
    std::fs::create_dir_all(dir.path().join("OBI/A")).unwrap();
    std::fs::write(dir.path().join("OBI/A/sol.cpp"), b"int main(){}").unwrap();

    let run = runtime.submit(Path::new("OBI/A/sol.cpp")).await.unwrap();

    assert_eq!(run, 12);
    assert!(!dir.path().join("OBI/A/Runs").exists());
}
