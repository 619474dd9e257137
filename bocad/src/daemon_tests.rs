use super::*;
use serde_json::json;
use std::collections::HashMap;
use tempfile::tempdir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name: &str| vars.get(name).cloned()
}

fn config(server: &MockServer, root: &Path, token: TokenSource) -> DaemonConfig {
    DaemonConfig {
        api_uri: server.uri(),
        mirror_root: root.to_path_buf(),
        token,
        profile: SubmissionProfile::default(),
    }
}

async fn mount_catalog(server: &MockServer, token: &str) {
    Mock::given(method("GET"))
        .and(path("/contest"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "contestnumber": 1, "contestname": "OBI" }
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contest/1/problem"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "contestnumber": 1, "problemnumber": 1, "problemname": "A",
              "probleminputfilename": "a.pdf" }
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contest/1/answer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contest/1/problem/1/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[test]
fn expands_tilde_to_home_mirror_dir() {
    let home = PathBuf::from("/tmp/home-user");
    assert_eq!(
        expand_with_home("~/contests", &home),
        PathBuf::from("/tmp/home-user/contests")
    );
    assert_eq!(expand_with_home("~", &home), home);
    assert_eq!(expand_with_home("/srv/boca", &home), PathBuf::from("/srv/boca"));
}

#[test]
fn config_defaults_mirror_dir_and_profile() {
    let home = PathBuf::from("/tmp/home-user");
    let config = DaemonConfig::from_lookup(
        lookup_from(&[("BOCA_API_URI", "http://boca.local/api"), ("BOCA_TOKEN", "abc")]),
        &home,
    )
    .unwrap();

    assert_eq!(config.mirror_root, home.join("BOCA"));
    assert_eq!(config.token, TokenSource::Bearer("abc".to_string()));
    assert_eq!(config.profile, SubmissionProfile::default());
}

#[test]
fn config_reads_overrides_and_credentials() {
    let home = PathBuf::from("/tmp/home-user");
    let config = DaemonConfig::from_lookup(
        lookup_from(&[
            ("BOCA_API_URI", "http://boca.local/api"),
            ("BOCA_MIRROR_DIR", "~/mirror"),
            ("BOCA_USERNAME", "team1"),
            ("BOCA_CREDENTIAL", "digest"),
            ("BOCA_USER_NUMBER", "2002"),
            ("BOCA_LANGUAGE", "not a number"),
        ]),
        &home,
    )
    .unwrap();

    assert_eq!(config.mirror_root, home.join("mirror"));
    assert_eq!(
        config.token,
        TokenSource::Credentials {
            name: "team1".to_string(),
            credential: "digest".to_string()
        }
    );
    assert_eq!(config.profile.user_number, 2002);
    assert_eq!(config.profile.language, DEFAULT_LANGUAGE);
}

#[test]
fn config_requires_api_uri_and_token() {
    let home = PathBuf::from("/tmp/home-user");
    let missing_uri = DaemonConfig::from_lookup(lookup_from(&[("BOCA_TOKEN", "abc")]), &home);
    assert!(missing_uri.unwrap_err().to_string().contains("BOCA_API_URI"));

    let missing_token = DaemonConfig::from_lookup(
        lookup_from(&[("BOCA_API_URI", "http://boca.local"), ("BOCA_USERNAME", "team1")]),
        &home,
    );
    assert!(missing_token.is_err());
}

#[tokio::test]
async fn bootstrap_exchanges_credentials_for_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/token"))
        .and(query_param("name", "team1"))
        .and(query_param("password", "digest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "issued" })))
        .expect(1)
        .mount(&server)
        .await;
    mount_catalog(&server, "issued").await;
    let dir = tempdir().unwrap();
    let root = dir.path().join("mirror");

    let runtime = DaemonRuntime::bootstrap(config(
        &server,
        &root,
        TokenSource::Credentials {
            name: "team1".to_string(),
            credential: "digest".to_string(),
        },
    ))
    .await
    .unwrap();

    assert!(root.is_dir());
    assert_eq!(runtime.engine().catalog().contests().await.len(), 1);
}

#[tokio::test]
async fn tree_shows_unsynchronized_badges() {
    let server = MockServer::start().await;
    mount_catalog(&server, "abc").await;
    let dir = tempdir().unwrap();
    let runtime = DaemonRuntime::bootstrap(config(
        &server,
        dir.path(),
        TokenSource::Bearer("abc".to_string()),
    ))
    .await
    .unwrap();

    let tree = runtime.render_tree().await;

    assert_eq!(tree, "⚠ OBI\n  ⚠ A\n    ⚠ a.pdf\n");
}

#[tokio::test]
async fn sync_rejects_paths_outside_the_mirror() {
    let server = MockServer::start().await;
    mount_catalog(&server, "abc").await;
    let dir = tempdir().unwrap();
    let runtime = DaemonRuntime::bootstrap(config(
        &server,
        dir.path(),
        TokenSource::Bearer("abc".to_string()),
    ))
    .await
    .unwrap();

    let err = runtime.sync(Some(Path::new("Elsewhere"))).await.unwrap_err();

    assert!(err.to_string().contains("not part of the mirror"));
}
