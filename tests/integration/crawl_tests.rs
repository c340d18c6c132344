//! Integration tests for the crawler
//!
//! These tests use wiremock to stand up a fake directory site and run the
//! full discover, fetch, extract and persist cycle end-to-end against both
//! storage backends.

use directory_harvester::config::{parse_config, Config};
use directory_harvester::crawler::{
    crawl, FetchError, LinkId, Orchestrator, Record, PERSON_NAME_UNAVAILABLE,
    PERSON_ROLE_UNAVAILABLE,
};
use directory_harvester::output::export_json;
use directory_harvester::storage::{open_store, CrawlStore, FileStore};
use directory_harvester::{HarvestError, RunStatus};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HASH: &str = "test-config-hash";

/// Creates a test configuration pointing at the mock server
fn create_test_config(server: &MockServer, dir: &Path, backend: &str) -> Config {
    parse_config(&format!(
        r#"
        [target]
        listing-url = "{uri}/clubs"
        detail-path = "/club?id={{code}}"

        [session]
        timeout-secs = 2
        user-agent = "TestBot/1.0"

        [output]
        backend = "{backend}"
        progress-path = "{dir}/progress.json"
        output-path = "{dir}/clubs.jsonl"
        database-path = "{dir}/harvest.db"
        "#,
        uri = server.uri(),
        backend = backend,
        dir = dir.display(),
    ))
    .expect("Failed to parse test config")
}

fn listing_page(codes: &[&str]) -> String {
    let rows: String = codes
        .iter()
        .map(|code| format!("<tr><td>Club {}</td><td>{}</td></tr>", code, code))
        .collect();
    format!(
        "<html><body><table><tr><th>Name</th><th>Code</th></tr>{}</table></body></html>",
        rows
    )
}

fn club_page(code: &str, people: &[(&str, &str)]) -> String {
    let rows: String = people
        .iter()
        .map(|(name, role)| format!("<tr><td>{}</td><td>{}</td></tr>", name, role))
        .collect();
    format!(
        r#"<html><body>
            <h2>Club {code}</h2>
            <h5><strong>Email:</strong> club{code}@example.org</h5>
            <h5><strong>Teléfonos:</strong> 900 000 00{code}</h5>
            <h5><strong>Provincia:</strong> Lugo</h5>
            <div>
                <table class="table-striped"><tbody>
                    <tr><td>Seniors</td></tr>
                    <tr><td>Juniors</td></tr>
                </tbody></table>
                <table class="table-striped">
                    <tr><th>Name</th><th>Role</th></tr>
                    {rows}
                </table>
            </div>
        </body></html>"#,
        code = code,
        rows = rows
    )
}

async fn mount_listing(server: &MockServer, codes: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/clubs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(codes)))
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, code: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/club"))
        .and(query_param("id", code))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_club(server: &MockServer, code: &str) {
    let people = [("Ana", "President"), ("Luis", "Secretary")];
    mount_detail(
        server,
        code,
        ResponseTemplate::new(200).set_body_string(club_page(code, &people)),
    )
    .await;
}

async fn mount_login_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<form>Sign in</form>"))
        .mount(server)
        .await;
}

/// Mounts a healthy site with one club per code
async fn healthy_site(codes: &[&str]) -> MockServer {
    let server = MockServer::start().await;
    mount_listing(&server, codes).await;
    for code in codes {
        mount_club(&server, code).await;
    }
    server
}

async fn run(config: &Config) -> directory_harvester::RunReport {
    crawl(config, HASH, false, Arc::new(AtomicBool::new(false)))
        .await
        .expect("Crawl failed")
}

fn progress_codes(config: &Config) -> Vec<String> {
    let store = open_store(&config.output, HASH).expect("Failed to open store");
    store
        .load_progress()
        .expect("Failed to load progress")
        .iter()
        .map(|link| link.to_string())
        .collect()
}

fn stored_records(config: &Config) -> Vec<(LinkId, Record)> {
    let store = open_store(&config.output, HASH).expect("Failed to open store");
    store
        .load_records()
        .expect("Failed to load records")
        .into_iter()
        .map(|stored| (stored.link, stored.record))
        .collect()
}

/// Every stored record belongs to a link in the progress set and vice versa
/// for links that produced records
fn assert_no_orphans(config: &Config) {
    let progress: HashSet<String> = progress_codes(config).into_iter().collect();
    for (link, _) in stored_records(config) {
        assert!(
            progress.contains(link.as_str()),
            "record for {} has no progress entry",
            link
        );
    }
}

#[tokio::test]
async fn test_full_crawl_persists_all_links() {
    let server = healthy_site(&["1", "2", "3"]).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), "files");

    let report = run(&config).await;

    assert!(report.is_clean());
    assert_eq!(report.discovered, 3);
    assert_eq!(report.persisted, 3);
    assert_eq!(report.records_written, 6);
    assert_eq!(report.remaining, 0);
    assert_eq!(progress_codes(&config), vec!["1", "2", "3"]);

    let records = stored_records(&config);
    assert_eq!(records.len(), 6);
    let (link, first) = &records[0];
    assert_eq!(link.as_str(), "1");
    assert_eq!(first.organization_name, "Club 1");
    assert_eq!(first.organization_email.as_deref(), Some("club1@example.org"));
    assert_eq!(first.organization_phone.as_deref(), Some("900 000 001"));
    assert_eq!(first.organization_province.as_deref(), Some("Lugo"));
    assert_eq!(first.person_name, "Ana");
    assert_eq!(first.person_role, "President");
    assert_eq!(first.team_count, 2);
}

#[tokio::test]
async fn test_resume_is_idempotent() {
    let server = healthy_site(&["1", "2", "3", "4"]).await;

    let once_dir = TempDir::new().unwrap();
    let once = create_test_config(&server, once_dir.path(), "files");
    run(&once).await;

    let twice_dir = TempDir::new().unwrap();
    let twice = create_test_config(&server, twice_dir.path(), "files");
    run(&twice).await;
    let second = run(&twice).await;

    assert_eq!(second.skipped, 4);
    assert_eq!(second.persisted, 0);
    assert_eq!(progress_codes(&once), progress_codes(&twice));

    let once_records: HashSet<Record> = stored_records(&once).into_iter().map(|(_, r)| r).collect();
    let twice_records: Vec<Record> = stored_records(&twice).into_iter().map(|(_, r)| r).collect();
    assert_eq!(twice_records.len(), 8);
    let twice_set: HashSet<Record> = twice_records.into_iter().collect();
    assert_eq!(once_records, twice_set);
}

#[tokio::test]
async fn test_login_redirect_halts_forward_progress() {
    let server = MockServer::start().await;
    let codes = ["1", "2", "3", "4", "5"];
    mount_listing(&server, &codes).await;
    mount_login_page(&server).await;
    for code in codes {
        if code == "3" {
            mount_detail(
                &server,
                code,
                ResponseTemplate::new(302).insert_header("location", "/login"),
            )
            .await;
        } else {
            mount_club(&server, code).await;
        }
    }

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), "files");
    let report = run(&config).await;

    match &report.status {
        RunStatus::Aborted { link, target } => {
            assert_eq!(link.as_str(), "3");
            assert!(target.ends_with("/login"));
        }
        other => panic!("Expected aborted run, got {}", other),
    }
    assert_eq!(report.persisted, 2);
    assert_eq!(report.remaining, 3);
    assert_eq!(progress_codes(&config), vec!["1", "2"]);

    let linked: HashSet<String> = stored_records(&config)
        .into_iter()
        .map(|(link, _)| link.to_string())
        .collect();
    assert_eq!(linked, HashSet::from(["1".to_string(), "2".to_string()]));
}

#[tokio::test]
async fn test_transient_error_is_isolated() {
    let server = MockServer::start().await;
    let codes = ["1", "2", "3", "4", "5"];
    mount_listing(&server, &codes).await;
    for code in codes {
        if code == "2" {
            mount_detail(&server, code, ResponseTemplate::new(500)).await;
        } else {
            mount_club(&server, code).await;
        }
    }

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), "files");
    let report = run(&config).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert!(!report.is_clean());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].link.as_str(), "2");
    assert!(matches!(
        report.failed[0].cause,
        FetchError::HttpStatus { status: 500, .. }
    ));
    assert_eq!(progress_codes(&config), vec!["1", "3", "4", "5"]);
    assert_no_orphans(&config);
}

#[tokio::test]
async fn test_slow_page_times_out_as_transient() {
    let server = MockServer::start().await;
    mount_listing(&server, &["1", "2"]).await;
    mount_detail(
        &server,
        "1",
        ResponseTemplate::new(200)
            .set_body_string(club_page("1", &[("Ana", "President")]))
            .set_delay(Duration::from_secs(5)),
    )
    .await;
    mount_club(&server, "2").await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), "files");
    let report = run(&config).await;

    assert!(report.status.is_completed());
    assert!(matches!(report.failed[0].cause, FetchError::Timeout(_)));
    assert_eq!(progress_codes(&config), vec!["2"]);
}

#[tokio::test]
async fn test_failed_link_is_retried_on_next_run() {
    let server = MockServer::start().await;
    mount_listing(&server, &["1", "2"]).await;
    mount_club(&server, "1").await;
    Mock::given(method("GET"))
        .and(path("/club"))
        .and(query_param("id", "2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_club(&server, "2").await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), "files");

    let first = run(&config).await;
    assert_eq!(first.failed.len(), 1);
    assert_eq!(progress_codes(&config), vec!["1"]);

    let second = run(&config).await;
    assert!(second.is_clean());
    assert_eq!(second.skipped, 1);
    assert_eq!(second.persisted, 1);
    assert_eq!(progress_codes(&config), vec!["1", "2"]);
    assert_no_orphans(&config);
}

#[tokio::test]
async fn test_empty_people_cells_use_stand_ins() {
    let server = MockServer::start().await;
    mount_listing(&server, &["9"]).await;
    mount_detail(
        &server,
        "9",
        ResponseTemplate::new(200).set_body_string(club_page("9", &[(" ", "")])),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), "files");
    run(&config).await;

    let records = stored_records(&config);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].1.person_name, PERSON_NAME_UNAVAILABLE);
    assert_eq!(records[0].1.person_role, PERSON_ROLE_UNAVAILABLE);
}

#[tokio::test]
async fn test_whitespace_code_rows_are_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clubs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<table>
                <tr><td>A</td><td>11</td></tr>
                <tr><td>B</td><td>   </td></tr>
                <tr><td>C</td><td>33</td></tr>
                <tr><td>D</td><td>44</td></tr>
            </table>"#,
        ))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), "files");
    let store = open_store(&config.output, HASH).unwrap();
    let orchestrator = Orchestrator::from_config(&config, store).unwrap();

    let links = orchestrator.discover().await.unwrap();
    assert_eq!(
        links,
        vec![LinkId::new("11"), LinkId::new("33"), LinkId::new("44")]
    );
}

#[tokio::test]
async fn test_unreachable_listing_is_discovery_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clubs"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), "files");
    let result = crawl(&config, HASH, false, Arc::new(AtomicBool::new(false))).await;

    assert!(matches!(result, Err(HarvestError::Discovery { .. })));
}

#[tokio::test]
async fn test_sqlite_backend_resumes_after_abort() {
    let server = MockServer::start().await;
    let codes = ["1", "2", "3"];
    mount_listing(&server, &codes).await;
    mount_login_page(&server).await;
    mount_club(&server, "1").await;
    mount_club(&server, "3").await;
    Mock::given(method("GET"))
        .and(path("/club"))
        .and(query_param("id", "2"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/login"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_club(&server, "2").await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), "sqlite");

    let first = run(&config).await;
    assert!(first.status.is_aborted());
    assert_eq!(progress_codes(&config), vec!["1"]);

    let second = run(&config).await;
    assert!(second.is_clean());
    assert_eq!(second.skipped, 1);
    assert_eq!(second.persisted, 2);
    assert_eq!(progress_codes(&config), vec!["1", "2", "3"]);
    assert_eq!(stored_records(&config).len(), 6);
    assert_no_orphans(&config);
}

#[tokio::test]
async fn test_fresh_run_discards_previous_state() {
    let server = healthy_site(&["1", "2"]).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), "files");
    run(&config).await;

    let report = crawl(&config, HASH, true, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    assert_eq!(report.skipped, 0);
    assert_eq!(report.persisted, 2);
    assert_eq!(stored_records(&config).len(), 4);
}

#[tokio::test]
async fn test_output_stays_parseable_after_every_commit() {
    let server = healthy_site(&["1", "2", "3"]).await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, dir.path(), "files");
    run(&config).await;

    let content = std::fs::read_to_string(&config.output.output_path).unwrap();
    for line in content.lines() {
        serde_json::from_str::<serde_json::Value>(line).expect("Every line is a JSON document");
    }

    let store = FileStore::open(
        Path::new(&config.output.progress_path),
        Path::new(&config.output.output_path),
        HASH,
    )
    .unwrap();
    let export_path = dir.path().join("clubs.json");
    assert_eq!(export_json(&store, &export_path).unwrap(), 6);

    let exported: Vec<Record> =
        serde_json::from_str(&std::fs::read_to_string(&export_path).unwrap()).unwrap();
    assert_eq!(exported.len(), 6);
    assert_eq!(exported[4].organization_name, "Club 3");
}
