use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ark_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ark");
    path
}

fn setup_test_env(api_base_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/theark.sqlite"

[arxiv]
api_base_url = "{}"
requests_per_second = 100.0
retry_base_delay_ms = 10
max_retries = 1
page_size = 10

[crawler]
categories = ["cs.AI", "cs.LG"]
historical_end_date = "2024-04-30"

[server]
bind = "127.0.0.1:7341"

[logging]
level = "warn"
"#,
        root.display(),
        api_base_url
    );

    let config_path = config_dir.join("ark.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ark(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ark_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ark binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

const PAPER_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"
      xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/"
      xmlns:arxiv="http://arxiv.org/schemas/atom">
  <opensearch:totalResults>1</opensearch:totalResults>
  <opensearch:startIndex>0</opensearch:startIndex>
  <opensearch:itemsPerPage>1</opensearch:itemsPerPage>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <updated>2023-08-02T00:41:18Z</updated>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All You Need</title>
    <summary>The dominant sequence transduction models are based on recurrent networks.</summary>
    <author><name>Ashish Vaswani</name></author>
    <arxiv:primary_category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>
"#;

async fn mock_arxiv() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("id_list", "1706.03762"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAPER_FEED))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAPER_FEED))
        .mount(&server)
        .await;
    server
}

fn unused_api() -> String {
    "http://127.0.0.1:9/api/query".to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env(&unused_api());

    let (stdout, stderr, success) = run_ark(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/theark.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env(&unused_api());

    let (_, _, success1) = run_ark(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_ark(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_papers_empty() {
    let (_tmp, config_path) = setup_test_env(&unused_api());

    run_ark(&config_path, &["init"]);
    let (stdout, stderr, success) = run_ark(&config_path, &["papers"]);
    assert!(success, "papers failed: stderr={}", stderr);
    assert!(stdout.contains("No papers stored."));
}

#[test]
fn test_stats_without_init() {
    let (_tmp, config_path) = setup_test_env(&unused_api());

    let (stdout, stderr, success) = run_ark(&config_path, &["stats"]);
    assert!(success, "stats failed: stderr={}", stderr);
    assert!(stdout.contains("Papers:      0"));
    assert!(stdout.contains("Historical crawl:"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_ark(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_init_without_config_uses_default_path() {
    let tmp = TempDir::new().unwrap();
    let output = Command::new(ark_binary())
        .current_dir(tmp.path())
        .args(["--config", "missing.toml", "--progress", "off", "init"])
        .output()
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "init failed: {}", stderr);
    assert!(tmp.path().join("data/theark.sqlite").exists());
    assert!(!tmp.path().join("missing.toml").exists());
}

#[test]
fn test_invalid_config_fails() {
    let (_tmp, config_path) = setup_test_env(&unused_api());
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("requests_per_second = 100.0", "requests_per_second = 0.0");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_ark(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("requests_per_second"));
}

#[test]
fn test_crawl_date_rejects_bad_input() {
    let (_tmp, config_path) = setup_test_env(&unused_api());

    let (_, stderr, success) = run_ark(
        &config_path,
        &["crawl", "date", "--category", "cs.AI", "--date", "2024-13-01"],
    );
    assert!(!success);
    assert!(stderr.contains("expected YYYY-MM-DD"));

    let (_, stderr, success) = run_ark(
        &config_path,
        &["crawl", "date", "--category", "CS.ai", "--date", "2024-05-01"],
    );
    assert!(!success);
    assert!(stderr.contains("invalid arXiv category"));
}

#[test]
fn test_show_missing_paper() {
    let (_tmp, config_path) = setup_test_env(&unused_api());

    run_ark(&config_path, &["init"]);
    let (_, stderr, success) = run_ark(&config_path, &["show", "1706.03762"]);
    assert!(!success);
    assert!(stderr.contains("paper not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_crawl_paper_then_show() {
    let server = mock_arxiv().await;
    let (_tmp, config_path) = setup_test_env(&format!("{}/api/query", server.uri()));

    let (stdout, stderr, success) = run_ark(
        &config_path,
        &["crawl", "paper", "https://arxiv.org/abs/1706.03762v7"],
    );
    assert!(success, "crawl failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("1706.03762  Attention Is All You Need"));
    assert!(stdout.contains("1 / 1 papers available"));

    let (stdout, _, success) = run_ark(&config_path, &["papers", "--category", "cs.LG"]);
    assert!(success);
    assert!(stdout.contains("1706.03762"));
    assert!(stdout.contains("1 of 1 papers"));

    let (stdout, _, success) = run_ark(&config_path, &["show", "1706.03762"]);
    assert!(success);
    assert!(stdout.contains("title:       Attention Is All You Need"));
    assert!(stdout.contains("categories:  cs.CL,cs.LG"));

    let (stdout, _, success) = run_ark(&config_path, &["events"]);
    assert!(success);
    assert!(stdout.contains("STORED"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_crawl_date_records_completion() {
    let server = mock_arxiv().await;
    let (_tmp, config_path) = setup_test_env(&format!("{}/api/query", server.uri()));

    let (stdout, stderr, success) = run_ark(
        &config_path,
        &["crawl", "date", "--category", "cs.CL", "--date", "2017-06-12"],
    );
    assert!(success, "crawl failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("cs.CL 2017-06-12: 1 found, 1 stored, 0 failed"));

    let (stdout, _, success) = run_ark(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("completed:  1 date-categories (0 failed)"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_crawl_date_dry_run_stores_nothing() {
    let server = mock_arxiv().await;
    let (_tmp, config_path) = setup_test_env(&format!("{}/api/query", server.uri()));

    let (stdout, _, success) = run_ark(
        &config_path,
        &[
            "crawl",
            "date",
            "--category",
            "cs.CL",
            "--date",
            "2017-06-12",
            "--dry-run",
        ],
    );
    assert!(success);
    assert!(stdout.contains("1 papers listed (dry run, nothing stored)"));

    let (stdout, _, _) = run_ark(&config_path, &["papers"]);
    assert!(stdout.contains("No papers stored."));
}
