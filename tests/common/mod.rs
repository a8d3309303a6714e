//! Shared test utilities and fixtures
//!
//! A mock arXiv API on wiremock plus a throwaway SQLite database.

#![allow(dead_code)]

use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use theark::config::Config;
use theark::crawler::Crawler;
use theark::{db, migrate};

pub const API_PATH: &str = "/api/query";

/// Config pointed at `server`, with a fast limiter and short backoff.
pub fn test_config(dir: &Path, server: &MockServer) -> Config {
    let mut config = Config::minimal();
    config.db.path = dir.join("theark.sqlite");
    config.arxiv.api_base_url = format!("{}{}", server.uri(), API_PATH);
    config.arxiv.requests_per_second = 1000.0;
    config.arxiv.retry_base_delay_ms = 10;
    config.arxiv.max_retries = 2;
    config.arxiv.page_size = 2;
    config.crawler.categories = vec!["cs.AI".to_string(), "cs.LG".to_string()];
    config.crawler.fetch_interval_secs = 3600;
    config.crawler.historical_delay_secs = 0;
    config.crawler.error_retry_delay_secs = 0;
    config
}

pub async fn test_pool(config: &Config) -> SqlitePool {
    let pool = db::connect(config).await.unwrap();
    migrate::create_schema(&pool).await.unwrap();
    pool
}

/// Mock server, temp dir, pool and crawler wired together.
pub struct Harness {
    pub server: MockServer,
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub crawler: Arc<Crawler>,
    _tmp: TempDir,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(tweak: impl FnOnce(&mut Config)) -> Self {
        let server = MockServer::start().await;
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(tmp.path(), &server);
        tweak(&mut config);
        let config = Arc::new(config);
        let pool = test_pool(&config).await;
        let crawler = Arc::new(Crawler::new(pool.clone(), config.clone()).unwrap());
        Self {
            server,
            config,
            pool,
            crawler,
            _tmp: tmp,
        }
    }

    pub async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }
}

pub fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// One Atom `<entry>` for `arxiv_id` filed under `category`.
pub fn entry(arxiv_id: &str, category: &str) -> String {
    format!(
        r#"  <entry>
    <id>http://arxiv.org/abs/{id}v1</id>
    <updated>2024-05-01T12:00:00Z</updated>
    <published>2024-05-01T12:00:00Z</published>
    <title>Paper {id}</title>
    <summary>Abstract of {id}.</summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <arxiv:primary_category term="{cat}" scheme="http://arxiv.org/schemas/atom"/>
    <category term="{cat}" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
"#,
        id = arxiv_id,
        cat = category
    )
}

/// A full feed page with paging headers.
pub fn feed(total: u64, start: u64, entries: &[String]) -> String {
    render_feed(Some(total), start, entries)
}

/// A feed page that carries no `opensearch:totalResults`.
pub fn feed_without_total(start: u64, entries: &[String]) -> String {
    render_feed(None, start, entries)
}

fn render_feed(total: Option<u64>, start: u64, entries: &[String]) -> String {
    let total = total
        .map(|t| format!("  <opensearch:totalResults>{}</opensearch:totalResults>\n", t))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"
      xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/"
      xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title>ArXiv Query</title>
{total}  <opensearch:startIndex>{start}</opensearch:startIndex>
  <opensearch:itemsPerPage>{per_page}</opensearch:itemsPerPage>
{body}</feed>
"#,
        total = total,
        start = start,
        per_page = entries.len(),
        body = entries.concat()
    )
}

pub fn atom(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/atom+xml")
        .set_body_string(body)
}

/// Matches search requests for one category.
pub fn for_category(category: &'static str) -> impl Fn(&Request) -> bool + Send + Sync {
    move |req: &Request| {
        req.url
            .query()
            .is_some_and(|q| q.contains(&format!("cat:{}", category)))
    }
}

/// Serve `arxiv_id` for `id_list` lookups.
pub async fn mount_paper(server: &MockServer, arxiv_id: &str, category: &str) {
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .and(query_param("id_list", arxiv_id))
        .respond_with(atom(feed(1, 0, &[entry(arxiv_id, category)])))
        .mount(server)
        .await;
}

/// Serve one search page for `category` starting at `start`.
pub async fn mount_page(
    server: &MockServer,
    category: &'static str,
    start: u64,
    total: u64,
    ids: &[&str],
) {
    let entries: Vec<String> = ids.iter().map(|id| entry(id, category)).collect();
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .and(query_param("start", start.to_string()))
        .and(for_category(category))
        .respond_with(atom(feed(total, start, &entries)))
        .mount(server)
        .await;
}
