//! Crawl progress reporting.
//!
//! Reports observable progress during `ark crawl ...` so users see which
//! category-day is being fetched and how many papers have been stored.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a crawl.
#[derive(Clone, Debug)]
pub enum CrawlProgressEvent {
    /// Requesting a result page starting at `start`.
    Fetching {
        category: String,
        date: String,
        start: u64,
    },
    /// `n` of `total` papers processed for this category-day.
    Storing {
        category: String,
        date: String,
        n: u64,
        total: u64,
    },
}

/// Reports crawl progress. Implementations write to stderr (human or JSON).
pub trait CrawlProgressReporter: Send + Sync {
    fn report(&self, event: CrawlProgressEvent);
}

/// Human-friendly progress on stderr: "crawl cs.AI 2024-05-01  storing  120 / 1,342 papers".
pub struct StderrProgress;

impl CrawlProgressReporter for StderrProgress {
    fn report(&self, event: CrawlProgressEvent) {
        let line = match &event {
            CrawlProgressEvent::Fetching {
                category,
                date,
                start,
            } => format!(
                "crawl {} {}  fetching from #{}\n",
                category,
                date,
                format_number(*start)
            ),
            CrawlProgressEvent::Storing {
                category,
                date,
                n,
                total,
            } => format!(
                "crawl {} {}  storing  {} / {} papers\n",
                category,
                date,
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl CrawlProgressReporter for JsonProgress {
    fn report(&self, event: CrawlProgressEvent) {
        let obj = match &event {
            CrawlProgressEvent::Fetching {
                category,
                date,
                start,
            } => serde_json::json!({
                "event": "progress",
                "category": category,
                "date": date,
                "phase": "fetching",
                "start": start
            }),
            CrawlProgressEvent::Storing {
                category,
                date,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "category": category,
                "date": date,
                "phase": "storing",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl CrawlProgressReporter for NoProgress {
    fn report(&self, _event: CrawlProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn CrawlProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
