//! arXiv identifier normalisation.
//!
//! Users hand us bare ids, abstract links and PDF links, with or without a
//! version suffix. Everything is reduced to the versionless id that the
//! `papers.arxiv_id` column is keyed on.
//!
//! | Input | Result |
//! |-------|--------|
//! | `1706.03762` | `1706.03762` |
//! | `1706.03762v7` | `1706.03762` |
//! | `https://arxiv.org/abs/1706.03762v7` | `1706.03762` |
//! | `https://arxiv.org/pdf/1706.03762.pdf` | `1706.03762` |
//! | `arXiv:1706.03762` | `1706.03762` |
//! | `hep-th/9901001` | `hep-th/9901001` |

use regex::Regex;
use std::sync::OnceLock;

use crate::error::ArxivError;

const ID_PATTERN: &str = r"(\d{4}\.\d{4,5}|[a-z][a-z-]*(?:\.[A-Z]{2})?/\d{7})(?:v\d+)?";

fn bare_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^{ID_PATTERN}$")).expect("valid arXiv id regex"))
}

fn url_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^(?:https?://)?(?:[a-z]+\.)?arxiv\.org/(?:abs|pdf)/{ID_PATTERN}(?:\.pdf)?/?(?:[?#].*)?$"
        ))
        .expect("valid arXiv url regex")
    })
}

fn feed_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"/abs/{ID_PATTERN}$")).expect("valid arXiv feed id regex")
    })
}

/// Extract the versionless arXiv id from an id, abstract URL or PDF URL.
pub fn extract_arxiv_id(identifier: &str) -> Result<String, ArxivError> {
    let trimmed = identifier.trim();
    let trimmed = match trimmed.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("arxiv:") => trimmed[6..].trim_start(),
        _ => trimmed,
    };
    if trimmed.is_empty() {
        return Err(ArxivError::InvalidIdentifier(identifier.to_string()));
    }

    let caps = bare_id_re()
        .captures(trimmed)
        .or_else(|| url_id_re().captures(trimmed));

    match caps.and_then(|c| c.get(1)) {
        Some(m) => Ok(m.as_str().to_string()),
        None => Err(ArxivError::InvalidIdentifier(trimmed.to_string())),
    }
}

/// Id from an Atom `<id>` element such as `http://arxiv.org/abs/1706.03762v7`.
pub fn id_from_entry_url(entry_id: &str) -> Option<String> {
    feed_id_re()
        .captures(entry_id.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn abs_url(base: &str, arxiv_id: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), arxiv_id)
}

pub fn pdf_url(base: &str, arxiv_id: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), arxiv_id)
}
