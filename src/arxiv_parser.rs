//! arXiv Atom feed parsing.
//!
//! The export API answers every query with an Atom 1.0 document extended by
//! the `opensearch:` and `arxiv:` namespaces. This module turns that document
//! into an [`ArxivFeed`]. Namespace prefixes are ignored; elements are matched
//! by local name.
//!
//! When the API rejects a query it still returns a 200 feed, with a single
//! entry whose `<id>` points at `arxiv.org/api/errors`. That entry is turned
//! into [`ArxivError::Api`] instead of a paper.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::arxiv_id::{abs_url, id_from_entry_url, pdf_url};
use crate::error::ArxivError;
use crate::models::ArxivPaper;

pub const DEFAULT_PRIMARY_CATEGORY: &str = "cs.AI";
const DEFAULT_ABS_BASE: &str = "https://arxiv.org/abs";
const DEFAULT_PDF_BASE: &str = "https://arxiv.org/pdf";
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One page of API results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArxivFeed {
    pub total_results: Option<u64>,
    pub start_index: Option<u64>,
    pub items_per_page: Option<u64>,
    pub papers: Vec<ArxivPaper>,
}

/// Parse a feed, building paper links against arxiv.org.
pub fn parse_feed(xml: &str) -> Result<ArxivFeed, ArxivError> {
    parse_feed_with_links(xml, DEFAULT_ABS_BASE, DEFAULT_PDF_BASE)
}

/// Parse a feed, building `url_abs`/`url_pdf` against the given bases.
pub fn parse_feed_with_links(
    xml: &str,
    abs_base: &str,
    pdf_base: &str,
) -> Result<ArxivFeed, ArxivError> {
    if xml.trim().is_empty() {
        return Err(ArxivError::Parse("empty response body".to_string()));
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut feed = ArxivFeed::default();
    let mut saw_feed = false;
    let mut entry: Option<RawEntry> = None;
    let mut in_author = false;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                text.clear();
                match e.local_name().as_ref() {
                    b"feed" => saw_feed = true,
                    b"entry" => entry = Some(RawEntry::default()),
                    b"author" => in_author = true,
                    _ => {
                        if let Some(raw) = entry.as_mut() {
                            raw.apply_attributes(&e)?;
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(raw) = entry.as_mut() {
                    raw.apply_attributes(&e)?;
                }
            }
            Ok(Event::Text(t)) => {
                let chunk = t
                    .unescape()
                    .map_err(|e| ArxivError::Parse(format!("bad text content: {}", e)))?;
                text.push_str(&chunk);
            }
            Ok(Event::CData(c)) => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Ok(Event::End(e)) => {
                let value = std::mem::take(&mut text);
                let local = e.local_name();
                let name = local.as_ref();

                if name == b"author" {
                    in_author = false;
                    continue;
                }
                if name == b"entry" {
                    if let Some(raw) = entry.take() {
                        if let Some(paper) = raw.finish(abs_base, pdf_base)? {
                            feed.papers.push(paper);
                        }
                    }
                    continue;
                }

                match (entry.as_mut(), name) {
                    (Some(raw), b"name") if in_author => {
                        let author = collapse_whitespace(&value);
                        if !author.is_empty() {
                            raw.authors.push(author);
                        }
                    }
                    (Some(raw), b"id") => raw.id = value,
                    (Some(raw), b"title") => raw.title = value,
                    (Some(raw), b"summary") => raw.summary = value,
                    (Some(raw), b"published") => raw.published = value,
                    (Some(raw), b"updated") => raw.updated = value,
                    (Some(raw), b"doi") => raw.doi = non_empty(value),
                    (Some(raw), b"comment") => raw.comment = non_empty(value),
                    (Some(raw), b"journal_ref") => raw.journal_ref = non_empty(value),
                    (None, b"totalResults") => feed.total_results = value.trim().parse().ok(),
                    (None, b"startIndex") => feed.start_index = value.trim().parse().ok(),
                    (None, b"itemsPerPage") => feed.items_per_page = value.trim().parse().ok(),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ArxivError::Parse(format!(
                    "malformed XML at byte {}: {}",
                    reader.error_position(),
                    e
                )))
            }
        }
    }

    if !saw_feed {
        return Err(ArxivError::Parse("response is not an Atom feed".to_string()));
    }

    Ok(feed)
}

/// Text and attributes of one `<entry>` before validation.
#[derive(Default)]
struct RawEntry {
    id: String,
    title: String,
    summary: String,
    published: String,
    updated: String,
    authors: Vec<String>,
    primary_category: Option<String>,
    categories: Vec<String>,
    doi: Option<String>,
    comment: Option<String>,
    journal_ref: Option<String>,
}

impl RawEntry {
    fn apply_attributes(&mut self, e: &BytesStart<'_>) -> Result<(), ArxivError> {
        let local = e.local_name();
        let is_primary = match local.as_ref() {
            b"primary_category" => true,
            b"category" => false,
            _ => return Ok(()),
        };

        for attr in e.attributes() {
            let attr = attr.map_err(|e| ArxivError::Parse(format!("bad attribute: {}", e)))?;
            if attr.key.local_name().as_ref() != b"term" {
                continue;
            }
            let term = attr
                .unescape_value()
                .map_err(|e| ArxivError::Parse(format!("bad attribute value: {}", e)))?
                .trim()
                .to_string();
            if term.is_empty() {
                continue;
            }
            if is_primary {
                self.primary_category = Some(term);
            } else {
                self.categories.push(term);
            }
        }
        Ok(())
    }

    fn finish(self, abs_base: &str, pdf_base: &str) -> Result<Option<ArxivPaper>, ArxivError> {
        if self.id.contains("arxiv.org/api/errors") {
            let message = collapse_whitespace(&self.summary);
            return Err(ArxivError::Api {
                status: 400,
                message: if message.is_empty() {
                    self.id.trim().to_string()
                } else {
                    message
                },
            });
        }

        let arxiv_id = match id_from_entry_url(&self.id) {
            Some(id) => id,
            None => {
                tracing::warn!(entry_id = %self.id.trim(), "skipping feed entry without arXiv id");
                return Ok(None);
            }
        };

        let mut categories: Vec<String> = Vec::with_capacity(self.categories.len() + 1);
        for cat in self.primary_category.into_iter().chain(self.categories) {
            if !categories.contains(&cat) {
                categories.push(cat);
            }
        }
        let primary_category = categories
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_PRIMARY_CATEGORY.to_string());

        Ok(Some(ArxivPaper {
            url_abs: abs_url(abs_base, &arxiv_id),
            url_pdf: pdf_url(pdf_base, &arxiv_id),
            title: collapse_whitespace(&self.title),
            abstract_text: collapse_whitespace(&self.summary),
            published_at: normalize_date(&self.published, &arxiv_id),
            updated_at: normalize_date(&self.updated, &arxiv_id),
            authors: self.authors,
            categories,
            primary_category,
            doi: self.doi,
            comment: self.comment.map(|c| collapse_whitespace(&c)),
            journal_ref: self.journal_ref.map(|j| collapse_whitespace(&j)),
            arxiv_id,
        }))
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_date(raw: &str, arxiv_id: &str) -> String {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(dt) => dt.with_timezone(&Utc).format(DATE_FORMAT).to_string(),
        Err(e) => {
            tracing::warn!(arxiv_id, raw, error = %e, "unparseable date in feed, using now");
            Utc::now().format(DATE_FORMAT).to_string()
        }
    }
}
