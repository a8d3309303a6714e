//! # TheArk
//!
//! A rate-limited arXiv crawler with resumable background crawling, a
//! deduplicating SQLite paper store and a small HTTP API.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────┐
//!                 │     CrawlService     │
//!                 │ recent ─┐ historical │
//!                 └─────────┼────────────┘
//!                           ▼
//! ┌───────────┐   ┌──────────────────┐   ┌──────────┐
//! │ arXiv API │◀──│ Crawler          │──▶│  SQLite  │
//! │  (Atom)   │   │ limiter + retry  │   │  papers  │
//! └───────────┘   └──────────────────┘   └────┬─────┘
//!                                             │
//!                        ┌────────────────────┤
//!                        ▼                    ▼
//!                   ┌──────────┐        ┌──────────┐
//!                   │   CLI    │        │   HTTP   │
//!                   │  (ark)   │        │  (axum)  │
//!                   └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ark init                                    # create database
//! ark crawl paper 1706.03762                  # fetch one paper
//! ark crawl date --category cs.AI --date 2024-05-01
//! ark run                                     # background loop until Ctrl-C
//! ark serve                                   # HTTP API + crawl control
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`arxiv_id`] | Identifier normalisation |
//! | [`arxiv_parser`] | Atom feed parsing |
//! | [`rate_limit`] | Request spacing |
//! | [`arxiv_client`] | arXiv HTTP client with retry |
//! | [`store`] | SQLite repository |
//! | [`summarizer`] | Summarization providers |
//! | [`crawler`] | Crawl operations |
//! | [`scheduler`] | Periodic task manager |
//! | [`explorer`] | Recent-papers monitor |
//! | [`historical`] | Backward archive crawl |
//! | [`service`] | Crawl start/stop control |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod arxiv_client;
pub mod arxiv_id;
pub mod arxiv_parser;
pub mod commands;
pub mod config;
pub mod crawler;
pub mod db;
pub mod error;
pub mod explorer;
pub mod historical;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod rate_limit;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod stats;
pub mod store;
pub mod summarizer;
