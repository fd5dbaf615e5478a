//! ModelViz Library
//!
//! Compare outputs, latency and cost of AI models across providers, and keep a
//! local log of every provider call for usage reporting.
//!
//! ## Core Features
//!
//! - **Side-by-side comparison**: one prompt is sent to several models
//!   concurrently under a shared deadline; each model gets its own result
//! - **Analysis**: fastest, cheapest and a weighted "best overall" pick among
//!   the successful responses
//! - **Usage metrics**: every call is recorded and aggregated per provider,
//!   per model and over time, with retention pruning
//! - **Local persistence**: sessions, keys, metrics and blends live as JSON
//!   documents in the data directory
//! - **Export**: JSON and Markdown reports
//!
//! ## Architecture Overview
//!
//! - [`models`] - Sessions, results, analyses and metric records
//! - [`storage`] - JSON document store addressed by fixed keys
//! - [`events`] - Change notifications between services
//! - [`keys`] - API key validation and storage
//! - [`pricing`] - Per-token prices with LiteLLM refresh
//! - [`providers`] - Vendor clients behind one trait
//! - [`metrics`] - Call log and aggregation
//! - [`comparison`] - Fan-out, analysis and session persistence
//! - [`export`] - JSON and Markdown rendering
//! - [`blends`] - Named model groups
//! - [`display`] - Terminal output
//! - [`config`] - Configuration management with environment variable support
//! - [`logging`] - Structured logging with JSON and pretty-print formats
//!
//! ## Main Entry Point
//!
//! ```no_run
//! use modelviz::{app::App, config::Config, ComparisonSession, SelectedModel, Provider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let app = App::new(Config::load()?)?;
//! let session = ComparisonSession::new(
//!     "Explain borrowing in one sentence",
//!     None,
//!     vec![
//!         SelectedModel::new(Provider::OpenAi, "gpt-4o-mini"),
//!         SelectedModel::new(Provider::Anthropic, "claude-3-5-haiku-20241022"),
//!     ],
//! );
//! let (session, analysis) = app.comparison.run_comparison(session, true).await?;
//! app.display.display_comparison(&session, &analysis, false);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod blends;
pub mod comparison;
pub mod config;
pub mod display;
pub mod events;
pub mod export;
pub mod keys;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pricing;
pub mod providers;
pub mod storage;
pub mod timestamp_parser;

pub use app::App;
pub use models::*;
