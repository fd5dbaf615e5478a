//! Session export
//!
//! JSON is the session and its analysis as one document; Markdown is a
//! human-readable report. Neither format is versioned.

use crate::models::*;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub session: ComparisonSession,
    pub analysis: ComparisonAnalysis,
    pub exported_at: DateTime<Utc>,
}

impl ExportDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Not a valid comparison export")
    }
}

pub fn render(session: &ComparisonSession, analysis: &ComparisonAnalysis, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => render_json(session, analysis),
        ExportFormat::Markdown => Ok(render_markdown(session, analysis)),
    }
}

pub fn render_json(session: &ComparisonSession, analysis: &ComparisonAnalysis) -> Result<String> {
    let document = ExportDocument {
        session: session.clone(),
        analysis: analysis.clone(),
        exported_at: Utc::now(),
    };
    serde_json::to_string_pretty(&document).context("Failed to serialize export")
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn model_name<'a>(session: &'a ComparisonSession, provider: Provider, model_id: &'a str) -> &'a str {
    session
        .models
        .iter()
        .find(|m| m.provider == provider && m.model_id == model_id)
        .map(|m| m.name.as_str())
        .unwrap_or(model_id)
}

// Writing into a String cannot fail, so the fmt::Results below are ignored.
pub fn render_markdown(session: &ComparisonSession, analysis: &ComparisonAnalysis) -> String {
    let mut out = String::new();
    let results = session.results.as_deref().unwrap_or(&[]);

    let _ = writeln!(out, "# Model Comparison Report\n");
    let _ = writeln!(out, "- **Session:** `{}`", session.id);
    let _ = writeln!(
        out,
        "- **Created:** {}",
        session.metadata.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "- **Models:** {}\n", session.models.len());

    let _ = writeln!(out, "## Prompt\n");
    for line in session.prompt.lines() {
        let _ = writeln!(out, "> {}", line);
    }
    out.push('\n');

    if let Some(system) = &session.system_prompt {
        let _ = writeln!(out, "## System Prompt\n");
        for line in system.lines() {
            let _ = writeln!(out, "> {}", line);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## Results\n");
    if results.is_empty() {
        let _ = writeln!(out, "_This session has not been run._\n");
    } else {
        let _ = writeln!(out, "| Model | Provider | Status | Latency | Cost | Tokens (in/out) |");
        let _ = writeln!(out, "|---|---|---|---:|---:|---:|");
        for result in results {
            let status = if result.is_success() { "ok" } else { "error" };
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} ms | ${:.6} | {} / {} |",
                escape_cell(model_name(session, result.provider, &result.model_id)),
                result.provider.display_name(),
                status,
                result.metrics.latency,
                result.metrics.cost,
                result.metrics.tokens_in,
                result.metrics.tokens_out
            );
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## Analysis\n");
    let metrics = &analysis.metrics;
    match &metrics.fastest {
        Some(m) => {
            let _ = writeln!(out, "- **Fastest:** {} ({} ms)", m.model_id, m.value);
        }
        None => {
            let _ = writeln!(out, "- **Fastest:** n/a");
        }
    }
    match &metrics.cheapest {
        Some(m) => {
            let _ = writeln!(out, "- **Cheapest:** {} (${:.6})", m.model_id, m.value);
        }
        None => {
            let _ = writeln!(out, "- **Cheapest:** n/a");
        }
    }
    if let Some(rec) = &analysis.recommendation {
        let _ = writeln!(
            out,
            "- **Best overall:** {} (score {:.2}). {}",
            rec.model_id, rec.score, rec.reason
        );
    }
    let _ = writeln!(out, "- **Average latency:** {:.0} ms", metrics.average_latency);
    let _ = writeln!(out, "- **Total cost:** ${:.6}", metrics.total_cost);
    let _ = writeln!(
        out,
        "- **Succeeded:** {} of {}\n",
        metrics.success_count,
        metrics.success_count + metrics.failure_count
    );

    if !results.is_empty() {
        let _ = writeln!(out, "## Responses\n");
        for result in results {
            let _ = writeln!(
                out,
                "### {} ({})\n",
                model_name(session, result.provider, &result.model_id),
                result.provider.display_name()
            );
            match (&result.response, &result.error) {
                (_, Some(error)) => {
                    let _ = writeln!(out, "_Error: {}_\n", error);
                }
                (Some(response), None) => {
                    let _ = writeln!(out, "{}\n", response.trim_end());
                }
                (None, None) => {
                    let _ = writeln!(out, "_No response._\n");
                }
            }
        }
    }

    out
}
