//! Output Formatting and Display Management
//!
//! This module handles all terminal output for ModelViz. Every report has a
//! human-readable colored form and a structured JSON form for scripting.
//!
//! ## Report Types
//!
//! - **Comparison**: per-model latency, cost and tokens, the analysis summary and
//!   each model's response
//! - **Sessions**: saved comparison runs, newest first
//! - **Metrics**: totals, provider and model breakdowns, and a bar chart of the
//!   time series
//! - **Keys / models / blends / pricing**: simple listings
//!
//! ## JSON Output
//!
//! When `json_output` is set, the same data is printed as one JSON document on
//! stdout, e.g. `{"metrics": {...}}`. Logs go to stderr and never mix in.

use crate::models::*;
use crate::pricing::ModelPricing;
use crate::providers::ModelInfo;
use colored::Colorize;
use serde::Serialize;

const RULE_WIDTH: usize = 80;
const BAR_WIDTH: usize = 40;

/// `1234` → `1.2K`, `2_500_000` → `2.5M`.
pub fn format_tokens(tokens: u64) -> String {
    if tokens >= 1_000_000 {
        format!("{:.1}M", tokens as f64 / 1_000_000.0)
    } else if tokens >= 1_000 {
        format!("{:.1}K", tokens as f64 / 1_000.0)
    } else {
        tokens.to_string()
    }
}

pub fn format_latency(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        format!("{:.0}ms", ms)
    }
}

pub fn format_cost(cost: f64) -> String {
    if cost > 0.0 && cost < 0.01 {
        format!("${:.4}", cost)
    } else {
        format!("${:.2}", cost)
    }
}

/// Horizontal bar scaled so that `max` fills `width` cells.
pub fn bar(value: f64, max: f64, width: usize) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let cells = ((value / max) * width as f64).round().max(1.0) as usize;
    "█".repeat(cells.min(width))
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

pub struct DisplayManager {
    json_pretty: bool,
}

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DisplayManager {
    pub fn new(json_pretty: bool) -> Self {
        Self { json_pretty }
    }

    pub fn print_json<T: Serialize>(&self, value: &T) {
        let rendered = if self.json_pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        match rendered {
            Ok(json_str) => println!("{}", json_str),
            Err(e) => eprintln!("Error serializing output to JSON: {}", e),
        }
    }

    fn header(&self, title: &str) {
        println!("\n{}", "=".repeat(RULE_WIDTH).bright_cyan());
        println!("{}", title.bright_white().bold());
        println!("{}", "=".repeat(RULE_WIDTH).bright_cyan());
    }

    pub fn display_comparison(&self, session: &ComparisonSession, analysis: &ComparisonAnalysis, json_output: bool) {
        if json_output {
            self.print_json(&serde_json::json!({"session": session, "analysis": analysis}));
            return;
        }

        self.header("Model Comparison");
        println!(
            "\n{} {}",
            "Prompt:".bright_white().bold(),
            truncate(&session.prompt, 200)
        );
        if let Some(system) = &session.system_prompt {
            println!("{} {}", "System:".bright_white().bold(), truncate(system, 200));
        }
        println!(
            "{} {}{}\n",
            "Session:".bright_white().bold(),
            session.id.bright_black(),
            if session.metadata.saved { " (saved)" } else { "" }
        );

        let results = session.results.as_deref().unwrap_or(&[]);
        let fastest = analysis.metrics.fastest.as_ref().map(|m| m.model_id.as_str());
        let cheapest = analysis.metrics.cheapest.as_ref().map(|m| m.model_id.as_str());

        for result in results {
            let mut badges = Vec::new();
            if fastest == Some(result.model_id.as_str()) {
                badges.push("fastest".bright_yellow().to_string());
            }
            if cheapest == Some(result.model_id.as_str()) {
                badges.push("cheapest".bright_green().to_string());
            }

            if result.is_success() {
                println!(
                    "{} {} ({}) {} • {} • {} in / {} out {}",
                    "✔".bright_green(),
                    result.model_id.bright_white().bold(),
                    result.provider.display_name(),
                    format_latency(result.metrics.latency as f64).bright_cyan(),
                    format_cost(result.metrics.cost).bright_green(),
                    format_tokens(result.metrics.tokens_in as u64),
                    format_tokens(result.metrics.tokens_out as u64),
                    badges.join(" ")
                );
                if let Some(response) = &result.response {
                    for line in truncate(response.trim(), 600).lines() {
                        println!("   {}", line);
                    }
                }
            } else {
                println!(
                    "{} {} ({}) {}",
                    "✘".bright_red(),
                    result.model_id.bright_white().bold(),
                    result.provider.display_name(),
                    result.error.as_deref().unwrap_or("unknown error").bright_red()
                );
            }
            println!();
        }

        let metrics = &analysis.metrics;
        println!(
            "{} {} of {} succeeded • avg {} • total {}",
            "📊".bright_yellow(),
            metrics.success_count.to_string().bright_white().bold(),
            (metrics.success_count + metrics.failure_count).to_string().bright_white(),
            format_latency(metrics.average_latency).bright_cyan(),
            format_cost(metrics.total_cost).bright_green().bold()
        );
        match &analysis.recommendation {
            Some(rec) => println!(
                "{} Best overall: {} (score {:.2})",
                "🏆".bright_yellow(),
                rec.model_id.bright_white().bold(),
                rec.score
            ),
            None => println!("{} No successful responses to recommend", "⚠".bright_yellow()),
        }
    }

    pub fn display_sessions(&self, sessions: &[ComparisonSession], limit: Option<usize>, json_output: bool) {
        let mut sorted: Vec<&ComparisonSession> = sessions.iter().collect();
        sorted.sort_by(|a, b| b.metadata.created_at.cmp(&a.metadata.created_at));
        if let Some(limit) = limit {
            sorted.truncate(limit);
        }

        if json_output {
            self.print_json(&serde_json::json!({"sessions": sorted}));
            return;
        }

        self.header("Saved Comparisons");
        if sorted.is_empty() {
            println!("\nNo saved comparisons yet. Run `modelviz compare` to create one.");
            return;
        }

        println!();
        for session in sorted {
            let results = session.results.as_deref().unwrap_or(&[]);
            let failed = results.iter().filter(|r| !r.is_success()).count();
            println!(
                "{} {} {} • {} models, {} failed",
                "📅".bright_blue(),
                session.metadata.created_at.format("%Y-%m-%d %H:%M").to_string().bright_white().bold(),
                session.id.bright_black(),
                session.models.len(),
                failed
            );
            println!("   {}", truncate(&session.prompt, 70).bright_cyan());
        }
    }

    pub fn display_metrics(&self, metrics: &AggregatedMetrics, json_output: bool) {
        if json_output {
            self.print_json(&serde_json::json!({"metrics": metrics}));
            return;
        }

        self.header(&format!("API Usage Metrics ({})", metrics.range));

        println!(
            "\n{} {} calls • {} failed • {} tokens • {} total • avg {}\n",
            "📊".bright_yellow(),
            metrics.total_calls.to_string().bright_white().bold(),
            metrics.failed_calls.to_string().bright_red(),
            format_tokens(metrics.total_tokens).bright_white(),
            format_cost(metrics.total_cost).bright_green().bold(),
            format_latency(metrics.average_latency).bright_cyan()
        );

        if metrics.total_calls == 0 {
            println!("No API calls recorded in this period.");
            return;
        }

        println!("{}", "By provider:".bright_white().bold());
        for (provider, agg) in &metrics.by_provider {
            let share = agg.total_cost / metrics.total_cost.max(f64::EPSILON) * 100.0;
            println!(
                "   {}: {} ({}%, {} calls, {:.0}% ok, avg {})",
                provider.display_name().bright_cyan(),
                format_cost(agg.total_cost).bright_green(),
                format!("{:.0}", share).bright_yellow(),
                agg.total_calls,
                agg.success_rate * 100.0,
                format_latency(agg.average_latency)
            );
        }

        println!("\n{}", "By model:".bright_white().bold());
        for (model, agg) in &metrics.by_model {
            println!(
                "   {}: {} calls • avg {} • p95 {} • {}/call • {:.0}% ok",
                model.bright_cyan(),
                agg.total_calls,
                format_latency(agg.average_latency),
                format_latency(agg.p95_latency as f64),
                format_cost(agg.average_cost),
                agg.success_rate * 100.0
            );
        }

        println!("\n{}", "Calls over time:".bright_white().bold());
        let max_calls = metrics.time_series.iter().map(|b| b.calls).max().unwrap_or(0) as f64;
        for bucket in &metrics.time_series {
            println!(
                "   {:>10} {:<width$} {}",
                bucket.label,
                bar(bucket.calls as f64, max_calls, BAR_WIDTH).bright_blue(),
                bucket.calls,
                width = BAR_WIDTH
            );
        }
    }

    pub fn display_keys(&self, keys: &[(Provider, String)], json_output: bool) {
        if json_output {
            let map: std::collections::BTreeMap<_, _> = keys.iter().cloned().collect();
            self.print_json(&serde_json::json!({"keys": map}));
            return;
        }

        println!("{}", "Configured API keys:".bright_white().bold());
        for provider in Provider::ALL {
            match keys.iter().find(|(p, _)| *p == provider) {
                Some((_, masked)) => println!("   {} {}: {}", "✔".bright_green(), provider.display_name(), masked),
                None => println!("   {} {}: not set", "·".bright_black(), provider.display_name()),
            }
        }
    }

    pub fn display_models(&self, provider: Provider, models: &[ModelInfo], json_output: bool) {
        if json_output {
            self.print_json(&serde_json::json!({"provider": provider, "models": models}));
            return;
        }

        println!("{}", format!("{} models:", provider.display_name()).bright_white().bold());
        for model in models {
            println!("   {}:{}  {}", provider, model.id.bright_cyan(), model.name.bright_black());
        }
    }

    pub fn display_blends(&self, blends: &[BlendedModel], json_output: bool) {
        if json_output {
            self.print_json(&serde_json::json!({"blends": blends}));
            return;
        }

        if blends.is_empty() {
            println!("No blends defined. Create one with `modelviz blend add`.");
            return;
        }
        for blend in blends {
            println!("{}", blend.name.bright_white().bold());
            if let Some(description) = &blend.description {
                println!("   {}", description.bright_black());
            }
            for model in &blend.models {
                println!("   • {}", model.qualified_id().bright_cyan());
            }
        }
    }

    pub fn display_pricing(&self, entries: &[(&String, &ModelPricing)], json_output: bool) {
        if json_output {
            let map: std::collections::BTreeMap<_, _> = entries.iter().cloned().collect();
            self.print_json(&serde_json::json!({"pricing": map}));
            return;
        }

        println!("{}", "Price per million tokens (input / output):".bright_white().bold());
        for (model, pricing) in entries {
            println!(
                "   {:<40} ${:>8.3} / ${:>8.3}",
                model,
                pricing.input_cost_per_token * 1_000_000.0,
                pricing.output_cost_per_token * 1_000_000.0
            );
        }
    }
}
