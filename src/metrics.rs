//! Call metrics log and aggregation
//!
//! Every provider call is appended to a JSON log under [`METRICS_KEY`]. Records
//! are never edited. Each write prunes records older than the configured
//! retention window, then drops the oldest remaining records if the log would
//! not fit the store's per-value quota.
//!
//! ## Aggregation
//!
//! [`aggregate`] is a pure reduction over an in-memory slice:
//!
//! - **Totals**: calls, successes, failures, tokens, cost, mean latency
//! - **By provider**: the same sums per vendor; they always add up to the totals
//! - **By model** (keyed `provider:model`): mean and p95 latency, mean cost, mean tokens, success rate
//! - **Time series**: hourly buckets for `today`, daily for `week`/`month`,
//!   monthly for `year`, with empty buckets included
//! - **Hourly**: hour-of-day distribution over the whole range (24 buckets)

use crate::events::{AppEvent, EventBus};
use crate::models::*;
use crate::storage::{JsonStore, METRICS_KEY};
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct MetricsService {
    store: JsonStore,
    events: EventBus,
    retention: Duration,
    // Serializes read-modify-write cycles on the log
    write_lock: Mutex<()>,
}

impl MetricsService {
    pub fn new(store: JsonStore, events: EventBus, retention_days: i64) -> Self {
        Self {
            store,
            events,
            retention: Duration::days(retention_days),
            write_lock: Mutex::new(()),
        }
    }

    pub fn get_records(&self) -> Result<Vec<MetricRecord>> {
        self.store
            .get_or_default(METRICS_KEY)
            .context("Failed to read metrics log")
    }

    pub async fn record_call(&self, record: MetricRecord) -> Result<()> {
        self.record_calls(vec![record], Utc::now()).await
    }

    /// Appends records and prunes anything older than the retention window relative to `now`.
    pub async fn record_calls(&self, records: Vec<MetricRecord>, now: DateTime<Utc>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;

        let mut log = self.get_records()?;
        log.extend(records);

        let cutoff = now - self.retention;
        let before = log.len();
        log.retain(|r| r.timestamp >= cutoff);
        let pruned = before - log.len();
        if pruned > 0 {
            debug!(pruned = pruned, cutoff = %cutoff, "Pruned expired metric records");
        }

        let content = fit_to_quota(&mut log, self.store.max_value_bytes())?;
        self.store
            .set_raw(METRICS_KEY, &content)
            .context("Failed to write metrics log")?;

        self.events.publish(AppEvent::MetricsUpdated {
            total_records: log.len(),
        });
        Ok(())
    }

    pub fn get_aggregated_metrics(&self, range: TimeRange) -> Result<AggregatedMetrics> {
        let records = self.get_records()?;
        Ok(aggregate(&records, range, Utc::now()))
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store
            .remove(METRICS_KEY)
            .context("Failed to clear metrics log")?;
        info!("Metrics log cleared");
        self.events.publish(AppEvent::MetricsUpdated { total_records: 0 });
        Ok(())
    }
}

/// Serializes `log`, dropping its oldest records until the document is at most `limit` bytes.
fn fit_to_quota(log: &mut Vec<MetricRecord>, limit: usize) -> Result<String> {
    let mut content = serde_json::to_string(log).context("Failed to serialize metrics log")?;
    if content.len() <= limit {
        return Ok(content);
    }

    log.sort_by_key(|r| r.timestamp);
    let mut dropped = 0;
    while content.len() > limit && !log.is_empty() {
        // Estimate from the average record size, always at least one
        let excess = content.len() - limit;
        let per_record = (content.len() / log.len()).max(1);
        let n = excess.div_ceil(per_record).clamp(1, log.len());
        log.drain(..n);
        dropped += n;
        content = serde_json::to_string(log).context("Failed to serialize metrics log")?;
    }

    warn!(
        dropped = dropped,
        kept = log.len(),
        limit_bytes = limit,
        "Metrics log reached its storage quota, dropped oldest records"
    );
    Ok(content)
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Inclusive lower bound of `range` as seen at `now`.
pub fn range_start(range: TimeRange, now: DateTime<Utc>) -> DateTime<Utc> {
    match range {
        TimeRange::Today => start_of_day(now.date_naive()),
        TimeRange::Week => now - Duration::days(7),
        TimeRange::Month => now - Duration::days(30),
        TimeRange::Year => now - Duration::days(365),
    }
}

/// Nearest-rank percentile over an ascending slice.
fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn mean(sum: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[derive(Default)]
struct Accumulator {
    calls: u64,
    successes: u64,
    tokens: u64,
    cost: f64,
    latency_sum: u64,
}

impl Accumulator {
    fn add(&mut self, record: &MetricRecord) {
        self.calls += 1;
        if record.success {
            self.successes += 1;
        }
        self.tokens += record.total_tokens();
        self.cost += record.cost;
        self.latency_sum += record.latency;
    }

    fn average_latency(&self) -> f64 {
        mean(self.latency_sum as f64, self.calls)
    }

    fn success_rate(&self) -> f64 {
        mean(self.successes as f64, self.calls)
    }

    fn bucket(&self, label: String) -> TimeBucket {
        TimeBucket {
            label,
            calls: self.calls,
            tokens: self.tokens,
            cost: self.cost,
            average_latency: self.average_latency(),
        }
    }
}

fn bucket_label(range: TimeRange, timestamp: DateTime<Utc>) -> String {
    match range {
        TimeRange::Today => timestamp.format("%H:00").to_string(),
        TimeRange::Week | TimeRange::Month => timestamp.format("%Y-%m-%d").to_string(),
        TimeRange::Year => timestamp.format("%Y-%m").to_string(),
    }
}

/// Every bucket label in the range, oldest first.
fn bucket_labels(range: TimeRange, now: DateTime<Utc>) -> Vec<String> {
    match range {
        TimeRange::Today => (0..=now.hour()).map(|h| format!("{:02}:00", h)).collect(),
        TimeRange::Week | TimeRange::Month => {
            let first = range_start(range, now).date_naive();
            first
                .iter_days()
                .take_while(|d| *d <= now.date_naive())
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect()
        }
        TimeRange::Year => {
            let first = range_start(range, now).date_naive();
            let (mut year, mut month) = (first.year(), first.month());
            let mut labels = Vec::new();
            while (year, month) <= (now.year(), now.month()) {
                labels.push(format!("{:04}-{:02}", year, month));
                if month == 12 {
                    year += 1;
                    month = 1;
                } else {
                    month += 1;
                }
            }
            labels
        }
    }
}

/// Reduces `records` to the aggregates for `range` as seen at `now`.
pub fn aggregate(records: &[MetricRecord], range: TimeRange, now: DateTime<Utc>) -> AggregatedMetrics {
    let start = range_start(range, now);

    let mut totals = Accumulator::default();
    let mut by_provider: BTreeMap<Provider, Accumulator> = BTreeMap::new();
    // Keyed by qualified id so the same model name from two vendors stays separate
    let mut by_model: BTreeMap<(Provider, String), (Accumulator, Vec<u64>)> = BTreeMap::new();
    let mut series: HashMap<String, Accumulator> = HashMap::new();
    let mut hourly: Vec<Accumulator> = (0..24).map(|_| Accumulator::default()).collect();

    for record in records
        .iter()
        .filter(|r| r.timestamp >= start && r.timestamp <= now)
    {
        totals.add(record);
        by_provider.entry(record.provider).or_default().add(record);

        let (model_acc, latencies) = by_model
            .entry((record.provider, record.model.clone()))
            .or_default();
        model_acc.add(record);
        latencies.push(record.latency);

        series
            .entry(bucket_label(range, record.timestamp))
            .or_default()
            .add(record);
        hourly[record.timestamp.hour() as usize].add(record);
    }

    let by_provider = by_provider
        .into_iter()
        .map(|(provider, acc)| {
            (
                provider,
                ProviderAggregate {
                    total_calls: acc.calls,
                    successful_calls: acc.successes,
                    total_tokens: acc.tokens,
                    total_cost: acc.cost,
                    average_latency: acc.average_latency(),
                    success_rate: acc.success_rate(),
                },
            )
        })
        .collect();

    let by_model = by_model
        .into_iter()
        .map(|((provider, model), (acc, mut latencies))| {
            latencies.sort_unstable();
            (
                format!("{}:{}", provider, model),
                ModelAggregate {
                    provider,
                    model,
                    total_calls: acc.calls,
                    total_tokens: acc.tokens,
                    total_cost: acc.cost,
                    average_latency: acc.average_latency(),
                    p95_latency: percentile(&latencies, 95.0),
                    average_cost: mean(acc.cost, acc.calls),
                    average_tokens: mean(acc.tokens as f64, acc.calls),
                    success_rate: acc.success_rate(),
                },
            )
        })
        .collect();

    let time_series = bucket_labels(range, now)
        .into_iter()
        .map(|label| match series.get(&label) {
            Some(acc) => acc.bucket(label),
            None => TimeBucket {
                label,
                ..Default::default()
            },
        })
        .collect();

    let hourly = hourly
        .iter()
        .enumerate()
        .map(|(hour, acc)| acc.bucket(format!("{:02}:00", hour)))
        .collect();

    AggregatedMetrics {
        range,
        total_calls: totals.calls,
        successful_calls: totals.successes,
        failed_calls: totals.calls - totals.successes,
        total_tokens: totals.tokens,
        total_cost: totals.cost,
        average_latency: totals.average_latency(),
        by_provider,
        by_model,
        time_series,
        hourly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn record(provider: Provider, model: &str, timestamp: &str, latency: u64, success: bool) -> MetricRecord {
        MetricRecord {
            id: format!("{}-{}", model, timestamp),
            timestamp: at(timestamp),
            provider,
            model: model.to_string(),
            tokens_in: 10,
            tokens_out: 20,
            cost: 0.01,
            latency,
            success,
            error: (!success).then(|| "failed".to_string()),
            session_id: None,
        }
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let values: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&values, 95.0), 95);
        assert_eq!(percentile(&[42], 95.0), 42);
        assert_eq!(percentile(&[10, 20], 95.0), 20);
        assert_eq!(percentile(&[], 95.0), 0);
    }

    #[test]
    fn test_range_start() {
        let now = at("2025-03-10T15:30:00Z");
        assert_eq!(range_start(TimeRange::Today, now), at("2025-03-10T00:00:00Z"));
        assert_eq!(range_start(TimeRange::Week, now), at("2025-03-03T15:30:00Z"));
    }

    #[test]
    fn test_today_filters_and_buckets_by_hour() {
        let now = at("2025-03-10T15:30:00Z");
        let records = vec![
            record(Provider::OpenAi, "gpt-4o", "2025-03-09T23:59:00Z", 100, true),
            record(Provider::OpenAi, "gpt-4o", "2025-03-10T09:15:00Z", 100, true),
            record(Provider::Anthropic, "claude-3-haiku-20240307", "2025-03-10T09:45:00Z", 300, false),
        ];

        let agg = aggregate(&records, TimeRange::Today, now);
        assert_eq!(agg.total_calls, 2);
        assert_eq!(agg.failed_calls, 1);
        assert_eq!(agg.time_series.len(), 16);
        assert_eq!(agg.time_series[9].label, "09:00");
        assert_eq!(agg.time_series[9].calls, 2);
        assert_eq!(agg.time_series[9].average_latency, 200.0);
        assert_eq!(agg.hourly.len(), 24);
        assert_eq!(agg.hourly[9].calls, 2);
    }

    #[test]
    fn test_week_series_includes_empty_days() {
        let now = at("2025-03-10T12:00:00Z");
        let records = vec![record(Provider::Google, "gemini-1.5-flash", "2025-03-05T08:00:00Z", 50, true)];

        let agg = aggregate(&records, TimeRange::Week, now);
        assert_eq!(agg.time_series.len(), 8);
        assert_eq!(agg.time_series.first().unwrap().label, "2025-03-03");
        assert_eq!(agg.time_series.last().unwrap().label, "2025-03-10");
        let busy: Vec<_> = agg.time_series.iter().filter(|b| b.calls > 0).collect();
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].label, "2025-03-05");
    }

    #[test]
    fn test_year_series_is_monthly() {
        let now = at("2025-03-10T12:00:00Z");
        let agg = aggregate(&[], TimeRange::Year, now);
        assert_eq!(agg.time_series.first().unwrap().label, "2024-03");
        assert_eq!(agg.time_series.last().unwrap().label, "2025-03");
        assert_eq!(agg.time_series.len(), 13);
        assert_eq!(agg.average_latency, 0.0);
    }

    #[test]
    fn test_model_statistics() {
        let now = at("2025-03-10T12:00:00Z");
        let mut records: Vec<MetricRecord> = (1..=20)
            .map(|i| record(Provider::OpenAi, "gpt-4o", "2025-03-10T10:00:00Z", i * 10, i != 20))
            .collect();
        records.push(record(Provider::Mistral, "mistral-small-latest", "2025-03-10T11:00:00Z", 5, true));

        let agg = aggregate(&records, TimeRange::Today, now);
        let gpt = &agg.by_model["openai:gpt-4o"];
        assert_eq!(gpt.total_calls, 20);
        assert_eq!(gpt.p95_latency, 190);
        assert_eq!(gpt.average_latency, 105.0);
        assert!((gpt.success_rate - 0.95).abs() < 1e-9);
        assert_eq!(gpt.average_tokens, 30.0);
        assert!((gpt.average_cost - 0.01).abs() < 1e-12);
        assert_eq!(agg.by_model["mistral:mistral-small-latest"].provider, Provider::Mistral);
    }

    #[test]
    fn test_same_model_id_from_two_providers_stays_separate() {
        let now = at("2025-03-10T12:00:00Z");
        let records = vec![
            record(Provider::OpenAi, "llama-3-70b", "2025-03-10T09:00:00Z", 100, true),
            record(Provider::Mistral, "llama-3-70b", "2025-03-10T10:00:00Z", 300, false),
            record(Provider::Mistral, "llama-3-70b", "2025-03-10T11:00:00Z", 500, true),
        ];

        let agg = aggregate(&records, TimeRange::Today, now);
        assert_eq!(agg.by_model.len(), 2);

        let openai = &agg.by_model["openai:llama-3-70b"];
        assert_eq!(openai.provider, Provider::OpenAi);
        assert_eq!(openai.model, "llama-3-70b");
        assert_eq!(openai.total_calls, 1);
        assert_eq!(openai.success_rate, 1.0);

        let mistral = &agg.by_model["mistral:llama-3-70b"];
        assert_eq!(mistral.provider, Provider::Mistral);
        assert_eq!(mistral.total_calls, 2);
        assert_eq!(mistral.average_latency, 400.0);
        assert_eq!(mistral.success_rate, 0.5);
    }
}
