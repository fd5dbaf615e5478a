mod common;

use common::{harness, MockClient};
use modelviz::events::AppEvent;
use modelviz::export::{ExportDocument, ExportFormat};
use modelviz::storage::SESSIONS_KEY;
use modelviz::{ComparisonSession, Provider, SelectedModel};
use std::sync::Arc;
use std::time::Duration;

fn gpt4_and_claude3() -> Vec<SelectedModel> {
    vec![
        SelectedModel::new(Provider::OpenAi, "gpt-4"),
        SelectedModel::new(Provider::Anthropic, "claude-3"),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_model_does_not_block_others() {
    let h = harness(Duration::from_secs(30));
    h.registry.register(Arc::new(
        MockClient::new(Provider::OpenAi).respond("gpt-4", 120, "Hello!", (12, 4), Some(0.002)),
    ));
    h.registry.register(Arc::new(
        MockClient::new(Provider::Anthropic).fail("claude-3", 40, "rate limited"),
    ));

    let session = ComparisonSession::new("Hello", None, gpt4_and_claude3());
    let results = h.service.execute_comparison(&session).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].model_id, "gpt-4");
    assert_eq!(results[0].metrics.latency, 120);
    assert_eq!(results[0].metrics.cost, 0.002);
    assert_eq!(results[0].response.as_deref(), Some("Hello!"));
    assert!(results[0].error.is_none());

    assert_eq!(results[1].model_id, "claude-3");
    assert_eq!(results[1].error.as_deref(), Some("rate limited"));
    assert!(results[1].response.is_none());

    let analysis = h.service.analyze_results(&session.id, &results);
    assert_eq!(analysis.metrics.fastest.as_ref().unwrap().model_id, "gpt-4");
    assert_eq!(analysis.metrics.cheapest.as_ref().unwrap().model_id, "gpt-4");
    assert_eq!(analysis.recommendation.unwrap().model_id, "gpt-4");
    assert_eq!(analysis.metrics.failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_results_keep_selection_order() {
    let h = harness(Duration::from_secs(30));
    h.registry.register(Arc::new(
        MockClient::new(Provider::OpenAi)
            .respond("slow", 900, "slow answer", (10, 10), Some(0.01))
            .respond("quick", 50, "quick answer", (10, 10), Some(0.01)),
    ));
    h.registry.register(Arc::new(
        MockClient::new(Provider::Mistral).respond("medium", 300, "medium answer", (10, 10), Some(0.01)),
    ));

    let models = vec![
        SelectedModel::new(Provider::OpenAi, "slow"),
        SelectedModel::new(Provider::Mistral, "medium"),
        SelectedModel::new(Provider::OpenAi, "quick"),
    ];
    let session = ComparisonSession::new("Order?", None, models);
    let results = h.service.execute_comparison(&session).await;

    let ids: Vec<&str> = results.iter().map(|r| r.model_id.as_str()).collect();
    assert_eq!(ids, vec!["slow", "medium", "quick"]);
    assert_eq!(results[0].metrics.latency, 900);
    assert_eq!(results[2].metrics.latency, 50);
}

#[tokio::test(start_paused = true)]
async fn test_calls_run_concurrently_under_one_deadline() {
    let h = harness(Duration::from_secs(1));
    h.registry.register(Arc::new(
        MockClient::new(Provider::OpenAi)
            .respond("hangs", 10_000, "too late", (1, 1), None)
            .respond("fine", 600, "on time", (1, 1), Some(0.0)),
    ));

    let models = vec![
        SelectedModel::new(Provider::OpenAi, "hangs"),
        SelectedModel::new(Provider::OpenAi, "fine"),
    ];
    let session = ComparisonSession::new("Race", None, models);

    let started = tokio::time::Instant::now();
    let results = h.service.execute_comparison(&session).await;
    assert_eq!(started.elapsed(), Duration::from_secs(1));

    assert_eq!(results[0].error.as_deref(), Some("Request timed out after 1s"));
    assert_eq!(results[0].metrics.latency, 1000);
    assert!(results[1].is_success());
    assert_eq!(results[1].metrics.latency, 600);
}

#[tokio::test]
async fn test_missing_key_fails_only_that_model() {
    let h = harness(Duration::from_secs(5));
    h.registry.register(Arc::new(
        MockClient::new(Provider::OpenAi).respond("gpt-4o-mini", 0, "hi", (3, 1), None),
    ));

    let models = vec![
        SelectedModel::new(Provider::Google, "gemini-1.5-flash"),
        SelectedModel::new(Provider::OpenAi, "gpt-4o-mini"),
    ];
    let session = ComparisonSession::new("hi", None, models);
    let results = h.service.execute_comparison(&session).await;

    assert_eq!(results[0].error.as_deref(), Some("No API key configured for Google"));
    assert_eq!(results[0].metrics.latency, 0);
    assert!(results[1].is_success());
    // No vendor cost reported, so the price table fills it in
    assert!(results[1].metrics.cost > 0.0);
}

#[tokio::test]
async fn test_requests_carry_prompt_settings() {
    let h = harness(Duration::from_secs(5));
    let client = Arc::new(MockClient::new(Provider::OpenAi).respond("gpt-4o", 0, "ok", (1, 1), None));
    h.registry.register(client.clone());

    let session = ComparisonSession::new(
        "Summarize",
        Some("Be terse".to_string()),
        vec![SelectedModel::new(Provider::OpenAi, "gpt-4o")],
    );
    h.service.execute_comparison(&session).await;

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].prompt, "Summarize");
    assert_eq!(requests[0].system_prompt.as_deref(), Some("Be terse"));
    assert_eq!(requests[0].max_tokens, 256);
}

#[tokio::test]
async fn test_every_call_is_recorded_in_metrics() {
    let h = harness(Duration::from_secs(5));
    h.registry.register(Arc::new(
        MockClient::new(Provider::OpenAi).respond("gpt-4", 0, "ok", (10, 20), Some(0.003)),
    ));
    h.registry.register(Arc::new(
        MockClient::new(Provider::Anthropic).fail("claude-3", 0, "overloaded"),
    ));

    let session = ComparisonSession::new("hi", None, gpt4_and_claude3());
    h.service.execute_comparison(&session).await;

    let records = h.metrics.get_records().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.session_id.as_deref() == Some(session.id.as_str())));

    let failed = records.iter().find(|r| r.model == "claude-3").unwrap();
    assert!(!failed.success);
    assert_eq!(failed.error.as_deref(), Some("overloaded"));

    let ok = records.iter().find(|r| r.model == "gpt-4").unwrap();
    assert!(ok.success);
    assert_eq!(ok.total_tokens(), 30);
}

#[tokio::test]
async fn test_run_comparison_rejects_bad_input() {
    let h = harness(Duration::from_secs(5));
    let models = vec![SelectedModel::new(Provider::OpenAi, "gpt-4")];

    assert!(h
        .service
        .run_comparison(ComparisonSession::new("   ", None, models), true)
        .await
        .is_err());
    assert!(h
        .service
        .run_comparison(ComparisonSession::new("hello", None, Vec::new()), true)
        .await
        .is_err());
    assert!(h.service.get_all_sessions().unwrap().is_empty());
}

#[tokio::test]
async fn test_saved_sessions_are_immutable() {
    let h = harness(Duration::from_secs(5));
    h.registry.register(Arc::new(
        MockClient::new(Provider::OpenAi).respond("gpt-4", 0, "ok", (1, 1), None),
    ));
    let mut events = h.events.subscribe();

    let session = ComparisonSession::new("hi", None, vec![SelectedModel::new(Provider::OpenAi, "gpt-4")]);
    let (mut session, _) = h.service.run_comparison(session, true).await.unwrap();
    assert!(session.metadata.saved);

    let stored = h.service.get_session(&session.id).unwrap().unwrap();
    assert_eq!(stored.result_count(), 1);

    session.prompt = "edited".to_string();
    assert!(h.service.save_session(&mut session).is_err());
    assert_eq!(h.service.get_session(&session.id).unwrap().unwrap().prompt, "hi");

    let mut saw_saved = false;
    while let Ok(event) = events.try_recv() {
        if event == (AppEvent::SessionSaved { session_id: session.id.clone() }) {
            saw_saved = true;
        }
    }
    assert!(saw_saved);

    assert!(h.service.delete_session(&session.id).unwrap());
    assert!(!h.service.delete_session(&session.id).unwrap());
    assert!(h.service.get_session(&session.id).unwrap().is_none());
}

#[tokio::test]
async fn test_unsaved_run_is_not_stored() {
    let h = harness(Duration::from_secs(5));
    h.registry.register(Arc::new(
        MockClient::new(Provider::OpenAi).respond("gpt-4", 0, "ok", (1, 1), None),
    ));

    let session = ComparisonSession::new("hi", None, vec![SelectedModel::new(Provider::OpenAi, "gpt-4")]);
    let (session, analysis) = h.service.run_comparison(session, false).await.unwrap();

    assert!(!session.metadata.saved);
    assert_eq!(analysis.session_id, session.id);
    assert!(h.service.get_all_sessions().unwrap().is_empty());
}

#[test]
fn test_legacy_sessions_are_upgraded_once() {
    let h = harness(Duration::from_secs(5));
    let legacy = serde_json::json!([{
        "id": "legacy-1",
        "prompt": "Hello",
        "models": ["openai:gpt-4", {"modelId": "gemini-1.5-pro", "provider": "google", "name": "Gemini 1.5 Pro"}],
        "timestamp": "2024-03-01T08:30:00Z",
        "results": []
    }]);
    h.store.set(SESSIONS_KEY, &legacy).unwrap();

    let sessions = h.service.get_all_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].models[0].provider, Provider::OpenAi);
    assert_eq!(sessions[0].models[1].name, "Gemini 1.5 Pro");
    assert!(sessions[0].metadata.saved);

    // Written back in the current shape
    let raw: Vec<ComparisonSession> = h.store.get(SESSIONS_KEY).unwrap().unwrap();
    assert_eq!(raw[0].id, "legacy-1");
    assert_eq!(raw[0].metadata.created_at.to_rfc3339(), "2024-03-01T08:30:00+00:00");
}

#[tokio::test(start_paused = true)]
async fn test_json_export_round_trip() {
    let h = harness(Duration::from_secs(30));
    h.registry.register(Arc::new(
        MockClient::new(Provider::OpenAi).respond("gpt-4", 120, "Hello!", (12, 4), Some(0.002)),
    ));
    h.registry.register(Arc::new(
        MockClient::new(Provider::Anthropic).fail("claude-3", 40, "rate limited"),
    ));

    let session = ComparisonSession::new("Say hello", Some("Be kind".into()), gpt4_and_claude3());
    let (session, analysis) = h.service.run_comparison(session, true).await.unwrap();

    let json = h.service.export_results(&session, &analysis, ExportFormat::Json).unwrap();
    let document = ExportDocument::from_json(&json).unwrap();

    assert_eq!(document.session.prompt, session.prompt);
    assert_eq!(document.session.system_prompt, session.system_prompt);
    assert_eq!(document.session.models, session.models);
    assert_eq!(document.session.result_count(), 2);
    assert_eq!(
        document.analysis.metrics.fastest.unwrap().model_id,
        analysis.metrics.fastest.as_ref().unwrap().model_id
    );

    let markdown = h.service.export_results(&session, &analysis, ExportFormat::Markdown).unwrap();
    assert!(markdown.contains("_Error: rate limited_"));
}

#[tokio::test]
async fn test_unreadable_sessions_survive_writes() {
    let h = harness(Duration::from_secs(5));
    h.registry.register(Arc::new(
        MockClient::new(Provider::OpenAi).respond("gpt-4", 0, "ok", (1, 1), None),
    ));

    // A result without completedAt matches neither the current nor the legacy shape
    let stored = serde_json::json!([
        {
            "id": "old-1",
            "prompt": "Hello",
            "models": ["openai:gpt-4"],
            "timestamp": "2024-03-01T08:30:00Z",
            "results": [{"modelId": "gpt-4", "provider": "openai", "response": "hi"}]
        },
        {
            "id": "legacy-2",
            "prompt": "Hi again",
            "models": ["openai:gpt-4"],
            "timestamp": "2024-03-02T08:30:00Z",
            "results": []
        }
    ]);
    h.store.set(SESSIONS_KEY, &stored).unwrap();

    let stored_ids = || -> Vec<String> {
        let raw: Vec<serde_json::Value> = h.store.get(SESSIONS_KEY).unwrap().unwrap();
        raw.iter().map(|v| v["id"].as_str().unwrap().to_string()).collect()
    };

    // Upgrading legacy-2 writes the array back
    let sessions = h.service.get_all_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, "legacy-2");
    assert_eq!(stored_ids(), vec!["old-1", "legacy-2"]);

    let session = ComparisonSession::new("hi", None, vec![SelectedModel::new(Provider::OpenAi, "gpt-4")]);
    let (session, _) = h.service.run_comparison(session, true).await.unwrap();
    assert_eq!(stored_ids(), vec!["old-1".to_string(), "legacy-2".to_string(), session.id.clone()]);

    assert!(h.service.delete_session(&session.id).unwrap());
    assert!(!h.service.delete_session("old-1").unwrap());

    let raw: Vec<serde_json::Value> = h.store.get(SESSIONS_KEY).unwrap().unwrap();
    assert_eq!(raw.len(), 2);
    assert_eq!(raw[0], stored[0]);
}

#[tokio::test(start_paused = true)]
async fn test_huge_timeout_does_not_overflow_deadline() {
    let h = harness(Duration::from_secs(u64::MAX));
    h.registry.register(Arc::new(
        MockClient::new(Provider::OpenAi).respond("gpt-4", 250, "ok", (1, 1), Some(0.001)),
    ));

    let session = ComparisonSession::new("hi", None, vec![SelectedModel::new(Provider::OpenAi, "gpt-4")]);
    let results = h.service.execute_comparison(&session).await;

    assert!(results[0].is_success());
    assert_eq!(results[0].metrics.latency, 250);
}
