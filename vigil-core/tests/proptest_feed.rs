//! Property-based tests for the feed components using proptest.

use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;

use vigil_core::feed::{
    FeedState, FrameDecoder, Ingest, MetricsSnapshot, RetryDecision, RetryPolicy, Severity,
    ThreatBuffer, ThreatEvent,
};

fn threat(id: usize) -> ThreatEvent {
    ThreatEvent {
        id: format!("t-{}", id),
        timestamp: "2026-10-19T08:00:00Z".into(),
        message: format!("event {}", id),
        severity: Severity::ALL[id % 4],
        ip: None,
        location: None,
        kind: None,
        risk: Some((id % 101) as u8),
    }
}

fn threat_frame(id: usize) -> String {
    json!({ "type": "threat", "data": threat(id) }).to_string()
}

fn metrics(total: u64) -> MetricsSnapshot {
    MetricsSnapshot {
        total_alerts: total,
        it_alerts: total / 2,
        critical_anomalies: total % 7,
        vulnerabilities: 3,
        mttd: "4.2m".into(),
        events_per_min: 120,
        active_incidents: 2,
        blocked_threats: total / 3,
        uae_threats: None,
    }
}

// --- Threat buffer properties ---

proptest! {
    #[test]
    fn buffer_never_exceeds_capacity(capacity in 1usize..64, pushes in 0usize..200) {
        let mut buffer = ThreatBuffer::new(capacity);
        for i in 0..pushes {
            buffer.push(threat(i));
            prop_assert!(buffer.len() <= capacity);
        }
        prop_assert_eq!(buffer.len(), pushes.min(capacity));
    }

    #[test]
    fn buffer_keeps_most_recent_first(capacity in 1usize..64, pushes in 1usize..200) {
        let mut buffer = ThreatBuffer::new(capacity);
        for i in 0..pushes {
            buffer.push(threat(i));
        }
        let ids: Vec<String> = buffer.iter().map(|t| t.id.clone()).collect();
        let expected: Vec<String> = (0..pushes)
            .rev()
            .take(capacity)
            .map(|i| format!("t-{}", i))
            .collect();
        prop_assert_eq!(ids, expected);
    }
}

// --- Metrics cell properties ---

proptest! {
    #[test]
    fn metrics_equals_last_payload(totals in prop::collection::vec(0u64..1_000_000, 1..30)) {
        let mut state = FeedState::new(10);
        for total in &totals {
            let raw = json!({ "type": "metrics", "data": metrics(*total) }).to_string();
            let applied = matches!(state.ingest_raw(&raw), Ingest::Metrics(_));
            prop_assert!(applied);
        }
        let last = *totals.last().unwrap();
        prop_assert_eq!(state.metrics(), Some(&metrics(last)));
    }
}

// --- Retry policy properties ---

proptest! {
    #[test]
    fn retry_gives_up_after_budget(max in 0u32..10, base_ms in 1u64..5000, extra in 0usize..5) {
        let mut policy = RetryPolicy::new(max, Duration::from_millis(base_ms));
        for attempt in 1..=max {
            prop_assert_eq!(
                policy.record_failure(),
                RetryDecision::Retry {
                    attempt,
                    delay: Duration::from_millis(base_ms * attempt as u64),
                }
            );
        }
        prop_assert_eq!(policy.record_failure(), RetryDecision::GiveUp { attempts: max + 1 });
        for _ in 0..extra {
            prop_assert_eq!(policy.record_failure(), RetryDecision::Halted);
        }
        prop_assert!(policy.gave_up());
    }

    #[test]
    fn success_always_restores_full_budget(max in 1u32..10, failures in 0u32..10) {
        let mut policy = RetryPolicy::new(max, Duration::from_millis(100));
        for _ in 0..failures {
            policy.record_failure();
        }
        policy.record_success();
        prop_assert_eq!(policy.attempts(), 0);
        prop_assert!(!policy.gave_up());
        let first_is_retry = matches!(
            policy.record_failure(),
            RetryDecision::Retry { attempt: 1, .. }
        );
        prop_assert!(first_is_retry);
    }
}

// --- Frame decoder properties ---

proptest! {
    #[test]
    fn decoder_is_chunking_invariant(
        ids in prop::collection::vec(0usize..1000, 1..10),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..12),
    ) {
        let wire: String = ids
            .iter()
            .map(|id| format!("data: {}\n\n", threat_frame(*id)))
            .collect();
        let bytes = wire.as_bytes();

        let mut points: Vec<usize> = cuts.iter().map(|c| c.index(bytes.len() + 1)).collect();
        points.push(0);
        points.push(bytes.len());
        points.sort_unstable();
        points.dedup();

        let mut decoder = FrameDecoder::new();
        let mut payloads = Vec::new();
        for pair in points.windows(2) {
            payloads.extend(decoder.push(&bytes[pair[0]..pair[1]]));
        }

        let expected: Vec<String> = ids.iter().map(|id| threat_frame(*id)).collect();
        prop_assert_eq!(payloads, expected);
        prop_assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn decoder_never_panics_on_garbage(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut decoder = FrameDecoder::new();
        let _ = decoder.push(&data);
    }
}

// --- Pause gate properties ---

proptest! {
    #[test]
    fn paused_state_is_frozen(ids in prop::collection::vec(0usize..1000, 1..40)) {
        let mut state = FeedState::new(20);
        state.ingest_raw(&threat_frame(99_999));
        state.set_paused(true);

        let before: Vec<ThreatEvent> = state.threats().to_vec();
        for id in &ids {
            prop_assert_eq!(state.ingest_raw(&threat_frame(*id)), Ingest::Suppressed);
        }
        prop_assert_eq!(state.threats().to_vec(), before);
        prop_assert!(state.metrics().is_none());
        prop_assert_eq!(state.stats().suppressed, ids.len() as u64);
    }

    #[test]
    fn garbage_payloads_never_mutate_state(raw in "\\PC{0,64}") {
        let mut state = FeedState::new(5);
        let outcome = state.ingest_raw(&raw);
        prop_assume!(!outcome.is_applied());
        prop_assert!(state.threats().is_empty());
        prop_assert!(state.metrics().is_none());
    }
}
