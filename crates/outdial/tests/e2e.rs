// SPDX-FileCopyrightText: 2026 Outdial Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end engine tests: the boundary scenarios and queue invariants,
//! driven through a full dispatcher over mock collaborators with
//! millisecond timings.

use std::time::{Duration, Instant};

use outdial_core::{CallOutcome, CallPriority, CallStatus, DataSource};
use outdial_test_utils::{fast_timings, test_job, EngineHarness};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread")]
async fn s1_happy_path_reconciles_provider_and_agent() {
    let harness = EngineHarness::builder().build().await.unwrap();
    harness.telephony.push_status("initiated", 0, None);
    harness.telephony.push_status("ringing", 0, None);
    harness.telephony.push_status("in-progress", 0, None);
    harness
        .telephony
        .push_status("completed", 30, Some("normal_clearing"));
    harness.voicebot.push_status(
        "completed",
        Some(serde_json::json!(["hi", "bye"])),
        Some("https://cdn.example.com/rec/A1.mp3"),
    );

    harness.submit(&test_job("A1")).await.unwrap();
    let job = harness.wait_for_terminal("A1", WAIT).await.unwrap();

    assert_eq!(job.status, CallStatus::Completed);
    let result = job.result.expect("terminal job carries a result");
    assert_eq!(result.call_outcome, CallOutcome::Completed);
    assert_eq!(result.duration_seconds, 30);
    assert_eq!(result.hangup_cause.as_deref(), Some("normal_clearing"));
    assert_eq!(result.transcript, Some(serde_json::json!(["hi", "bye"])));
    assert_eq!(
        result.recording_ref.as_deref(),
        Some("https://cdn.example.com/rec/A1.mp3")
    );
    assert_eq!(result.data_source, DataSource::ProviderPrimary);
    assert!(result.reported_ok);

    // Exactly one delivery.
    let delivered = harness.sink.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].call_id, "A1");

    // The agent was told to expect the call.
    assert_eq!(harness.voicebot.registrations().len(), 1);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn s2_short_completion_is_reclassified_as_miss() {
    let harness = EngineHarness::builder().build().await.unwrap();
    harness.telephony.push_status("completed", 3, None);

    harness.submit(&test_job("A2")).await.unwrap();
    let job = harness.wait_for_terminal("A2", WAIT).await.unwrap();

    let result = job.result.unwrap();
    assert_eq!(result.status, CallStatus::Completed);
    assert_eq!(result.call_outcome, CallOutcome::Missed);
    assert_eq!(result.duration_seconds, 3);
    assert_eq!(result.data_source, DataSource::ProviderPrimary);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn s3_stuck_at_initiated_synthesizes_a_miss() {
    let harness = EngineHarness::builder().build().await.unwrap();
    // The default (empty-script) answer is "initiated", held forever.
    harness.submit(&test_job("A3")).await.unwrap();

    let started = Instant::now();
    let job = harness.wait_for_terminal("A3", WAIT).await.unwrap();

    assert_eq!(job.status, CallStatus::Missed);
    let result = job.result.unwrap();
    assert_eq!(result.call_outcome, CallOutcome::Missed);
    assert_eq!(result.hangup_cause.as_deref(), Some("no_answer_timeout"));
    assert_eq!(result.data_source, DataSource::SupervisorSynthetic);
    // Bound: stuck deadline plus two poll intervals, generously padded.
    assert!(started.elapsed() < Duration::from_secs(2));

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn s4_transient_polls_recover_without_job_retry() {
    let harness = EngineHarness::builder().build().await.unwrap();
    harness.telephony.push_status_transient("503");
    harness.telephony.push_status_transient("503");
    harness.telephony.push_status_transient("503");
    harness.telephony.push_status("in-progress", 0, None);
    harness
        .telephony
        .push_status("completed", 20, Some("normal_clearing"));

    harness.submit(&test_job("A4")).await.unwrap();
    let job = harness.wait_for_terminal("A4", WAIT).await.unwrap();

    assert_eq!(job.status, CallStatus::Completed);
    assert_eq!(job.retry_count, 0, "transient polls must not burn job retries");
    assert_eq!(job.result.unwrap().duration_seconds, 20);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn s5_permanent_initiate_failure_fails_without_retry() {
    let harness = EngineHarness::builder().build().await.unwrap();
    harness
        .telephony
        .push_initiate_permanent("400 invalid destination");

    harness.submit(&test_job("A5")).await.unwrap();
    let job = harness.wait_for_terminal("A5", WAIT).await.unwrap();

    assert_eq!(job.status, CallStatus::Failed);
    assert_eq!(job.retry_count, 0, "permanent failures are not retried");
    assert_eq!(job.attempt_log.len(), 1);
    let result = job.result.unwrap();
    assert_eq!(result.call_outcome, CallOutcome::Failed);
    assert_eq!(result.data_source, DataSource::SupervisorSynthetic);
    assert_eq!(harness.sink.delivered().len(), 1);
    assert_eq!(harness.telephony.initiate_count(), 1);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn s6_transient_initiates_retry_then_proceed() {
    let harness = EngineHarness::builder().build().await.unwrap();
    harness.telephony.push_initiate_transient("timeout");
    harness.telephony.push_initiate_transient("timeout");
    harness.telephony.push_initiate_transient("timeout");
    // Fourth attempt uses the default success path.
    harness
        .telephony
        .push_status("completed", 25, Some("normal_clearing"));

    harness.submit(&test_job("A6")).await.unwrap();
    let job = harness.wait_for_terminal("A6", WAIT).await.unwrap();

    assert_eq!(job.status, CallStatus::Completed);
    assert_eq!(job.attempt_log.len(), 4, "every initiation attempt is logged");
    assert!(job.attempt_log[0].provider_uuid.is_none());
    assert!(job.attempt_log[3].provider_uuid.is_some());
    assert_eq!(job.retry_count, 0, "in-attempt retries are not job retries");

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn s7_urgent_dispatches_before_low_with_one_worker() {
    let harness = EngineHarness::builder()
        .workers(1)
        .rate_limit(1)
        .build()
        .await
        .unwrap();
    harness.telephony.push_status("completed", 10, None);

    // The single worker burns the burst token immediately, then blocks
    // about a second for the next one; submit both jobs inside that window.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let mut low = test_job("L1");
    low.priority = CallPriority::Low;
    harness.submit(&low).await.unwrap();
    let mut urgent = test_job("U1");
    urgent.priority = CallPriority::Urgent;
    harness.submit(&urgent).await.unwrap();

    harness.wait_for_terminal("U1", WAIT).await.unwrap();
    harness.wait_for_terminal("L1", WAIT).await.unwrap();

    // Order of initiation is the order of dispatch.
    assert_eq!(harness.telephony.initiate_call_ids(), vec!["U1", "L1"]);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn s8_scheduled_job_is_invisible_until_fire_time() {
    let harness = EngineHarness::builder().build().await.unwrap();
    harness.telephony.push_status("completed", 12, None);

    let mut job = test_job("A8");
    job.scheduled_at = Some(chrono::Utc::now() + chrono::Duration::milliseconds(800));
    harness.submit(&job).await.unwrap();

    // Well before the fire time: still scheduled, never dispatched.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let held = harness.store.get("A8").await.unwrap().unwrap();
    assert_eq!(held.status, CallStatus::Scheduled);
    assert_eq!(harness.telephony.initiate_count(), 0);

    // After the fire time (plus one promoter tick) it runs to completion.
    let job = harness.wait_for_terminal("A8", WAIT).await.unwrap();
    assert_eq!(job.status, CallStatus::Completed);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn active_set_never_exceeds_the_concurrency_ceiling() {
    let mut timings = fast_timings();
    timings.overall_deadline = Duration::from_millis(700);
    let harness = EngineHarness::builder()
        .workers(4)
        .max_concurrent(2)
        .timings(timings)
        .build()
        .await
        .unwrap();
    // Calls sit in-progress until the supervision deadline.
    harness.telephony.push_status("in-progress", 0, None);

    for i in 0..6 {
        harness.submit(&test_job(&format!("N{i}"))).await.unwrap();
    }

    let deadline = Instant::now() + Duration::from_millis(600);
    while Instant::now() < deadline {
        let active = harness.store.active_count().await.unwrap();
        assert!(active <= 2, "active set exceeded the ceiling: {active}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn initiation_rate_stays_within_the_bucket() {
    let harness = EngineHarness::builder()
        .workers(4)
        .rate_limit(5)
        .build()
        .await
        .unwrap();
    harness.telephony.push_status("completed", 10, None);

    for i in 0..10 {
        harness.submit(&test_job(&format!("R{i}"))).await.unwrap();
    }
    for i in 0..10 {
        harness
            .wait_for_terminal(&format!("R{i}"), WAIT)
            .await
            .unwrap();
    }

    let mut stamps = harness.telephony.initiate_timestamps();
    stamps.sort();
    assert_eq!(stamps.len(), 10);

    // The bucket holds `rate` tokens, so a window may carry the initial
    // burst plus the refill: never more than 2x the rate.
    for (i, start) in stamps.iter().enumerate() {
        let in_window = stamps[i..]
            .iter()
            .take_while(|t| t.duration_since(*start) < Duration::from_secs(1))
            .count();
        assert!(
            in_window <= 10,
            "{in_window} initiations within one second exceeds burst + refill"
        );
    }

    // Sustained throughput is the refill rate: draining 10 jobs through a
    // 5/s bucket (burst 5) takes at least a second of refills.
    let spread = stamps[9].duration_since(stamps[0]);
    assert!(
        spread >= Duration::from_millis(800),
        "10 initiations at 5/s finished too fast: {spread:?}"
    );

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_delivery_persists_the_result_unreported() {
    let harness = EngineHarness::builder().build().await.unwrap();
    harness.telephony.push_status("completed", 15, None);
    // All five delivery attempts fail.
    harness.sink.fail_next_transient(5);

    harness.submit(&test_job("D1")).await.unwrap();
    let job = harness.wait_for_terminal("D1", WAIT).await.unwrap();

    let result = job.result.expect("result must be persisted, never dropped");
    assert!(!result.reported_ok);
    assert_eq!(result.duration_seconds, 15);
    assert_eq!(harness.sink.attempts(), 5);
    assert!(harness.sink.delivered().is_empty());

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn permanent_delivery_failure_stops_after_one_attempt() {
    let harness = EngineHarness::builder().build().await.unwrap();
    harness.telephony.push_status("completed", 15, None);
    harness.sink.fail_next_permanent();

    harness.submit(&test_job("D2")).await.unwrap();
    let job = harness.wait_for_terminal("D2", WAIT).await.unwrap();

    assert!(!job.result.unwrap().reported_ok);
    assert_eq!(harness.sink.attempts(), 1);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_calls_consume_job_retries_then_deliver_once() {
    let harness = EngineHarness::builder().build().await.unwrap();
    // Four dispatches, each exhausting four initiation attempts.
    for _ in 0..16 {
        harness.telephony.push_initiate_transient("timeout");
    }

    harness.submit(&test_job("F1")).await.unwrap();
    let job = harness.wait_for_terminal("F1", WAIT).await.unwrap();

    assert_eq!(job.status, CallStatus::Failed);
    assert_eq!(job.retry_count, 3, "all job-level retries consumed");
    assert_eq!(harness.telephony.initiate_count(), 16);
    assert_eq!(harness.sink.delivered().len(), 1, "exactly one final delivery");
    // Every handoff released cleanly: the final release left the active
    // set empty, never a later owner's entry.
    assert_eq!(harness.store.active_count().await.unwrap(), 0);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn provider_unreachable_falls_back_to_agent_terminal() {
    let harness = EngineHarness::builder().build().await.unwrap();
    harness.telephony.push_status_transient("connection reset");
    harness.voicebot.push_status(
        "completed",
        Some(serde_json::json!(["only the agent saw this"])),
        None,
    );

    harness.submit(&test_job("G1")).await.unwrap();
    let job = harness.wait_for_terminal("G1", WAIT).await.unwrap();

    let result = job.result.unwrap();
    assert_eq!(result.data_source, DataSource::AgentOnly);
    assert_eq!(result.call_outcome, CallOutcome::Completed);
    assert_eq!(
        result.transcript,
        Some(serde_json::json!(["only the agent saw this"]))
    );

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn provider_and_agent_both_dark_synthesizes_failure() {
    let harness = EngineHarness::builder().build().await.unwrap();
    harness.telephony.push_status_transient("connection reset");
    // Agent answers 404 forever (default script).

    let mut job = test_job("G2");
    job.max_retries = 0; // observe the synthetic failure directly
    harness.submit(&job).await.unwrap();
    let job = harness.wait_for_terminal("G2", WAIT).await.unwrap();

    let result = job.result.unwrap();
    assert_eq!(result.call_outcome, CallOutcome::Failed);
    assert_eq!(result.data_source, DataSource::SupervisorSynthetic);
    assert_eq!(result.hangup_cause.as_deref(), Some("agent_unreachable"));

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn agent_registration_failure_does_not_block_the_call() {
    let harness = EngineHarness::builder().build().await.unwrap();
    harness.voicebot.fail_registrations();
    harness.telephony.push_status("completed", 30, None);

    harness.submit(&test_job("B1")).await.unwrap();
    let job = harness.wait_for_terminal("B1", WAIT).await.unwrap();

    assert_eq!(job.status, CallStatus::Completed);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn sweeper_force_completes_a_call_with_a_dead_supervisor() {
    let harness = EngineHarness::builder()
        .workers(0) // nobody supervises; only the sweeper runs
        .sweeper(Duration::from_secs(1), Duration::ZERO, Duration::ZERO)
        .build()
        .await
        .unwrap();

    // Claim the call by hand, simulating a supervisor that died.
    harness.submit(&test_job("Z1")).await.unwrap();
    assert_eq!(harness.store.pop_ready(1).await.unwrap(), vec!["Z1"]);

    let job = harness
        .wait_for_terminal("Z1", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(job.status, CallStatus::Missed);
    let result = job.result.unwrap();
    assert_eq!(result.hangup_cause.as_deref(), Some("no_answer_timeout"));
    assert_eq!(result.data_source, DataSource::SupervisorSynthetic);
    assert_eq!(harness.store.active_count().await.unwrap(), 0);
    assert_eq!(harness.sink.delivered().len(), 1);

    harness.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_lets_the_inflight_call_finish() {
    let mut timings = fast_timings();
    timings.overall_deadline = Duration::from_millis(600);
    let harness = EngineHarness::builder()
        .timings(timings)
        .build()
        .await
        .unwrap();
    harness.telephony.push_status("in-progress", 0, None);

    harness.submit(&test_job("S1")).await.unwrap();
    harness
        .wait_for_status("S1", CallStatus::InProgress, WAIT)
        .await
        .unwrap();

    let store = harness.store.clone();
    harness.shutdown().await;

    // The supervisor ran to its hard deadline and recorded the stuck
    // terminal state, not a success.
    let job = store.get("S1").await.unwrap().unwrap();
    assert_eq!(job.status, CallStatus::Missed);
    let result = job.result.unwrap();
    assert_eq!(result.call_outcome, CallOutcome::Timeout);
    assert_eq!(result.data_source, DataSource::SupervisorSynthetic);
    assert_eq!(store.active_count().await.unwrap(), 0);
}
