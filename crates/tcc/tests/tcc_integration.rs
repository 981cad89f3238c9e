//! Integration tests for the TCC coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tcc::{
    Coordinator, FailedPhase, Operation, Participant, ParticipantError, RetryPolicy,
    TransactionState,
};
use tokio::sync::Barrier;

/// Counts calls per operation and fails the first `failures` of them.
#[derive(Clone, Default)]
struct Script {
    calls: Arc<AtomicU32>,
}

impl Script {
    fn new() -> Self {
        Self::default()
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn failing_first(self, failures: u32) -> impl Operation {
        let calls = self.calls;
        move || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= failures {
                    Err(ParticipantError::new(format!("transient failure {n}")))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn always_ok(self) -> impl Operation {
        self.failing_first(0)
    }

    fn always_failing(self) -> impl Operation {
        self.failing_first(u32::MAX)
    }
}

struct TestHarness {
    coordinator: Coordinator,
    tries: Vec<Script>,
    confirms: Vec<Script>,
    cancels: Vec<Script>,
}

impl TestHarness {
    /// Builds `n` participants named `s1..=sn`; `configure` picks each
    /// participant's operations from its three scripts.
    fn new<F>(n: usize, max_attempts: u32, configure: F) -> Self
    where
        F: Fn(usize, Script, Script, Script) -> Participant,
    {
        let tries: Vec<Script> = (0..n).map(|_| Script::new()).collect();
        let confirms: Vec<Script> = (0..n).map(|_| Script::new()).collect();
        let cancels: Vec<Script> = (0..n).map(|_| Script::new()).collect();

        let participants = (0..n)
            .map(|i| {
                configure(
                    i,
                    tries[i].clone(),
                    confirms[i].clone(),
                    cancels[i].clone(),
                )
            })
            .collect::<Vec<_>>();
        let coordinator = Coordinator::builder()
            .participants(participants)
            .retry_policy(RetryPolicy::no_delay(max_attempts))
            .build();

        Self {
            coordinator,
            tries,
            confirms,
            cancels,
        }
    }

    fn name(i: usize) -> String {
        format!("s{}", i + 1)
    }
}

#[tokio::test]
async fn test_all_succeed_commits_everyone() {
    let mut h = TestHarness::new(3, 1, |i, t, c, x| {
        Participant::new(TestHarness::name(i), t.always_ok(), c.always_ok(), x.always_ok())
    });

    h.coordinator.orchestrate().await.unwrap();

    for p in h.coordinator.participants() {
        assert!(p.try_succeeded(), "{}", p.name());
        assert!(p.confirm_succeeded(), "{}", p.name());
        assert!(!p.canceled(), "{}", p.name());
        assert!(p.status().is_consistent());
    }
    assert!(h.cancels.iter().all(|s| s.calls() == 0));
    assert!(h.confirms.iter().all(|s| s.calls() == 1));
}

#[tokio::test]
async fn test_single_try_failure_cancels_all_tried() {
    let mut h = TestHarness::new(3, 3, |i, t, c, x| {
        let try_failures = if i == 1 { u32::MAX } else { 0 };
        Participant::new(
            TestHarness::name(i),
            t.failing_first(try_failures),
            c.always_ok(),
            x.always_ok(),
        )
    });

    let err = h.coordinator.orchestrate().await.unwrap_err();
    assert_eq!(err.failed_phase(), FailedPhase::TryFailed);
    assert_eq!(err.participant_name(), "s2");
    assert!(!err.requires_manual_intervention());

    for p in h.coordinator.participants() {
        assert!(p.tried());
        assert!(p.canceled(), "{} should be canceled", p.name());
        assert!(p.cancel_succeeded());
        assert!(!p.confirmed());
        assert!(p.status().is_consistent());
    }
    // Try is never retried.
    assert_eq!(h.tries[1].calls(), 1);
    assert!(h.cancels.iter().all(|s| s.calls() == 1));
    assert!(h.confirms.iter().all(|s| s.calls() == 0));
}

#[tokio::test]
async fn test_confirm_exhaustion_reports_confirm_failed_without_cancel() {
    let mut h = TestHarness::new(2, 3, |i, t, c, x| {
        if i == 0 {
            Participant::new(TestHarness::name(i), t.always_ok(), c.always_failing(), x.always_ok())
        } else {
            Participant::new(TestHarness::name(i), t.always_ok(), c.always_ok(), x.always_ok())
        }
    });

    let err = h.coordinator.orchestrate().await.unwrap_err();
    assert_eq!(err.failed_phase(), FailedPhase::ConfirmFailed);
    assert_eq!(err.participant_name(), "s1");
    assert_eq!(err.cause().to_string(), "transient failure 3");
    assert!(err.requires_manual_intervention());

    assert_eq!(h.confirms[0].calls(), 3);
    assert!(h.cancels.iter().all(|s| s.calls() == 0));
    assert!(h.coordinator.participants().iter().all(|p| !p.canceled()));
}

#[tokio::test]
async fn test_cancel_failure_overrides_try_failure() {
    // s1's Try succeeds but its Cancel never does; s2's Try fails.
    let mut h = TestHarness::new(2, 2, |i, t, c, x| {
        if i == 0 {
            Participant::new(TestHarness::name(i), t.always_ok(), c.always_ok(), x.always_failing())
        } else {
            Participant::new(TestHarness::name(i), t.always_failing(), c.always_ok(), x.always_ok())
        }
    });

    let report = h.coordinator.execute().await;
    let err = report.error().expect("transaction should fail");
    assert_eq!(err.failed_phase(), FailedPhase::CancelFailed);
    assert_eq!(err.participant_name(), "s1");
    assert_eq!(report.resolution(), TransactionState::Canceling);

    let s1 = report.participant("s1").unwrap();
    assert!(s1.canceled && !s1.cancel_succeeded);
    let s2 = report.participant("s2").unwrap();
    assert!(s2.canceled && s2.cancel_succeeded);
    assert_eq!(h.cancels[0].calls(), 2);
}

#[tokio::test]
async fn test_transient_confirm_failures_within_budget_succeed() {
    let cases = [(2, 3, true), (2, 4, true), (2, 2, false)];
    for (failures, max_attempts, should_succeed) in cases {
        let mut h = TestHarness::new(1, max_attempts, |i, t, c, x| {
            Participant::new(
                TestHarness::name(i),
                t.always_ok(),
                c.failing_first(failures),
                x.always_ok(),
            )
        });

        let result = h.coordinator.orchestrate().await;
        let p = h.coordinator.participant("s1").unwrap();
        assert_eq!(
            result.is_ok(),
            should_succeed,
            "k={failures} attempts={max_attempts}"
        );
        assert_eq!(p.confirm_succeeded(), should_succeed);
        if let Err(err) = result {
            assert_eq!(err.failed_phase(), FailedPhase::ConfirmFailed);
        }
    }
}

#[tokio::test]
async fn test_transient_cancel_failures_within_budget_succeed() {
    for (failures, max_attempts, should_succeed) in [(1, 2, true), (1, 1, false)] {
        let mut h = TestHarness::new(1, max_attempts, |i, t, c, x| {
            Participant::new(
                TestHarness::name(i),
                t.always_failing(),
                c.always_ok(),
                x.failing_first(failures),
            )
        });

        let err = h.coordinator.orchestrate().await.unwrap_err();
        let expected = if should_succeed {
            FailedPhase::TryFailed
        } else {
            FailedPhase::CancelFailed
        };
        assert_eq!(err.failed_phase(), expected);
        let p = h.coordinator.participant("s1").unwrap();
        assert_eq!(p.cancel_succeeded(), should_succeed);
    }
}

#[tokio::test]
async fn test_try_operations_run_concurrently() {
    // Each Try waits until all three are in flight; a serial coordinator
    // would never get past the first.
    let barrier = Arc::new(Barrier::new(3));
    let participants = (1..=3).map(|i| {
        let barrier = barrier.clone();
        Participant::new(
            format!("s{i}"),
            move || {
                let barrier = barrier.clone();
                async move {
                    barrier.wait().await;
                    Ok::<(), ParticipantError>(())
                }
            },
            || async { Ok::<(), ParticipantError>(()) },
            || async { Ok::<(), ParticipantError>(()) },
        )
    });
    let mut coordinator = Coordinator::builder()
        .participants(participants)
        .max_attempts(1)
        .build();

    tokio::time::timeout(Duration::from_secs(5), coordinator.orchestrate())
        .await
        .expect("try phase should not serialize participants")
        .unwrap();
}

const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Two attempts with one fixed, unjittered delay between them.
fn one_retry_after_delay() -> RetryPolicy {
    RetryPolicy::new()
        .with_initial_interval(RETRY_DELAY)
        .with_multiplier(1.0)
        .with_randomization_factor(0.0)
        .with_max_attempts(2)
}

/// Runs `n` participants whose retried operation fails once and returns the
/// elapsed time. Retries sharing a lock would take about `n` delays.
async fn time_single_retry_per_participant(n: usize, in_cancel: bool) -> Duration {
    let participants = (1..=n).map(|i| {
        let (try_failures, confirm_failures) = if in_cancel { (u32::MAX, 0) } else { (0, 1) };
        let cancel_failures = if in_cancel { 1 } else { 0 };
        Participant::new(
            format!("s{i}"),
            Script::new().failing_first(try_failures),
            Script::new().failing_first(confirm_failures),
            Script::new().failing_first(cancel_failures),
        )
    });
    let mut coordinator = Coordinator::builder()
        .participants(participants)
        .retry_policy(one_retry_after_delay())
        .build();

    let started = std::time::Instant::now();
    let report = coordinator.execute().await;
    let elapsed = started.elapsed();

    for p in report.participants() {
        if in_cancel {
            assert!(p.status.cancel_succeeded, "{p:?}");
        } else {
            assert!(p.status.confirm_succeeded, "{p:?}");
        }
    }
    elapsed
}

#[tokio::test]
async fn test_confirm_retries_run_concurrently() {
    let elapsed = time_single_retry_per_participant(4, false).await;
    assert!(elapsed >= RETRY_DELAY, "{elapsed:?}");
    assert!(elapsed < RETRY_DELAY * 3, "confirm retries were serialized: {elapsed:?}");
}

#[tokio::test]
async fn test_cancel_retries_run_concurrently() {
    let elapsed = time_single_retry_per_participant(4, true).await;
    assert!(elapsed >= RETRY_DELAY, "{elapsed:?}");
    assert!(elapsed < RETRY_DELAY * 3, "cancel retries were serialized: {elapsed:?}");
}

#[tokio::test]
async fn test_try_failure_waits_for_slow_siblings() {
    let slow_finished = Arc::new(AtomicU32::new(0));
    let finished = slow_finished.clone();
    let mut coordinator = Coordinator::builder()
        .participant(Participant::new(
            "slow",
            move || {
                let finished = finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), ParticipantError>(())
                }
            },
            || async { Ok::<(), ParticipantError>(()) },
            || async { Ok::<(), ParticipantError>(()) },
        ))
        .participant(Participant::new(
            "fast",
            || async { Err::<(), _>(ParticipantError::new("rejected")) },
            || async { Ok::<(), ParticipantError>(()) },
            || async { Ok::<(), ParticipantError>(()) },
        ))
        .max_attempts(1)
        .build();

    let err = coordinator.orchestrate().await.unwrap_err();
    assert_eq!(err.participant_name(), "fast");
    assert_eq!(slow_finished.load(Ordering::SeqCst), 1);

    let slow = coordinator.participant("slow").unwrap();
    assert!(slow.try_succeeded());
    assert!(slow.canceled());
}

#[tokio::test]
async fn test_timed_out_run_lets_in_flight_try_finish() {
    let mut coordinator = Coordinator::builder()
        .participant(Participant::new(
            "slow",
            || async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<(), ParticipantError>(())
            },
            Script::new().always_ok(),
            Script::new().always_ok(),
        ))
        .max_attempts(1)
        .build();

    let timed_out =
        tokio::time::timeout(Duration::from_millis(5), coordinator.execute()).await;
    assert!(timed_out.is_err());

    tokio::time::sleep(Duration::from_millis(150)).await;
    let slow = coordinator.participant("slow").unwrap();
    assert!(slow.try_succeeded());
    assert!(!slow.confirmed());
    assert_eq!(coordinator.state(), TransactionState::Trying);
}

#[tokio::test]
async fn test_canceled_implies_tried_across_runs() {
    let mut h = TestHarness::new(4, 1, |i, t, c, x| {
        if i % 2 == 0 {
            Participant::new(TestHarness::name(i), t.always_failing(), c.always_ok(), x.always_ok())
        } else {
            Participant::new(TestHarness::name(i), t.always_ok(), c.always_ok(), x.always_ok())
        }
    });

    for _ in 0..3 {
        let report = h.coordinator.execute().await;
        assert!(!report.is_success());
        for p in report.participants() {
            assert!(p.status.is_consistent(), "{p:?}");
            assert_eq!(p.status.canceled, p.status.tried);
            assert!(!p.status.confirmed);
        }
    }
    assert!(h.tries.iter().all(|s| s.calls() == 3));
}

#[tokio::test]
async fn test_coordinator_is_reusable_and_reports_distinct_ids() {
    let mut h = TestHarness::new(2, 1, |i, t, c, x| {
        Participant::new(TestHarness::name(i), t.always_ok(), c.always_ok(), x.always_ok())
    });

    let first = h.coordinator.execute().await;
    let second = h.coordinator.execute().await;
    assert!(first.is_success() && second.is_success());
    assert_ne!(first.id(), second.id());
    assert_eq!(h.coordinator.state(), TransactionState::Done);
    assert!(h.confirms.iter().all(|s| s.calls() == 2));
}
