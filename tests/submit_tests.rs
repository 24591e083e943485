//! Submit: per-kind preconditions, validation and synthesized replies.

mod common;

use common::*;
use pretty_assertions::assert_eq;

use concent_arbiter::codec::encode_signed;
use concent_arbiter::engine::SubmitOutcome;
use concent_arbiter::store::{DeliveryTracker, MessageStore};
use concent_arbiter::types::{
    Message, MessageKind, RejectReason, Signed, TaskToCompute,
};
use concent_arbiter::ArbiterError;

fn assert_code(result: Result<SubmitOutcome, ArbiterError>, code: &str) {
    match result {
        Err(e) => assert_eq!(e.error_code(), code, "{e}"),
        Ok(outcome) => panic!("expected {code}, got {outcome:?}"),
    }
}

// ─── Force ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn force_is_stored_and_addressed_to_requestor() {
    let (engine, store) = engine();
    let t = task("task1", DEADLINE);
    let raw = force_bytes(&t, 950);

    let outcome = engine.submit(&key(&provider()), &raw, 950).await.unwrap();
    let SubmitOutcome::Accepted { message_id } = outcome else {
        panic!("expected Accepted, got {outcome:?}");
    };

    let stored = store.get(message_id).await.unwrap();
    assert_eq!(stored.kind, MessageKind::ForceReportComputedTask);
    assert_eq!(stored.raw, raw);
    assert_eq!(stored.received_at, 950);
    assert!(!stored.synthesized);

    let pending = store.undelivered_for(&key(&requestor()), i64::MIN).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].message_id, message_id);
    assert!(store.undelivered_for(&key(&provider()), i64::MIN).await.unwrap().is_empty());
}

#[tokio::test]
async fn identical_force_twice_is_duplicate() {
    let (engine, store) = engine();
    let t = task("task1", DEADLINE);
    let raw = force_bytes(&t, 950);

    engine.submit(&key(&provider()), &raw, 950).await.unwrap();
    assert_code(
        engine.submit(&key(&provider()), &raw, 951).await,
        "message.duplicate",
    );
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn force_at_deadline_is_still_accepted() {
    let (engine, _store) = engine();
    let t = task("task1", DEADLINE);
    let outcome = engine
        .submit(&key(&provider()), &force_bytes(&t, DEADLINE), DEADLINE)
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Accepted { .. }));
}

#[tokio::test]
async fn late_force_gets_synthesized_reject_and_nothing_is_stored() {
    let (engine, store) = engine();
    let t = task("task1", DEADLINE);

    let outcome = engine
        .submit(&key(&provider()), &force_bytes(&t, 1050), 1050)
        .await
        .unwrap();
    let SubmitOutcome::Synthesized(raw) = outcome else {
        panic!("expected Synthesized, got {outcome:?}");
    };

    match decode_arbiter_signed(&raw) {
        Message::RejectReportComputedTask(reject) => {
            assert_eq!(reject.reason, RejectReason::DeadlineExceeded);
            assert_eq!(reject.task_to_compute, t);
            assert_eq!(reject.timestamp, 1050);
        },
        other => panic!("expected Reject, got {other:?}"),
    }
    assert!(store.is_empty());
    assert_eq!(store.delivery_count(), 0);
}

#[tokio::test]
async fn duplicate_check_precedes_deadline_check() {
    let (engine, _store) = engine();
    let t = task("task1", DEADLINE);
    engine
        .submit(&key(&provider()), &force_bytes(&t, 950), 950)
        .await
        .unwrap();
    assert_code(
        engine.submit(&key(&provider()), &force_bytes(&t, 1050), 1050).await,
        "message.duplicate",
    );
}

// ─── Ack ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ack_within_window_is_addressed_to_provider() {
    let (engine, store) = engine();
    let t = task("task1", DEADLINE);
    engine
        .submit(&key(&provider()), &force_bytes(&t, 950), 950)
        .await
        .unwrap();

    let outcome = engine
        .submit(&key(&requestor()), &ack_bytes(&t, 1060), 1060)
        .await
        .unwrap();
    let SubmitOutcome::Accepted { message_id } = outcome else {
        panic!("expected Accepted");
    };
    let pending = store.undelivered_for(&key(&provider()), i64::MIN).await.unwrap();
    assert_eq!(pending[0].message_id, message_id);
}

#[tokio::test]
async fn ack_after_grace_period_is_expired() {
    let (engine, store) = engine();
    let t = task("task1", DEADLINE);
    engine
        .submit(&key(&provider()), &force_bytes(&t, 950), 950)
        .await
        .unwrap();

    let result = engine
        .submit(&key(&requestor()), &ack_bytes(&t, 1061), 1061)
        .await;
    match result {
        Err(ArbiterError::TimeWindowExpired {
            deadline,
            window_end,
            ..
        }) => {
            assert_eq!(deadline, 1000);
            assert_eq!(window_end, 1060);
        },
        other => panic!("expected TimeWindowExpired, got {other:?}"),
    }
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn ack_without_force_has_no_precursor() {
    let (engine, store) = engine();
    let t = task("task1", DEADLINE);
    assert_code(
        engine.submit(&key(&requestor()), &ack_bytes(&t, 990), 990).await,
        "message.precursor_missing",
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn second_answer_is_already_resolved() {
    let (engine, store) = engine();
    let t = task("task1", DEADLINE);
    engine
        .submit(&key(&provider()), &force_bytes(&t, 950), 950)
        .await
        .unwrap();
    engine
        .submit(&key(&requestor()), &ack_bytes(&t, 990), 990)
        .await
        .unwrap();

    assert_code(
        engine.submit(&key(&requestor()), &ack_bytes(&t, 995), 995).await,
        "message.already_resolved",
    );
    assert_code(
        engine
            .submit(
                &key(&requestor()),
                &reject_bytes(&t, RejectReason::CannotCompute, 996),
                996,
            )
            .await,
        "message.already_resolved",
    );
    assert_eq!(store.len(), 2);
}

// ─── Reject ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reject_outside_window_is_expired() {
    let (engine, _store) = engine();
    let t = task("task1", DEADLINE);
    engine
        .submit(&key(&provider()), &force_bytes(&t, 950), 950)
        .await
        .unwrap();
    assert_code(
        engine
            .submit(
                &key(&requestor()),
                &reject_bytes(&t, RejectReason::BadInput, 1100),
                1100,
            )
            .await,
        "message.time_window_expired",
    );
}

#[tokio::test]
async fn deadline_exceeded_reject_ignores_time_window() {
    let (engine, _store) = engine();
    let t = task("task1", DEADLINE);
    engine
        .submit(&key(&provider()), &force_bytes(&t, 950), 950)
        .await
        .unwrap();
    let outcome = engine
        .submit(
            &key(&requestor()),
            &reject_bytes(&t, RejectReason::DeadlineExceeded, 5000),
            5000,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Accepted { .. }));
}

#[tokio::test]
async fn deadline_exceeded_reject_still_needs_force_and_open_task() {
    let (engine, _store) = engine();
    let t = task("task1", DEADLINE);
    assert_code(
        engine
            .submit(
                &key(&requestor()),
                &reject_bytes(&t, RejectReason::DeadlineExceeded, 990),
                990,
            )
            .await,
        "message.precursor_missing",
    );

    engine
        .submit(&key(&provider()), &force_bytes(&t, 950), 950)
        .await
        .unwrap();
    engine
        .submit(&key(&requestor()), &ack_bytes(&t, 990), 990)
        .await
        .unwrap();
    assert_code(
        engine
            .submit(
                &key(&requestor()),
                &reject_bytes(&t, RejectReason::DeadlineExceeded, 2000),
                2000,
            )
            .await,
        "message.already_resolved",
    );
}

#[tokio::test]
async fn answer_must_refer_to_the_forced_task() {
    let (engine, _store) = engine();
    let forced = task("task1", DEADLINE);
    engine
        .submit(&key(&provider()), &force_bytes(&forced, 950), 950)
        .await
        .unwrap();

    // Same task id, different deadline.
    let other = task("task1", 2000);
    assert_code(
        engine.submit(&key(&requestor()), &ack_bytes(&other, 990), 990).await,
        "message.invalid",
    );
}

// ─── Validation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn task_description_is_not_submittable() {
    let (engine, _store) = engine();
    let t = task("task1", DEADLINE);
    let raw = encode_signed(Message::TaskToCompute(t.payload.clone()), &requestor()).unwrap();
    assert_code(
        engine.submit(&key(&requestor()), &raw, 950).await,
        "message.unsupported_type",
    );
}

#[tokio::test]
async fn garbage_body_is_invalid() {
    let (engine, _store) = engine();
    assert_code(
        engine.submit(&key(&provider()), b"{not json", 950).await,
        "message.invalid",
    );
}

#[tokio::test]
async fn fields_outside_the_signed_payload_are_invalid() {
    let (engine, store) = engine();
    let t = task("task1", DEADLINE);
    let mut body: serde_json::Value = serde_json::from_slice(&force_bytes(&t, 950)).unwrap();

    // The signature still verifies over the known fields, so the extra one
    // would otherwise be forwarded unsigned.
    body["payload"]["note"] = "x".into();
    let raw = serde_json::to_vec(&body).unwrap();
    assert_code(engine.submit(&key(&provider()), &raw, 950).await, "message.invalid");

    body["payload"].as_object_mut().unwrap().remove("note");
    body["relay"] = "x".into();
    let raw = serde_json::to_vec(&body).unwrap();
    assert_code(engine.submit(&key(&provider()), &raw, 950).await, "message.invalid");
    assert!(store.is_empty());
}

#[tokio::test]
async fn sender_must_be_the_signer_named_by_the_task() {
    let (engine, store) = engine();
    let t = task("task1", DEADLINE);

    // Force must come from the provider.
    assert_code(
        engine.submit(&key(&requestor()), &force_bytes(&t, 950), 950).await,
        "message.invalid",
    );
    // Correct header, wrong signing key.
    let forged = encode_signed(force_message(&t, 950), &stranger()).unwrap();
    assert_code(
        engine.submit(&key(&provider()), &forged, 950).await,
        "message.invalid",
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn task_description_must_be_signed_by_requestor() {
    let (engine, _store) = engine();
    let mut t = task("task1", DEADLINE);
    t.payload.deadline = 9999;
    assert_code(
        engine.submit(&key(&provider()), &force_bytes(&t, 950), 950).await,
        "message.invalid",
    );
}

#[tokio::test]
async fn malformed_task_id_is_invalid() {
    let (engine, _store) = engine();
    let bad = Signed::sign(
        TaskToCompute {
            task_id: "no spaces allowed".into(),
            subtask_id: "s".into(),
            deadline: DEADLINE,
            provider_public_key: key(&provider()),
            requestor_public_key: key(&requestor()),
            timestamp: 900,
        },
        &requestor(),
    )
    .unwrap();
    assert_code(
        engine.submit(&key(&provider()), &force_bytes(&bad, 950), 950).await,
        "message.invalid",
    );
}
