use epx_integrity::{CameraSample, Gaze, IntegrityConfig, Signal, SignalKind};
use epx_runtime::{dashboard, RuntimeError, SessionRegistry, StatusBand};
use uuid::Uuid;

#[tokio::test]
async fn registry_feeds_dashboard() {
    let reg = SessionRegistry::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let ha = reg.open(a, "alice", None, IntegrityConfig::standard_defaults()).await;
    let hb = reg.open(b, "bob", None, IntegrityConfig::standard_defaults()).await;

    ha.signal(Signal::new(SignalKind::TabHidden, 0)).await.unwrap();

    // Two faces, looking away, one flagged object: 3 violations, -25.
    let r = hb
        .camera(
            CameraSample {
                face_count: 2,
                gaze: Gaze::Away,
                suspicious_activity: vec!["phone detected".into()],
            },
            1_000,
        )
        .await
        .unwrap();
    assert_eq!(r.reports.len(), 3);
    assert_eq!(r.attention_score, 55);

    hb.signal(Signal::new(SignalKind::FullscreenExit, 2_000))
        .await
        .unwrap();

    let (rows, summary) = dashboard(&reg.snapshots().await);
    assert_eq!(rows.len(), 2);
    let row_a = rows.iter().find(|r| r.attempt_id == a).unwrap();
    let row_b = rows.iter().find(|r| r.attempt_id == b).unwrap();
    assert_eq!(row_a.integrity_score, 95);
    assert_eq!(row_a.status, StatusBand::Normal);
    assert_eq!(row_b.integrity_score, 65);
    assert_eq!(row_b.status, StatusBand::Warning);
    assert_eq!(row_b.violation_count, 4);
    assert_eq!(
        row_b.last_violation.as_ref().map(|v| v.kind),
        Some(SignalKind::FullscreenExit)
    );

    assert_eq!(summary.total_students, 2);
    assert_eq!(summary.active_students, 2);
    assert_eq!(summary.critical_students, 0);
    // (95 + 65) / 2
    assert_eq!(summary.average_integrity, 80);
}

#[tokio::test]
async fn reopening_returns_the_running_session() {
    let reg = SessionRegistry::new();
    let id = Uuid::new_v4();
    let first = reg.open(id, "carol", None, IntegrityConfig::standard_defaults()).await;
    first.signal(Signal::new(SignalKind::ContextMenu, 0)).await.unwrap();

    let again = reg.open(id, "carol", None, IntegrityConfig::standard_defaults()).await;
    assert_eq!(again.snapshot().state.integrity.score, 99);
    assert_eq!(reg.len().await, 1);
}

#[tokio::test]
async fn unknown_attempt_is_reported() {
    let reg = SessionRegistry::new();
    let id = Uuid::new_v4();
    match reg.get(id).await {
        Err(RuntimeError::UnknownAttempt(got)) => assert_eq!(got, id),
        other => panic!("expected UnknownAttempt, got {other:?}"),
    }
    assert!(reg.remove(id).await.is_none());
    assert!(reg.is_empty().await);
}
