//! End-to-end pipeline behaviour against the in-memory store.

mod common;

use std::sync::Arc;

use alertflow::models::{
    AlertStatus, CooldownKey, DispatchStatus, NewAlert, NewDispatchRecord, Severity,
};
use alertflow::notify::{LinkIssuer, StoredLinkIssuer};
use alertflow::store::{MemoryStore, Storage};
use alertflow::{Engine, Error, PipelineOutcome};
use anyhow::Result;
use tokio_util::sync::CancellationToken;

use common::*;

// ---

#[tokio::test]
async fn test_reading_within_bounds_creates_no_alert() -> Result<()> {
    // ---
    let h = create_test_engine(create_test_store(), RecordingTransport::default());

    let outcome = h
        .engine
        .process_reading(create_test_reading("pressure", 95.0, 0))
        .await?;

    assert_eq!(outcome, PipelineOutcome::WithinBounds);
    assert!(h.store.alerts().is_empty());
    assert!(h.transport.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unknown_sensor_is_configuration_gap() -> Result<()> {
    // ---
    let h = create_test_engine(create_test_store(), RecordingTransport::default());

    let outcome = h
        .engine
        .process_reading(create_test_reading("humidity", 99.0, 0))
        .await?;

    assert_eq!(outcome, PipelineOutcome::ConfigurationGap);
    assert!(h.store.alerts().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_warning_alert_reaches_assignees_then_subscribers() -> Result<()> {
    // ---
    let h = create_test_engine(create_test_store(), RecordingTransport::default());

    let outcome = h
        .engine
        .process_reading(create_test_reading("pressure", 125.5, 0))
        .await?;

    let PipelineOutcome::Dispatched { alert, report } = outcome else {
        panic!("expected a dispatched alert");
    };
    assert_eq!(alert.severity, Severity::Warning);
    assert_eq!(alert.threshold, 120.0);
    assert_eq!(alert.status, AlertStatus::Unprocessed);
    assert!(!alert.no_recipients);
    assert_eq!(report.sent, 3);
    assert_eq!(report.failed, 0);

    assert_eq!(
        h.transport.phones(),
        vec![PRIMARY_PHONE, MANAGER_PHONE, SUBSCRIBER_PHONE]
    );
    assert_eq!(h.store.dispatch_records().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_sms_body_for_press_001() -> Result<()> {
    // ---
    let h = create_test_engine(create_test_store(), RecordingTransport::default());

    h.engine
        .process_reading(create_test_reading("pressure", 125.5, 0))
        .await?;

    let (phone, body) = h.transport.sent().into_iter().next().unwrap();
    assert_eq!(phone, PRIMARY_PHONE);

    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines[0], "18:45:00");
    assert_eq!(lines[1], "press_001 H");
    assert_eq!(lines[2], "압력: 125.5 > 120.0(임계값)");
    assert_eq!(lines[3], "[warning] 담당자");
    assert!(lines[4].starts_with("https://alerts.test/action/"));
    Ok(())
}

#[tokio::test]
async fn test_critical_reading_raises_error_severity() -> Result<()> {
    // ---
    let h = create_test_engine(create_test_store(), RecordingTransport::default());

    let outcome = h
        .engine
        .process_reading(create_test_reading("pressure", 162.0, 0))
        .await?;

    let alert = outcome.alert().unwrap();
    assert_eq!(alert.severity, Severity::Error);
    assert_eq!(alert.threshold, 130.0);
    assert!(alert.message.contains("above error threshold"));

    // The subscriber only follows warnings.
    assert_eq!(h.transport.phones(), vec![PRIMARY_PHONE, MANAGER_PHONE]);
    Ok(())
}

#[tokio::test]
async fn test_low_quality_reading_alerts_below_threshold() -> Result<()> {
    // ---
    let h = create_test_engine(create_test_store(), RecordingTransport::default());

    let outcome = h
        .engine
        .process_reading(create_test_reading("quality", 90.0, 0))
        .await?;

    let alert = outcome.alert().unwrap();
    assert_eq!(alert.severity, Severity::Error);
    assert_eq!(alert.threshold, 92.0);
    assert!(alert.message.contains("below error threshold"));

    assert_eq!(h.transport.phones(), vec![PRIMARY_PHONE, MANAGER_PHONE]);
    for (_, body) in h.transport.sent() {
        assert!(body.contains("품질: 90.0 < 92.0(임계값)"), "{}", body);
    }
    Ok(())
}

#[tokio::test]
async fn test_cooldown_window_suppresses_then_reopens() -> Result<()> {
    // ---
    let h = create_test_engine(create_test_store(), RecordingTransport::default());

    let first = h
        .engine
        .process_reading(create_test_reading("pressure", 125.5, 0))
        .await?;
    assert!(matches!(first, PipelineOutcome::Dispatched { .. }));

    let second = h
        .engine
        .process_reading(create_test_reading("pressure", 126.0, 30))
        .await?;
    match second {
        PipelineOutcome::CoolingDown {
            severity,
            remaining,
        } => {
            assert_eq!(severity, Severity::Warning);
            assert_eq!(remaining.as_secs(), 30);
        }
        other => panic!("expected cooldown, got {:?}", other),
    }

    let third = h
        .engine
        .process_reading(create_test_reading("pressure", 127.0, 61))
        .await?;
    assert!(matches!(third, PipelineOutcome::Dispatched { .. }));

    assert_eq!(h.store.alerts().len(), 2);

    let entry = h
        .engine
        .get_cooldown_state(&CooldownKey::new("press_001", "pressure", Severity::Warning))
        .unwrap();
    assert_eq!(entry.last_value, 127.0);
    assert_eq!(entry.last_fired_at, base_time() + chrono::Duration::seconds(61));
    Ok(())
}

#[tokio::test]
async fn test_escalation_is_not_held_by_lower_severity_cooldown() -> Result<()> {
    // ---
    let h = create_test_engine(create_test_store(), RecordingTransport::default());

    h.engine
        .process_reading(create_test_reading("pressure", 125.5, 0))
        .await?;
    let escalated = h
        .engine
        .process_reading(create_test_reading("pressure", 155.0, 10))
        .await?;

    assert_eq!(escalated.alert().unwrap().severity, Severity::Error);
    assert_eq!(h.store.alerts().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_repeated_identical_readings_are_suppressed() -> Result<()> {
    // ---
    let h = create_test_engine(create_test_store(), RecordingTransport::default());

    // Spaced beyond the warning cooldown so only the repeat filter applies.
    for step in 0..4 {
        let outcome = h
            .engine
            .process_reading(create_test_reading("pressure", 125.5, step * 100))
            .await?;
        assert!(
            matches!(outcome, PipelineOutcome::Dispatched { .. }),
            "reading {} should alert, got {:?}",
            step,
            outcome
        );
    }

    let outcome = h
        .engine
        .process_reading(create_test_reading("pressure", 125.5, 400))
        .await?;
    assert_eq!(
        outcome,
        PipelineOutcome::Insignificant {
            severity: Severity::Warning
        }
    );
    assert_eq!(h.store.alerts().len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_no_recipients_persists_flagged_alert() -> Result<()> {
    // ---
    let h = create_test_engine(Arc::new(MemoryStore::new()), RecordingTransport::default());

    let outcome = h
        .engine
        .process_reading(create_test_reading("pressure", 130.0, 0))
        .await?;

    let PipelineOutcome::NoRecipients { alert } = outcome else {
        panic!("expected a flagged alert without recipients");
    };
    assert!(alert.no_recipients);
    assert_eq!(h.store.alerts(), vec![alert]);
    assert!(h.store.dispatch_records().is_empty());
    assert!(h.transport.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_primary_failure_does_not_block_others() -> Result<()> {
    // ---
    let h = create_test_engine(
        create_test_store(),
        RecordingTransport::failing_for(PRIMARY_PHONE),
    );

    let outcome = h
        .engine
        .process_reading(create_test_reading("pressure", 125.5, 0))
        .await?;

    let PipelineOutcome::Dispatched { report, .. } = outcome else {
        panic!("expected a dispatched alert");
    };
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);

    let records = h.store.dispatch_records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].user_id, 1);
    assert_eq!(records[0].status, DispatchStatus::Failed);
    assert!(records[1..].iter().all(|r| r.status == DispatchStatus::Sent));
    Ok(())
}

#[tokio::test]
async fn test_redispatch_skips_recorded_recipients() -> Result<()> {
    // ---
    let h = create_test_engine(create_test_store(), RecordingTransport::default());

    let outcome = h
        .engine
        .process_reading(create_test_reading("pressure", 125.5, 0))
        .await?;
    let alert_id = outcome.alert().unwrap().id;
    assert_eq!(h.store.action_link_count(), 1);

    let report = h.engine.redispatch(alert_id).await?;

    assert_eq!(report.sent, 0);
    assert_eq!(report.already_recorded, 3);
    assert_eq!(h.transport.sent().len(), 3);
    assert_eq!(h.store.dispatch_records().len(), 3);
    // Nobody needed a message, so no new link was issued.
    assert_eq!(h.store.action_link_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_redispatch_sends_only_to_unrecorded_recipients() -> Result<()> {
    // ---
    let h = create_test_engine(create_test_store(), RecordingTransport::default());

    let alert = h
        .store
        .create_alert(NewAlert {
            equipment_id: "press_001".to_string(),
            sensor_type: "pressure".to_string(),
            value: 125.5,
            threshold: 120.0,
            severity: Severity::Warning,
            timestamp: base_time(),
            message: "pressure 125.5 bar above warning threshold 120.0 bar".to_string(),
            no_recipients: false,
        })
        .await?;
    h.store
        .create_dispatch_record(NewDispatchRecord {
            user_id: 2,
            alert_id: alert.id,
            phone_number: MANAGER_PHONE.to_string(),
            message: "earlier attempt".to_string(),
            status: DispatchStatus::Sent,
            sent_at: base_time(),
        })
        .await?;

    let report = h.engine.redispatch(alert.id).await?;

    assert_eq!(report.sent, 2);
    assert_eq!(report.already_recorded, 1);
    assert_eq!(h.transport.phones(), vec![PRIMARY_PHONE, SUBSCRIBER_PHONE]);
    assert_eq!(h.store.dispatch_records().len(), 3);
    assert_eq!(h.store.action_link_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_cancellation_skips_remaining_recipients() -> Result<()> {
    // ---
    let cancel = CancellationToken::new();
    let h = create_test_engine_with(
        create_test_store(),
        RecordingTransport::cancelling(cancel.clone()),
        cancel,
    );

    let outcome = h
        .engine
        .process_reading(create_test_reading("pressure", 125.5, 0))
        .await?;

    let PipelineOutcome::Dispatched { report, .. } = outcome else {
        panic!("expected a dispatched alert");
    };
    assert_eq!(report.sent, 1);
    assert_eq!(report.cancelled, 2);
    assert_eq!(h.transport.phones(), vec![PRIMARY_PHONE]);
    assert_eq!(h.store.dispatch_records().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_same_key_readings_fire_once() -> Result<()> {
    // ---
    let h = create_test_engine(create_test_store(), RecordingTransport::default());

    let mut tasks = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&h.engine);
        let value = 125.0 + i as f64 * 0.1;
        tasks.push(tokio::spawn(async move {
            engine
                .process_reading(create_test_reading("pressure", value, 0))
                .await
        }));
    }

    let mut fired = 0;
    for task in tasks {
        if task.await??.alert().is_some() {
            fired += 1;
        }
    }

    assert_eq!(fired, 1);
    assert_eq!(h.store.alerts().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_link_failure_sends_without_link() -> Result<()> {
    // ---
    let store = create_test_store();
    let storage: Arc<dyn Storage> = store.clone();
    let transport = Arc::new(RecordingTransport::default());
    let engine = Engine::new(
        Arc::new(create_test_settings()),
        storage,
        transport.clone(),
        Arc::new(BrokenLinks),
    );

    engine
        .process_reading(create_test_reading("pressure", 125.5, 0))
        .await?;

    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|(_, body)| !body.contains("/action/")));
    Ok(())
}

#[tokio::test]
async fn test_status_lifecycle_ends_at_done() -> Result<()> {
    // ---
    let h = create_test_engine(create_test_store(), RecordingTransport::default());
    let outcome = h
        .engine
        .process_reading(create_test_reading("pressure", 125.5, 0))
        .await?;
    let id = outcome.alert().unwrap().id;

    let alert = h.engine.transition_alert(id, AlertStatus::InProgress).await?;
    assert_eq!(alert.status, AlertStatus::InProgress);

    let err = h
        .engine
        .transition_alert(id, AlertStatus::Unprocessed)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidStateTransition { .. }));

    let alert = h.engine.transition_alert(id, AlertStatus::Done).await?;
    assert_eq!(alert.status, AlertStatus::Done);

    for to in [AlertStatus::Unprocessed, AlertStatus::InProgress, AlertStatus::Done] {
        let err = h.engine.transition_alert(id, to).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidStateTransition {
                from: AlertStatus::Done,
                ..
            }
        ));
    }

    let err = h
        .engine
        .transition_alert(9999, AlertStatus::Done)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn test_action_link_is_single_use() -> Result<()> {
    // ---
    let store = create_test_store();
    let storage: Arc<dyn Storage> = store.clone();
    let issuer = StoredLinkIssuer::new(
        Arc::clone(&storage),
        "https://alerts.test",
        chrono::Duration::hours(24),
    );
    let h = create_test_engine(store, RecordingTransport::default());

    let outcome = h
        .engine
        .process_reading(create_test_reading("pressure", 125.5, 0))
        .await?;
    let alert_id = outcome.alert().unwrap().id;

    let url = issuer.create_link(alert_id).await?;
    let token = url.rsplit('/').next().unwrap();

    let now = chrono::Utc::now();
    assert_eq!(storage.consume_action_link(token, now).await?, Some(alert_id));
    assert_eq!(storage.consume_action_link(token, now).await?, None);
    Ok(())
}
