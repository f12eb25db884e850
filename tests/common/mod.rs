//! Shared fixtures for the integration tests: an in-memory store seeded with
//! press_001 contacts, and scriptable SMS/link collaborators.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use alertflow::engine::{ThresholdSpec, ThresholdTable};
use alertflow::error::{Error, Result};
use alertflow::models::{AssignmentRole, Reading, Severity, Subscription};
use alertflow::notify::{DeliveryResult, LinkIssuer, SmsTransport, StoredLinkIssuer};
use alertflow::store::{MemoryStore, Storage};
use alertflow::{Engine, EngineSettings};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

pub const PRIMARY_PHONE: &str = "010-1111-1111";
pub const MANAGER_PHONE: &str = "010-2222-2222";
pub const SUBSCRIBER_PHONE: &str = "010-3333-3333";

// ---

/// Records every message instead of sending it. Numbers in `failing` get a
/// transport error; `cancel_after_first` fires the token after one send.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    failing: HashSet<String>,
    cancel_after_first: Option<CancellationToken>,
}

impl RecordingTransport {
    // ---
    pub fn failing_for(phone_number: &str) -> Self {
        RecordingTransport {
            failing: HashSet::from([phone_number.to_string()]),
            ..Default::default()
        }
    }

    pub fn cancelling(token: CancellationToken) -> Self {
        RecordingTransport {
            cancel_after_first: Some(token),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn phones(&self) -> Vec<String> {
        self.sent().into_iter().map(|(phone, _)| phone).collect()
    }
}

#[async_trait]
impl SmsTransport for RecordingTransport {
    async fn send(&self, phone_number: &str, message: &str) -> Result<DeliveryResult> {
        // ---
        if self.failing.contains(phone_number) {
            return Err(Error::Transport(format!("gateway rejected {}", phone_number)));
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push((phone_number.to_string(), message.to_string()));
        let message_id = format!("msg-{}", sent.len());
        drop(sent);

        if let Some(token) = &self.cancel_after_first {
            token.cancel();
        }

        Ok(DeliveryResult {
            message_id: Some(message_id),
        })
    }
}

pub struct BrokenLinks;

#[async_trait]
impl LinkIssuer for BrokenLinks {
    async fn create_link(&self, _alert_id: i64) -> Result<String> {
        Err(Error::Transport("link service down".into()))
    }
}

// ---

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub transport: Arc<RecordingTransport>,
    pub engine: Arc<Engine>,
}

/// press_001 pressure warns at 120 bar and is critical at 130 bar. Quality
/// is lower-bound: it warns below 95 % and is critical below 92 %.
pub fn create_test_settings() -> EngineSettings {
    // ---
    EngineSettings {
        thresholds: ThresholdTable::new()
            .with("pressure", ThresholdSpec::new(120.0, 130.0, "bar"))
            .with("temperature", ThresholdSpec::new(70.0, 85.0, "°C"))
            .with("quality", ThresholdSpec::new(95.0, 92.0, "%")),
        ..Default::default()
    }
}

/// Primary user 1, manager user 2, and user 3 subscribed to warnings on
/// any equipment.
pub fn create_test_store() -> Arc<MemoryStore> {
    // ---
    let store = Arc::new(MemoryStore::new());
    store.add_contact(1, "김담당", PRIMARY_PHONE);
    store.add_contact(2, "이관리", MANAGER_PHONE);
    store.add_contact(3, "박구독", SUBSCRIBER_PHONE);

    store.assign("press_001", 2, AssignmentRole::Manager);
    store.assign("press_001", 1, AssignmentRole::Primary);
    store.subscribe(Subscription {
        user_id: 3,
        equipment_id: None,
        sensor_type: None,
        severity: Severity::Warning,
    });
    store
}

pub fn create_test_engine(store: Arc<MemoryStore>, transport: RecordingTransport) -> Harness {
    // ---
    create_test_engine_with(store, transport, CancellationToken::new())
}

pub fn create_test_engine_with(
    store: Arc<MemoryStore>,
    transport: RecordingTransport,
    cancel: CancellationToken,
) -> Harness {
    // ---
    let storage: Arc<dyn Storage> = store.clone();
    let transport = Arc::new(transport);
    let links = Arc::new(StoredLinkIssuer::new(
        Arc::clone(&storage),
        "https://alerts.test",
        Duration::hours(24),
    ));

    let engine = Engine::new(
        Arc::new(create_test_settings()),
        storage,
        transport.clone(),
        links,
    )
    .with_cancellation(cancel);

    Harness {
        store,
        transport,
        engine: Arc::new(engine),
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap()
}

pub fn create_test_reading(sensor_type: &str, value: f64, offset_secs: i64) -> Reading {
    // ---
    Reading {
        equipment_id: "press_001".to_string(),
        sensor_type: sensor_type.to_string(),
        value,
        timestamp: base_time() + Duration::seconds(offset_secs),
    }
}
