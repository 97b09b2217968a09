use camwatch_common::{CameraConfig, CameraPatch, DetectionEvent, RestrictedZone};
use camwatch_operator::{AppContext, EventRepository, OperatorConfig, OperatorError, Result};
use camwatch_perception::camera::SyntheticTransport;
use camwatch_perception::detection::{NoopDetector, ObjectScan, ObjectScanner, ZoneIntrusion};
use camwatch_perception::{DetectorSet, Frame, PipelineSettings};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

/// Reports an intrusion in every zone it is given.
struct AlwaysIntruded;

impl ObjectScanner for AlwaysIntruded {
    fn scan(&self, _frame: &Frame, zones: &[RestrictedZone]) -> camwatch_perception::Result<ObjectScan> {
        Ok(ObjectScan {
            counts: Default::default(),
            intrusions: zones
                .iter()
                .map(|z| ZoneIntrusion {
                    zone_name: z.name.clone(),
                    confidence: 0.75,
                })
                .collect(),
        })
    }
}

#[derive(Default)]
struct MemoryRepository {
    events: Mutex<Vec<DetectionEvent>>,
    fail: bool,
}

impl EventRepository for MemoryRepository {
    fn record(&self, event: &DetectionEvent) -> Result<()> {
        if self.fail {
            return Err(OperatorError::Send("database unavailable".to_string()));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

fn operator_config() -> OperatorConfig {
    OperatorConfig {
        pipeline: PipelineSettings {
            detection_interval_ms: 50,
            idle_poll_ms: 5,
            capture_delay_ms: 1,
            stop_timeout_ms: 2_000,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn context(repository: Arc<MemoryRepository>) -> AppContext {
    let factory = |_: &CameraConfig| {
        let noop = Arc::new(NoopDetector);
        DetectorSet::new(noop.clone(), noop, Arc::new(AlwaysIntruded))
    };
    AppContext::new(
        &operator_config(),
        Arc::new(SyntheticTransport),
        Arc::new(factory),
        repository,
    )
}

fn camera(id: &str, tenant_id: &str) -> CameraConfig {
    CameraConfig::new(id, "Gate", "sim://gate?fps=50", tenant_id)
}

fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
    let mut messages = Vec::new();
    while let Ok(text) = rx.try_recv() {
        messages.push(serde_json::from_str(&text).unwrap());
    }
    messages
}

fn types(messages: &[Value]) -> Vec<String> {
    messages
        .iter()
        .map(|m| m["type"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn wait_for(rx: &mut UnboundedReceiver<String>, kind: &str, timeout: Duration) -> Vec<Value> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        seen.extend(drain(rx));
        if seen.iter().any(|m| m["type"] == kind) {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    seen
}

#[test]
fn test_admin_actions_are_announced_to_tenant() {
    let context = context(Arc::new(MemoryRepository::default()));
    let (_alice, mut rx) = context.hub().connect_channel("tenant-a", "alice");
    let (_bob, mut other) = context.hub().connect_channel("tenant-b", "bob");

    assert!(context.add_camera(camera("C1", "tenant-a").with_active(false)));
    let created = drain(&mut rx);
    assert_eq!(types(&created), vec!["camera_status"]);
    assert_eq!(created[0]["data"]["action"], "created");
    assert_eq!(created[0]["data"]["camera_id"], "C1");
    assert_eq!(created[0]["data"]["running"], false);

    let patch = CameraPatch {
        location: Some("North dock".to_string()),
        ..Default::default()
    };
    assert!(context.patch_camera("C1", patch).is_some());
    assert_eq!(drain(&mut rx)[0]["data"]["action"], "updated");

    // Nothing to change, nothing to announce.
    let unchanged = context.patch_camera("C1", CameraPatch::default()).expect("camera exists");
    assert_eq!(unchanged.location, "North dock");
    assert!(drain(&mut rx).is_empty());

    assert!(context.remove_camera("C1"));
    let deleted = drain(&mut rx);
    assert_eq!(deleted[0]["data"]["action"], "deleted");
    assert!(deleted[0]["data"].get("name").is_none());

    assert!(drain(&mut other).is_empty());
}

#[test]
fn test_rejected_actions_broadcast_nothing() {
    let context = context(Arc::new(MemoryRepository::default()));
    let (_alice, mut rx) = context.hub().connect_channel("tenant-a", "alice");

    assert!(!context.update_camera("C9", camera("C9", "tenant-a")));
    assert!(!context.remove_camera("C9"));
    assert!(!context.start_camera("C9"));
    assert!(context.patch_camera("C9", CameraPatch::default()).is_none());

    let invalid = CameraConfig::new("C2", "", "ftp://nowhere", "tenant-a");
    assert!(!context.add_camera(invalid));
    assert!(context.registry().is_empty());

    assert!(context.add_camera(camera("C1", "tenant-a").with_active(false)));
    drain(&mut rx);
    let bad_patch = CameraPatch {
        stream_uri: Some("gopher://old".to_string()),
        ..Default::default()
    };
    assert!(context.patch_camera("C1", bad_patch).is_none());
    assert_eq!(context.registry().camera_config("C1").unwrap().stream_uri, "sim://gate?fps=50");
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_intrusion_is_recorded_and_pushed_as_event_and_alert() {
    let repository = Arc::new(MemoryRepository::default());
    let context = context(repository.clone());
    let (_alice, mut rx) = context.hub().connect_channel("tenant-a", "alice");

    assert!(context.add_camera(camera("C1", "tenant-a")));
    let messages = wait_for(&mut rx, "alert", Duration::from_secs(3));
    context.shutdown();

    assert!(types(&messages).contains(&"camera_status".to_string()));
    let event = messages.iter().find(|m| m["type"] == "event").expect("event pushed");
    assert_eq!(event["data"]["event_type"], "intrusion");
    assert_eq!(event["data"]["metadata"]["zone_name"], "Restricted Area");
    let alert = messages.iter().find(|m| m["type"] == "alert").expect("alert pushed");
    assert_eq!(alert["data"]["event_id"], event["data"]["id"]);
    assert_eq!(alert["data"]["camera_id"], "C1");

    assert!(!repository.events.lock().is_empty());
}

#[test]
fn test_repository_failure_still_broadcasts() {
    let repository = Arc::new(MemoryRepository {
        fail: true,
        ..Default::default()
    });
    let context = context(repository);
    let (_alice, mut rx) = context.hub().connect_channel("tenant-a", "alice");

    context.add_camera(camera("C1", "tenant-a"));
    let messages = wait_for(&mut rx, "event", Duration::from_secs(3));
    context.shutdown();

    assert!(messages.iter().any(|m| m["type"] == "event"));
}

#[test]
fn test_start_stop_and_shutdown() {
    let context = context(Arc::new(MemoryRepository::default()));
    let (_alice, mut rx) = context.hub().connect_channel("tenant-a", "alice");

    context.add_camera(camera("C1", "tenant-a").with_active(false));
    assert!(context.start_camera("C1"));
    assert!(context.registry().is_running("C1"));
    assert!(context.stop_camera("C1"));
    assert!(!context.registry().is_running("C1"));

    let actions: Vec<Value> = drain(&mut rx)
        .into_iter()
        .filter(|m| m["type"] == "camera_status")
        .map(|m| m["data"]["action"].clone())
        .collect();
    assert_eq!(actions, vec!["created", "started", "stopped"]);

    context.shutdown();
    assert!(context.registry().is_empty());
    assert_eq!(context.hub().total_connections(), 0);
    // The writer side sees the end of the stream once its transport closes.
    assert!(matches!(
        rx.try_recv(),
        Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
    ));
}
