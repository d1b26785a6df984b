//! End-to-end session tests over the in-process network

use async_trait::async_trait;
use motion_sensor_agent::collector::{Clock, ManualClock, SensorHub, SensorType, VirtualSensorHub};
use motion_sensor_agent::config::Config;
use motion_sensor_agent::core::{Prediction, CSV_HEADER};
use motion_sensor_agent::session::{
    CompanionController, MemoryNetwork, RemoteListener, SessionCoordinator, SessionPhase, UiState,
    WearableService,
};
use motion_sensor_agent::transparency::create_shared_log;
use motion_sensor_agent::upload::{UploadError, UploadSink};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const CAPABILITY: &str = "AGL_MOZGASMERES";

#[derive(Default)]
struct CollectingSink {
    uploads: Mutex<Vec<(PathBuf, String)>>,
}

#[async_trait]
impl UploadSink for CollectingSink {
    async fn upload(&self, file: &Path, api_key: &str) -> Result<(), UploadError> {
        self.uploads
            .lock()
            .unwrap()
            .push((file.to_path_buf(), api_key.to_string()));
        Ok(())
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recording_round_trip() {
    let export_dir = tempfile::tempdir().unwrap();
    let receive_dir = tempfile::tempdir().unwrap();
    let network = MemoryNetwork::new();
    let log = create_shared_log();

    // Wearable with accelerometer and gyroscope only.
    let (watch, watch_inbox) = network.join("watch-1", "Watch", &[CAPABILITY]);
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(100, 0));
    let hub = Arc::new(VirtualSensorHub::new(
        vec![SensorType::Accelerometer, SensorType::Gyroscope],
        clock.clone(),
    ));
    let config = Config {
        window_capacity: 6,
        prediction_period: Duration::from_millis(20),
        export_path: export_dir.path().to_path_buf(),
        ..Config::default()
    };
    let coordinator = Arc::new(SessionCoordinator::from_config(
        &config,
        Arc::new(watch),
        hub.clone(),
        Arc::new(UiState::new()),
        clock,
        log.clone(),
    ));
    tokio::spawn(WearableService::new(coordinator.clone()).run(watch_inbox));

    // Companion with a listener and an upload sink.
    let (phone, phone_inbox) = network.join("phone-1", "Phone", &[]);
    let ui = UiState::new();
    let sink = Arc::new(CollectingSink::default());
    let listener = RemoteListener::new(Arc::new(ui.clone()), receive_dir.path(), log.clone())
        .with_upload(sink.clone(), "project-key");
    tokio::spawn(Arc::new(listener).run(phone_inbox));
    let controller = CompanionController::new(Arc::new(phone), Arc::new(ui.clone()), CAPABILITY);

    let reached = controller.start_recording().await.unwrap();
    assert_eq!(reached.len(), 1);
    wait_for(|| coordinator.phase() == SessionPhase::Recording).await;
    wait_for(|| ui.snapshot().sensor_count == Some(2)).await;

    assert!(hub.emit(SensorType::Accelerometer, vec![1.0, 2.0, 3.0], 3));
    assert!(hub.emit(SensorType::Gyroscope, vec![4.0, 5.0, 6.0], 3));

    wait_for(|| ui.snapshot().prediction.is_some()).await;
    let text = ui.snapshot().prediction.unwrap();
    assert!(Prediction::from_payload(&text).is_some(), "bad payload {text}");

    controller.stop_recording().await.unwrap();
    wait_for(|| !ui.snapshot().received_files.is_empty()).await;
    assert_eq!(coordinator.phase(), SessionPhase::Idle);
    assert!(hub.registered().is_empty());

    let received = ui.snapshot().received_files[0].clone();
    assert!(received.starts_with(receive_dir.path()));
    let body = std::fs::read_to_string(&received).unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines, vec![CSV_HEADER, "100,-0.1,-0.2,-0.3,NaN,NaN,NaN,4,5,6"]);

    wait_for(|| !sink.uploads.lock().unwrap().is_empty()).await;
    assert_eq!(
        sink.uploads.lock().unwrap()[0],
        (received, "project-key".to_string())
    );

    wait_for(|| log.stats().uploads_completed == 1).await;
    let stats = log.stats();
    assert_eq!(stats.files_sent, 1);
    assert_eq!(stats.files_received, 1);
    assert_eq!(stats.accelerometer_readings, 1);
    assert_eq!(stats.gyroscope_readings, 1);
}

#[tokio::test]
async fn test_start_without_watch_reports_status() {
    let network = MemoryNetwork::new();
    let (phone, _inbox) = network.join("phone-1", "Phone", &[]);
    let ui = UiState::new();
    let controller = CompanionController::new(Arc::new(phone), Arc::new(ui.clone()), CAPABILITY);

    assert!(controller.start_recording().await.unwrap().is_empty());
    assert_eq!(ui.snapshot().status, "No watch connected");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_companion_vanishing_mid_session() {
    let export_dir = tempfile::tempdir().unwrap();
    let network = MemoryNetwork::new();
    let (watch, _watch_inbox) = network.join("watch-1", "Watch", &[CAPABILITY]);
    let (_phone, _phone_inbox) = network.join("phone-1", "Phone", &[]);

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0, 0));
    let hub = Arc::new(VirtualSensorHub::new(
        vec![SensorType::Accelerometer, SensorType::Gravity, SensorType::Gyroscope],
        clock.clone(),
    ));
    let config = Config {
        export_path: export_dir.path().to_path_buf(),
        ..Config::default()
    };
    let ui = UiState::new();
    let coordinator = SessionCoordinator::from_config(
        &config,
        Arc::new(watch),
        hub.clone(),
        Arc::new(ui.clone()),
        clock,
        create_shared_log(),
    );

    let report = coordinator.start_session(Some("phone-1")).await.unwrap();
    assert!(report.missing.is_empty());
    hub.emit(SensorType::Gravity, vec![0.0, 9.81, 0.0], 3);

    network.disconnect("phone-1");
    let stop = coordinator.stop_session().await.unwrap().unwrap();
    assert!(!stop.transferred);
    assert_eq!(stop.rows_exported, 1);

    // The export survives locally even though the transfer failed.
    let exported = stop.export_file.unwrap();
    assert!(std::fs::read_to_string(exported).unwrap().starts_with(CSV_HEADER));
    assert_eq!(coordinator.phase(), SessionPhase::Idle);
}
