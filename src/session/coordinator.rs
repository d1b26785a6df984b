//! Wearable-side recording session.
//!
//! The coordinator owns one session at a time:
//!
//! ```text
//! Idle ──start──▶ Starting ──▶ Recording ──stop──▶ Stopping ──▶ Idle
//! ```
//!
//! While recording, sensor events flow through a [`CapturePipeline`] on a
//! dedicated capture thread, and a tokio task pushes the latest prediction
//! to the companion once per period. Stopping joins the capture thread,
//! exports the readings and ships the file over a bulk-transfer channel.
//! The local export is removed once the companion has it.

use crate::collector::normalizer::{Clock, SampleNormalizer};
use crate::collector::types::{SensorType, REQUIRED_SENSORS};
use crate::collector::{SensorHub, EVENT_QUEUE_CAPACITY};
use crate::config::Config;
use crate::core::classifier::{
    ClassifierAdapter, MotionEnergyClassifier, Prediction, PredictionCell,
};
use crate::core::pipeline::CapturePipeline;
use crate::core::window::InferenceWindow;
use crate::session::channel::{send_payload, ChannelPath, ChannelTransport, TransportError};
use crate::session::ui::UiSink;
use crate::transparency::SharedTransparencyLog;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Lifecycle phase of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Starting,
    Recording,
    Stopping,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Starting => write!(f, "starting"),
            SessionPhase::Recording => write!(f, "recording"),
            SessionPhase::Stopping => write!(f, "stopping"),
        }
    }
}

/// Errors returned by session control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No companion node id was supplied
    MissingPeer,
    /// A session is already running
    AlreadyRecording,
    /// The capture thread died and took the session's readings with it
    CaptureLost,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::MissingPeer => write!(f, "No companion node id for this session"),
            SessionError::AlreadyRecording => write!(f, "A recording session is already active"),
            SessionError::CaptureLost => write!(f, "Capture thread terminated unexpectedly"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Snapshot of the running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub peer_node_id: String,
    pub active_sensors: BTreeSet<SensorType>,
    pub running: bool,
}

/// Outcome of a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub peer_node_id: String,
    /// Every sensor the hardware reported
    pub available: Vec<SensorType>,
    /// Required sensors with a registered listener
    pub active: BTreeSet<SensorType>,
    /// Required sensors that could not be registered
    pub missing: BTreeSet<SensorType>,
    pub sensor_count_sent: bool,
}

/// Outcome of a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub peer_node_id: String,
    pub rows_exported: usize,
    /// Local export left behind when the transfer failed
    pub export_file: Option<PathBuf>,
    pub transferred: bool,
}

/// Builds the capture pipeline around the coordinator's prediction cell
/// and log. Called once up front and again after a capture thread dies.
pub type PipelineFactory =
    Box<dyn Fn(PredictionCell, SharedTransparencyLog) -> CapturePipeline + Send + Sync>;

/// Coordinator tunables.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Directory receiving exported session files
    pub export_dir: PathBuf,
    pub prediction_period: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            export_dir: config.export_path.clone(),
            prediction_period: config.prediction_period,
        }
    }
}

struct ActiveSession {
    peer_node_id: String,
    active_sensors: BTreeSet<SensorType>,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    capture: JoinHandle<CapturePipeline>,
    push_loop: tokio::task::JoinHandle<()>,
}

struct Inner {
    /// Present whenever no capture thread is running
    pipeline: Option<CapturePipeline>,
    active: Option<ActiveSession>,
}

/// Owns the recording session on the wearable.
pub struct SessionCoordinator {
    transport: Arc<dyn ChannelTransport>,
    hub: Arc<dyn SensorHub>,
    ui: Arc<dyn UiSink>,
    predictions: PredictionCell,
    log: SharedTransparencyLog,
    build_pipeline: PipelineFactory,
    settings: CoordinatorSettings,
    phase: RwLock<SessionPhase>,
    inner: Mutex<Inner>,
}

impl SessionCoordinator {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        hub: Arc<dyn SensorHub>,
        ui: Arc<dyn UiSink>,
        log: SharedTransparencyLog,
        build_pipeline: PipelineFactory,
        settings: CoordinatorSettings,
    ) -> Self {
        let predictions = PredictionCell::new();
        let pipeline = build_pipeline(predictions.clone(), log.clone());
        Self {
            transport,
            hub,
            ui,
            predictions,
            log,
            build_pipeline,
            settings,
            phase: RwLock::new(SessionPhase::Idle),
            inner: Mutex::new(Inner {
                pipeline: Some(pipeline),
                active: None,
            }),
        }
    }

    /// Build a coordinator running the built-in energy classifier.
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn ChannelTransport>,
        hub: Arc<dyn SensorHub>,
        ui: Arc<dyn UiSink>,
        clock: Arc<dyn Clock>,
        log: SharedTransparencyLog,
    ) -> Self {
        let interval_ms = config.bucket_interval_ms;
        let capacity = config.window_capacity;
        let build_pipeline: PipelineFactory =
            Box::new(move |predictions: PredictionCell, log: SharedTransparencyLog| {
                CapturePipeline::new(
                    SampleNormalizer::new(interval_ms),
                    Arc::clone(&clock),
                    InferenceWindow::new(capacity),
                    ClassifierAdapter::new(Box::new(MotionEnergyClassifier::new(capacity))),
                    predictions,
                    log,
                )
            });
        let settings = CoordinatorSettings::from_config(config);
        Self::new(transport, hub, ui, log, build_pipeline, settings)
    }

    fn fresh_pipeline(&self) -> CapturePipeline {
        (self.build_pipeline)(self.predictions.clone(), self.log.clone())
    }

    pub fn phase(&self) -> SessionPhase {
        match self.phase.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Latest prediction of the running (or last) session.
    pub fn prediction(&self) -> Option<Prediction> {
        self.predictions.load()
    }

    pub async fn state(&self) -> Option<SessionState> {
        let inner = self.inner.lock().await;
        inner.active.as_ref().map(|session| SessionState {
            peer_node_id: session.peer_node_id.clone(),
            active_sensors: session.active_sensors.clone(),
            running: session.running.load(Ordering::SeqCst),
        })
    }

    /// Start recording for the companion `peer`.
    pub async fn start_session(&self, peer: Option<&str>) -> Result<SessionReport, SessionError> {
        let Some(peer) = peer.map(str::trim).filter(|p| !p.is_empty()) else {
            tracing::warn!("Recording requested without a companion node id");
            self.ui.status("Cannot start recording: no companion device connected");
            return Err(SessionError::MissingPeer);
        };

        let mut inner = self.inner.lock().await;
        if inner.active.is_some() {
            tracing::warn!("Ignoring start request, session already active");
            self.ui.status("Recording already in progress");
            return Err(SessionError::AlreadyRecording);
        }
        let mut pipeline = match inner.pipeline.take() {
            Some(pipeline) => pipeline,
            None => self.fresh_pipeline(),
        };

        self.set_phase(SessionPhase::Starting);
        pipeline.reset();

        let available = self.hub.available_sensors();
        let (sender, receiver) = crossbeam_channel::bounded(EVENT_QUEUE_CAPACITY);
        let mut active_sensors = BTreeSet::new();
        for sensor in REQUIRED_SENSORS.iter() {
            if !available.contains(sensor) {
                continue;
            }
            match self.hub.register(sensor, sender.clone()) {
                Ok(()) => {
                    active_sensors.insert(sensor.clone());
                }
                Err(e) => tracing::warn!("Could not listen to {sensor}: {e}"),
            }
        }
        // Only the hub may hold senders, so unregistering ends the capture loop.
        drop(sender);

        let missing: BTreeSet<SensorType> = REQUIRED_SENSORS
            .iter()
            .filter(|sensor| !active_sensors.contains(*sensor))
            .cloned()
            .collect();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|s| s.to_string()).collect();
            tracing::warn!("Sensors not available: {}", names.join(", "));
        }

        let capture = std::thread::spawn(move || pipeline.run(receiver));

        let count = available.len().to_string();
        let sent = send_payload(
            self.transport.as_ref(),
            peer,
            ChannelPath::SensorCount,
            count.as_bytes(),
        )
        .await;
        let sensor_count_sent = match sent {
            Ok(()) => true,
            Err(e) => {
                self.log.record_exchange_failed();
                tracing::warn!("Failed to report sensor count to {peer}: {e}");
                false
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let wake = Arc::new(Notify::new());
        let push_loop = tokio::spawn(run_prediction_loop(PredictionPush {
            transport: Arc::clone(&self.transport),
            peer_node_id: peer.to_string(),
            predictions: self.predictions.clone(),
            log: Arc::clone(&self.log),
            period: self.settings.prediction_period,
            running: Arc::clone(&running),
            wake: Arc::clone(&wake),
        }));

        inner.active = Some(ActiveSession {
            peer_node_id: peer.to_string(),
            active_sensors: active_sensors.clone(),
            running,
            wake,
            capture,
            push_loop,
        });
        self.set_phase(SessionPhase::Recording);

        tracing::info!(
            "Recording for {peer} with {} of {} sensors",
            active_sensors.len(),
            REQUIRED_SENSORS.len()
        );
        self.ui.status("Recording in progress...");

        Ok(SessionReport {
            peer_node_id: peer.to_string(),
            available,
            active: active_sensors,
            missing,
            sensor_count_sent,
        })
    }

    /// Stop recording and ship the session file. `None` when nothing was running.
    pub async fn stop_session(&self) -> Result<Option<StopReport>, SessionError> {
        let mut inner = self.inner.lock().await;
        let Some(session) = inner.active.take() else {
            tracing::debug!("Stop requested while idle");
            return Ok(None);
        };
        let ActiveSession {
            peer_node_id,
            running,
            wake,
            capture,
            push_loop,
            ..
        } = session;

        self.set_phase(SessionPhase::Stopping);
        self.hub.unregister_all();
        running.store(false, Ordering::SeqCst);
        wake.notify_one();

        if let Err(e) = push_loop.await {
            tracing::warn!("Prediction loop ended abnormally: {e}");
        }

        let mut pipeline = match tokio::task::spawn_blocking(move || capture.join()).await {
            Ok(Ok(pipeline)) => pipeline,
            _ => {
                tracing::error!("Capture thread panicked, session data lost");
                inner.pipeline = Some(self.fresh_pipeline());
                self.set_phase(SessionPhase::Idle);
                self.ui.status("Recording failed: capture stopped unexpectedly");
                return Err(SessionError::CaptureLost);
            }
        };

        let rows_exported = pipeline.store().bucket_count();
        let exported = pipeline.store().export_to_file(&self.settings.export_dir);
        let (export_file, transferred) = match exported {
            Ok(path) => {
                if self.transfer_file(&peer_node_id, &path).await {
                    if let Err(e) = std::fs::remove_file(&path) {
                        tracing::warn!("Could not remove {}: {e}", path.display());
                    }
                    (None, true)
                } else {
                    tracing::info!("Session file kept at {}", path.display());
                    (Some(path), false)
                }
            }
            Err(e) => {
                tracing::error!("Failed to export session: {e}");
                (None, false)
            }
        };

        pipeline.reset();
        inner.pipeline = Some(pipeline);
        self.set_phase(SessionPhase::Idle);

        if transferred {
            self.ui.status(&format!("Recording stopped, {rows_exported} rows sent"));
        } else {
            self.ui.status("Recording stopped, session file could not be sent");
        }

        Ok(Some(StopReport {
            peer_node_id,
            rows_exported,
            export_file,
            transferred,
        }))
    }

    /// Stop any running session before the process exits.
    pub async fn shutdown(&self) {
        match self.stop_session().await {
            Ok(Some(report)) => {
                tracing::info!("Session closed on shutdown ({} rows)", report.rows_exported);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session did not close cleanly: {e}"),
        }
    }

    async fn transfer_file(&self, peer: &str, path: &Path) -> bool {
        let result: Result<u64, TransportError> = async {
            let mut channel = self
                .transport
                .open_channel(peer, ChannelPath::SensorFile.as_str())
                .await?;
            let sent = channel.send_file(path).await?;
            channel.close().await?;
            Ok(sent)
        }
        .await;

        match result {
            Ok(bytes) => {
                self.log.record_file_sent();
                tracing::info!("Sent {} ({bytes} bytes) to {peer}", path.display());
                true
            }
            Err(e) => {
                self.log.record_exchange_failed();
                tracing::warn!("Session file transfer to {peer} failed: {e}");
                false
            }
        }
    }

    fn set_phase(&self, phase: SessionPhase) {
        match self.phase.write() {
            Ok(mut guard) => *guard = phase,
            Err(poisoned) => *poisoned.into_inner() = phase,
        }
    }
}

struct PredictionPush {
    transport: Arc<dyn ChannelTransport>,
    peer_node_id: String,
    predictions: PredictionCell,
    log: SharedTransparencyLog,
    period: Duration,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

/// Push the latest prediction once per period until `running` drops.
///
/// Returns only after every exchange it started has finished, so no
/// prediction channel opens once the loop has been joined.
async fn run_prediction_loop(push: PredictionPush) {
    let mut exchanges = JoinSet::new();
    let mut ticks = tokio::time::interval(push.period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticks.tick().await;

    while push.running.load(Ordering::SeqCst) {
        tokio::select! {
            _ = ticks.tick() => {}
            _ = push.wake.notified() => {}
            Some(_) = exchanges.join_next(), if !exchanges.is_empty() => continue,
        }
        if !push.running.load(Ordering::SeqCst) {
            break;
        }

        let Some(prediction) = push.predictions.load() else {
            continue;
        };

        let transport = Arc::clone(&push.transport);
        let log = Arc::clone(&push.log);
        let peer = push.peer_node_id.clone();
        exchanges.spawn(async move {
            let payload = prediction.to_payload();
            match send_payload(transport.as_ref(), &peer, ChannelPath::Prediction, &payload).await {
                Ok(()) => log.record_prediction_sent(),
                Err(e) => {
                    log.record_exchange_failed();
                    tracing::warn!("Prediction push to {peer} failed: {e}");
                }
            }
        });
    }

    while exchanges.join_next().await.is_some() {}
    tracing::debug!("Prediction loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::normalizer::ManualClock;
    use crate::collector::virtual_hub::VirtualSensorHub;
    use crate::core::classifier::{Classifier, ClassifierError};
    use crate::core::store::CSV_HEADER;
    use crate::session::channel::{Channel, InboundEvent};
    use crate::session::memory::MemoryNetwork;
    use crate::session::ui::UiState;
    use crate::transparency::create_shared_log;
    use tokio::sync::mpsc;

    struct Fixture {
        coordinator: SessionCoordinator,
        hub: Arc<VirtualSensorHub>,
        ui: UiState,
        network: MemoryNetwork,
        phone_inbox: mpsc::Receiver<InboundEvent>,
        log: SharedTransparencyLog,
        dir: tempfile::TempDir,
    }

    fn fixture(available: Vec<SensorType>) -> Fixture {
        fixture_with(available, || Box::new(MotionEnergyClassifier::new(6)))
    }

    fn fixture_with<M>(available: Vec<SensorType>, model: M) -> Fixture
    where
        M: Fn() -> Box<dyn Classifier> + Send + Sync + 'static,
    {
        let dir = tempfile::tempdir().unwrap();
        let network = MemoryNetwork::new();
        let (watch, _) = network.join("watch-1", "Watch", &["AGL_MOZGASMERES"]);
        let (_, phone_inbox) = network.join("peer-1", "Phone", &[]);

        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000, 0));
        let hub = Arc::new(VirtualSensorHub::new(available, clock.clone()));
        let ui = UiState::new();
        let log = create_shared_log();

        let build_pipeline: PipelineFactory =
            Box::new(move |predictions: PredictionCell, log: SharedTransparencyLog| {
                CapturePipeline::new(
                    SampleNormalizer::default(),
                    Arc::clone(&clock),
                    InferenceWindow::new(6),
                    ClassifierAdapter::new(model()),
                    predictions,
                    log,
                )
            });
        let coordinator = SessionCoordinator::new(
            Arc::new(watch),
            hub.clone(),
            Arc::new(ui.clone()),
            log.clone(),
            build_pipeline,
            CoordinatorSettings {
                export_dir: dir.path().to_path_buf(),
                prediction_period: Duration::from_millis(20),
            },
        );

        Fixture {
            coordinator,
            hub,
            ui,
            network,
            phone_inbox,
            log,
            dir,
        }
    }

    /// Next channel opened on `path`, skipping others.
    async fn next_channel(inbox: &mut mpsc::Receiver<InboundEvent>, path: ChannelPath) -> Channel {
        let wait = async {
            loop {
                match inbox.recv().await {
                    Some(InboundEvent::ChannelOpened(channel))
                        if channel.path() == path.as_str() =>
                    {
                        return channel;
                    }
                    Some(_) => continue,
                    None => panic!("inbox closed before {path} arrived"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("timed out waiting for channel")
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let mut f = fixture(REQUIRED_SENSORS.to_vec());
        assert_eq!(f.coordinator.stop_session().await, Ok(None));
        assert_eq!(f.coordinator.phase(), SessionPhase::Idle);
        assert_eq!(f.hub.registration_count(), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            f.phone_inbox.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_missing_peer_leaves_idle() {
        let f = fixture(REQUIRED_SENSORS.to_vec());
        assert_eq!(f.coordinator.start_session(None).await, Err(SessionError::MissingPeer));
        assert_eq!(f.coordinator.start_session(Some("  ")).await, Err(SessionError::MissingPeer));

        assert_eq!(f.coordinator.phase(), SessionPhase::Idle);
        assert!(f.hub.registered().is_empty());
        assert!(f.ui.snapshot().status.contains("no companion"));
    }

    #[tokio::test]
    async fn test_sensor_count_and_missing_sensors() {
        let mut f = fixture(vec![SensorType::Accelerometer, SensorType::Gyroscope]);

        let report = f.coordinator.start_session(Some("peer-1")).await.unwrap();
        assert_eq!(report.missing, BTreeSet::from([SensorType::Gravity]));
        assert_eq!(
            report.active,
            BTreeSet::from([SensorType::Accelerometer, SensorType::Gyroscope])
        );
        assert!(report.sensor_count_sent);
        assert_eq!(f.coordinator.phase(), SessionPhase::Recording);

        let mut channel = next_channel(&mut f.phone_inbox, ChannelPath::SensorCount).await;
        assert_eq!(channel.node_id(), "watch-1");
        assert_eq!(channel.read_to_end().await.unwrap(), b"2".to_vec());

        f.coordinator.stop_session().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_start_keeps_registrations() {
        let f = fixture(REQUIRED_SENSORS.to_vec());
        f.coordinator.start_session(Some("peer-1")).await.unwrap();
        assert_eq!(f.hub.registration_count(), 3);

        assert_eq!(
            f.coordinator.start_session(Some("peer-1")).await,
            Err(SessionError::AlreadyRecording)
        );
        assert_eq!(f.hub.registration_count(), 3);
        assert_eq!(f.coordinator.phase(), SessionPhase::Recording);

        let state = f.coordinator.state().await.unwrap();
        assert_eq!(state.peer_node_id, "peer-1");
        assert!(state.running);

        f.coordinator.stop_session().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_exports_and_sends_file() {
        let mut f = fixture(REQUIRED_SENSORS.to_vec());
        f.coordinator.start_session(Some("peer-1")).await.unwrap();
        assert!(f.hub.emit(SensorType::Accelerometer, vec![1.0, 2.0, 3.0], 3));
        assert!(f.hub.emit(SensorType::Gyroscope, vec![4.0, 5.0, 6.0], 3));

        let report = f.coordinator.stop_session().await.unwrap().unwrap();
        assert_eq!(report.rows_exported, 1);
        assert!(report.transferred);
        // Delivered exports are not kept on the watch.
        assert!(report.export_file.is_none());
        assert_eq!(std::fs::read_dir(f.dir.path()).unwrap().count(), 0);
        assert_eq!(f.coordinator.phase(), SessionPhase::Idle);
        assert!(f.hub.registered().is_empty());
        assert!(f.coordinator.state().await.is_none());

        let mut channel = next_channel(&mut f.phone_inbox, ChannelPath::SensorFile).await;
        let body = String::from_utf8(channel.read_to_end().await.unwrap()).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines, vec![CSV_HEADER, "1000,-0.1,-0.2,-0.3,NaN,NaN,NaN,4,5,6"]);
        assert_eq!(f.log.stats().files_sent, 1);
    }

    #[tokio::test]
    async fn test_failed_transfer_still_resets_session() {
        let f = fixture(REQUIRED_SENSORS.to_vec());
        f.coordinator.start_session(Some("peer-1")).await.unwrap();
        f.hub.emit(SensorType::Gravity, vec![0.0, 9.8, 0.0], 3);

        f.network.disconnect("peer-1");
        let report = f.coordinator.stop_session().await.unwrap().unwrap();
        assert!(!report.transferred);
        assert_eq!(report.rows_exported, 1);
        assert!(report.export_file.as_ref().is_some_and(|path| path.exists()));
        assert_eq!(f.coordinator.phase(), SessionPhase::Idle);
        assert!(f.hub.registered().is_empty());
        assert!(f.log.stats().exchanges_failed >= 1);
        assert!(f.ui.snapshot().status.contains("could not be sent"));

        // A later session starts from a clean store even without a peer link.
        let report = f.coordinator.start_session(Some("peer-1")).await.unwrap();
        assert!(!report.sensor_count_sent);
        let report = f.coordinator.stop_session().await.unwrap().unwrap();
        assert_eq!(report.rows_exported, 0);
    }

    #[tokio::test]
    async fn test_prediction_loop_pushes_latest_prediction() {
        let mut f = fixture(REQUIRED_SENSORS.to_vec());
        f.coordinator.start_session(Some("peer-1")).await.unwrap();

        // Two accelerometer triples fill the six-slot window.
        f.hub.emit(SensorType::Accelerometer, vec![0.0, 9.8, 0.0], 3);
        f.hub.emit(SensorType::Accelerometer, vec![0.0, 9.8, 0.1], 3);

        let mut channel = next_channel(&mut f.phone_inbox, ChannelPath::Prediction).await;
        let text = String::from_utf8(channel.read_to_end().await.unwrap()).unwrap();
        let prediction = Prediction::from_payload(&text).unwrap();
        assert_eq!(
            Some(prediction.class_name.clone()),
            f.coordinator.prediction().map(|p| p.class_name)
        );

        f.coordinator.stop_session().await.unwrap();
        assert!(f.coordinator.prediction().is_none());
    }

    #[tokio::test]
    async fn test_no_prediction_channel_after_stop() {
        let mut f = fixture(REQUIRED_SENSORS.to_vec());
        f.coordinator.start_session(Some("peer-1")).await.unwrap();
        f.hub.emit(SensorType::Accelerometer, vec![0.0, 9.8, 0.0], 3);
        f.hub.emit(SensorType::Accelerometer, vec![0.0, 9.8, 0.1], 3);
        next_channel(&mut f.phone_inbox, ChannelPath::Prediction).await;

        f.coordinator.stop_session().await.unwrap();
        while f.phone_inbox.try_recv().is_ok() {}

        // Ten prediction periods without a single late push.
        tokio::time::sleep(Duration::from_millis(200)).await;
        while let Ok(event) = f.phone_inbox.try_recv() {
            if let InboundEvent::ChannelOpened(channel) = event {
                assert_ne!(channel.path(), ChannelPath::Prediction.as_str());
            }
        }
    }

    struct PanickingModel {
        labels: Vec<String>,
    }

    impl Classifier for PanickingModel {
        fn input_len(&self) -> usize {
            6
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn infer(&mut self, _input: &[f32]) -> Result<Vec<f32>, ClassifierError> {
            panic!("model crashed");
        }
    }

    #[tokio::test]
    async fn test_recovers_after_capture_thread_panic() {
        use std::sync::atomic::AtomicUsize;

        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let f = fixture_with(REQUIRED_SENSORS.to_vec(), move || -> Box<dyn Classifier> {
            // Only the first pipeline gets the crashing model.
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Box::new(PanickingModel {
                    labels: vec!["still".into()],
                })
            } else {
                Box::new(MotionEnergyClassifier::new(6))
            }
        });

        f.coordinator.start_session(Some("peer-1")).await.unwrap();
        f.hub.emit(SensorType::Accelerometer, vec![0.0, 9.8, 0.0], 3);
        f.hub.emit(SensorType::Accelerometer, vec![0.0, 9.8, 0.0], 3);
        assert_eq!(f.coordinator.stop_session().await, Err(SessionError::CaptureLost));
        assert_eq!(f.coordinator.phase(), SessionPhase::Idle);
        assert!(f.hub.registered().is_empty());

        f.coordinator.start_session(Some("peer-1")).await.unwrap();
        f.hub.emit(SensorType::Gyroscope, vec![0.1, 0.2, 0.3], 3);
        let report = f.coordinator.stop_session().await.unwrap().unwrap();
        assert_eq!(report.rows_exported, 1);
        assert!(report.transferred);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }
}
