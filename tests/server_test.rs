//! Integration tests for the companion control server

#[cfg(feature = "server")]
mod server_tests {
    use motion_sensor_agent::collector::{Clock, ManualClock, VirtualSensorHub, REQUIRED_SENSORS};
    use motion_sensor_agent::config::Config;
    use motion_sensor_agent::server::{run, ServerConfig, ServerState};
    use motion_sensor_agent::session::{
        CompanionController, MemoryNetwork, SessionCoordinator, SessionPhase, UiState,
        WearableService,
    };
    use motion_sensor_agent::transparency::create_shared_log;
    use std::sync::Arc;
    use std::time::Duration;

    const CAPABILITY: &str = "AGL_MOZGASMERES";

    fn companion_state(network: &MemoryNetwork) -> Arc<ServerState> {
        let (phone, _inbox) = network.join("phone-1", "Phone", &[]);
        let ui = UiState::new();
        let controller =
            CompanionController::new(Arc::new(phone), Arc::new(ui.clone()), CAPABILITY);
        Arc::new(ServerState::new(controller, ui, create_shared_log()))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let network = MemoryNetwork::new();
        let (addr, shutdown_tx) = run(ServerConfig::new(0), companion_state(&network))
            .await
            .expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_start_without_watch_is_not_found() {
        let network = MemoryNetwork::new();
        let (addr, shutdown_tx) = run(ServerConfig::new(0), companion_state(&network))
            .await
            .expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/recording/start", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "NO_WATCH");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_recording_endpoints_drive_watch() {
        let export_dir = tempfile::tempdir().unwrap();
        let network = MemoryNetwork::new();

        let (watch, watch_inbox) = network.join("watch-1", "Watch", &[CAPABILITY]);
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0, 0));
        let hub = Arc::new(VirtualSensorHub::new(REQUIRED_SENSORS.to_vec(), clock.clone()));
        let config = Config {
            export_path: export_dir.path().to_path_buf(),
            ..Config::default()
        };
        let coordinator = Arc::new(SessionCoordinator::from_config(
            &config,
            Arc::new(watch),
            hub,
            Arc::new(UiState::new()),
            clock,
            create_shared_log(),
        ));
        tokio::spawn(WearableService::new(coordinator.clone()).run(watch_inbox));

        let (addr, shutdown_tx) = run(ServerConfig::new(0), companion_state(&network))
            .await
            .expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/recording/start", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "recording");
        assert_eq!(body["nodes"][0]["id"], "watch-1");

        for _ in 0..100 {
            if coordinator.phase() == SessionPhase::Recording {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(coordinator.phase(), SessionPhase::Recording);

        let status: serde_json::Value = client
            .get(format!("http://{}/status", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert!(status["ui"]["status"].as_str().unwrap().starts_with("Watch connected"));
        assert!(status["stats"]["files_sent"].is_u64());

        let response = client
            .post(format!("http://{}/recording/stop", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let network = MemoryNetwork::new();
        let (addr, shutdown_tx) = run(ServerConfig::new(0), companion_state(&network))
            .await
            .expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Send OPTIONS request to check CORS
        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/recording/start", addr))
            .header("Origin", "http://localhost")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .expect("Failed to send request");

        // CORS preflight should succeed
        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );

        let _ = shutdown_tx.send(());
    }
}
