//! Recording against a real headless Chrome
//!
//! These tests launch Chrome, so they are ignored by default.
//!
//! Run: `cargo test --test chrome_recording_test -- --ignored --test-threads=1`

mod test_server;

use robert_recorder::browser::{self, ChromeDriver, ChromeProbe, ConnectionMode, LiveRecording};
use robert_recorder::screenshot::ScreenshotCapturer;
use robert_recorder::step::StepValue;
use robert_recorder::store::StepStore;
use robert_recorder::{
    MemoryStore, PageReadinessDetector, ReadinessConfig, Recorder, RecorderConfig, StepType,
};
use serde_json::Map;
use std::sync::Arc;
use std::time::Duration;
use test_server::TestServer;

async fn launch() -> ChromeDriver {
    ChromeDriver::new(ConnectionMode::Sandboxed {
        chrome_path: None,
        no_sandbox: true,
        headless: true,
    })
    .await
    .expect("Failed to launch Chrome")
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_records_typed_password_masked() {
    let server = TestServer::start().await;
    server.wait_ready().await.expect("Server failed to start");

    let driver = Arc::new(launch().await);
    driver.navigate(&server.url()).await.expect("Failed to navigate");

    let mut config = RecorderConfig::default();
    config.storage.state_file = None;
    let store = Arc::new(MemoryStore::new());
    let recorder = Recorder::new(config, store.clone(), driver.clone(), driver.clone());

    let target = browser::attach(&driver, &recorder).await.expect("attach");
    let live = LiveRecording::start(&driver, recorder.clone())
        .await
        .expect("Failed to install listeners");
    let session_id = recorder.start_recording(Map::new()).await.unwrap();
    println!("🎬 Recording {} on {}", session_id, target);

    driver
        .execute_script(
            r#"(() => {
                const field = document.querySelector('input[name="pwd"]');
                field.focus();
                field.value = 'secret123';
                field.dispatchEvent(new Event('input', { bubbles: true }));
                return true;
            })()"#,
        )
        .await
        .expect("Failed to type");

    // Binding calls arrive asynchronously
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(live.is_running());
    recorder.stop_recording().await.unwrap();

    let session = store.get_session(&session_id).await.unwrap().unwrap();
    let input = session
        .ordered_steps()
        .into_iter()
        .find(|s| s.step_type == StepType::Input)
        .expect("input step recorded");
    assert_eq!(input.selector, "input[name=\"pwd\"]");
    assert_eq!(input.value, Some(StepValue::Text("***MASKED***".to_string())));
    println!("✅ Recorded {} step(s)", session.step_ids.len());

    live.stop();
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_readiness_waits_for_spinner() {
    let server = TestServer::start().await;
    server.wait_ready().await.expect("Server failed to start");

    let driver = launch().await;
    driver
        .navigate(&format!("{}/next", server.url()))
        .await
        .expect("Failed to navigate");

    let probe = ChromeProbe::new(driver.current_page().await.unwrap());
    let state = PageReadinessDetector::new(ReadinessConfig::default())
        .wait_for_page_ready(&probe)
        .await;
    println!("📊 {:?}", state);

    assert!(state.is_ready, "{}", state.reason);
    assert!(state.checks.no_skeletons, "{}", state.reason);
    let text = driver
        .execute_script("document.getElementById('content').textContent")
        .await
        .unwrap();
    assert_eq!(text, "Ready");

    driver.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_capture_current_view_returns_data_url() {
    let server = TestServer::start().await;
    server.wait_ready().await.expect("Server failed to start");

    let driver = launch().await;
    driver.navigate(&server.url()).await.expect("Failed to navigate");
    let target = driver.target_handle().await.unwrap();

    for immediate in [true, false] {
        let image = driver
            .capture_current_view(&target, immediate)
            .await
            .expect("screenshot");
        assert!(image.starts_with("data:image/png;base64,"));
    }

    driver.close().await.expect("Failed to close browser");
}
