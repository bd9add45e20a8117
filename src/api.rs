//! HTTP front end over the [`MessageBus`]
//!
//! Every route answers with the `{success, error, data}` envelope; failures
//! use `400 Bad Request`.

use crate::bus::{Command, CommandResponse, MessageBus};
use serde_json::{Map, Value};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::Filter;

pub fn routes(
    bus: MessageBus,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let health =
        warp::path("health").map(|| warp::reply::json(&serde_json::json!({ "status": "ok" })));

    let start = warp::path!("recording" / "start")
        .and(warp::post())
        .and(warp::body::bytes())
        .and(with_bus(bus.clone()))
        .and_then(handle_start);

    let stop = warp::path!("recording" / "stop")
        .and(warp::post())
        .and(with_bus(bus.clone()))
        .and_then(|bus: MessageBus| relay(bus, Command::StopRecording));

    let state = warp::path!("state")
        .and(warp::get())
        .and(with_bus(bus.clone()))
        .and_then(|bus: MessageBus| relay(bus, Command::GetState));

    let get_session = warp::path!("sessions" / String)
        .and(warp::get())
        .and(with_bus(bus.clone()))
        .and_then(|session_id: String, bus: MessageBus| {
            relay(bus, Command::GetSession { session_id })
        });

    let delete_session = warp::path!("sessions" / String)
        .and(warp::delete())
        .and(with_bus(bus.clone()))
        .and_then(|session_id: String, bus: MessageBus| {
            relay(bus, Command::DeleteSession { session_id })
        });

    let ready = warp::path!("ready")
        .and(warp::post())
        .and(with_bus(bus.clone()))
        .and_then(|bus: MessageBus| relay(bus, Command::WaitForPageReady));

    let capture = warp::path!("capture")
        .and(warp::post())
        .and(with_bus(bus))
        .and_then(|bus: MessageBus| relay(bus, Command::CaptureNow));

    health
        .or(start)
        .or(stop)
        .or(state)
        .or(get_session)
        .or(delete_session)
        .or(ready)
        .or(capture)
}

fn with_bus(
    bus: MessageBus,
) -> impl Filter<Extract = (MessageBus,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || bus.clone())
}

async fn handle_start(body: Bytes, bus: MessageBus) -> Result<impl warp::Reply, warp::Rejection> {
    let metadata = if body.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        match serde_json::from_slice::<Map<String, Value>>(&body) {
            Ok(metadata) => metadata,
            Err(e) => {
                return Ok(reply(CommandResponse::failure(format!(
                    "Invalid session metadata: {}",
                    e
                ))))
            }
        }
    };
    Ok(reply(bus.request(Command::StartRecording { metadata }).await))
}

async fn relay(bus: MessageBus, command: Command) -> Result<impl warp::Reply, warp::Rejection> {
    log::debug!("HTTP {}", command.name());
    Ok(reply(bus.request(command).await))
}

fn reply(response: CommandResponse) -> warp::reply::WithStatus<warp::reply::Json> {
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    warp::reply::with_status(warp::reply::json(&response), status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecorderConfig;
    use crate::screenshot::{AssumeLoaded, ScreenshotCapturer, TargetHandle};
    use crate::session::Recorder;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoScreenshots;

    #[async_trait]
    impl ScreenshotCapturer for NoScreenshots {
        async fn capture_current_view(&self, _target: &TargetHandle, _immediate: bool) -> Option<String> {
            None
        }
    }

    fn bus() -> MessageBus {
        let mut config = RecorderConfig::default();
        config.storage.state_file = None;
        let recorder = Recorder::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(NoScreenshots),
            Arc::new(AssumeLoaded),
        );
        MessageBus::spawn(recorder)
    }

    #[tokio::test]
    async fn test_health() {
        let response = warp::test::request().path("/health").reply(&routes(bus())).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_state_starts_idle() {
        let response = warp::test::request().path("/state").reply(&routes(bus())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "idle");
    }

    #[tokio::test]
    async fn test_start_without_page_fails() {
        let response = warp::test::request()
            .method("POST")
            .path("/recording/start")
            .body(r#"{"name": "checkout"}"#)
            .reply(&routes(bus()))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["error"], "No page available");
    }

    #[tokio::test]
    async fn test_start_rejects_malformed_metadata() {
        let response = warp::test::request()
            .method("POST")
            .path("/recording/start")
            .body("[1, 2]")
            .reply(&routes(bus()))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("Invalid session metadata"));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let response = warp::test::request().path("/sessions/missing").reply(&routes(bus())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["error"], "Session not found: missing");
    }
}
