//! Integration tests for catalog commands dispatched through `WdaSession`:
//! request shapes, response rules, local validation and artifact output.

mod common;

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::json;

use common::{envelope, mock_session, MemorySink};

use wda_core::command::{Button, Command, NotificationKind, Reply, SearchStrategy};
use wda_core::error::{ErrorCategory, WdaError};
use wda_core::snapshot::{AppState, Point};
use wda_core::transport::{Method, TransportError};

const SID: &str = "S1";

fn ack() -> serde_json::Value {
    envelope(json!(""), SID)
}

// ---------------------------------------------------------------------------
// Local validation: nothing is sent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsupported_button_sends_nothing() {
    let (mut session, transport) = mock_session(Some(SID));

    let err = session.press_button_named("power").await.unwrap_err();

    assert!(matches!(err, WdaError::UnsupportedButton(ref name) if name == "power"));
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn legacy_button_code_is_pressed() {
    let (mut session, transport) = mock_session(Some(SID));
    transport.respond(ack());

    session.press_button_named("3").await.unwrap();

    let call = transport.last_call();
    assert_eq!(call.url, "http://device:8100/session/S1/wda/pressButton");
    assert_eq!(call.body.unwrap(), json!({"name": "home"}));
}

#[tokio::test]
async fn relative_url_sends_nothing() {
    let (mut session, transport) = mock_session(Some(SID));

    let err = session.open_url("foo/bar").await.unwrap_err();

    assert!(matches!(err, WdaError::InvalidUrl { .. }));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn absolute_url_is_opened() {
    let (mut session, transport) = mock_session(Some(SID));
    transport.respond(ack());

    session.open_url("https://example.com").await.unwrap();

    let call = transport.last_call();
    assert_eq!(call.method, Method::Post);
    assert_eq!(call.url, "http://device:8100/session/S1/url");
    assert_eq!(call.body.unwrap()["url"], "https://example.com/");
}

#[tokio::test]
async fn session_commands_need_a_session() {
    let (mut session, transport) = mock_session(None);

    assert!(matches!(session.device_info().await, Err(WdaError::NoActiveSession)));
    assert!(matches!(
        session.find_element(SearchStrategy::ClassName, "XCUIElementTypeButton").await,
        Err(WdaError::NoActiveSession)
    ));
    assert!(matches!(session.press_button(Button::Home).await, Err(WdaError::NoActiveSession)));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn global_commands_work_unbound() {
    let (mut session, transport) = mock_session(None);
    transport.respond(json!({"value": "", "sessionId": null}));

    session.launch_unattached("com.example").await.unwrap();

    let call = transport.last_call();
    assert_eq!(call.url, "http://device:8100/wda/apps/launchUnattached");
    assert_eq!(call.body.unwrap(), json!({"bundleId": "com.example"}));
}

// ---------------------------------------------------------------------------
// Ack rule
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ack_with_foreign_session_is_mismatch() {
    let (mut session, transport) = mock_session(Some(SID));
    transport.respond(envelope(json!(""), "OTHER"));

    let err = session.lock().await.unwrap_err();

    assert!(matches!(err, WdaError::ProtocolMismatch { command: "lock", .. }));
    assert_eq!(err.command(), Some("lock"));
}

#[tokio::test]
async fn ack_with_error_value_is_mismatch() {
    let (mut session, transport) = mock_session(Some(SID));
    transport.respond(envelope(json!({"error": "no such alert"}), SID));

    let err = session.accept_alert().await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::ProtocolMismatch);
    assert!(err.to_string().contains("no such alert"));
}

#[tokio::test]
async fn http_error_status_is_network_failure_with_body() {
    let (mut session, transport) = mock_session(Some(SID));
    transport.fail(TransportError::Status {
        status: 404,
        body: br#"{"value":{"error":"unknown command"}}"#.to_vec(),
    });

    let err = session.unlock().await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Network);
    assert_eq!(err.command(), Some("unlock"));
    match err {
        WdaError::Network {
            source: TransportError::Status { status, body },
            ..
        } => {
            assert_eq!(status, 404);
            assert!(String::from_utf8_lossy(&body).contains("unknown command"));
        }
        other => panic!("expected Network status error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let (mut session, transport) = mock_session(Some(SID));
    transport.respond_raw(b"not json".to_vec());

    let err = session.unlock().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::MalformedEnvelope);
}

// ---------------------------------------------------------------------------
// Element search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn find_element_returns_first_match() {
    let (mut session, transport) = mock_session(Some(SID));
    transport.respond(envelope(json!([{"ELEMENT": "e1"}, {"ELEMENT": "e2"}]), SID));

    let id = session
        .find_element(SearchStrategy::ClassName, "XCUIElementTypeButton")
        .await
        .unwrap();

    assert_eq!(id, "e1");
    let call = transport.last_call();
    assert_eq!(call.url, "http://device:8100/session/S1/elements");
    assert_eq!(
        call.body.unwrap(),
        json!({"using": "class name", "value": "XCUIElementTypeButton"})
    );
}

#[tokio::test]
async fn find_element_empty_is_no_element_found() {
    let (mut session, transport) = mock_session(Some(SID));
    transport.respond(envelope(json!([]), SID));

    let err = session
        .find_element(SearchStrategy::ClassName, "XCUIElementTypeButton")
        .await
        .unwrap_err();

    assert!(matches!(err, WdaError::NoElementFound { .. }));
    assert!(err.to_string().contains("XCUIElementTypeButton"));
}

#[tokio::test]
async fn element_interactions_use_element_paths() {
    let (mut session, transport) = mock_session(Some(SID));
    transport.respond(ack()).respond(ack()).respond(ack());

    session.click("e1").await.unwrap();
    session.type_text("e1", "ab").await.unwrap();
    session.clear_text("e1").await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls[0].url, "http://device:8100/session/S1/element/e1/click");
    assert_eq!(calls[1].url, "http://device:8100/session/S1/element/e1/value");
    assert_eq!(calls[1].body.clone().unwrap(), json!({"value": ["a", "b"]}));
    assert_eq!(calls[2].url, "http://device:8100/session/S1/element/e1/clear");
}

// ---------------------------------------------------------------------------
// Structured values
// ---------------------------------------------------------------------------

#[tokio::test]
async fn device_info_tolerates_loose_types() {
    let (mut session, transport) = mock_session(Some(SID));
    transport.respond(envelope(
        json!({
            "timeZone": "Europe/Paris",
            "model": "iPhone",
            "userInterfaceIdiom": "0",
            "isSimulator": "true",
            "name": "Test Phone"
        }),
        SID,
    ));

    let info = session.device_info().await.unwrap();

    assert_eq!(info.time_zone, "Europe/Paris");
    assert_eq!(info.user_interface_idiom, 0);
    assert!(info.is_simulator);
    assert_eq!(info.uuid, "");
    assert_eq!(transport.last_call().url, "http://device:8100/session/S1/wda/device/info");
}

#[tokio::test]
async fn device_info_non_object_is_malformed() {
    let (mut session, transport) = mock_session(Some(SID));
    transport.respond(envelope(json!("oops"), SID));

    assert!(matches!(
        session.device_info().await,
        Err(WdaError::MalformedEnvelope { command: "device-info", .. })
    ));
}

#[tokio::test]
async fn status_reads_nested_fields() {
    let (mut session, transport) = mock_session(None);
    transport.respond(json!({
        "value": {
            "ready": true,
            "state": "success",
            "os": {"name": "iOS", "version": "17.2", "sdkVersion": "17.2"},
            "ios": {"ip": "192.168.1.20"},
            "build": {"version": "6.0.0"}
        },
        "sessionId": null
    }));

    let status = session.status().await.unwrap();

    assert!(status.ready);
    assert_eq!(status.os_version, "17.2");
    assert_eq!(status.ip, "192.168.1.20");
    assert_eq!(status.state, "success");
    assert_eq!(transport.last_call().method, Method::Get);
}

#[tokio::test]
async fn app_state_and_list() {
    let (mut session, transport) = mock_session(Some(SID));
    transport
        .respond(envelope(json!(4), SID))
        .respond(envelope(json!([{"pid": 12, "bundleId": "com.a"}, {"pid": "13", "bundleId": "com.b"}]), SID));

    assert_eq!(session.app_state("com.a").await.unwrap(), AppState::RunningForeground);
    let apps = session.app_list().await.unwrap();

    assert_eq!(apps.len(), 2);
    assert_eq!(apps[1].pid, 13);
    assert_eq!(transport.calls()[0].body.clone().unwrap(), json!({"bundleId": "com.a"}));
}

#[tokio::test]
async fn screen_and_window_sizes() {
    let (mut session, transport) = mock_session(Some(SID));
    transport
        .respond(envelope(json!({"width": 390, "height": 844}), SID))
        .respond(envelope(
            json!({"statusBarSize": {"width": 390, "height": 47}, "scale": 3, "screenSize": {"width": 390, "height": 844}}),
            SID,
        ));

    let window = session.window_size().await.unwrap();
    let screen = session.screen_size().await.unwrap();

    assert_eq!((window.width, window.height), (390, 844));
    assert_eq!(screen.scale, 3);
    assert_eq!(screen.status_bar_size.height, 47);
    assert_eq!(screen.to_pixels(10.0), 30.0);
}

#[tokio::test]
async fn orientation_and_alert_text_are_strings() {
    let (mut session, transport) = mock_session(Some(SID));
    transport
        .respond(envelope(json!("PORTRAIT"), SID))
        .respond(envelope(json!("Allow access?"), SID));

    assert_eq!(session.orientation().await.unwrap(), "PORTRAIT");
    assert_eq!(session.alert_text().await.unwrap(), "Allow access?");
    assert_eq!(transport.calls()[1].url, "http://device:8100/session/S1/alert/text");
}

// ---------------------------------------------------------------------------
// Boolean rule
// ---------------------------------------------------------------------------

#[tokio::test]
async fn terminate_false_is_mismatch() {
    let (mut session, transport) = mock_session(Some(SID));
    transport
        .respond(envelope(json!(true), SID))
        .respond(envelope(json!(false), SID));

    session.terminate_app("com.example").await.unwrap();
    let err = session.terminate_app("com.example").await.unwrap_err();

    assert!(matches!(err, WdaError::ProtocolMismatch { command: "terminate-app", .. }));
}

#[tokio::test]
async fn is_locked_reports_value() {
    let (mut session, transport) = mock_session(Some(SID));
    transport.respond(envelope(json!(false), SID));

    assert!(!session.is_locked().await.unwrap());
    assert_eq!(transport.last_call().url, "http://device:8100/session/S1/wda/locked");
}

// ---------------------------------------------------------------------------
// Gestures and system
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gestures_send_coordinates() {
    let (mut session, transport) = mock_session(Some(SID));
    for _ in 0..4 {
        transport.respond(ack());
    }

    session.tap(Point::new(10.0, 20.0)).await.unwrap();
    session.double_tap(Point::new(1.5, 2.5)).await.unwrap();
    session.touch_and_hold(Point::new(5.0, 6.0), 2.0).await.unwrap();
    session
        .drag(Point::new(0.0, 0.0), Point::new(100.0, 200.0), 0.5)
        .await
        .unwrap();

    let calls = transport.calls();
    assert_eq!(calls[0].body.clone().unwrap(), json!({"x": 10.0, "y": 20.0}));
    assert!(calls[1].url.ends_with("/wda/doubleTap"));
    assert_eq!(
        calls[2].body.clone().unwrap(),
        json!({"x": 5.0, "y": 6.0, "duration": 2.0})
    );
    assert_eq!(
        calls[3].body.clone().unwrap(),
        json!({"fromX": 0.0, "fromY": 0.0, "toX": 100.0, "toY": 200.0, "duration": 0.5})
    );
}

#[tokio::test]
async fn notification_siri_and_app_control() {
    let (mut session, transport) = mock_session(Some(SID));
    for _ in 0..4 {
        transport.respond(ack());
    }

    session
        .expect_notification("done", NotificationKind::Plain, 10.0)
        .await
        .unwrap();
    session.activate_siri("what time is it").await.unwrap();
    session.deactivate_app(3.0).await.unwrap();
    session.reset_app_auth("camera").await.unwrap();

    let calls = transport.calls();
    assert_eq!(
        calls[0].body.clone().unwrap(),
        json!({"name": "done", "type": "plain", "timeout": 10.0})
    );
    assert_eq!(calls[1].body.clone().unwrap(), json!({"text": "what time is it"}));
    assert_eq!(calls[2].body.clone().unwrap(), json!({"duration": 3.0}));
    assert_eq!(calls[3].body.clone().unwrap(), json!({"resource": "camera"}));
}

#[tokio::test]
async fn run_exposes_raw_replies() {
    let (mut session, transport) = mock_session(Some(SID));
    transport.respond(envelope(json!("LANDSCAPE"), SID));

    let reply = session.run(Command::Orientation).await.unwrap();
    assert_eq!(reply, Reply::Value(json!("LANDSCAPE")));
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn screenshot_extension_handling() {
    let (session, transport) = mock_session(None);
    let sink = MemorySink::new();
    let mut session = session.with_artifact_sink(sink.clone());
    let png = b"\x89PNG\r\n\x1a\n".to_vec();
    let body = json!({"value": STANDARD.encode(&png), "sessionId": null});
    transport.respond(body.clone()).respond(body);

    let first = session.screenshot(Path::new("/tmp/out"), "shot").await.unwrap();
    let second = session.screenshot(Path::new("/tmp/out"), "shot.jpg").await.unwrap();

    assert!(first.ends_with("shot.png"));
    assert!(second.ends_with("shot.jpg"));
    let written = sink.written();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0].1, png);
    assert_eq!(transport.last_call().url, "http://device:8100/screenshot");
}

#[tokio::test]
async fn screenshot_bad_base64_writes_nothing() {
    let (session, transport) = mock_session(None);
    let sink = MemorySink::new();
    let mut session = session.with_artifact_sink(sink.clone());
    transport.respond(json!({"value": "%%%not base64%%%"}));

    let err = session.screenshot(Path::new("out"), "shot").await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::MalformedEnvelope);
    assert!(sink.written().is_empty());
}

#[tokio::test]
async fn screenshot_sink_failure_is_artifact_error() {
    let (session, transport) = mock_session(None);
    let mut session = session.with_artifact_sink(MemorySink::failing());
    transport.respond(json!({"value": STANDARD.encode(b"img")}));

    let err = session.screenshot(Path::new("out"), "shot").await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Artifact);
    assert!(err.to_string().contains("shot.png"));
}

#[tokio::test]
async fn page_source_saved_as_xml() {
    let (session, transport) = mock_session(None);
    let sink = MemorySink::new();
    let mut session = session.with_artifact_sink(sink.clone());
    transport.respond(json!({"value": "<XCUIElementTypeApplication/>"}));

    let path = session.save_page_source(Path::new("dump"), "tree").await.unwrap();

    assert!(path.ends_with("tree.xml"));
    assert_eq!(sink.written()[0].1, b"<XCUIElementTypeApplication/>".to_vec());
}
