//! Event capture end to end: browser event in, stored step out

mod fixtures;

use fixtures::{click, event, harness, login_page, typed};
use robert_recorder::capture::{EventKind, Modifiers, NavigationTrigger};
use robert_recorder::step::{CaptureMode, StepValue};
use robert_recorder::store::StepStore;
use robert_recorder::{PageHandle, RecorderError, Step, StepType};
use serde_json::Map;

async fn stored_steps(h: &fixtures::Harness, session_id: &str) -> Vec<Step> {
    let session = h.store.get_session(session_id).await.unwrap().unwrap();
    session.ordered_steps().into_iter().cloned().collect()
}

// ===== SCENARIOS =====

#[tokio::test(start_paused = true)]
async fn test_click_on_stable_id_button() {
    let page = login_page();
    let submit = page.submit;
    let h = harness(page.doc.clone()).await;
    let session_id = h.recorder.start_recording(Map::new()).await.unwrap();

    let step_id = h
        .recorder
        .handle_event(&page.doc, &click(submit))
        .await
        .unwrap()
        .expect("click should be recorded");
    h.recorder.stop_recording().await.unwrap();

    let steps = stored_steps(&h, &session_id).await;
    assert_eq!(steps.len(), 1);
    let step = &steps[0];
    assert_eq!(step.id, step_id);
    assert_eq!(step.step_type, StepType::Click);
    assert_eq!(step.selector, "#submit-btn");
    assert_eq!(step.metadata["text"], "Sign in");
    assert_eq!(step.metadata["captureTiming"], "afterReadiness");

    let visual = step.visual.as_ref().expect("screenshot attached");
    assert_eq!(visual.mode, CaptureMode::AfterReadiness);
    assert!(visual.readiness.as_ref().unwrap().is_ready);
    assert!(!h.screenshots.calls()[0].immediate);
}

#[tokio::test(start_paused = true)]
async fn test_password_input_is_masked() {
    let page = login_page();
    let h = harness(page.doc.clone()).await;
    let session_id = h.recorder.start_recording(Map::new()).await.unwrap();

    for value in ["secret123", ""] {
        h.recorder
            .handle_event(&page.doc, &typed(page.password, value))
            .await
            .unwrap()
            .unwrap();
    }
    h.recorder.stop_recording().await.unwrap();

    let steps = stored_steps(&h, &session_id).await;
    assert_eq!(steps.len(), 2);
    for step in &steps {
        assert_eq!(step.step_type, StepType::Input);
        assert_eq!(step.value, Some(StepValue::Text("***MASKED***".to_string())));
        assert_eq!(step.metadata["masked"], true);
        assert!(step.visual.is_none());
    }
    // Inputs never trigger screenshots
    assert!(h.screenshots.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_mirrored_password_never_reaches_the_session() {
    let mut page = login_page();
    // Controlled inputs mirror what was typed into the value attribute
    page.doc.set_attribute(page.password, "value", "secret123");
    let h = harness(page.doc.clone()).await;
    let session_id = h.recorder.start_recording(Map::new()).await.unwrap();

    for e in [
        event(Some(page.password), EventKind::Focus),
        typed(page.password, "secret123"),
        event(Some(page.password), EventKind::Blur),
    ] {
        h.recorder.handle_event(&page.doc, &e).await.unwrap().unwrap();
    }
    h.recorder.stop_recording().await.unwrap();

    let session = h.store.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.step_ids.len(), 3);
    for step in session.ordered_steps() {
        let context = step.element_context.as_ref().unwrap();
        assert_eq!(context.attributes["value"], "***MASKED***");
    }
    let json = serde_json::to_string(&session).unwrap();
    assert!(!json.contains("secret123"));
}

#[tokio::test(start_paused = true)]
async fn test_link_click_captures_immediately() {
    let page = login_page();
    let h = harness(page.doc.clone()).await;
    let session_id = h.recorder.start_recording(Map::new()).await.unwrap();

    h.recorder
        .handle_event(&page.doc, &click(page.next_link))
        .await
        .unwrap()
        .unwrap();

    // The capture happened before handle_event returned, with no readiness wait
    let calls = h.screenshots.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].immediate);

    h.recorder.stop_recording().await.unwrap();
    let steps = stored_steps(&h, &session_id).await;
    assert_eq!(steps[0].metadata["href"], "/next");
    let visual = steps[0].visual.as_ref().unwrap();
    assert_eq!(visual.mode, CaptureMode::Immediate);
    assert!(visual.readiness.is_none());
    assert_eq!(h.screenshots.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_tab_link_waits_for_readiness() {
    let mut page = login_page();
    page.doc.set_attribute(page.next_link, "target", "_blank");
    let h = harness(page.doc.clone()).await;
    let session_id = h.recorder.start_recording(Map::new()).await.unwrap();

    h.recorder
        .handle_event(&page.doc, &click(page.next_link))
        .await
        .unwrap()
        .unwrap();
    h.recorder.stop_recording().await.unwrap();

    // The original page stays loaded, so it is captured settled
    let steps = stored_steps(&h, &session_id).await;
    assert_eq!(steps[0].metadata["captureTiming"], "afterReadiness");
    let visual = steps[0].visual.as_ref().unwrap();
    assert_eq!(visual.mode, CaptureMode::AfterReadiness);
    assert!(!h.screenshots.calls()[0].immediate);
}

// ===== OTHER ELEMENT KINDS =====

#[tokio::test(start_paused = true)]
async fn test_plain_input_keeps_its_value() {
    let page = login_page();
    let h = harness(page.doc.clone()).await;
    let session_id = h.recorder.start_recording(Map::new()).await.unwrap();

    h.recorder
        .handle_event(&page.doc, &typed(page.email, "ada@example.com"))
        .await
        .unwrap()
        .unwrap();
    h.recorder.stop_recording().await.unwrap();

    let step = &stored_steps(&h, &session_id).await[0];
    assert_eq!(step.value, Some(StepValue::Text("ada@example.com".to_string())));
    assert_eq!(step.metadata["inputType"], "email");
    assert_eq!(step.selector, "input[name=\"email\"]");
}

#[tokio::test(start_paused = true)]
async fn test_checkbox_change_and_form_submit() {
    let page = login_page();
    let h = harness(page.doc.clone()).await;
    let session_id = h.recorder.start_recording(Map::new()).await.unwrap();

    let change = event(
        Some(page.remember),
        EventKind::Change {
            checked: Some(true),
            value: Some("on".to_string()),
            selected_index: None,
        },
    );
    h.recorder.handle_event(&page.doc, &change).await.unwrap().unwrap();
    h.recorder
        .handle_event(&page.doc, &event(Some(page.form), EventKind::Submit))
        .await
        .unwrap()
        .unwrap();
    h.recorder.stop_recording().await.unwrap();

    let steps = stored_steps(&h, &session_id).await;
    assert_eq!(steps[0].step_type, StepType::Change);
    assert_eq!(steps[0].value, Some(StepValue::Checked(true)));
    assert_eq!(steps[1].step_type, StepType::Submit);
    assert_eq!(steps[1].selector, "#login");
    assert_eq!(steps[1].metadata["method"], "post");
    assert_eq!(steps[1].visual.as_ref().unwrap().mode, CaptureMode::Immediate);
}

#[tokio::test(start_paused = true)]
async fn test_window_level_steps() {
    let page = login_page();
    let h = harness(page.doc.clone()).await;
    let session_id = h.recorder.start_recording(Map::new()).await.unwrap();

    let navigation = event(
        None,
        EventKind::Navigation {
            url: "https://app.test/dashboard?tab=2#recent".to_string(),
            trigger: NavigationTrigger::PushState,
        },
    );
    h.recorder.handle_event(&page.doc, &navigation).await.unwrap().unwrap();
    let scroll = event(
        None,
        EventKind::Scroll {
            scroll_x: 0.0,
            scroll_y: 640.0,
        },
    );
    h.recorder.handle_event(&page.doc, &scroll).await.unwrap().unwrap();
    h.recorder.stop_recording().await.unwrap();

    let steps = stored_steps(&h, &session_id).await;
    assert_eq!(steps[0].step_type, StepType::Navigation);
    assert_eq!(steps[0].selector, "window");
    assert_eq!(steps[0].metadata["path"], "/dashboard");
    assert_eq!(steps[0].metadata["query"], "?tab=2");
    assert_eq!(steps[0].metadata["hash"], "#recent");
    assert_eq!(steps[0].metadata["trigger"], "pushState");
    assert_eq!(steps[0].visual.as_ref().unwrap().mode, CaptureMode::AfterReadiness);

    assert_eq!(steps[1].step_type, StepType::Scroll);
    assert_eq!(steps[1].metadata["scrollY"], 640.0);
    assert!(steps[1].visual.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_page_load_waits_for_load_complete() {
    let page = login_page();
    let h = harness(page.doc.clone()).await;
    let session_id = h.recorder.start_recording(Map::new()).await.unwrap();

    let load = event(
        None,
        EventKind::PageLoad {
            url: "https://app.test/login".to_string(),
            title: Some("Sign in".to_string()),
        },
    );
    h.recorder.handle_event(&page.doc, &load).await.unwrap().unwrap();
    h.recorder.stop_recording().await.unwrap();

    let step = &stored_steps(&h, &session_id).await[0];
    assert_eq!(step.step_type, StepType::PageLoad);
    assert_eq!(step.metadata["title"], "Sign in");
    assert_eq!(step.visual.as_ref().unwrap().mode, CaptureMode::AfterLoadComplete);
}

// ===== FILTERING =====

#[tokio::test(start_paused = true)]
async fn test_noise_is_filtered() {
    let mut page = login_page();
    let body = page.doc.body().unwrap();
    let script = page.doc.element(body, "script", &[("src", "/app.js")]);
    let detached = page.doc.create_element("button");

    let h = harness(page.doc.clone()).await;
    let session_id = h.recorder.start_recording(Map::new()).await.unwrap();

    let ignored = [
        click(script),
        click(detached),
        typed(page.remember, "on"),
        event(
            Some(page.email),
            EventKind::Keypress {
                key: "a".to_string(),
                modifiers: Modifiers::default(),
            },
        ),
        event(None, EventKind::Hover),
    ];
    for e in &ignored {
        let recorded = h.recorder.handle_event(&page.doc, e).await.unwrap();
        assert_eq!(recorded, None, "{:?} should be dropped", e.kind);
    }

    let enter = event(
        Some(page.email),
        EventKind::Keypress {
            key: "Enter".to_string(),
            modifiers: Modifiers::default(),
        },
    );
    assert!(h.recorder.handle_event(&page.doc, &enter).await.unwrap().is_some());
    h.recorder.stop_recording().await.unwrap();

    let steps = stored_steps(&h, &session_id).await;
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].metadata["key"], "Enter");
}

#[tokio::test]
async fn test_events_outside_a_recording_are_rejected() {
    let page = login_page();
    let h = harness(page.doc.clone()).await;
    let result = h.recorder.handle_event(&page.doc, &click(page.submit)).await;
    assert!(matches!(result, Err(RecorderError::NotRecording)));
}
