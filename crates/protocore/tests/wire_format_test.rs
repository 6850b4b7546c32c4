use protocore::{ExecutionEvent, ExecutionState, OutputRecord, Workflow};
use serde_json::json;

fn parse_frame(frame: &str) -> ExecutionEvent {
    let body = frame
        .strip_prefix("data: ")
        .and_then(|rest| rest.strip_suffix("\n\n"))
        .expect("well-formed frame");
    serde_json::from_str(body).unwrap()
}

#[test]
fn test_editor_payload_survives_save_and_reload() {
    let payload = json!({
        "name": "saved",
        "nodes": {
            "prompt": {
                "data": {"nodeType": "ProtoDynamicTextNode", "nodeInputs": {"text": "hi"}, "label": "Prompt"},
                "position": {"x": 10.0, "y": 20.0}
            },
            "out": {"data": {"nodeType": "ProtoOutputNode", "nodeInputs": {}}}
        },
        "edges": [
            {"id": "e1", "source": "prompt", "sourceHandle": "output", "target": "out", "targetHandle": "content"}
        ]
    });

    let workflow: Workflow = serde_json::from_value(payload).unwrap();
    let saved = serde_json::to_string(&workflow).unwrap();
    let reloaded: Workflow = serde_json::from_str(&saved).unwrap();

    assert_eq!(reloaded.id, workflow.id);
    assert_eq!(reloaded.name, "saved");
    let ids: Vec<_> = reloaded.node_ids().collect();
    assert_eq!(ids, vec!["prompt", "out"]);
    assert_eq!(reloaded.nodes[0].data.label.as_deref(), Some("Prompt"));
    assert_eq!(reloaded.edges[0].id.as_deref(), Some("e1"));
    assert!(reloaded.edges[0].targets("out", "content"));
}

#[test]
fn test_duplicate_node_keys_are_rejected_on_parse() {
    let raw = r#"{"nodes": {"a": {"data": {}}, "a": {"data": {}}}, "edges": []}"#;
    let err = serde_json::from_str::<Workflow>(raw).unwrap_err();
    assert!(err.to_string().contains("duplicate node id: a"));
}

#[test]
fn test_frames_decode_back_into_events() {
    let events = vec![
        ExecutionEvent::workflow_start(),
        ExecutionEvent::NodeStream {
            node_id: "out".to_string(),
            content: json!("partial"),
        },
        ExecutionEvent::NodeComplete {
            node_id: "out".to_string(),
            output: None,
        },
        ExecutionEvent::error("Node a failed: boom"),
    ];

    for event in &events {
        let frame = event.to_sse_frame().unwrap();
        assert!(!frame.trim_end().contains('\n'));
        assert_eq!(&parse_frame(&frame), event);
    }

    let terminal: Vec<bool> = events.iter().map(ExecutionEvent::is_terminal).collect();
    assert_eq!(terminal, vec![false, false, false, true]);
    assert_eq!(events[1].node_id(), Some("out"));
    assert_eq!(events[0].node_id(), None);
}

#[test]
fn test_state_commits_replace_earlier_records() {
    let mut state = ExecutionState::new();
    state.commit("a", OutputRecord::new().with_output("response", "first"));
    state.commit("a", OutputRecord::new().with_output("response", "second"));

    assert_eq!(state.len(), 1);
    assert_eq!(
        state.get("a").and_then(OutputRecord::response),
        Some(&json!("second"))
    );
    assert!(!state.contains("b"));
}
