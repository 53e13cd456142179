//! End-to-end tests: a real kernel actor driving the scripted engine.

use std::time::Duration;

use futures::FutureExt;
use hashi_kernel::{
    EngineScript, HashiConfig, KernelError, KernelHandle, KernelSession, ScriptedDisplay,
    ScriptedEvent, ScriptedLoader, spawn_kernel,
};
use hashi_types::{
    CompleteRequest, ExecuteRequest, Header, Message, MimeBundle, MsgType, SessionId, StreamName,
};
use tokio::sync::{broadcast, oneshot};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn script() -> EngineScript {
    EngineScript::default()
        .vocabulary(["print", "property", "range"])
        .entry(
            "x = 2; x",
            vec![ScriptedEvent::Finished { result: Some(MimeBundle::plain("2")) }],
        )
        .entry(
            "print('hi')",
            vec![
                ScriptedEvent::Output { stream: StreamName::Stdout, content: "hi\n".into() },
                ScriptedEvent::Output { stream: StreamName::Stderr, content: "warn\n".into() },
                ScriptedEvent::Finished { result: None },
            ],
        )
        .entry(
            "1/0",
            vec![ScriptedEvent::Error {
                ename: "ZeroDivisionError".into(),
                evalue: "division by zero".into(),
                traceback: vec!["Traceback (most recent call last):".into()],
            }],
        )
        .entry(
            "print('a'); 2",
            vec![
                ScriptedEvent::Output { stream: StreamName::Stdout, content: "a\n".into() },
                ScriptedEvent::Finished { result: Some(MimeBundle::plain("2")) },
            ],
        )
        .entry(
            "print('b'); 1/0",
            vec![
                ScriptedEvent::Output { stream: StreamName::Stdout, content: "b\n".into() },
                ScriptedEvent::Error {
                    ename: "ZeroDivisionError".into(),
                    evalue: "division by zero".into(),
                    traceback: vec![],
                },
            ],
        )
        .entry(
            "plot()",
            vec![
                ScriptedEvent::Display {
                    display_type: "matplotlib".into(),
                    content: ScriptedDisplay::Node {
                        tag: "canvas".into(),
                        attributes: vec![],
                        inner: String::new(),
                    },
                },
                ScriptedEvent::Finished { result: None },
            ],
        )
        .entry(
            "turtle.done()",
            vec![
                ScriptedEvent::Display {
                    display_type: "turtle".into(),
                    content: ScriptedDisplay::Node {
                        tag: "svg".into(),
                        attributes: vec![("viewBox".into(), "0 0 10 10".into())],
                        inner: "<path/>".into(),
                    },
                },
                ScriptedEvent::Finished { result: None },
            ],
        )
        .entry(
            "show()",
            vec![
                ScriptedEvent::Display {
                    display_type: "bokeh".into(),
                    content: ScriptedDisplay::Text("?".into()),
                },
                ScriptedEvent::Display {
                    display_type: "html".into(),
                    content: ScriptedDisplay::Text("<b>ok</b>".into()),
                },
                ScriptedEvent::Finished { result: None },
            ],
        )
}

fn kernel() -> KernelHandle {
    init_tracing();
    spawn_kernel(ScriptedLoader::new(script()), &HashiConfig::default())
}

fn request_header() -> Header {
    Header::new(MsgType::ExecuteRequest, SessionId::new())
}

fn drain(rx: &mut broadcast::Receiver<Message>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

// ============================================================================
// Readiness
// ============================================================================

#[tokio::test]
async fn test_requests_wait_for_load_and_init() {
    init_tracing();
    let (load_tx, load_rx) = oneshot::channel();
    let (init_tx, init_rx) = oneshot::channel();
    let loader = ScriptedLoader::new(script())
        .with_load_gate(load_rx)
        .with_init_gate(init_rx);
    let kernel = spawn_kernel(loader, &HashiConfig::default());

    assert!(kernel.ready().now_or_never().is_none());

    let queued = {
        let kernel = kernel.clone();
        tokio::spawn(async move {
            kernel
                .execute(&ExecuteRequest::new("x = 2; x"), request_header(), 1)
                .await
        })
    };

    load_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!kernel.is_ready(), "init has not run yet");
    assert!(!queued.is_finished());

    init_tx.send(()).unwrap();
    kernel.ready().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(1), queued)
        .await
        .expect("queued request served after readiness")
        .unwrap()
        .unwrap();
    assert_eq!(result.data.get_str("text/plain"), Some("2"));
}

#[tokio::test]
async fn test_init_failure_reported() {
    init_tracing();
    let (init_tx, init_rx) = oneshot::channel::<()>();
    let kernel = spawn_kernel(
        ScriptedLoader::new(script()).with_init_gate(init_rx),
        &HashiConfig::default(),
    );
    drop(init_tx);

    let err = kernel.ready().await.unwrap_err();
    assert!(matches!(err, KernelError::LoadFailed(ref m) if m.contains("init gate dropped")));

    let err = kernel
        .complete(&CompleteRequest { code: "pr".into(), cursor_pos: 2 })
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::LoadFailed(_)));
}

#[tokio::test]
async fn test_kernel_info_is_stable() {
    let kernel = kernel();
    let before = kernel.kernel_info();
    kernel.ready().await.unwrap();
    let after = kernel.kernel_info();

    assert_eq!(before, after);
    assert_eq!(after.implementation, "pyodide");
    assert_eq!(after.protocol_version, "5.3");
    assert_eq!(after.language_info.file_extension, ".py");
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_execute_returns_bundle_and_count() {
    let kernel = kernel();
    let result = kernel
        .execute(&ExecuteRequest::new("x = 2; x"), request_header(), 7)
        .await
        .unwrap();

    assert_eq!(result.execution_count, 7);
    assert_eq!(result.data, MimeBundle::plain("2"));
    assert!(result.metadata.is_empty());
}

#[tokio::test]
async fn test_execute_error_carries_parent_header() {
    let kernel = kernel();
    let parent = request_header();
    let err = kernel
        .execute(&ExecuteRequest::new("1/0"), parent.clone(), 1)
        .await
        .unwrap_err();

    let e = match err {
        KernelError::Execution(e) => e,
        other => panic!("expected execution error, got {other:?}"),
    };
    assert_eq!(e.parent, parent);
    assert_eq!(e.error.ename, "ZeroDivisionError");
    assert_eq!(e.error.evalue, "division by zero");
    assert_eq!(e.error.traceback.len(), 1);
}

#[tokio::test]
async fn test_output_arrives_before_reply() {
    let kernel = kernel();
    let mut iopub = kernel.subscribe_iopub();
    let parent = request_header();

    kernel
        .execute(&ExecuteRequest::new("print('hi')"), parent.clone(), 1)
        .await
        .unwrap();

    let msgs = drain(&mut iopub);
    assert_eq!(msgs.len(), 2);
    for msg in &msgs {
        assert_eq!(msg.msg_type(), MsgType::Stream);
        assert_eq!(msg.parent_header.as_ref(), Some(&parent));
        assert_eq!(msg.header.session, parent.session);
    }
    assert_eq!(msgs[0].content["name"], "stdout");
    assert_eq!(msgs[0].content["text"], "hi\n");
    assert_eq!(msgs[1].content["name"], "stderr");
}

#[tokio::test]
async fn test_concurrent_executions_resolve_in_order() {
    let kernel = kernel();
    let mut iopub = kernel.subscribe_iopub();
    let first = request_header();
    let second = request_header();
    let ok = ExecuteRequest::new("print('a'); 2");
    let raises = ExecuteRequest::new("print('b'); 1/0");

    let (a, b) = tokio::join!(
        kernel.execute(&ok, first.clone(), 1),
        kernel.execute(&raises, second.clone(), 2),
    );

    assert_eq!(a.unwrap().data.get_str("text/plain"), Some("2"));
    let Err(KernelError::Execution(e)) = b else {
        panic!("second execution should fail");
    };
    assert_eq!(e.parent, second);

    // Each stream chunk is parented to the request that produced it.
    let msgs = drain(&mut iopub);
    assert_eq!(types(&msgs), vec![MsgType::Stream, MsgType::Stream]);
    assert_eq!(msgs[0].content["text"], "a\n");
    assert_eq!(msgs[0].parent_header.as_ref(), Some(&first));
    assert_eq!(msgs[1].content["text"], "b\n");
    assert_eq!(msgs[1].parent_header.as_ref(), Some(&second));
}

#[tokio::test]
async fn test_unknown_code_finishes_empty() {
    let kernel = kernel();
    let result = kernel
        .execute(&ExecuteRequest::new("import this"), request_header(), 1)
        .await
        .unwrap();
    assert!(result.data.is_empty());
}

// ============================================================================
// Displays
// ============================================================================

#[tokio::test]
async fn test_live_object_parked_on_bus() {
    let kernel = kernel();
    let mut iopub = kernel.subscribe_iopub();

    kernel
        .execute(&ExecuteRequest::new("plot()"), request_header(), 1)
        .await
        .unwrap();

    let msgs = drain(&mut iopub);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].msg_type(), MsgType::DisplayData);
    let html = msgs[0].content["data"]["text/html"].as_str().unwrap();
    assert!(html.starts_with("<div id=\"hashi-output-1\"></div>"));
    assert!(html.contains("window.valueBus.pop(1)"));

    let bus = kernel.value_bus();
    let node = bus.pop(1).expect("live object parked under handle 1");
    assert_eq!(node.outer_html(), "<canvas></canvas>");
    assert!(bus.pop(1).is_none());
}

#[tokio::test]
async fn test_vector_graphic_sized() {
    let kernel = kernel();
    let mut iopub = kernel.subscribe_iopub();

    kernel
        .execute(&ExecuteRequest::new("turtle.done()"), request_header(), 1)
        .await
        .unwrap();

    let msgs = drain(&mut iopub);
    assert_eq!(
        msgs[0].content["data"]["text/html"],
        "<svg viewBox=\"0 0 10 10\" width=\"480px\" height=\"360px\"><path/></svg>"
    );
    assert!(kernel.value_bus().is_empty());
}

#[tokio::test]
async fn test_unknown_display_dropped_others_kept() {
    let kernel = kernel();
    let mut iopub = kernel.subscribe_iopub();

    kernel
        .execute(&ExecuteRequest::new("show()"), request_header(), 1)
        .await
        .unwrap();

    let msgs = drain(&mut iopub);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].content["data"]["text/html"], "<b>ok</b>");
}

// ============================================================================
// Completion and unsupported requests
// ============================================================================

#[tokio::test]
async fn test_complete() {
    let kernel = kernel();
    let reply = kernel
        .complete(&CompleteRequest { code: "x = pr".into(), cursor_pos: 6 })
        .await
        .unwrap();

    assert_eq!(reply.matches, vec!["print", "property"]);
    assert_eq!(reply.cursor_start, 4);
    assert_eq!(reply.cursor_end, 6);
}

#[tokio::test]
async fn test_complete_uses_code_before_cursor() {
    let kernel = kernel();
    let reply = kernel
        .complete(&CompleteRequest { code: "ra(1)".into(), cursor_pos: 2 })
        .await
        .unwrap();

    assert_eq!(reply.matches, vec!["range"]);
    assert_eq!(reply.cursor_start, 0);
    assert_eq!(reply.cursor_end, 2);
}

// ============================================================================
// Session
// ============================================================================

fn shell(msg_type: MsgType, content: serde_json::Value) -> Message {
    Message::from_content(msg_type, SessionId::new(), None, &content).unwrap()
}

fn types(msgs: &[Message]) -> Vec<MsgType> {
    msgs.iter().map(Message::msg_type).collect()
}

#[tokio::test]
async fn test_session_execute_flow() {
    let session = KernelSession::new(kernel());
    let mut iopub = session.kernel().subscribe_iopub();

    let req = shell(MsgType::ExecuteRequest, serde_json::json!({"code": "x = 2; x"}));
    let reply = session.handle(&req).await.unwrap();

    assert_eq!(reply.msg_type(), MsgType::ExecuteReply);
    assert_eq!(reply.parent_header.as_ref(), Some(&req.header));
    assert_eq!(reply.content["status"], "ok");
    assert_eq!(reply.content["execution_count"], 1);
    assert_eq!(reply.content["user_expressions"], serde_json::json!({}));

    let msgs = drain(&mut iopub);
    assert_eq!(
        types(&msgs),
        vec![MsgType::Status, MsgType::ExecuteInput, MsgType::ExecuteResult, MsgType::Status]
    );
    assert_eq!(msgs[0].content["execution_state"], "busy");
    assert_eq!(msgs[1].content["code"], "x = 2; x");
    assert_eq!(msgs[2].content["data"]["text/plain"], "2");
    assert_eq!(msgs[2].content["execution_count"], 1);
    assert_eq!(msgs[3].content["execution_state"], "idle");
    assert!(msgs.iter().all(|m| m.parent_header.as_ref() == Some(&req.header)));
}

#[tokio::test]
async fn test_session_execute_error_flow() {
    let session = KernelSession::new(kernel());
    let mut iopub = session.kernel().subscribe_iopub();

    let ok = shell(MsgType::ExecuteRequest, serde_json::json!({"code": "print('hi')"}));
    session.handle(&ok).await.unwrap();
    drain(&mut iopub);

    let req = shell(MsgType::ExecuteRequest, serde_json::json!({"code": "1/0"}));
    let reply = session.handle(&req).await.unwrap();

    assert_eq!(reply.content["status"], "error");
    assert_eq!(reply.content["execution_count"], 2);
    assert_eq!(reply.content["ename"], "ZeroDivisionError");
    assert_eq!(reply.content["evalue"], "division by zero");

    let msgs = drain(&mut iopub);
    assert_eq!(
        types(&msgs),
        vec![MsgType::Status, MsgType::ExecuteInput, MsgType::Error, MsgType::Status]
    );
    assert_eq!(msgs[2].content["ename"], "ZeroDivisionError");
}

#[tokio::test]
async fn test_session_output_without_result() {
    let session = KernelSession::new(kernel());
    let mut iopub = session.kernel().subscribe_iopub();

    let req = shell(MsgType::ExecuteRequest, serde_json::json!({"code": "print('hi')"}));
    session.handle(&req).await.unwrap();

    assert_eq!(
        types(&drain(&mut iopub)),
        vec![
            MsgType::Status,
            MsgType::ExecuteInput,
            MsgType::Stream,
            MsgType::Stream,
            MsgType::Status,
        ]
    );
}

#[tokio::test]
async fn test_session_complete_and_not_implemented() {
    let session = KernelSession::new(kernel());

    let req = shell(
        MsgType::CompleteRequest,
        serde_json::json!({"code": "ran", "cursor_pos": 3}),
    );
    let reply = session.handle(&req).await.unwrap();
    assert_eq!(reply.msg_type(), MsgType::CompleteReply);
    assert_eq!(reply.content["matches"], serde_json::json!(["range"]));
    assert_eq!(reply.content["status"], "ok");

    for (msg_type, content) in [
        (MsgType::IsCompleteRequest, serde_json::json!({"code": "for x in y:"})),
        (MsgType::CommInfoRequest, serde_json::json!({})),
    ] {
        let reply = session.handle(&shell(msg_type, content)).await.unwrap();
        assert_eq!(Some(reply.msg_type()), msg_type.reply_type());
        assert_eq!(reply.content["status"], "error");
        assert_eq!(reply.content["ename"], "NotImplementedError");
    }
}

// ============================================================================
// Host demo files
// ============================================================================

#[tokio::test]
async fn test_host_demo_files_load() {
    let demos = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../hashi-host/demos");
    let config = HashiConfig::load(demos.join("hashi.ron")).unwrap();
    assert_eq!(config.display.graphic_width, "640px");
    assert_eq!(config.kernel_spec.name, "python");

    let script = EngineScript::load(demos.join("script.ron")).unwrap();
    let kernel = spawn_kernel(ScriptedLoader::new(script), &config);
    let mut iopub = kernel.subscribe_iopub();

    kernel
        .execute(&ExecuteRequest::new("turtle.done()"), request_header(), 1)
        .await
        .unwrap();
    let msgs = drain(&mut iopub);
    assert_eq!(
        msgs[0].content["data"]["text/html"],
        "<svg width=\"640px\" height=\"480px\"><path d=\"M0 0L10 10\"/></svg>"
    );
}
