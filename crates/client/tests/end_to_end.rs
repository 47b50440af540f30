mod common;

use std::time::Duration;

use common::{CaptureEngine, init_tracing};
use micro_client::{Channel, ChannelError, EngineErrorPolicy, HeaderStatus, Headers, HttpMethod, Session, Timeout, TransferState};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn request_header_overrides_session_default_once() {
    init_tracing();
    let (engine, captured) = CaptureEngine::new();
    let channel = Channel::builder().engine_error_policy(EngineErrorPolicy::Log).build(engine);
    let session = Session::new(&channel);
    session.default_headers().set("X-Trace", "session");
    session.default_headers().set("Accept", "*/*");

    let request = session.request(HttpMethod::Get, "http://example.com/trace").header("x-trace", "request");
    assert_eq!(request.headers().contains("X-Trace"), HeaderStatus::ExplicitlyDefined);
    let response = request.send().unwrap();

    assert!(response.wait_for(WAIT));
    assert_eq!(response.state(), TransferState::Completed);
    assert_eq!(response.status_code(), 200);

    let wire = response.text();
    assert_eq!(wire.matches("X-Trace").count() + wire.matches("x-trace").count(), 1);
    assert!(wire.contains("x-trace: request\r\n"));
    assert!(wire.contains("Accept: */*\r\n"));

    let captured = captured.lock();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].headers.get("X-TRACE").as_deref(), Some("request"));
    assert_eq!(response.headers().get("content-length"), Some(wire.len().to_string()));
}

#[test]
fn shared_default_layer_applies_to_later_requests() {
    init_tracing();
    let (engine, captured) = CaptureEngine::new();
    let channel = Channel::builder().engine_error_policy(EngineErrorPolicy::Log).build(engine);

    let org_wide = Headers::new();
    org_wide.set("User-Agent", "micro-client");
    let per_session = Headers::new();
    per_session.get_defaults_from(&org_wide).unwrap();

    let session = Session::new(&channel);
    session.set_default_headers(per_session);

    assert!(session.get("http://example.com/one").unwrap().wait_for(WAIT));
    org_wide.set("User-Agent", "micro-client/2");
    assert!(session.get("http://example.com/two").unwrap().wait_for(WAIT));

    let captured = captured.lock();
    assert_eq!(captured[0].headers.get("user-agent").as_deref(), Some("micro-client"));
    assert_eq!(captured[1].headers.get("user-agent").as_deref(), Some("micro-client/2"));
}

#[test]
fn default_channel_and_one_shot_calls() {
    init_tracing();
    assert!(matches!(Channel::get_default(), Err(ChannelError::NoDefaultEngine)));
    assert!(matches!(micro_client::get("http://example.com/"), Err(micro_client::ClientError::Channel { .. })));

    Channel::set_default_engine(|| Box::new(CaptureEngine::new().0)).unwrap();
    assert!(matches!(Channel::set_default_engine(|| Box::new(CaptureEngine::new().0)), Err(ChannelError::DefaultAlreadySet)));

    let first = Channel::get_default().unwrap();
    let second = Channel::get_default().unwrap();
    assert_eq!(first.id(), second.id());

    let response = micro_client::post("http://example.com/submit").unwrap();
    assert!(response.wait(Timeout::NEVER));
    assert_eq!(response.state(), TransferState::Completed);
    assert_eq!(response.effective_url().as_deref(), Some("http://example.com/submit"));

    let session = Session::with_default_channel().unwrap();
    assert_eq!(session.channel().map(|c| c.id()), Some(first.id()));
    assert!(session.delete("http://example.com/item").unwrap().wait_for(WAIT));
}
