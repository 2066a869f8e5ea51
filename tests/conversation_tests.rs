//! Voice companion tests
//!
//! The session runs against an in-process loopback wire and a silent output
//! sink, driven through the orchestrator the way a host would drive it.

use readalong::audio::{ChannelMicrophone, MicFeed, MicrophoneSource, SilentSink, StreamScheduler};
use readalong::content::{Catalog, Section};
use readalong::conversation::{
    ConnectionStatus, ConversationConfig, LoopbackConnector, RemoteEnd, StaticCredential,
    WireConnection,
};
use readalong::integration::{
    OrchestratorBuilder, OrchestratorCommand, OrchestratorEvent, OrchestratorHandle,
    ReadalongConfig,
};
use readalong::sync::{Clock, ManualClock};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

#[test]
fn test_chunk_waits_for_queued_audio() {
    let clock = Arc::new(ManualClock::new());
    let sink = Arc::new(SilentSink::new(clock.clone() as Arc<dyn Clock>));
    let mut scheduler = StreamScheduler::new(sink);

    scheduler.reset_cursor(secs(2.0));
    clock.set(secs(1.0));
    let chunk = scheduler
        .schedule(&"turn-1".into(), vec![0.0; 12_000], 24_000)
        .expect("chunk should be scheduled");

    assert_eq!(chunk.start, secs(2.0), "Chunk should start at the cursor, not now");
    assert_eq!(scheduler.next_play_time(), secs(2.5));
}

#[test]
fn test_new_turn_cancels_old_chunks() {
    let clock = Arc::new(ManualClock::new());
    let sink = Arc::new(SilentSink::new(clock.clone() as Arc<dyn Clock>));
    let mut scheduler = StreamScheduler::new(sink);

    let first = "turn-1".into();
    scheduler.schedule(&first, vec![0.0; 24_000], 24_000).unwrap();
    scheduler.schedule(&first, vec![0.0; 24_000], 24_000).unwrap();

    clock.set(secs(0.3));
    let second = "turn-2".into();
    assert_eq!(scheduler.cancel_except(&second), 2, "Both turn-1 chunks stop");
    scheduler.reset_cursor(clock.now());

    assert!(scheduler.live().is_empty());
    assert_eq!(scheduler.next_play_time(), secs(0.3));
    assert!(
        scheduler.schedule(&first, vec![0.0; 100], 24_000).is_none(),
        "Late turn-1 audio is rejected"
    );
}

struct Host {
    handle: OrchestratorHandle,
    events: Receiver<OrchestratorEvent>,
    remote: RemoteEnd,
    feed: Arc<Mutex<Option<MicFeed>>>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

fn catalog() -> Catalog {
    Catalog::from_sections(vec![
        Section::new("intro", "The Truth", "Most decisions are slow."),
        Section::new("body", "Decision latency", "Waiting has a cost."),
    ])
    .unwrap()
}

fn start_host() -> Host {
    let (connection, remote) = WireConnection::loopback();
    let feed = Arc::new(Mutex::new(None));
    let feed_slot = Arc::clone(&feed);

    let config = ReadalongConfig::default()
        .without_audio_devices()
        .with_conversation(ConversationConfig::default().with_listener("Ada Lovelace"));

    let (orchestrator, handle) = OrchestratorBuilder::new()
        .with_config(config)
        .with_catalog(catalog())
        .with_credential(Arc::new(StaticCredential::new("test-token")))
        .with_connector(Arc::new(LoopbackConnector::new(connection)))
        .with_microphone(Arc::new(move || {
            let (microphone, feed) = ChannelMicrophone::new();
            *feed_slot.lock() = Some(feed);
            Box::new(microphone) as Box<dyn MicrophoneSource>
        }))
        .build()
        .unwrap();

    let workers = orchestrator.start().unwrap();
    let events = handle.event_receiver();
    Host {
        handle,
        events,
        remote,
        feed,
        workers,
    }
}

fn next_sent(remote: &mut RemoteEnd) -> Value {
    let text = remote.sent.blocking_recv().expect("session closed the wire");
    serde_json::from_str(&text).unwrap()
}

fn wait_for(
    events: &Receiver<OrchestratorEvent>,
    pred: impl Fn(&OrchestratorEvent) -> bool,
) -> OrchestratorEvent {
    loop {
        match events.recv_timeout(Duration::from_secs(2)) {
            Ok(event) if pred(&event) => return event,
            Ok(_) => continue,
            Err(e) => panic!("Expected event not received: {}", e),
        }
    }
}

fn shutdown(host: Host) {
    host.handle
        .send_command(OrchestratorCommand::Shutdown)
        .unwrap();
    for worker in host.workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_conversation_lifecycle() {
    let mut host = start_host();
    host.handle
        .send_command(OrchestratorCommand::StartConversation)
        .unwrap();

    let update = next_sent(&mut host.remote);
    assert_eq!(update["type"], "session.update");
    let instructions = update["session"]["instructions"].as_str().unwrap();
    assert!(instructions.contains("Ada is viewing the section: \"The Truth\""));
    assert!(instructions.contains("## Full Article Content (for your reference)"));
    assert_eq!(
        update["session"]["tools"].as_array().map(Vec::len),
        Some(3),
        "The article tools are advertised"
    );

    host.remote.push(json!({"type": "session.updated"}));
    assert_eq!(next_sent(&mut host.remote)["type"], "response.create");
    wait_for(&host.events, |e| {
        *e == OrchestratorEvent::Connection(ConnectionStatus::Connected)
    });
    let surface = host.handle.surface();
    assert_eq!(surface.connection, ConnectionStatus::Connected);
    assert!(surface.connected_at.is_some());

    host.handle
        .send_command(OrchestratorCommand::StopConversation)
        .unwrap();
    wait_for(&host.events, |e| {
        *e == OrchestratorEvent::Connection(ConnectionStatus::Idle)
    });
    assert!(
        !host.feed.lock().as_ref().unwrap().is_open(),
        "Stopping releases the microphone"
    );
    assert!(host.handle.surface().connected_at.is_none());

    shutdown(host);
}

#[test]
fn test_companion_navigates_article() {
    let mut host = start_host();
    host.handle
        .send_command(OrchestratorCommand::StartConversation)
        .unwrap();
    next_sent(&mut host.remote);
    host.remote.push(json!({"type": "session.updated"}));
    next_sent(&mut host.remote);

    host.remote.push(json!({
        "type": "response.function_call_arguments.done",
        "call_id": "call_1",
        "name": "scroll_to_heading",
        "arguments": "{\"section_id\":\"body\"}",
    }));

    let output = next_sent(&mut host.remote);
    assert_eq!(output["type"], "conversation.item.create");
    assert_eq!(output["item"]["output"], "{\"success\":true}");
    assert_eq!(next_sent(&mut host.remote)["type"], "response.create");

    wait_for(&host.events, |e| {
        *e == OrchestratorEvent::ScrollTo("body".into())
    });
    assert_eq!(host.handle.surface().active_section, Some("body".into()));

    shutdown(host);
}

#[test]
fn test_microphone_streams_after_first_response_audio() {
    let mut host = start_host();
    host.handle
        .send_command(OrchestratorCommand::StartConversation)
        .unwrap();
    next_sent(&mut host.remote);
    host.remote.push(json!({"type": "session.updated"}));
    next_sent(&mut host.remote);

    let feed = host.feed.lock().clone().expect("microphone opened");
    assert!(!feed.push(vec![0.2; 32]), "Microphone is gated before the greeting plays");

    host.remote.push(json!({"type": "response.created", "response": {"id": "resp_1"}}));
    host.remote.push(json!({
        "type": "response.audio.delta",
        "response_id": "resp_1",
        "delta": readalong::audio::codec::encode_frame(&[0.1; 480]),
    }));
    wait_for(&host.events, |e| {
        *e == OrchestratorEvent::TurnStarted("resp_1".into())
    });

    let mut delivered = false;
    for _ in 0..200 {
        if feed.push(vec![0.2; 32]) {
            delivered = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(delivered, "Microphone opens once response audio is scheduled");

    let append = next_sent(&mut host.remote);
    assert_eq!(append["type"], "input_audio_buffer.append");
    assert_eq!(append["audio"], readalong::audio::codec::encode_frame(&[0.2; 32]));

    shutdown(host);
}

#[test]
fn test_remote_error_is_surfaced_without_disconnecting() {
    let mut host = start_host();
    host.handle
        .send_command(OrchestratorCommand::StartConversation)
        .unwrap();
    next_sent(&mut host.remote);
    host.remote.push(json!({"type": "session.updated"}));
    next_sent(&mut host.remote);

    host.remote
        .push(json!({"type": "error", "error": {"message": "Invalid voice"}}));
    wait_for(&host.events, |e| {
        *e == OrchestratorEvent::Error("Invalid voice".into())
    });
    assert_eq!(host.handle.surface().connection, ConnectionStatus::Connected);

    shutdown(host);
}
