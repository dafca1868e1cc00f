//! Full-stack telemetry tests: engine events out over real UDP sockets,
//! OSC control traffic back in.
//!
//! Run with:
//! ```bash
//! cargo test -p penta --test telemetry_integration
//! ```

#![cfg(feature = "telemetry")]

use penta::prelude::*;
use rosc::{decoder, encoder, OscMessage, OscPacket, OscType};
use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Engine wired to a hub that sends to the given peer.
fn engine_with_hub(peer: SocketAddr) -> (AnalysisEngine, EngineHandles) {
    AnalysisEngine::builder()
        .telemetry(TelemetryConfig {
            peer_addr: peer,
            ..TelemetryConfig::default()
        })
        .build()
        .expect("Failed to create test engine")
}

fn discard_peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9))
}

fn send_osc(to: SocketAddr, addr: &str, args: Vec<OscType>) {
    let packet = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    let bytes = encoder::encode(&packet).unwrap();
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.send_to(&bytes, to).unwrap();
}

/// Receive datagrams until one decodes to the wanted address.
fn wait_for_datagram(socket: &UdpSocket, addr: &str, deadline: Instant) -> Option<OscMessage> {
    let mut buf = [0u8; 1536];
    while Instant::now() < deadline {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _from)) => len,
            Err(_) => continue,
        };
        if let Ok((_, OscPacket::Message(message))) = decoder::decode_udp(&buf[..len]) {
            if message.addr == addr {
                return Some(message);
            }
        }
    }
    None
}

#[test]
fn test_chord_reaches_udp_peer() {
    init_tracing();
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();

    let (mut engine, handles) = engine_with_hub(receiver.local_addr().unwrap());
    // The spawned hub owns the telemetry consumer.
    assert!(handles.messages.is_none());

    engine.note_event(60, 100, true, 0);
    engine.note_event(64, 100, true, 0);
    engine.note_event(67, 100, true, 0);

    let deadline = Instant::now() + Duration::from_secs(5);
    let chord = wait_for_datagram(&receiver, "/penta/harmony/chord", deadline)
        .expect("no chord datagram arrived");

    // seq, root, quality, confidence; an exact C major triad.
    assert_eq!(chord.args.len(), 4);
    assert!(matches!(chord.args[0], OscType::Long(seq) if seq > 0));
    assert_eq!(chord.args[1], OscType::Int(0));
    assert_eq!(chord.args[2], OscType::Int(0));
    assert_eq!(chord.args[3], OscType::Float(1.0));
}

#[test]
fn test_control_tempo_round_trip() {
    init_tracing();
    let (mut engine, handles) = engine_with_hub(discard_peer());
    let hub_addr = handles.hub.as_ref().unwrap().local_addr();

    send_osc(hub_addr, "/penta/control/tempo", vec![OscType::Float(90.0)]);

    // The override lands at a block boundary once the hub has relayed it.
    let block = vec![0.0f32; 512];
    for _ in 0..200 {
        engine.process_block(&block).unwrap();
        if engine.tempo_bpm() == 90.0 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(engine.tempo_bpm(), 90.0);
}

#[test]
fn test_config_update_round_trip() {
    init_tracing();
    let (_engine, handles) = engine_with_hub(discard_peer());
    let hub_addr = handles.hub.as_ref().unwrap().local_addr();

    send_osc(
        hub_addr,
        "/penta/control/config/threshold_k",
        vec![OscType::Float(5.0)],
    );

    // The hub swaps the update into the shared store on its own thread.
    let mut threshold = 0.0;
    for _ in 0..200 {
        threshold = handles.config.load().threshold_k;
        if threshold == 5.0 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(threshold, 5.0);
}

#[test]
fn test_subscription_sees_engine_messages() {
    init_tracing();
    let (mut engine, handles) = engine_with_hub(discard_peer());
    let harmony = handles.hub.as_ref().unwrap().subscribe("/penta/harmony/*");

    engine.note_event(60, 100, true, 0);
    engine.note_event(64, 100, true, 0);
    engine.note_event(67, 100, true, 0);

    let message = harmony
        .recv_timeout(Duration::from_secs(5))
        .expect("no harmony message arrived");
    assert!(message.payload.address().starts_with("/penta/harmony/"));
    assert!(message.seq > 0);
}
