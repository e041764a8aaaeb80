//! Client ↔ server tests over loopback TCP.
//!
//! Each test binds a real server on an ephemeral port and drives real
//! supervisors (or raw framed connections, for protocol-level checks)
//! against it.

use std::time::Duration;

use tokio::{sync::mpsc, time::timeout};

use tether_client::{
    ClientConfig, ConnectionSupervisor, Dialer, SessionEvent, SessionLink, TcpDialer, TcpLink,
    TokioEnv,
};
use tether_core::BackoffPolicy;
use tether_crypto::{seal_session_key, ServerKeyPair, ServerPublicKey, SessionKey};
use tether_proto::{
    payloads::session::{Register, REJECT_HANDSHAKE},
    ErrorPayload, Opcode, Payload,
};
use tether_server::{LivenessConfig, Server, ServerConfig, ServerRuntimeConfig};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

async fn start_server(liveness: LivenessConfig) -> (String, ServerPublicKey) {
    let keypair = ServerKeyPair::generate();
    let public_key = keypair.public_key();

    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        driver: ServerConfig { liveness, ..ServerConfig::default() },
    };

    let server = Server::bind(config, keypair).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(server.run());

    (addr, public_key)
}

fn fast_config(addr: &str, username: &str) -> ClientConfig {
    let mut config = ClientConfig::new(addr, username);
    config.backoff = BackoffPolicy {
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
        max_attempts: 10,
    };
    config
}

type Client = (
    ConnectionSupervisor<TokioEnv, TcpDialer>,
    mpsc::UnboundedReceiver<SessionEvent>,
);

async fn connect_client(addr: &str, username: &str) -> Client {
    connect_with(fast_config(addr, username)).await
}

async fn connect_with(config: ClientConfig) -> Client {
    let dialer = TcpDialer::new(config.server_addr.clone());
    let (supervisor, mut events) = ConnectionSupervisor::new(TokioEnv::new(), dialer, config);
    supervisor.start().await.unwrap();

    timeout(TEST_TIMEOUT, async {
        loop {
            match events.recv().await.expect("event channel closed") {
                SessionEvent::Reconnected => break,
                SessionEvent::GaveUp { failure } => panic!("session never came up: {failure}"),
                _ => continue,
            }
        }
    })
    .await
    .expect("session did not come up");

    (supervisor, events)
}

async fn next_message(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> (String, Vec<u8>) {
    timeout(TEST_TIMEOUT, async {
        loop {
            match events.recv().await.expect("event channel closed") {
                SessionEvent::MessageReceived { sender, payload, .. } => return (sender, payload),
                _ => continue,
            }
        }
    })
    .await
    .expect("no message arrived")
}

/// Register `username` over a raw framed connection, answering nothing
/// else. Returns the link with the session established.
async fn raw_register(addr: &str, username: &str) -> TcpLink {
    let dialer = TcpDialer::new(addr);
    let server_key = dialer.fetch_server_key().await.unwrap();

    let session_key = SessionKey::generate();
    let sealed = seal_session_key(&server_key, &session_key).unwrap();

    let mut link = dialer.dial().await.unwrap();
    link.send_frame(
        Payload::Register(Register {
            username: username.to_string(),
            ephemeral_public: sealed.ephemeral_public.to_vec(),
            nonce: sealed.nonce.to_vec(),
            sealed_key: sealed.ciphertext,
        })
        .into_frame()
        .unwrap(),
    )
    .await
    .unwrap();

    let reply = timeout(TEST_TIMEOUT, link.recv_frame()).await.unwrap().unwrap();
    assert_eq!(reply.header.opcode_enum(), Some(Opcode::RegisterAck));

    link
}

#[tokio::test]
async fn two_clients_exchange_a_broadcast_message() {
    let (addr, _) = start_server(LivenessConfig::default()).await;

    let (alice, _alice_events) = connect_client(&addr, "alice").await;
    let (bob, mut bob_events) = connect_client(&addr, "bob").await;

    alice.send(b"hello bob".to_vec());

    let (sender, payload) = next_message(&mut bob_events).await;
    assert_eq!(sender, "alice");
    assert_eq!(payload, b"hello bob");

    // The server's ack releases the message from alice's queue.
    timeout(TEST_TIMEOUT, async {
        while alice.pending_messages() != 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("message was never acknowledged");

    alice.stop().await;
    bob.stop().await;
}

#[tokio::test]
async fn messages_composed_offline_arrive_in_enqueue_order() {
    let (addr, _) = start_server(LivenessConfig::default()).await;

    let (bob, mut bob_events) = connect_client(&addr, "bob").await;

    // Composed before the session exists.
    let dialer = TcpDialer::new(addr.clone());
    let (alice, mut alice_events) =
        ConnectionSupervisor::new(TokioEnv::new(), dialer, fast_config(&addr, "alice"));
    alice.send(b"hi".to_vec());
    alice.send(b"bye".to_vec());

    alice.start().await.unwrap();
    timeout(TEST_TIMEOUT, async {
        loop {
            if alice_events.recv().await.expect("event channel closed")
                == SessionEvent::Reconnected
            {
                break;
            }
        }
    })
    .await
    .expect("alice never connected");

    // First two application events, in exactly that order.
    assert_eq!(next_message(&mut bob_events).await.1, b"hi");
    assert_eq!(next_message(&mut bob_events).await.1, b"bye");

    alice.stop().await;
    bob.stop().await;
}

#[tokio::test]
async fn colliding_registration_evicts_the_older_connection() {
    let (addr, _) = start_server(LivenessConfig::default()).await;

    let (bob, mut bob_events) = connect_client(&addr, "bob").await;

    // The first "alice" gets a 1s retry schedule: wide enough that the
    // stop() below always lands inside its backoff wait, so it cannot
    // win the username back after the eviction.
    let mut config = fast_config(&addr, "alice");
    config.backoff.initial_delay = Duration::from_secs(1);
    let (alice_old, mut alice_old_events) = connect_with(config).await;

    // Second device claims "alice" without any graceful close.
    let (alice_new, _alice_new_events) = connect_client(&addr, "alice").await;

    // The superseded connection is told why before it is dropped.
    timeout(TEST_TIMEOUT, async {
        loop {
            if let SessionEvent::Evicted { reason } =
                alice_old_events.recv().await.expect("event channel closed")
            {
                assert!(reason.contains("superseded"));
                break;
            }
        }
    })
    .await
    .expect("old connection was never evicted");

    alice_old.stop().await;

    // The username now routes to the new connection.
    alice_new.send(b"it is me".to_vec());
    let (sender, payload) = next_message(&mut bob_events).await;
    assert_eq!(sender, "alice");
    assert_eq!(payload, b"it is me");

    alice_new.stop().await;
    bob.stop().await;
}

#[tokio::test]
async fn app_message_before_registration_is_rejected_and_closed() {
    let (addr, _) = start_server(LivenessConfig::default()).await;

    let dialer = TcpDialer::new(addr);
    let mut link = dialer.dial().await.unwrap();

    link.send_frame(
        Payload::AppMessage(tether_proto::payloads::app::AppMessage {
            message_id: 1,
            sender: None,
            nonce: vec![0; 24],
            ciphertext: vec![1, 2, 3],
        })
        .into_frame()
        .unwrap(),
    )
    .await
    .unwrap();

    let reply = timeout(TEST_TIMEOUT, link.recv_frame()).await.unwrap().unwrap();
    let Payload::Error(error) = Payload::from_frame(&reply).unwrap() else {
        panic!("expected an Error frame");
    };
    assert_eq!(error.code, ErrorPayload::NOT_REGISTERED);

    // And the server hangs up.
    let next = timeout(TEST_TIMEOUT, link.recv_frame()).await.unwrap();
    assert!(next.is_err());
}

#[tokio::test]
async fn key_fetch_and_health_probe_work_without_a_session() {
    let (addr, public_key) = start_server(LivenessConfig::default()).await;

    let dialer = TcpDialer::new(addr);
    assert_eq!(dialer.fetch_server_key().await.unwrap(), public_key);

    let mut link = dialer.dial().await.unwrap();
    link.send_frame(Payload::HealthRequest.into_frame().unwrap()).await.unwrap();

    let reply = timeout(TEST_TIMEOUT, link.recv_frame()).await.unwrap().unwrap();
    let Payload::HealthResponse(health) = Payload::from_frame(&reply).unwrap() else {
        panic!("expected a HealthResponse frame");
    };
    assert!(health.healthy);
}

#[tokio::test]
async fn unopenable_seal_is_rejected_and_existing_binding_survives() {
    let (addr, _) = start_server(LivenessConfig::default()).await;

    let (alice, _alice_events) = connect_client(&addr, "alice").await;
    let (bob, mut bob_events) = connect_client(&addr, "bob").await;

    // A claim for "alice" sealed under the wrong server key.
    let wrong_server = ServerKeyPair::generate();
    let sealed =
        seal_session_key(&wrong_server.public_key(), &SessionKey::generate()).unwrap();

    let dialer = TcpDialer::new(addr);
    let mut link = dialer.dial().await.unwrap();
    link.send_frame(
        Payload::Register(Register {
            username: "alice".to_string(),
            ephemeral_public: sealed.ephemeral_public.to_vec(),
            nonce: sealed.nonce.to_vec(),
            sealed_key: sealed.ciphertext,
        })
        .into_frame()
        .unwrap(),
    )
    .await
    .unwrap();

    let reply = timeout(TEST_TIMEOUT, link.recv_frame()).await.unwrap().unwrap();
    let Payload::RegisterFail(fail) = Payload::from_frame(&reply).unwrap() else {
        panic!("expected a RegisterFail frame");
    };
    assert_eq!(fail.code, REJECT_HANDSHAKE);

    // The real alice still owns the name.
    alice.send(b"still here".to_vec());
    let (sender, payload) = next_message(&mut bob_events).await;
    assert_eq!(sender, "alice");
    assert_eq!(payload, b"still here");

    alice.stop().await;
    bob.stop().await;
}

#[tokio::test]
async fn silent_connection_is_probed_then_dropped_within_the_timeout() {
    let liveness = LivenessConfig {
        interval: Duration::from_millis(200),
        timeout: Duration::from_millis(600),
    };
    let (addr, _) = start_server(liveness).await;

    let mut link = raw_register(&addr, "ghost").await;

    // Never answer the probes: the server must ping, then hang up.
    let mut saw_ping = false;
    timeout(Duration::from_secs(5), async {
        loop {
            match link.recv_frame().await {
                Ok(frame) => {
                    if frame.header.opcode_enum() == Some(Opcode::Ping) {
                        saw_ping = true;
                    }
                },
                Err(_) => break,
            }
        }
    })
    .await
    .expect("silent connection was never dropped");

    assert!(saw_ping, "the connection should have been probed before expiring");
}
