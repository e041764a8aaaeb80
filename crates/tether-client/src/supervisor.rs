//! Connection supervisor: the client-side reconnection state machine.
//!
//! One supervisor owns one logical session and at most one background
//! task driving it. The task runs connection cycles (backoff wait,
//! dial, handshake) until a session is live, then services it (pings,
//! inbound messages, acks, pending-queue flushes) until the transport
//! dies, and starts the next cycle. `stop()` cancels whatever the task
//! is doing with bounded latency and always wins the race against a
//! concurrently succeeding attempt.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, watch, Notify},
    task::JoinHandle,
};

use tether_core::{Backoff, Environment, PendingQueue, SessionFailure};
use tether_crypto::{decrypt_payload, encrypt_payload, SessionKey};
use tether_proto::{
    payloads::{app::AppMessage, session::Goodbye},
    Frame, Payload,
};

use crate::{
    config::ClientConfig,
    error::ClientError,
    event::{SessionEvent, SupervisorState},
    handshake::HandshakeCoordinator,
    transport::{Dialer, SessionLink},
};

/// Client-side reconnection state machine.
///
/// See the module docs for the lifecycle. All methods are callable from
/// any task; message composition ([`Self::send`]) never blocks on
/// connection state.
pub struct ConnectionSupervisor<E: Environment, D: Dialer> {
    shared: Arc<Shared<E, D>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

struct Shared<E: Environment, D: Dialer> {
    env: E,
    dialer: D,
    config: ClientConfig,
    state: Mutex<SupervisorState>,
    // Separate lock domain from `state`: composing a message must never
    // wait on a backoff decision.
    queue: Mutex<PendingQueue<E::Instant>>,
    queue_wakeup: Notify,
    stop: watch::Sender<bool>,
    events: mpsc::UnboundedSender<SessionEvent>,
    handshake: HandshakeCoordinator,
    last_failure: Mutex<Option<SessionFailure>>,
}

struct Session<L> {
    link: L,
    key: SessionKey,
}

enum CycleOutcome<L> {
    Established(Session<L>),
    Stopped,
    GaveUp(SessionFailure),
}

enum SessionEnd {
    Stopped,
    TransportLost,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CycleKind {
    /// First cycle after `start()`: surfaces Connecting/Handshaking.
    Initial,
    /// Cycle after a transport loss: surfaces Reconnecting.
    Resume,
}

impl<E: Environment, D: Dialer> ConnectionSupervisor<E, D> {
    /// Create a supervisor and the receiving end of its event channel.
    ///
    /// Nothing connects until [`Self::start`].
    #[must_use]
    pub fn new(
        env: E,
        dialer: D,
        config: ClientConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (stop, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            env,
            dialer,
            config,
            state: Mutex::new(SupervisorState::Disconnected),
            queue: Mutex::new(PendingQueue::new()),
            queue_wakeup: Notify::new(),
            stop,
            events,
            handshake: HandshakeCoordinator::new(),
            last_failure: Mutex::new(None),
        });

        (Self { shared, task: tokio::sync::Mutex::new(None) }, events_rx)
    }

    /// Start the connection loop.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AlreadyRunning`] if the loop is already active;
    ///   exactly one loop may run per supervisor.
    pub async fn start(&self) -> Result<(), ClientError> {
        let mut slot = self.task.lock().await;

        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                return Err(ClientError::AlreadyRunning);
            }
        }

        let _ = self.shared.stop.send(false);
        *self.shared.last_failure.lock() = None;
        *self.shared.state.lock() = SupervisorState::Connecting;

        let shared = Arc::clone(&self.shared);
        *slot = Some(tokio::spawn(run(shared)));

        Ok(())
    }

    /// Stop the connection loop.
    ///
    /// Cancels any in-flight backoff wait or attempt, waits for the
    /// task to wind down, and leaves the supervisor in
    /// [`SupervisorState::Disconnected`], even if an attempt was
    /// completing concurrently. Pending messages are preserved. No-op
    /// if not running.
    pub async fn stop(&self) {
        let _ = self.shared.stop.send(true);

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        *self.shared.state.lock() = SupervisorState::Disconnected;
    }

    /// Queue an application payload for delivery and return its
    /// idempotency key.
    ///
    /// While connected the payload is sent promptly; while disconnected
    /// it waits in the pending queue and is flushed, in enqueue order,
    /// after the next successful handshake.
    pub fn send(&self, payload: Vec<u8>) -> u64 {
        let message_id = self.shared.env.random_u64();
        let now = self.shared.env.now();

        self.shared.queue.lock().push(message_id, payload, now);
        self.shared.queue_wakeup.notify_one();

        message_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        *self.shared.state.lock()
    }

    /// Categorized reason of the most recent failed attempt, if any.
    #[must_use]
    pub fn last_failure(&self) -> Option<SessionFailure> {
        *self.shared.last_failure.lock()
    }

    /// Number of messages waiting for acknowledgment.
    #[must_use]
    pub fn pending_messages(&self) -> usize {
        self.shared.queue.lock().len()
    }
}

/// The single background task owned by a supervisor.
async fn run<E: Environment, D: Dialer>(shared: Arc<Shared<E, D>>) {
    let mut stop_rx = shared.stop.subscribe();
    let mut kind = CycleKind::Initial;

    loop {
        let session = match connect_cycle(&shared, &mut stop_rx, kind).await {
            CycleOutcome::Established(session) => session,
            CycleOutcome::Stopped => break,
            CycleOutcome::GaveUp(failure) => {
                *shared.state.lock() = SupervisorState::GivingUp;
                emit(&shared, SessionEvent::GaveUp { failure });
                tracing::info!(%failure, "supervisor giving up");
                return;
            },
        };

        // Commit to Connected under the state lock, re-checking the stop
        // flag: a stop() racing this attempt must end in Disconnected.
        {
            let mut state = shared.state.lock();
            if *stop_rx.borrow() {
                break;
            }
            *state = SupervisorState::Connected;
        }

        match run_session(&shared, &mut stop_rx, session).await {
            SessionEnd::Stopped => break,
            SessionEnd::TransportLost => {
                tracing::info!("session lost, entering reconnect loop");
                *shared.state.lock() = SupervisorState::Reconnecting { attempt: 0 };
                emit(&shared, SessionEvent::Disconnected);
                kind = CycleKind::Resume;
            },
        }
    }

    *shared.state.lock() = SupervisorState::Disconnected;
}

/// One connection cycle: run the backoff schedule until a session is
/// established, the attempts are exhausted, or the supervisor stops.
async fn connect_cycle<E: Environment, D: Dialer>(
    shared: &Arc<Shared<E, D>>,
    stop_rx: &mut watch::Receiver<bool>,
    kind: CycleKind,
) -> CycleOutcome<D::Link> {
    let mut backoff = Backoff::new(shared.config.backoff);

    loop {
        let Some((attempt, delay)) = backoff.next() else {
            record_failure(shared, SessionFailure::MaxAttemptsExceeded);
            return CycleOutcome::GaveUp(SessionFailure::MaxAttemptsExceeded);
        };

        set_cycle_state(shared, kind, attempt, SupervisorState::Connecting);
        emit(shared, SessionEvent::Reconnecting { attempt });
        tracing::debug!(attempt, ?delay, "waiting before connection attempt");

        tokio::select! {
            _ = stop_rx.changed() => return CycleOutcome::Stopped,
            () = shared.env.sleep(delay) => {},
        }

        let dialed = tokio::select! {
            _ = stop_rx.changed() => return CycleOutcome::Stopped,
            result = shared.dialer.dial() => result,
        };

        let mut link = match dialed {
            Ok(link) => link,
            Err(e) => {
                tracing::debug!(attempt, error = %e, "transport open failed");
                record_failure(shared, SessionFailure::TransportUnavailable);
                continue;
            },
        };

        set_cycle_state(shared, kind, attempt, SupervisorState::Handshaking);

        let handshake = tokio::select! {
            _ = stop_rx.changed() => return CycleOutcome::Stopped,
            result = shared.handshake.establish(
                &shared.env,
                &shared.dialer,
                &mut link,
                &shared.config.username,
            ) => result,
        };

        match handshake {
            Ok(key) => return CycleOutcome::Established(Session { link, key }),
            Err(failure) => {
                record_failure(shared, failure);
                if failure.is_terminal() {
                    return CycleOutcome::GaveUp(failure);
                }
            },
        }
    }
}

/// Service one live session until the transport dies or stop is
/// requested.
async fn run_session<E: Environment, D: Dialer>(
    shared: &Arc<Shared<E, D>>,
    stop_rx: &mut watch::Receiver<bool>,
    session: Session<D::Link>,
) -> SessionEnd {
    let Session { mut link, key } = session;

    // Flush strictly precedes the Reconnected notification: by the time
    // consumers hear about the session, queued messages are on the wire.
    if flush_pending(shared, &mut link, &key).await.is_err() {
        return SessionEnd::TransportLost;
    }
    emit(shared, SessionEvent::Reconnected);

    enum Wake {
        Stopped,
        Flush,
        Inbound(std::io::Result<Frame>),
    }

    loop {
        // recv_frame is required to be cancellation-safe, so dropping
        // it when another branch fires loses nothing.
        let wake = tokio::select! {
            _ = stop_rx.changed() => Wake::Stopped,
            _ = shared.queue_wakeup.notified() => Wake::Flush,
            result = link.recv_frame() => Wake::Inbound(result),
        };

        match wake {
            Wake::Stopped => {
                // Best-effort goodbye so the server can unbind promptly.
                if let Ok(frame) =
                    Payload::Goodbye(Goodbye { reason: "client shutdown".to_string() }).into_frame()
                {
                    let _ = link.send_frame(frame).await;
                }
                return SessionEnd::Stopped;
            },

            Wake::Flush => {
                if flush_pending(shared, &mut link, &key).await.is_err() {
                    return SessionEnd::TransportLost;
                }
            },

            Wake::Inbound(Err(e)) => {
                tracing::debug!(error = %e, "session transport lost");
                return SessionEnd::TransportLost;
            },

            Wake::Inbound(Ok(frame)) => match Payload::from_frame(&frame) {
                Ok(Payload::Ping) => {
                    let Ok(pong) = Payload::Pong.into_frame() else { continue };
                    if link.send_frame(pong).await.is_err() {
                        return SessionEnd::TransportLost;
                    }
                },

                Ok(Payload::MessageAck(ack)) => {
                    shared.queue.lock().acknowledge(ack.message_id);
                },

                Ok(Payload::AppMessage(message)) => {
                    match decrypt_payload(&key, &message.nonce, &message.ciphertext) {
                        Ok(payload) => emit(shared, SessionEvent::MessageReceived {
                            message_id: message.message_id,
                            sender: message.sender.unwrap_or_default(),
                            payload,
                        }),
                        Err(e) => {
                            tracing::warn!(error = %e, "dropping undecryptable message");
                        },
                    }
                },

                Ok(Payload::Goodbye(goodbye)) => {
                    tracing::info!(reason = %goodbye.reason, "server revoked this session");
                    emit(shared, SessionEvent::Evicted { reason: goodbye.reason });
                    return SessionEnd::TransportLost;
                },

                Ok(other) => {
                    tracing::debug!(opcode = ?other.opcode(), "ignoring unexpected frame");
                },

                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed frame");
                },
            },
        }
    }
}

/// Send every unacknowledged message, oldest first.
///
/// Entries are marked `Sent` only after the transport accepted them;
/// they leave the queue when the server's ack arrives.
async fn flush_pending<E: Environment, D: Dialer>(
    shared: &Arc<Shared<E, D>>,
    link: &mut D::Link,
    key: &SessionKey,
) -> std::io::Result<()> {
    let batch: Vec<(u64, Vec<u8>)> = {
        let queue = shared.queue.lock();
        queue.unacked().map(|m| (m.message_id, m.payload.clone())).collect()
    };

    for (message_id, payload) in batch {
        let encrypted = match encrypt_payload(key, &payload) {
            Ok(encrypted) => encrypted,
            Err(e) => {
                tracing::error!(message_id, error = %e, "skipping unencryptable message");
                continue;
            },
        };

        let frame = match Payload::AppMessage(AppMessage {
            message_id,
            sender: None,
            nonce: encrypted.nonce.to_vec(),
            ciphertext: encrypted.ciphertext,
        })
        .into_frame()
        {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(message_id, error = %e, "skipping unencodable message");
                continue;
            },
        };

        link.send_frame(frame).await?;
        shared.queue.lock().mark_sent(message_id);
    }

    Ok(())
}

fn set_cycle_state<E: Environment, D: Dialer>(
    shared: &Arc<Shared<E, D>>,
    kind: CycleKind,
    attempt: u32,
    initial_state: SupervisorState,
) {
    let state = match kind {
        CycleKind::Initial => initial_state,
        CycleKind::Resume => SupervisorState::Reconnecting { attempt },
    };
    *shared.state.lock() = state;
}

fn record_failure<E: Environment, D: Dialer>(shared: &Arc<Shared<E, D>>, failure: SessionFailure) {
    if failure != SessionFailure::MaxAttemptsExceeded {
        *shared.last_failure.lock() = Some(failure);
    } else if shared.last_failure.lock().is_none() {
        *shared.last_failure.lock() = Some(failure);
    }
}

fn emit<E: Environment, D: Dialer>(shared: &Arc<Shared<E, D>>, event: SessionEvent) {
    let _ = shared.events.send(event);
}
