//! Background telemetry thread.
//!
//! The hub owns the UDP socket and the subscriber registry. It drains
//! the RT message queue, encodes each message once, sends it to the
//! configured peer, and fans it out to in-process subscribers. A failed
//! send retries a bounded number of times with an escalating pause
//! before the datagram counts as lost. Inbound datagrams decode to
//! control commands pushed toward the RT side, or config updates handed
//! to the caller's config store.

use crate::codec::{self, AddressFilter, Inbound};
use crate::error::Result;
use crate::message::{ConfigUpdate, ControlCommand, Message};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use penta_rt::{AtomicCounter, RtConsumer, RtProducer};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SUBSCRIBER_QUEUE_SIZE: usize = 256;
const RECV_BUF_SIZE: usize = 1536;
const SEND_WARN_EVERY: u64 = 1024;

/// Send attempts per datagram before it counts as lost.
const MAX_SEND_ATTEMPTS: u32 = 4;
/// Pause before the first resend; doubles per attempt.
const SEND_RETRY_BASE: Duration = Duration::from_micros(250);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Local address for the hub socket. Port 0 binds ephemerally.
    pub bind_addr: SocketAddr,
    /// Where outbound datagrams go.
    pub peer_addr: SocketAddr,
    /// Sleep between polls when both directions are idle.
    pub poll_interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            peer_addr: SocketAddr::from(([127, 0, 0, 1], 9001)),
            poll_interval: Duration::from_micros(200),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicCounter,
    send_failures: AtomicCounter,
    controls: AtomicCounter,
    subscriber_drops: AtomicCounter,
}

/// Snapshot of hub activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HubStats {
    pub sent: u64,
    pub send_failures: u64,
    pub controls: u64,
    pub subscriber_drops: u64,
}

struct Subscriber {
    filter: AddressFilter,
    sender: Sender<Message>,
}

/// An in-process message feed. A subscriber that stops draining loses
/// its own messages once its channel fills; the hub never blocks on it.
pub struct Subscription {
    receiver: Receiver<Message>,
}

impl Subscription {
    pub fn try_recv(&self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Message> {
        self.receiver.recv_timeout(timeout).ok()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Worker state moved onto the hub thread.
pub struct TelemetryHub {
    socket: UdpSocket,
    peer: SocketAddr,
    poll_interval: Duration,
    messages: RtConsumer<Message>,
    controls: RtProducer<ControlCommand>,
    on_config: Box<dyn FnMut(ConfigUpdate) + Send>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
}

/// Hub thread handle. Stops gracefully when dropped.
pub struct HubHandle {
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    counters: Arc<Counters>,
    local_addr: SocketAddr,
}

impl TelemetryHub {
    /// Binds the socket and spawns the hub thread. `on_config` receives
    /// decoded config updates; it is expected to clamp and swap them into
    /// the caller's config store.
    pub fn spawn(
        config: TelemetryConfig,
        messages: RtConsumer<Message>,
        controls: RtProducer<ControlCommand>,
        on_config: impl FnMut(ConfigUpdate) + Send + 'static,
    ) -> Result<HubHandle> {
        let socket = UdpSocket::bind(config.bind_addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let subscribers = Arc::new(Mutex::new(Vec::new()));
        let counters = Arc::new(Counters::default());

        let hub = Self {
            socket,
            peer: config.peer_addr,
            poll_interval: config.poll_interval,
            messages,
            controls,
            on_config: Box::new(on_config),
            subscribers: Arc::clone(&subscribers),
            counters: Arc::clone(&counters),
            running: Arc::clone(&running),
        };

        let thread = thread::Builder::new()
            .name("penta-telemetry".to_string())
            .spawn(move || hub.run())?;

        Ok(HubHandle {
            running,
            thread: Some(thread),
            subscribers,
            counters,
            local_addr,
        })
    }

    fn run(mut self) {
        tracing::debug!(peer = %self.peer, "telemetry hub started");
        let mut buf = [0u8; RECV_BUF_SIZE];

        while self.running.load(Ordering::Relaxed) {
            let outbound = self.flush_outbound();
            let inbound = self.pump_inbound(&mut buf);
            if outbound == 0 && inbound == 0 {
                thread::sleep(self.poll_interval);
            }
        }

        // Whatever the RT side queued before the stop flag landed still
        // goes out.
        self.flush_outbound();
        tracing::debug!("telemetry hub stopped");
    }

    fn flush_outbound(&mut self) -> usize {
        let Self {
            socket,
            peer,
            messages,
            subscribers,
            counters,
            ..
        } = self;

        messages.drain(|message| {
            match codec::encode(&message) {
                Ok(datagram) => send_with_retry(socket, *peer, &datagram, counters),
                Err(err) => {
                    counters.send_failures.increment();
                    tracing::warn!(%err, "telemetry encode failed");
                }
            }
            fan_out(subscribers, counters, &message);
        })
    }

    fn pump_inbound(&mut self, buf: &mut [u8]) -> usize {
        let mut handled = 0;
        loop {
            let len = match self.socket.recv_from(buf) {
                Ok((len, _from)) => len,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::debug!(%err, "telemetry recv failed");
                    break;
                }
            };

            match rosc::decoder::decode_udp(&buf[..len]) {
                Ok((_, packet)) => match codec::decode_inbound(&packet) {
                    Some(Inbound::Control(command)) => {
                        self.controls.push(command);
                        self.counters.controls.increment();
                        handled += 1;
                    }
                    Some(Inbound::Config(update)) => {
                        (self.on_config)(update);
                        handled += 1;
                    }
                    None => tracing::debug!("unroutable osc packet"),
                },
                Err(err) => tracing::debug!(%err, "undecodable datagram"),
            }
        }
        handled
    }
}

/// One datagram to the peer. A failed send retries after an escalating
/// pause; once the attempts are spent the loss is counted and draining
/// moves on.
fn send_with_retry(socket: &UdpSocket, peer: SocketAddr, datagram: &[u8], counters: &Counters) {
    let mut delay = SEND_RETRY_BASE;
    let mut attempt = 1;
    loop {
        match socket.send_to(datagram, peer) {
            Ok(_) => {
                counters.sent.increment();
                return;
            }
            Err(err) if attempt < MAX_SEND_ATTEMPTS => {
                tracing::debug!(%err, attempt, "telemetry send failed, retrying");
                attempt += 1;
                thread::sleep(delay);
                delay *= 2;
            }
            Err(err) => {
                if counters.send_failures.increment() % SEND_WARN_EVERY == 0 {
                    tracing::warn!(%err, peer = %peer, attempts = attempt, "telemetry send failed");
                }
                return;
            }
        }
    }
}

fn fan_out(subscribers: &Mutex<Vec<Subscriber>>, counters: &Counters, message: &Message) {
    let mut subscribers = subscribers.lock();
    subscribers.retain(|subscriber| {
        if !subscriber.filter.matches(message.payload.address()) {
            return true;
        }
        match subscriber.sender.try_send(*message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                counters.subscriber_drops.increment();
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    });
}

impl HubHandle {
    /// Registers an in-process subscriber for addresses matching
    /// `pattern` (see [`AddressFilter`]).
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        let (sender, receiver) = crossbeam_channel::bounded(SUBSCRIBER_QUEUE_SIZE);
        self.subscribers.lock().push(Subscriber {
            filter: AddressFilter::new(pattern),
            sender,
        });
        Subscription { receiver }
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            sent: self.counters.sent.get(),
            send_failures: self.counters.send_failures.get(),
            controls: self.counters.controls.get(),
            subscriber_drops: self.counters.subscriber_drops.get(),
        }
    }

    /// Actual bound address, useful when binding ephemerally.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for HubHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
