//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Bus controller: connection lifecycle, dispatch and acknowledged writes."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
//! Locking: `tx` guards the sink and is held for the whole of an
//! acknowledged write, so a request and its retries never interleave with
//! another writer. `shared` guards the registry, the discovery set and the
//! pending-ack slot; a waiter releases it while parked on `ack_signal`.
//! Lock order is `tx` before `shared`.

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use poolbus_common::BusConfig;
use poolbus_proto::{Command, RawMessage};
use strum::Display;
use tracing::{debug, error, info, warn};

use crate::ack::{AckOutcome, AckSlot};
use crate::discovery::{DeviceCategory, DiscoveryListener, NoopDiscovery};
use crate::io::ByteSink;
use crate::link::Link;
use crate::metrics::BusMetrics;
use crate::reader::FrameReader;
use crate::registry::{DeviceHandler, DeviceRegistry, DeviceRole};
use crate::{BusError, Result};

/// Lifecycle of the link owned by a [`BusController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// Never connected.
    Init,
    /// Opening the link.
    Connecting,
    /// Reader running, writes allowed.
    Connected,
    /// Link lost or closed; a reconnect may follow.
    Disconnected,
    /// The link cannot be opened as configured.
    ConfigError,
}

struct Shared {
    registry: DeviceRegistry,
    unregistered: HashSet<u8>,
    ack: AckSlot,
    state: ConnectionState,
}

struct ReaderHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

struct Inner {
    config: BusConfig,
    tx: Mutex<Option<Box<dyn ByteSink>>>,
    shared: Mutex<Shared>,
    ack_signal: Condvar,
    reader: Mutex<Option<ReaderHandle>>,
    discovery: Arc<dyn DiscoveryListener>,
    metrics: Arc<BusMetrics>,
}

/// Owner of the transmit path and dispatcher of received messages.
///
/// Cheap to clone; clones share the same bus.
#[derive(Clone)]
pub struct BusController {
    inner: Arc<Inner>,
}

impl BusController {
    /// Controller that ignores discovery notifications.
    pub fn new(config: BusConfig) -> Self {
        Self::with_discovery(config, Arc::new(NoopDiscovery))
    }

    /// Controller reporting unregistered devices to `discovery`.
    pub fn with_discovery(config: BusConfig, discovery: Arc<dyn DiscoveryListener>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                tx: Mutex::new(None),
                shared: Mutex::new(Shared {
                    registry: DeviceRegistry::new(),
                    unregistered: HashSet::new(),
                    ack: AckSlot::Idle,
                    state: ConnectionState::Init,
                }),
                ack_signal: Condvar::new(),
                reader: Mutex::new(None),
                discovery,
                metrics: Arc::new(BusMetrics::new()),
            }),
        }
    }

    /// Timing and identity in use.
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Counters for this bus.
    pub fn metrics(&self) -> Arc<BusMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Current link state.
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// Attach `handler` to `address`.
    pub fn register_device(&self, address: u8, handler: Arc<dyn DeviceHandler>) -> Result<()> {
        let role = handler.role();
        self.inner.shared.lock().registry.insert(address, handler)?;
        info!(address = format_args!("0x{address:02X}"), %role, "device registered");
        Ok(())
    }

    /// Detach whatever handler serves `address`.
    pub fn unregister_device(&self, address: u8) {
        if self.inner.shared.lock().registry.remove(address).is_some() {
            info!(address = format_args!("0x{address:02X}"), "device unregistered");
        }
    }

    /// Whether a device of `role` has been heard since the last connect.
    pub fn is_online(&self, role: DeviceRole) -> bool {
        self.inner.shared.lock().registry.is_online(role)
    }

    /// Whether the device at `address` has been heard since the last connect.
    pub fn is_address_online(&self, address: u8) -> bool {
        self.inner.shared.lock().registry.is_address_online(address)
    }

    /// True while an online controller is driving the bus.
    pub fn other_master_active(&self) -> bool {
        let controllers = self.inner.shared.lock().registry.online(DeviceRole::Controller);
        controllers.iter().any(|controller| !controller.service_mode())
    }

    /// Route one received message.
    pub fn dispatch(&self, message: &RawMessage) {
        self.inner.dispatch(message);
    }

    /// Open `link` and start the reader thread.
    pub fn connect(&self, link: &dyn Link) -> Result<()> {
        {
            let mut shared = self.inner.shared.lock();
            if shared.state == ConnectionState::Connected {
                return Ok(());
            }
            shared.state = ConnectionState::Connecting;
        }
        // a previous reader may still be winding down after a link loss
        self.inner.stop_reader();

        let (source, sink) = match link.open() {
            Ok(pair) => pair,
            Err(err) => {
                let state = if matches!(
                    err.kind(),
                    io::ErrorKind::NotFound
                        | io::ErrorKind::InvalidInput
                        | io::ErrorKind::PermissionDenied
                ) {
                    ConnectionState::ConfigError
                } else {
                    ConnectionState::Disconnected
                };
                error!(link = %link.name(), error = %err, %state, "unable to open link");
                self.inner.shared.lock().state = state;
                return Err(err.into());
            }
        };

        *self.inner.tx.lock() = Some(sink);
        let stop = Arc::new(AtomicBool::new(false));
        let mut reader = FrameReader::new(
            source,
            self.inner.config.idle_backoff,
            Arc::clone(&self.inner.metrics),
        );
        let weak = Arc::downgrade(&self.inner);
        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("poolbus-reader".into())
            .spawn(move || reader_loop(&mut reader, &weak, &thread_stop));
        let thread = match thread {
            Ok(thread) => thread,
            Err(err) => {
                *self.inner.tx.lock() = None;
                self.inner.shared.lock().state = ConnectionState::Disconnected;
                return Err(err.into());
            }
        };
        *self.inner.reader.lock() = Some(ReaderHandle { stop, thread });
        self.inner.shared.lock().state = ConnectionState::Connected;
        info!(link = %link.name(), "bus connected");
        Ok(())
    }

    /// Stop the reader, drop the sink and fail any pending acknowledged write.
    pub fn disconnect(&self) {
        self.inner.link_lost();
        self.inner.stop_reader();
        info!("bus disconnected");
    }

    /// Transmit without waiting for a reply.
    pub fn write(&self, message: &RawMessage) -> Result<()> {
        let mut tx = self.inner.tx.lock();
        let wire = message.clone().with_source(self.inner.config.id).to_wire();
        self.inner.transmit(&mut tx, &wire)
    }

    /// Transmit and wait for a message with `response_action` from a registered device.
    ///
    /// Retransmits up to `max_retries` times after each unanswered `timeout`.
    /// Running out of attempts yields [`AckOutcome::TimedOut`]; losing the link
    /// while waiting yields [`BusError::StreamClosed`].
    pub fn write_and_await_response(
        &self,
        message: &RawMessage,
        response_action: u8,
        max_retries: u8,
        timeout: Duration,
    ) -> Result<AckOutcome> {
        let mut tx = self.inner.tx.lock();
        let wire = message.clone().with_source(self.inner.config.id).to_wire();
        let attempts = u32::from(max_retries) + 1;

        {
            let mut shared = self.inner.shared.lock();
            if shared.state != ConnectionState::Connected {
                return Err(BusError::NotConnected);
            }
            shared.ack = AckSlot::Waiting {
                action: response_action,
            };
        }

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.inner.metrics.retry();
                debug!(
                    action = format_args!("0x{:02X}", message.action()),
                    attempt, "retransmitting"
                );
            }
            if let Err(err) = self.inner.transmit(&mut tx, &wire) {
                self.inner.shared.lock().ack = AckSlot::Idle;
                return Err(err);
            }

            let deadline = Instant::now() + timeout;
            let mut shared = self.inner.shared.lock();
            loop {
                if let Some(resolution) = shared.ack.resolve() {
                    return resolution.map(AckOutcome::Response);
                }
                if self
                    .inner
                    .ack_signal
                    .wait_until(&mut shared, deadline)
                    .timed_out()
                {
                    if let Some(resolution) = shared.ack.resolve() {
                        return resolution.map(AckOutcome::Response);
                    }
                    break;
                }
            }
        }

        self.inner.shared.lock().ack = AckSlot::Idle;
        self.inner.metrics.ack_timeout();
        warn!(
            action = format_args!("0x{:02X}", message.action()),
            response = format_args!("0x{response_action:02X}"),
            attempts,
            "no response from device"
        );
        Ok(AckOutcome::TimedOut {
            action: response_action,
            attempts,
        })
    }

    /// Send a command with the configured retry budget and timeout.
    ///
    /// Returns the correlated response, or `None` for commands that expect none.
    pub fn send(&self, command: &Command) -> Result<Option<RawMessage>> {
        match command.response {
            None => self.write(&command.message).map(|()| None),
            Some(action) => self
                .write_and_await_response(
                    &command.message,
                    action,
                    self.inner.config.max_retries,
                    self.inner.config.ack_timeout,
                )?
                .into_result()
                .map(Some),
        }
    }
}

impl Inner {
    fn dispatch(&self, message: &RawMessage) {
        let source = message.source();
        let handler = self.shared.lock().registry.touch(source);
        let Some(handler) = handler else {
            self.discover(message);
            return;
        };

        handler.handle(message);
        self.metrics.dispatched();

        let mut shared = self.shared.lock();
        if shared.ack.offer(message) {
            self.ack_signal.notify_all();
        }
    }

    fn discover(&self, message: &RawMessage) {
        let address = message.source();
        let category = DeviceCategory::classify(message.kind(), address);
        self.metrics.unregistered();
        if category == DeviceCategory::ControlPanel {
            debug!(address = format_args!("0x{address:02X}"), "control panel traffic");
            return;
        }

        let (first_sighting, controller_online) = {
            let mut shared = self.shared.lock();
            (
                shared.unregistered.insert(address),
                shared.registry.is_online(DeviceRole::Controller),
            )
        };
        if !first_sighting {
            debug!(address = format_args!("0x{address:02X}"), %category, "unregistered device");
            return;
        }

        info!(address = format_args!("0x{address:02X}"), %category, "discovered unregistered device");
        match category {
            DeviceCategory::Controller if !controller_online => {
                self.discovery.on_unregistered_controller(address)
            }
            DeviceCategory::Pump => self.discovery.on_unregistered_pump(address),
            DeviceCategory::ChemistryMonitor => {
                self.discovery.on_unregistered_chemistry_monitor(address)
            }
            DeviceCategory::Chlorinator => self.discovery.on_unregistered_chlorinator(address),
            _ => {}
        }
    }

    fn transmit(&self, tx: &mut Option<Box<dyn ByteSink>>, wire: &[u8]) -> Result<()> {
        if self.shared.lock().state != ConnectionState::Connected {
            return Err(BusError::NotConnected);
        }
        let Some(sink) = tx.as_mut() else {
            return Err(BusError::NotConnected);
        };
        match sink.send(wire) {
            Ok(()) => {
                self.metrics.write();
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "write failed, dropping link");
                *tx = None;
                self.mark_disconnected();
                self.signal_reader_stop();
                Err(err.into())
            }
        }
    }

    /// Mark the link gone and release any waiter, then drop the sink.
    fn link_lost(&self) {
        self.mark_disconnected();
        *self.tx.lock() = None;
    }

    fn mark_disconnected(&self) {
        let mut shared = self.shared.lock();
        if matches!(
            shared.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            shared.state = ConnectionState::Disconnected;
        }
        shared.registry.set_all_offline();
        if shared.ack.cancel() {
            self.ack_signal.notify_all();
        }
    }

    fn signal_reader_stop(&self) {
        if let Some(handle) = self.reader.lock().as_ref() {
            handle.stop.store(true, Ordering::Release);
        }
    }

    fn stop_reader(&self) {
        let handle = self.reader.lock().take();
        if let Some(handle) = handle {
            handle.stop.store(true, Ordering::Release);
            if handle.thread.thread().id() != std::thread::current().id()
                && handle.thread.join().is_err()
            {
                warn!("reader thread panicked");
            }
        }
    }
}

fn reader_loop(reader: &mut FrameReader, inner: &Weak<Inner>, stop: &AtomicBool) {
    loop {
        match reader.next_message(stop) {
            Ok(Some(message)) => match inner.upgrade() {
                Some(inner) => inner.dispatch(&message),
                None => return,
            },
            Ok(None) => return,
            Err(err) => {
                if stop.load(Ordering::Acquire) {
                    return;
                }
                warn!(error = %err, "bus input lost");
                if let Some(inner) = inner.upgrade() {
                    inner.link_lost();
                }
                return;
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.get_mut().take() {
            handle.stop.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MemoryLink;
    use poolbus_proto::parse_hex;

    struct Recorder {
        role: DeviceRole,
        seen: Mutex<Vec<RawMessage>>,
    }

    impl Recorder {
        fn new(role: DeviceRole) -> Arc<Self> {
            Arc::new(Self {
                role,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl DeviceHandler for Recorder {
        fn role(&self) -> DeviceRole {
            self.role
        }

        fn handle(&self, message: &RawMessage) {
            self.seen.lock().push(message.clone());
        }
    }

    fn fast_config() -> BusConfig {
        BusConfig {
            ack_timeout: Duration::from_millis(50),
            idle_backoff: Duration::from_millis(1),
            ..BusConfig::default()
        }
    }

    fn ack_from(source: u8) -> RawMessage {
        RawMessage::primary(0x01, 0x22, source, 0x01, &[0x86]).expect("valid")
    }

    #[test]
    fn dispatch_routes_by_source_and_marks_online() {
        let bus = BusController::new(fast_config());
        let controller = Recorder::new(DeviceRole::Controller);
        bus.register_device(0x10, controller.clone()).expect("register");
        assert!(!bus.is_online(DeviceRole::Controller));

        bus.dispatch(&ack_from(0x10));
        assert_eq!(controller.seen.lock().len(), 1);
        assert!(bus.is_online(DeviceRole::Controller));
        assert!(bus.other_master_active());
        assert_eq!(bus.metrics().snapshot().dispatched, 1);
    }

    #[test]
    fn register_rejects_duplicates() {
        let bus = BusController::new(fast_config());
        bus.register_device(0x60, Recorder::new(DeviceRole::Pump))
            .expect("register");
        assert!(matches!(
            bus.register_device(0x60, Recorder::new(DeviceRole::Pump)),
            Err(BusError::AddressInUse(0x60))
        ));
        bus.unregister_device(0x60);
        bus.unregister_device(0x60);
        bus.register_device(0x60, Recorder::new(DeviceRole::Pump))
            .expect("register again");
    }

    #[test]
    fn writes_require_connection() {
        let bus = BusController::new(fast_config());
        assert_eq!(bus.state(), ConnectionState::Init);
        assert!(matches!(bus.write(&ack_from(0)), Err(BusError::NotConnected)));
        assert!(matches!(
            bus.write_and_await_response(&ack_from(0), 0x01, 0, Duration::from_millis(1)),
            Err(BusError::NotConnected)
        ));
    }

    #[test]
    fn write_stamps_bus_id() {
        let bus = BusController::new(fast_config());
        let link = MemoryLink::new();
        bus.connect(&link).expect("connect");
        let request = RawMessage::primary(0x10, 0x10, 0x00, 0x86, &[0x0B, 0x01]).expect("valid");
        bus.write(&request).expect("write");
        assert_eq!(
            link.written(),
            vec![parse_hex("FF 00 FF A5 10 10 22 86 02 0B 01 01 7B").expect("hex")]
        );
        bus.disconnect();
        assert_eq!(bus.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn acknowledged_write_completes_on_matching_response() {
        let bus = BusController::new(fast_config());
        bus.register_device(0x10, Recorder::new(DeviceRole::Controller))
            .expect("register");
        let link = MemoryLink::new();
        link.set_responder(|_| {
            Some(parse_hex("FF FF 00 FF A5 10 22 10 01 01 86 01 6F").expect("hex"))
        });
        bus.connect(&link).expect("connect");

        let request = RawMessage::primary(0x10, 0x10, 0x00, 0x86, &[0x0B, 0x01]).expect("valid");
        let outcome = bus
            .write_and_await_response(&request, 0x01, 2, Duration::from_secs(2))
            .expect("no error");
        let expected = RawMessage::primary(0x10, 0x22, 0x10, 0x01, &[0x86]).expect("valid");
        assert_eq!(outcome, AckOutcome::Response(expected));
        assert_eq!(link.written().len(), 1);
        bus.disconnect();
    }

    #[test]
    fn exhausted_retries_return_timeout_value() {
        let bus = BusController::new(fast_config());
        let link = MemoryLink::new();
        bus.connect(&link).expect("connect");
        let request = RawMessage::primary(0x01, 0x10, 0x00, 0x02, &[0x00]).expect("valid");
        let outcome = bus
            .write_and_await_response(&request, 0x02, 2, Duration::from_millis(10))
            .expect("no error");
        assert_eq!(
            outcome,
            AckOutcome::TimedOut {
                action: 0x02,
                attempts: 3
            }
        );
        assert_eq!(link.written().len(), 3);
        let snapshot = bus.metrics().snapshot();
        assert_eq!(snapshot.retries, 2);
        assert_eq!(snapshot.ack_timeouts, 1);
        bus.disconnect();
    }

    #[test]
    fn open_failures_set_state() {
        let bus = BusController::new(fast_config());
        let link = MemoryLink::new();
        link.fail_next_open(io::ErrorKind::ConnectionRefused);
        assert!(matches!(bus.connect(&link), Err(BusError::Io(_))));
        assert_eq!(bus.state(), ConnectionState::Disconnected);

        link.fail_next_open(io::ErrorKind::NotFound);
        assert!(bus.connect(&link).is_err());
        assert_eq!(bus.state(), ConnectionState::ConfigError);

        bus.connect(&link).expect("reconnect");
        assert_eq!(bus.state(), ConnectionState::Connected);
        bus.disconnect();
    }

    #[test]
    fn end_of_stream_disconnects() {
        let bus = BusController::new(fast_config());
        bus.register_device(0x10, Recorder::new(DeviceRole::Controller))
            .expect("register");
        let link = MemoryLink::new();
        bus.connect(&link).expect("connect");
        link.push_message(&ack_from(0x10));
        link.close();

        let deadline = Instant::now() + Duration::from_secs(5);
        while bus.state() == ConnectionState::Connected && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(bus.state(), ConnectionState::Disconnected);
        assert!(!bus.is_online(DeviceRole::Controller));
    }
}
