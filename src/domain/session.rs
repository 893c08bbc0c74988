//! Pointer Session
//!
//! Owns the filter, button state and transport link for one connection and
//! is the only writer to that transport.
//!
//! ```text
//! Idle ──connect──► Connecting ──ok──► Active ──host lost──► Disconnected
//!  ▲                    │                 │
//!  └──────failed────────┘                 └──stop──► Stopped
//! ```

use crate::domain::buttons::ButtonEdgeTracker;
use crate::domain::imu::{FilterState, MotionFilter};
use crate::domain::models::{
    AppEvent, ButtonId, ButtonMask, ConnectionStatus, Event, InputEvent, MessageSeverity,
    MotionSample, PointerDelta, StatusMessage, TransportKind,
};
use crate::infrastructure::input_source::InputSource;
use crate::infrastructure::transport::protocol::{ReportEncoder, NETWORK_PORT};
use crate::infrastructure::transport::{
    Delivery, Dispatcher, HidLinkEvent, HidReportChannel, HidSink, NetworkSink, TransportError,
    TransportSink,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Disconnected,
    Stopped,
}

/// Where to connect, per transport
pub enum ConnectTarget {
    Network { host: String, port: u16 },
    Hid { channel: Arc<dyn HidReportChannel> },
}

impl ConnectTarget {
    pub fn network(host: impl Into<String>) -> Self {
        Self::Network {
            host: host.into(),
            port: NETWORK_PORT,
        }
    }

    pub fn hid(channel: Arc<dyn HidReportChannel>) -> Self {
        Self::Hid { channel }
    }

    fn kind(&self) -> TransportKind {
        match self {
            Self::Network { .. } => TransportKind::Network,
            Self::Hid { .. } => TransportKind::Hid,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },

    #[error("Session is {session}, target is {target}")]
    KindMismatch {
        session: TransportKind,
        target: TransportKind,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Live transport for an active session
struct Link {
    dispatcher: Dispatcher,
}

pub struct Session {
    kind: TransportKind,
    state: watch::Sender<SessionState>,
    filter: Mutex<MotionFilter>,
    buttons: Mutex<ButtonEdgeTracker>,
    link: RwLock<Option<Link>>,
    input_pump: Mutex<Option<JoinHandle<()>>>,
    link_monitor: Mutex<Option<JoinHandle<()>>>,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl Session {
    pub fn new(kind: TransportKind, events: mpsc::UnboundedSender<AppEvent>) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Idle);
        Arc::new(Self {
            kind,
            state,
            filter: Mutex::new(MotionFilter::new()),
            buttons: Mutex::new(ButtonEdgeTracker::new()),
            link: RwLock::new(None),
            input_pump: Mutex::new(None),
            link_monitor: Mutex::new(None),
            events,
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn filter_state(&self) -> FilterState {
        lock(&self.filter).state()
    }

    pub fn button_mask(&self) -> ButtonMask {
        lock(&self.buttons).mask()
    }

    /// Run the transport handshake. Ends `Active` on success, back in `Idle` on failure.
    pub async fn connect(self: &Arc<Self>, target: ConnectTarget) -> Result<(), SessionError> {
        if target.kind() != self.kind {
            return Err(SessionError::KindMismatch {
                session: self.kind,
                target: target.kind(),
            });
        }
        self.transition("connect", &[SessionState::Idle], SessionState::Connecting)?;
        self.send_status(ConnectionStatus::Connecting);

        // stop() cancels a handshake that would otherwise wait for a host forever
        let established = tokio::select! {
            result = self.establish(target) => result,
            _ = self.stopped() => {
                info!("{} handshake cancelled", self.kind);
                return Err(SessionError::InvalidState {
                    action: "connect",
                    state: SessionState::Stopped,
                });
            }
        };

        let (dispatcher, monitor, greeting) = match established {
            Ok(established) => established,
            Err(e) => {
                warn!("{} connection failed: {}", self.kind, e);
                self.state.send_if_modified(|state| {
                    if *state == SessionState::Connecting {
                        *state = SessionState::Idle;
                        return true;
                    }
                    false
                });
                let text = match &e {
                    TransportError::InvalidAddress(_) => "Invalid IP".to_string(),
                    other => format!("Connection failed: {}", other),
                };
                self.send_log(text, MessageSeverity::Error);
                self.send_status(ConnectionStatus::Error);
                return Err(e.into());
            }
        };

        lock(&self.filter).reset();
        lock(&self.buttons).reset();
        *write(&self.link) = Some(Link { dispatcher });

        // stop() may have run while the handshake was in flight
        let activated =
            self.transition("activate", &[SessionState::Connecting], SessionState::Active);
        if let Err(e) = activated {
            self.release_link();
            if let Some(monitor) = monitor {
                monitor.abort();
            }
            return Err(e);
        }
        *lock(&self.link_monitor) = monitor;

        info!("{} session active", self.kind);
        self.send_log(greeting, MessageSeverity::Success);
        self.send_status(ConnectionStatus::Connected);
        Ok(())
    }

    async fn stopped(&self) {
        let mut state = self.subscribe();
        let _ = state.wait_for(|s| *s == SessionState::Stopped).await;
    }

    async fn establish(
        self: &Arc<Self>,
        target: ConnectTarget,
    ) -> Result<(Dispatcher, Option<JoinHandle<()>>, String), TransportError> {
        match target {
            ConnectTarget::Network { host, port } => {
                let sink = NetworkSink::connect_with_port(&host, port).await?;
                debug!("Datagrams go to {}", sink.destination());
                let sink: Arc<dyn TransportSink> = Arc::new(sink);
                Ok((Dispatcher::spawn(sink), None, format!("Sending to {}", host)))
            }
            ConnectTarget::Hid { channel } => {
                let (sink, link_events) = HidSink::establish(channel).await?;
                let sink = Arc::new(sink);
                let monitor = tokio::spawn(watch_host(
                    Arc::downgrade(self),
                    sink.clone(),
                    link_events,
                ));
                let sink: Arc<dyn TransportSink> = sink;
                Ok((Dispatcher::spawn(sink), Some(monitor), "BT Connected!".to_string()))
            }
        }
    }

    /// Start consuming `source`. Only allowed while `Active`.
    pub fn attach_input<S: InputSource>(
        self: &Arc<Self>,
        mut source: S,
    ) -> Result<(), SessionError> {
        let state = self.state();
        if state != SessionState::Active {
            return Err(SessionError::InvalidState {
                action: "attach input",
                state,
            });
        }

        let session = Arc::downgrade(self);
        let pump = tokio::spawn(async move {
            while let Some(event) = source.next_event().await {
                let Some(active) = session.upgrade() else {
                    break;
                };
                active.feed_event(event);
            }
            debug!("Input source finished");
        });

        if let Some(previous) = lock(&self.input_pump).replace(pump) {
            previous.abort();
        }
        Ok(())
    }

    /// Resolves when the attached input source runs dry or the session leaves `Active`
    pub async fn run_until_idle(&self) {
        let mut state = self.subscribe();
        let pump = lock(&self.input_pump).take();
        let Some(pump) = pump else {
            let _ = state.wait_for(|s| *s != SessionState::Active).await;
            return;
        };

        // Cancelling this future must not leave the pump detached
        let mut pump = AbortOnDrop(pump);
        tokio::select! {
            _ = &mut pump.0 => {}
            _ = state.wait_for(|s| *s != SessionState::Active) => {}
        }
    }

    pub fn feed_event(&self, event: InputEvent) {
        match event {
            InputEvent::Motion(sample) => {
                self.feed_motion(sample);
            }
            InputEvent::Button { id, pressed } => {
                self.feed_button(id, pressed);
            }
        }
    }

    /// Filter one sample and queue the movement, if any. Never blocks on I/O.
    pub fn feed_motion(&self, sample: MotionSample) -> Option<PointerDelta> {
        if self.state() != SessionState::Active {
            return None;
        }

        let mut filter = lock(&self.filter);
        let delta = filter.apply(sample)?;
        // Both guards stay held until the report is queued: deltas keep their
        // order and a concurrent release cannot slip in ahead of a stale mask
        let buttons = lock(&self.buttons);
        self.submit(Event::Move(delta), buttons.mask(), Delivery::BestEffort);
        Some(delta)
    }

    /// Apply a button edge and queue its report. Returns the new mask.
    pub fn feed_button(&self, id: ButtonId, pressed: bool) -> Option<ButtonMask> {
        if self.state() != SessionState::Active {
            return None;
        }

        let mut buttons = lock(&self.buttons);
        if let Some(change) = buttons.edge(id, pressed) {
            self.submit(Event::Buttons(change), change.mask, Delivery::Reliable);
        }
        Some(buttons.mask())
    }

    fn submit(&self, event: Event, held: ButtonMask, delivery: Delivery) {
        let Some(payload) = ReportEncoder::encode(&event, self.kind, held) else {
            return;
        };
        if let Some(link) = read(&self.link).as_ref() {
            link.dispatcher.submit(payload, delivery);
        }
    }

    /// The host went away. No reconnect is attempted.
    pub fn host_lost(&self) {
        let changed = self.state.send_if_modified(|state| {
            if matches!(*state, SessionState::Active | SessionState::Connecting) {
                *state = SessionState::Disconnected;
                return true;
            }
            false
        });
        if !changed {
            return;
        }

        warn!("{} host lost", self.kind);
        self.release_link();
        if let Some(pump) = lock(&self.input_pump).take() {
            pump.abort();
        }
        self.send_log("Disconnected".to_string(), MessageSeverity::Warning);
        self.send_status(ConnectionStatus::Disconnected);
    }

    /// User shutdown: release input and transport
    pub fn stop(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == SessionState::Stopped {
                return false;
            }
            *state = SessionState::Stopped;
            true
        });
        if !changed {
            return;
        }

        info!("{} session stopped", self.kind);
        if let Some(pump) = lock(&self.input_pump).take() {
            pump.abort();
        }
        if let Some(monitor) = lock(&self.link_monitor).take() {
            monitor.abort();
        }
        self.release_link();
        self.send_log("Stopped".to_string(), MessageSeverity::Info);
        self.send_status(ConnectionStatus::Disconnected);
    }

    fn release_link(&self) {
        if let Some(link) = write(&self.link).take() {
            let dropped = link.dispatcher.dropped();
            if dropped > 0 {
                debug!("{} reports dropped during session", dropped);
            }
            // Queued reports drain in the background; nothing waits on them
            drop(link.dispatcher.shutdown());
        }
    }

    fn transition(
        &self,
        action: &'static str,
        from: &[SessionState],
        to: SessionState,
    ) -> Result<(), SessionError> {
        let mut current = to;
        let changed = self.state.send_if_modified(|state| {
            current = *state;
            if from.contains(state) {
                *state = to;
                return true;
            }
            false
        });
        if changed {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                action,
                state: current,
            })
        }
    }

    fn send_status(&self, status: ConnectionStatus) {
        let _ = self.events.send(AppEvent::ConnectionStatus(status));
    }

    fn send_log(&self, message: String, severity: MessageSeverity) {
        let _ = self
            .events
            .send(AppEvent::LogMessage(StatusMessage { message, severity }));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(pump) = lock(&self.input_pump).take() {
            pump.abort();
        }
        if let Some(monitor) = lock(&self.link_monitor).take() {
            monitor.abort();
        }
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn watch_host(
    session: Weak<Session>,
    sink: Arc<HidSink>,
    mut link_events: mpsc::UnboundedReceiver<HidLinkEvent>,
) {
    loop {
        match link_events.recv().await {
            Some(HidLinkEvent::HostDisconnected(address)) => {
                debug!("Host {} disconnected", address);
                break;
            }
            Some(HidLinkEvent::HostConnected(address)) => {
                debug!("Ignoring late host connection from {}", address);
            }
            None => break,
        }
    }

    sink.unbind_host();
    if let Some(session) = session.upgrade() {
        session.host_lost();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
