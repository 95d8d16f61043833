//! Session actor
//!
//! Runs a [`SessionManager`] on its own tokio task. Caller requests,
//! platform callbacks and scan timer expiries are all funnelled into that one
//! task, so transitions never race.

use crate::domain::error::SessionError;
use crate::domain::models::{CommandKind, DiscoveredDevice, SessionState};
use crate::domain::settings::SessionConfig;
use crate::infrastructure::bluetooth::platform::{BlePlatform, PlatformEvent, PlatformInbox};
use crate::infrastructure::bluetooth::scanner::ScanTimer;
use crate::infrastructure::bluetooth::service::{EventStream, SessionManager};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Messages that originate below the session (platform, timers)
#[derive(Debug)]
pub(crate) enum Inbox {
    Platform(PlatformEvent),
    ScanTimeout(u64),
}

enum Request {
    StartScan {
        target: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    StopScan {
        reply: oneshot::Sender<()>,
    },
    ConnectToTarget {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Connect {
        device: DiscoveredDevice,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    SendCommand {
        command: CommandKind,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Subscribe {
        reply: oneshot::Sender<Result<EventStream, SessionError>>,
    },
    Unsubscribe,
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown,
}

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub found: Option<DiscoveredDevice>,
    pub linked: Option<DiscoveredDevice>,
}

/// Scan timer backed by a tokio sleep task per arm
pub(crate) struct TokioScanTimer {
    inbox: mpsc::UnboundedSender<Inbox>,
    pending: Option<JoinHandle<()>>,
}

impl TokioScanTimer {
    pub(crate) fn new(inbox: mpsc::UnboundedSender<Inbox>) -> Self {
        Self {
            inbox,
            pending: None,
        }
    }
}

impl ScanTimer for TokioScanTimer {
    fn arm(&mut self, generation: u64, timeout: Duration) {
        self.cancel();
        let inbox = self.inbox.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = inbox.send(Inbox::ScanTimeout(generation));
        }));
    }

    fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl Drop for TokioScanTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Cloneable handle to a running session. The session task stops once every
/// handle is dropped or [`shutdown`](Self::shutdown) is called.
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::UnboundedSender<Request>,
}

impl SessionHandle {
    /// Start the session task. Must be called inside a tokio runtime.
    pub fn spawn<P>(config: SessionConfig, platform: P, inbox: PlatformInbox) -> Self
    where
        P: BlePlatform + 'static,
    {
        let PlatformInbox { tx, rx } = inbox;
        let timer = TokioScanTimer::new(tx);
        let manager = SessionManager::new(platform, config, Box::new(timer));
        let (requests, request_rx) = mpsc::unbounded_channel();

        tokio::spawn(run(manager, request_rx, rx));
        Self { requests }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(make(reply))
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn start_scan(&self, target: &str) -> Result<(), SessionError> {
        let target = target.to_string();
        self.request(|reply| Request::StartScan { target, reply })
            .await?
    }

    pub async fn stop_scan(&self) -> Result<(), SessionError> {
        self.request(|reply| Request::StopScan { reply }).await
    }

    pub async fn connect_to_target(&self) -> Result<(), SessionError> {
        self.request(|reply| Request::ConnectToTarget { reply })
            .await?
    }

    pub async fn connect(&self, device: &DiscoveredDevice) -> Result<(), SessionError> {
        let device = device.clone();
        self.request(|reply| Request::Connect { device, reply })
            .await?
    }

    /// Start the trip: connect to the current target. The trip is running
    /// once [`SessionEvent::Connected`](crate::domain::models::SessionEvent::Connected)
    /// arrives.
    pub async fn start_trip(&self) -> Result<(), SessionError> {
        self.connect_to_target().await
    }

    /// End the trip by dropping the link
    pub async fn end_trip(&self) -> Result<(), SessionError> {
        self.disconnect().await
    }

    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(|reply| Request::Disconnect { reply }).await
    }

    pub async fn send_command(&self, command: CommandKind) -> Result<(), SessionError> {
        self.request(|reply| Request::SendCommand { command, reply })
            .await?
    }

    pub async fn subscribe(&self) -> Result<EventStream, SessionError> {
        self.request(|reply| Request::Subscribe { reply }).await?
    }

    pub fn unsubscribe(&self) {
        let _ = self.requests.send(Request::Unsubscribe);
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Request::Snapshot { reply }).await
    }

    pub async fn state(&self) -> Result<SessionState, SessionError> {
        Ok(self.snapshot().await?.state)
    }

    pub fn shutdown(&self) {
        let _ = self.requests.send(Request::Shutdown);
    }
}

async fn run<P: BlePlatform>(
    mut manager: SessionManager<P>,
    mut requests: mpsc::UnboundedReceiver<Request>,
    mut inbox: mpsc::UnboundedReceiver<Inbox>,
) {
    info!("Session started");
    loop {
        tokio::select! {
            // facts already reported are applied before later requests
            biased;
            Some(message) = inbox.recv() => match message {
                Inbox::Platform(event) => manager.handle_platform_event(event),
                Inbox::ScanTimeout(generation) => manager.on_scan_timeout(generation),
            },
            request = requests.recv() => match request {
                Some(Request::Shutdown) | None => break,
                Some(request) => handle_request(&mut manager, request),
            },
        }
    }

    manager.disconnect();
    info!("Session stopped");
}

fn handle_request<P: BlePlatform>(manager: &mut SessionManager<P>, request: Request) {
    match request {
        Request::StartScan { target, reply } => {
            let _ = reply.send(manager.start_scan(&target));
        }
        Request::StopScan { reply } => {
            manager.stop_scan();
            let _ = reply.send(());
        }
        Request::ConnectToTarget { reply } => {
            let _ = reply.send(manager.connect_to_target());
        }
        Request::Connect { device, reply } => {
            let _ = reply.send(manager.connect(&device));
        }
        Request::Disconnect { reply } => {
            manager.disconnect();
            let _ = reply.send(());
        }
        Request::SendCommand { command, reply } => {
            let _ = reply.send(manager.send_command(command));
        }
        Request::Subscribe { reply } => {
            let _ = reply.send(manager.subscribe());
        }
        Request::Unsubscribe => manager.unsubscribe(),
        Request::Snapshot { reply } => {
            let _ = reply.send(SessionSnapshot {
                state: manager.state(),
                found: manager.found_device().cloned(),
                linked: manager.linked_device().cloned(),
            });
        }
        Request::Shutdown => debug!("Shutdown handled by the run loop"),
    }
}
