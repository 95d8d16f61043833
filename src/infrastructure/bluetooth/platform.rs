//! Platform BLE Port
//!
//! The session never talks to a BLE stack directly. Outbound requests go
//! through [`BlePlatform`]; whatever the stack reports back is fed in as a
//! [`PlatformEvent`] through a [`PlatformEvents`] sink.

use crate::domain::models::{Advertisement, DeviceId};
use crate::infrastructure::bluetooth::actor::Inbox;
use tokio::sync::mpsc;
use tracing::debug;

/// Requests issued to the BLE stack.
///
/// Every call is fire-and-forget. Outcomes (link up, write confirmed,
/// failures) arrive later as [`PlatformEvent`]s.
pub trait BlePlatform: Send {
    fn start_scan(&mut self);
    fn stop_scan(&mut self);
    fn connect(&mut self, device: &DeviceId);
    fn disconnect(&mut self, device: &DeviceId);
    fn write(&mut self, device: &DeviceId, payload: &[u8]);
}

/// Facts reported by the BLE stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    Advertisement(Advertisement),
    LinkUp,
    LinkDown,
    WriteConfirmed,
    WriteFailed(String),
    Error(String),
}

/// Create the channel a platform adapter reports through. The
/// [`PlatformInbox`] half is handed to
/// [`SessionHandle::spawn`](crate::infrastructure::bluetooth::actor::SessionHandle::spawn).
pub fn platform_channel() -> (PlatformEvents, PlatformInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PlatformEvents::new(tx.clone()), PlatformInbox { tx, rx })
}

/// Session side of [`platform_channel`]
#[derive(Debug)]
pub struct PlatformInbox {
    pub(crate) tx: mpsc::UnboundedSender<Inbox>,
    pub(crate) rx: mpsc::UnboundedReceiver<Inbox>,
}

/// Cloneable sink through which a platform adapter reports to its session
#[derive(Debug, Clone)]
pub struct PlatformEvents {
    inbox: mpsc::UnboundedSender<Inbox>,
}

impl PlatformEvents {
    pub(crate) fn new(inbox: mpsc::UnboundedSender<Inbox>) -> Self {
        Self { inbox }
    }

    pub fn send(&self, event: PlatformEvent) {
        if self.inbox.send(Inbox::Platform(event)).is_err() {
            debug!("Session stopped, dropping platform event");
        }
    }

    pub fn advertisement(&self, advertisement: Advertisement) {
        self.send(PlatformEvent::Advertisement(advertisement));
    }

    pub fn link_up(&self) {
        self.send(PlatformEvent::LinkUp);
    }

    pub fn link_down(&self) {
        self.send(PlatformEvent::LinkDown);
    }

    pub fn write_confirmed(&self) {
        self.send(PlatformEvent::WriteConfirmed);
    }

    pub fn write_failed(&self, reason: impl Into<String>) {
        self.send(PlatformEvent::WriteFailed(reason.into()));
    }

    pub fn platform_error(&self, reason: impl Into<String>) {
        self.send(PlatformEvent::Error(reason.into()));
    }
}
