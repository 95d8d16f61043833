//! Bluetooth Session Module
//!
//! Orchestrator that composes scanning, connection and command dispatch
//! into one session. It is the only place where controller state changes;
//! the controllers report what happened and the session decides which
//! event (if any) the subscriber sees.

use crate::domain::error::{LinkError, SessionError};
use crate::domain::models::{
    CommandKind, DeviceId, DiscoveredDevice, LinkState, SessionEvent, SessionState,
};
use crate::domain::settings::SessionConfig;
use crate::infrastructure::bluetooth::{
    connection::ConnectionController,
    dispatcher::CommandDispatcher,
    filter::AdvertisementFilter,
    platform::{BlePlatform, PlatformEvent},
    scanner::{ScanController, ScanTimer},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receiving end of a session subscription. Dropping it detaches.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}

pub struct SessionManager<P: BlePlatform> {
    platform: P,
    scan: ScanController,
    link: ConnectionController,
    dispatcher: CommandDispatcher,
    /// Link written off by a failure whose platform down-signal is still due
    torn_down: Option<DeviceId>,
    subscriber: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl<P: BlePlatform> SessionManager<P> {
    pub fn new(platform: P, config: SessionConfig, timer: Box<dyn ScanTimer>) -> Self {
        Self {
            platform,
            scan: ScanController::new(
                AdvertisementFilter::new(config.match_policy),
                config.scan_timeout,
                timer,
            ),
            link: ConnectionController::new(),
            dispatcher: CommandDispatcher::new(),
            torn_down: None,
            subscriber: None,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn state(&self) -> SessionState {
        SessionState::compose(self.scan.state(), self.link.state())
    }

    pub fn scan_generation(&self) -> u64 {
        self.scan.generation()
    }

    pub fn found_device(&self) -> Option<&DiscoveredDevice> {
        self.scan.found()
    }

    pub fn linked_device(&self) -> Option<&DiscoveredDevice> {
        self.link.device()
    }

    /// Attach the single event subscriber
    pub fn subscribe(&mut self) -> Result<EventStream, SessionError> {
        if let Some(tx) = &self.subscriber {
            if !tx.is_closed() {
                return Err(SessionError::AlreadySubscribed);
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriber = Some(tx);
        Ok(EventStream { rx })
    }

    pub fn unsubscribe(&mut self) {
        self.subscriber = None;
    }

    pub fn start_scan(&mut self, target: &str) -> Result<(), SessionError> {
        if self.link.state() != LinkState::Disconnected {
            return Err(SessionError::LinkActive);
        }
        self.scan.start(target, &mut self.platform)?;
        Ok(())
    }

    /// Cancel scanning without notifying the subscriber
    pub fn stop_scan(&mut self) {
        if self.link.state() == LinkState::Disconnected {
            self.scan.stop(&mut self.platform);
        }
    }

    /// Connect to the most recent discovery (starts the trip)
    pub fn connect_to_target(&mut self) -> Result<(), SessionError> {
        let device = self.scan.found().cloned().ok_or(SessionError::NoTarget)?;
        self.connect(&device)
    }

    /// Connect to `device`, which must be the current discovery
    pub fn connect(&mut self, device: &DiscoveredDevice) -> Result<(), SessionError> {
        if self.link.state() != LinkState::Disconnected {
            return Err(SessionError::LinkActive);
        }
        if device.discovery != self.scan.generation() {
            warn!(
                "Rejecting connect to {}: discovery {} superseded by scan {}",
                device.name,
                device.discovery,
                self.scan.generation()
            );
            return Err(SessionError::StaleTarget);
        }
        match self.scan.found() {
            None => return Err(SessionError::NoTarget),
            Some(found) if found.id != device.id => return Err(SessionError::StaleTarget),
            Some(_) => {}
        }

        let device = self.scan.hand_off().ok_or(SessionError::NoTarget)?;
        self.link.connect(device, &mut self.platform);
        Ok(())
    }

    /// Ask for the link to be torn down (ends the trip). The state changes
    /// when the platform reports the link down. While only scanning this
    /// cancels the scan silently.
    pub fn disconnect(&mut self) {
        match self.link.state() {
            LinkState::Disconnected => self.scan.stop(&mut self.platform),
            LinkState::Connecting | LinkState::Connected => {
                self.link.disconnect(&mut self.platform)
            }
        }
    }

    pub fn send_command(&mut self, command: CommandKind) -> Result<(), SessionError> {
        self.dispatcher
            .send(&self.link, command, &mut self.platform)
    }

    pub fn on_scan_timeout(&mut self, generation: u64) {
        if self.scan.on_timeout(generation, &mut self.platform) {
            self.emit(SessionEvent::ScanTimeout);
        }
    }

    pub fn handle_platform_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::Advertisement(advertisement) => {
                if let Some(device) = self
                    .scan
                    .on_advertisement(&advertisement, &mut self.platform)
                {
                    self.emit(SessionEvent::TargetFound(device));
                }
            }
            PlatformEvent::LinkUp => {
                self.torn_down = None;
                if self.link.on_link_up() {
                    info!("Connected and command-ready");
                    self.emit(SessionEvent::Connected);
                }
            }
            PlatformEvent::LinkDown => self.on_link_down(),
            PlatformEvent::WriteConfirmed => {
                if let Some(command) = self.dispatcher.on_write_confirmed() {
                    self.emit(SessionEvent::CommandAcknowledged(command));
                }
            }
            PlatformEvent::WriteFailed(reason) => match self.dispatcher.on_write_failed() {
                Some(command) => self.fail(format!("{} write failed: {}", command, reason)),
                None if self.link.state() == LinkState::Disconnected => {
                    debug!("Ignoring write failure after link loss: {}", reason)
                }
                None => self.fail(format!("write failed: {}", reason)),
            },
            PlatformEvent::Error(reason) => self.fail(reason),
        }
    }

    /// The platform answers every disconnect request with one link-down, in
    /// order. The first one after a failure belongs to the failed link.
    fn on_link_down(&mut self) {
        if let Some(id) = self.torn_down.take() {
            debug!("Link-down of {} already reported as an error", id);
        } else if self.link.on_link_down() {
            self.dispatcher.reset();
            self.emit(SessionEvent::Disconnected);
        } else {
            debug!("Ignoring link-down without an active link");
        }
    }

    /// Asynchronous failure: reset to idle and report it once
    fn fail(&mut self, reason: String) {
        warn!("Link error: {}", reason);
        if self.link.state() != LinkState::Disconnected {
            self.torn_down = self.link.device().map(|d| d.id.clone());
            self.link.disconnect(&mut self.platform);
            self.link.on_link_down();
            self.dispatcher.reset();
        }
        self.scan.stop(&mut self.platform);
        self.emit(SessionEvent::Error(LinkError::new(reason)));
    }

    fn emit(&mut self, event: SessionEvent) {
        match &self.subscriber {
            Some(tx) => {
                if let Err(mpsc::error::SendError(event)) = tx.send(event) {
                    debug!("Subscriber detached, dropping event: {}", event);
                    self.subscriber = None;
                }
            }
            None => debug!("No subscriber for event: {}", event),
        }
    }
}
