//! BLE Connection Module
//!
//! Tracks the link to the promoted target: `Disconnected -> Connecting ->
//! Connected -> Disconnected`. Disconnect requests only ask the platform;
//! the link is considered down once the platform says so.

use crate::domain::models::{DiscoveredDevice, LinkState};
use crate::infrastructure::bluetooth::platform::BlePlatform;
use tracing::{debug, info};

pub struct ConnectionController {
    state: LinkState,
    device: Option<DiscoveredDevice>,
}

impl Default for ConnectionController {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionController {
    pub fn new() -> Self {
        Self {
            state: LinkState::Disconnected,
            device: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn device(&self) -> Option<&DiscoveredDevice> {
        self.device.as_ref()
    }

    /// The linked device, only once the link is command-ready
    pub fn ready_device(&self) -> Option<&DiscoveredDevice> {
        match self.state {
            LinkState::Connected => self.device.as_ref(),
            _ => None,
        }
    }

    pub fn connect(&mut self, device: DiscoveredDevice, platform: &mut dyn BlePlatform) {
        info!("Connecting to {} ({})", device.name, device.id);
        platform.connect(&device.id);
        self.device = Some(device);
        self.state = LinkState::Connecting;
    }

    /// Returns true if this completed a pending connect
    pub fn on_link_up(&mut self) -> bool {
        if self.state != LinkState::Connecting {
            debug!("Ignoring link-up while {:?}", self.state);
            return false;
        }
        self.state = LinkState::Connected;
        if let Some(device) = &self.device {
            info!("Device connected: {}", device.name);
        }
        true
    }

    /// Returns true only for the first down signal of a link
    pub fn on_link_down(&mut self) -> bool {
        if self.state == LinkState::Disconnected {
            return false;
        }
        if let Some(device) = self.device.take() {
            info!("Link to {} is down", device.name);
        }
        self.state = LinkState::Disconnected;
        true
    }

    /// Ask the platform to tear the link down
    pub fn disconnect(&mut self, platform: &mut dyn BlePlatform) {
        match (&self.device, self.state) {
            (Some(device), LinkState::Connecting | LinkState::Connected) => {
                info!("Disconnecting from {}", device.name);
                platform.disconnect(&device.id);
            }
            _ => debug!("Disconnect requested without an active link"),
        }
    }
}
