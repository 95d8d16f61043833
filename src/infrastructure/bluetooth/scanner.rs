//! BLE Scanner Module
//!
//! Owns the scan lifecycle for one target: `Idle -> Scanning -> {Found, Idle}`.
//! Every scan gets a fresh generation number; the timeout armed for it
//! carries that number so a late timer from an older scan is recognised and
//! ignored.

use crate::domain::error::SessionError;
use crate::domain::models::{Advertisement, DiscoveredDevice, ScanState};
use crate::infrastructure::bluetooth::filter::AdvertisementFilter;
use crate::infrastructure::bluetooth::platform::BlePlatform;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Single-shot scan deadline.
///
/// `arm` replaces any pending timer. When it expires the owner must be told
/// with the same `generation` it was armed with.
pub trait ScanTimer: Send {
    fn arm(&mut self, generation: u64, timeout: Duration);
    fn cancel(&mut self);
}

pub struct ScanController {
    filter: AdvertisementFilter,
    timeout: Duration,
    timer: Box<dyn ScanTimer>,
    state: ScanState,
    generation: u64,
    target: Option<String>,
    deadline: Option<Instant>,
    found: Option<DiscoveredDevice>,
}

impl ScanController {
    pub fn new(filter: AdvertisementFilter, timeout: Duration, timer: Box<dyn ScanTimer>) -> Self {
        Self {
            filter,
            timeout,
            timer,
            state: ScanState::Idle,
            generation: 0,
            target: None,
            deadline: None,
            found: None,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Most recent discovery of the current scan generation
    pub fn found(&self) -> Option<&DiscoveredDevice> {
        self.found.as_ref()
    }

    /// Start scanning for `target`.
    ///
    /// Allowed from `Idle` and `Found`; a previous discovery is superseded.
    /// Returns the generation of the new scan.
    pub fn start(&mut self, target: &str, platform: &mut dyn BlePlatform) -> Result<u64, SessionError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(SessionError::EmptyTarget);
        }
        if self.state == ScanState::Scanning {
            return Err(SessionError::AlreadyScanning);
        }

        self.timer.cancel();
        self.generation += 1;
        self.found = None;
        self.target = Some(target.to_string());
        self.deadline = Some(Instant::now() + self.timeout);
        self.state = ScanState::Scanning;

        info!(
            "Scanning for target '{}' (generation {}, timeout {:?}, policy {:?})",
            target,
            self.generation,
            self.timeout,
            self.filter.policy()
        );
        platform.start_scan();
        self.timer.arm(self.generation, self.timeout);

        Ok(self.generation)
    }

    /// Evaluate an advertisement. First match wins; anything outside
    /// `Scanning` is ignored.
    pub fn on_advertisement(
        &mut self,
        advertisement: &Advertisement,
        platform: &mut dyn BlePlatform,
    ) -> Option<DiscoveredDevice> {
        if self.state != ScanState::Scanning {
            return None;
        }
        let target = self.target.as_deref()?;
        if !self.filter.matches(advertisement, target) {
            return None;
        }

        let device = DiscoveredDevice {
            name: advertisement.local_name.clone().unwrap_or_default(),
            id: advertisement.id.clone(),
            rssi: advertisement.rssi,
            discovery: self.generation,
        };

        self.timer.cancel();
        platform.stop_scan();
        self.deadline = None;
        self.state = ScanState::Found;
        self.found = Some(device.clone());
        info!("Target found: {} ({})", device.name, device.id);

        Some(device)
    }

    /// Scan deadline reached. Returns false when the timer belongs to an
    /// older scan or the scan already resolved.
    pub fn on_timeout(&mut self, generation: u64, platform: &mut dyn BlePlatform) -> bool {
        if generation != self.generation || self.state != ScanState::Scanning {
            debug!(
                "Ignoring scan timeout for generation {} (current {}, {:?})",
                generation, self.generation, self.state
            );
            return false;
        }

        info!("Scan for '{}' timed out", self.target.as_deref().unwrap_or_default());
        platform.stop_scan();
        self.reset();
        true
    }

    /// Caller-initiated, silent stop. Also forgets any discovery.
    pub fn stop(&mut self, platform: &mut dyn BlePlatform) {
        if self.state == ScanState::Scanning {
            info!("Stopping BLE scan...");
            self.timer.cancel();
            platform.stop_scan();
        }
        self.reset();
    }

    /// Give up the found device to the connection controller
    pub fn hand_off(&mut self) -> Option<DiscoveredDevice> {
        let device = self.found.take()?;
        self.reset();
        Some(device)
    }

    fn reset(&mut self) {
        self.state = ScanState::Idle;
        self.target = None;
        self.deadline = None;
        self.found = None;
    }
}
