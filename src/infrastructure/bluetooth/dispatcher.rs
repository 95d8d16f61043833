//! Command dispatch
//!
//! Writes command payloads over a ready link and pairs each write
//! confirmation with the oldest command still in flight.

use crate::domain::error::SessionError;
use crate::domain::models::CommandKind;
use crate::infrastructure::bluetooth::connection::ConnectionController;
use crate::infrastructure::bluetooth::platform::BlePlatform;
use crate::infrastructure::bluetooth::protocol;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct CommandDispatcher {
    in_flight: VecDeque<CommandKind>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Issue the write. Confirmation arrives later through
    /// [`on_write_confirmed`](Self::on_write_confirmed).
    pub fn send(
        &mut self,
        link: &ConnectionController,
        command: CommandKind,
        platform: &mut dyn BlePlatform,
    ) -> Result<(), SessionError> {
        let Some(device) = link.ready_device() else {
            warn!("Rejecting {}: session is not command-ready", command);
            return Err(SessionError::NotReady);
        };

        info!("Sending {} to {}", command, device.name);
        platform.write(&device.id, protocol::payload(command));
        self.in_flight.push_back(command);
        Ok(())
    }

    pub fn on_write_confirmed(&mut self) -> Option<CommandKind> {
        let command = self.in_flight.pop_front();
        if command.is_none() {
            debug!("Write confirmation with no command in flight");
        }
        command
    }

    pub fn on_write_failed(&mut self) -> Option<CommandKind> {
        self.in_flight.pop_front()
    }

    /// Drop everything in flight; the link is gone
    pub fn reset(&mut self) {
        if !self.in_flight.is_empty() {
            debug!("Discarding {} unconfirmed command(s)", self.in_flight.len());
        }
        self.in_flight.clear();
    }
}
