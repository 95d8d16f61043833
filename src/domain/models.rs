use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::LinkError;

/// Opaque peripheral handle issued by the BLE stack.
///
/// The session only ever holds this identifier; the stack keeps ownership of
/// the underlying peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Raw advertisement record as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: DeviceId,
    pub local_name: Option<String>,
    pub rssi: Option<i16>,
}

impl Advertisement {
    pub fn new(id: impl Into<DeviceId>, local_name: Option<&str>, rssi: Option<i16>) -> Self {
        Self {
            id: id.into(),
            local_name: local_name.map(str::to_string),
            rssi,
        }
    }
}

/// A target advertisement promoted by the scan controller.
///
/// `discovery` is the scan generation that produced it. A device from an
/// older generation has been superseded and can no longer be connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub name: String,
    pub id: DeviceId,
    pub rssi: Option<i16>,
    pub discovery: u64,
}

impl DiscoveredDevice {
    /// Signal strength for display, "?" when the stack did not report one
    pub fn rssi_label(&self) -> String {
        self.rssi
            .map(|r| r.to_string())
            .unwrap_or_else(|| "?".to_string())
    }
}

/// Lock / immobilizer commands understood by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    IgnitionOn,
    IgnitionOff,
    ImmobilizeOn,
    ImmobilizeOff,
}

impl CommandKind {
    pub const ALL: [CommandKind; 4] = [
        CommandKind::IgnitionOn,
        CommandKind::IgnitionOff,
        CommandKind::ImmobilizeOn,
        CommandKind::ImmobilizeOff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IgnitionOn => "ignition-on",
            Self::IgnitionOff => "ignition-off",
            Self::ImmobilizeOn => "immobilize-on",
            Self::ImmobilizeOff => "immobilize-off",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command '{0}' (expected one of ignition-on, ignition-off, immobilize-on, immobilize-off)")]
pub struct UnknownCommand(pub String);

impl FromStr for CommandKind {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

/// Scan controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Found,
}

/// Connection controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Composite session state.
///
/// Always computed from the scan and link states; never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Found,
    Connecting,
    /// Connected and command-ready (trip in progress)
    Ready,
}

impl SessionState {
    /// An active link takes precedence over whatever the scanner last did.
    pub fn compose(scan: ScanState, link: LinkState) -> Self {
        match (link, scan) {
            (LinkState::Connected, _) => Self::Ready,
            (LinkState::Connecting, _) => Self::Connecting,
            (LinkState::Disconnected, ScanState::Idle) => Self::Idle,
            (LinkState::Disconnected, ScanState::Scanning) => Self::Scanning,
            (LinkState::Disconnected, ScanState::Found) => Self::Found,
        }
    }

    pub fn can_start_scan(&self) -> bool {
        matches!(self, Self::Idle | Self::Found)
    }

    pub fn can_start_trip(&self) -> bool {
        *self == Self::Found
    }

    pub fn can_send_commands(&self) -> bool {
        *self == Self::Ready
    }

    pub fn is_connected(&self) -> bool {
        *self == Self::Ready
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Found => "found",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
        };
        f.write_str(label)
    }
}

/// Notifications emitted by the session to its subscriber, in occurrence order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TargetFound(DiscoveredDevice),
    Connected,
    Disconnected,
    Error(LinkError),
    ScanTimeout,
    CommandAcknowledged(CommandKind),
}

impl SessionEvent {
    pub fn severity(&self) -> MessageSeverity {
        match self {
            Self::TargetFound(_) => MessageSeverity::Warning,
            Self::CommandAcknowledged(_) => MessageSeverity::Info,
            Self::Connected => MessageSeverity::Success,
            Self::Disconnected | Self::Error(_) | Self::ScanTimeout => MessageSeverity::Error,
        }
    }

    pub fn to_status(&self) -> StatusMessage {
        StatusMessage {
            message: self.to_string(),
            severity: self.severity(),
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetFound(device) => {
                write!(f, "Target found: {} RSSI:{}", device.name, device.rssi_label())
            }
            Self::Connected => f.write_str("Connected and command-ready"),
            Self::Disconnected => f.write_str("Device disconnected"),
            Self::Error(err) => write!(f, "Error: {}", err.reason),
            Self::ScanTimeout => f.write_str("Scan timed out"),
            Self::CommandAcknowledged(kind) => write!(f, "Command sent: {}", kind),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_state_prefers_link() {
        assert_eq!(
            SessionState::compose(ScanState::Idle, LinkState::Connected),
            SessionState::Ready
        );
        assert_eq!(
            SessionState::compose(ScanState::Found, LinkState::Connecting),
            SessionState::Connecting
        );
        assert_eq!(
            SessionState::compose(ScanState::Scanning, LinkState::Disconnected),
            SessionState::Scanning
        );
    }

    #[test]
    fn capabilities_follow_state() {
        assert!(SessionState::Idle.can_start_scan());
        assert!(SessionState::Found.can_start_scan());
        assert!(!SessionState::Scanning.can_start_scan());
        assert!(SessionState::Found.can_start_trip());
        assert!(!SessionState::Ready.can_start_trip());
        assert!(SessionState::Ready.can_send_commands());
        assert!(!SessionState::Connecting.can_send_commands());
    }

    #[test]
    fn command_kind_parses_cli_spelling() {
        assert_eq!("ignition-on".parse(), Ok(CommandKind::IgnitionOn));
        assert_eq!("IMMOBILIZE_OFF".parse(), Ok(CommandKind::ImmobilizeOff));
        assert!("unlock".parse::<CommandKind>().is_err());
    }

    #[test]
    fn event_log_lines() {
        let device = DiscoveredDevice {
            name: "DEV123".to_string(),
            id: DeviceId::new("aa:bb"),
            rssi: Some(-60),
            discovery: 1,
        };
        assert_eq!(
            SessionEvent::TargetFound(device).to_string(),
            "Target found: DEV123 RSSI:-60"
        );
        assert_eq!(
            SessionEvent::CommandAcknowledged(CommandKind::ImmobilizeOn).to_string(),
            "Command sent: immobilize-on"
        );
        assert_eq!(SessionEvent::ScanTimeout.severity(), MessageSeverity::Error);
    }

    #[test]
    fn severity_per_event() {
        let device = DiscoveredDevice {
            name: "DEV123".to_string(),
            id: DeviceId::new("aa:bb"),
            rssi: None,
            discovery: 1,
        };
        let found = SessionEvent::TargetFound(device).to_status();
        assert_eq!(found.severity, MessageSeverity::Warning);
        assert_eq!(found.message, "Target found: DEV123 RSSI:?");
        assert_eq!(SessionEvent::Connected.severity(), MessageSeverity::Success);
        assert_eq!(
            SessionEvent::CommandAcknowledged(CommandKind::IgnitionOff).severity(),
            MessageSeverity::Info
        );
        assert_eq!(SessionEvent::Disconnected.severity(), MessageSeverity::Error);
    }
}
