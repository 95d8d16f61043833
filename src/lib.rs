//! KLE BLE SDK
//!
//! Scan for a ZenLock device by name, connect to it (start a trip) and send
//! ignition / immobilizer commands, observing the session through a single
//! ordered event stream.
//!
//! ```ignore
//! use kle_ble_sdk::{platform_channel, SessionConfig, SessionEvent, SessionHandle};
//!
//! let (events, inbox) = platform_channel();
//! let platform = make_platform(events); // any `BlePlatform`
//! let session = SessionHandle::spawn(SessionConfig::default(), platform, inbox);
//! let mut stream = session.subscribe().await?;
//!
//! session.start_scan("11717433").await?;
//! while let Some(event) = stream.recv().await {
//!     if let SessionEvent::TargetFound(_) = event {
//!         session.start_trip().await?;
//!     }
//! }
//! ```

pub mod domain;
pub mod infrastructure;

pub use domain::error::{LinkError, SessionError};
pub use domain::models::{
    Advertisement, CommandKind, DeviceId, DiscoveredDevice, SessionEvent, SessionState,
};
pub use domain::settings::{MatchPolicy, SessionConfig, Settings, SettingsService};
pub use infrastructure::bluetooth::{
    platform_channel, BlePlatform, EventStream, PlatformEvent, PlatformEvents, SessionHandle,
    SessionManager, SessionSnapshot,
};
