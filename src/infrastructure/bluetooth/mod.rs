//! Bluetooth Module
//!
//! Device session core for ZenLock BLE locks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │           SessionHandle  (actor task, public API)        │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────┐
//! │      SessionManager  (sole owner of session state)       │
//! └───────┬─────────────┬───────────────┬───────────────────┘
//!         │             │               │
//!         ▼             ▼               ▼
//! ┌────────────┐ ┌────────────┐ ┌────────────┐
//! │  Scanner   │ │ Connection │ │ Dispatcher │
//! │ - filter   │ │ - link     │ │ - protocol │
//! │ - timeout  │ │   up/down  │ │ - acks     │
//! └────────────┘ └────────────┘ └────────────┘
//!         │             │               │
//!         └─────────────┼───────────────┘
//!                       ▼
//!            BlePlatform (btleplug, mocks)
//! ```
//!
//! ## Modules
//!
//! - [`filter`] - Advertisement name matching
//! - [`scanner`] - Scan lifecycle and timeout
//! - [`connection`] - Link lifecycle
//! - [`protocol`] - Command payloads and GATT identifiers
//! - [`dispatcher`] - Command writes and acknowledgements
//! - [`platform`] - Port to the BLE stack
//! - [`service`] - Session orchestrator
//! - [`actor`] - Serialized async front end

pub mod actor;
#[cfg(feature = "btleplug")]
pub mod btleplug_platform;
pub mod connection;
pub mod dispatcher;
pub mod filter;
pub mod platform;
pub mod protocol;
pub mod scanner;
pub mod service;

pub use actor::{SessionHandle, SessionSnapshot};
pub use platform::{platform_channel, BlePlatform, PlatformEvent, PlatformEvents, PlatformInbox};
pub use service::{EventStream, SessionManager};
