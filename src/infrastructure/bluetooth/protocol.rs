//! ZenLock Command Protocol
//!
//! Fixed mapping from command kinds to the payload written on the lock's
//! command characteristic.

use crate::domain::models::CommandKind;
use uuid::Uuid;

/// Lock control service
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);

/// Command characteristic - where command payloads are written
pub const COMMAND_CHAR_UUID: Uuid = Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e24dcca9e);

/// Command group bytes
const GROUP_IGNITION: u8 = 0x01;
const GROUP_IMMOBILIZER: u8 = 0x02;

/// Wire payload for a command kind.
///
/// ```text
/// [0] : group  (0x01 ignition, 0x02 immobilizer)
/// [1] : switch (0x01 on, 0x00 off)
/// ```
pub fn payload(kind: CommandKind) -> &'static [u8] {
    match kind {
        CommandKind::IgnitionOn => &[GROUP_IGNITION, 0x01],
        CommandKind::IgnitionOff => &[GROUP_IGNITION, 0x00],
        CommandKind::ImmobilizeOn => &[GROUP_IMMOBILIZER, 0x01],
        CommandKind::ImmobilizeOff => &[GROUP_IMMOBILIZER, 0x00],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_command_bytes() {
        assert_eq!(payload(CommandKind::IgnitionOn), &[0x01, 0x01]);
        assert_eq!(payload(CommandKind::ImmobilizeOff), &[0x02, 0x00]);
    }

    #[test]
    fn every_kind_has_its_own_payload() {
        let distinct: HashSet<&[u8]> = CommandKind::ALL.iter().map(|k| payload(*k)).collect();
        assert_eq!(distinct.len(), CommandKind::ALL.len());
    }
}
