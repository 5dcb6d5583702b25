// Mission fingerprinting.
//
// Clients cache data derived from a mission (lighting, most expensively) and
// key that cache by a fingerprint of the mission resource's bytes. The
// fingerprint is a plain CRC-32 (IEEE). It only has to detect edits, not
// resist tampering.

use crate::types::MissionCrc;

/// CRC-32 of a mission resource's raw bytes.
pub fn fingerprint(bytes: &[u8]) -> MissionCrc {
    MissionCrc(crc32fast::hash(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_crc32() {
        // Standard CRC-32 check value.
        assert_eq!(fingerprint(b"123456789"), MissionCrc(0xCBF4_3926));
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(fingerprint(b""), MissionCrc(0));
    }

    #[test]
    fn single_byte_edit_changes_fingerprint() {
        let a = fingerprint(br#"{"info":{"name":"Outpost"}}"#);
        let b = fingerprint(br#"{"info":{"name":"Outpose"}}"#);
        assert_ne!(a, b);
    }
}
