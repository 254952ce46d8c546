//! Sync frame encoding
//!
//! A frame is a JSON object mapping configuration keys to string values, e.g.
//! `{"zone2Max":"150"}`. The sender emits one pair per frame; receivers accept
//! any number of pairs.

use crate::error::SyncError;
use std::collections::BTreeMap;

/// Encode a single key/value pair
pub fn encode_pair(key: &str, value: &str) -> Result<Vec<u8>, SyncError> {
    let mut frame = BTreeMap::new();
    frame.insert(key, value);
    Ok(serde_json::to_vec(&frame)?)
}

/// Decode a frame into its pairs. Non-string values are rejected.
pub fn decode_frame(bytes: &[u8]) -> Result<BTreeMap<String, String>, SyncError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_frame_layout() {
        let frame = encode_pair("zone2Max", "150").unwrap();
        assert_eq!(frame, br#"{"zone2Max":"150"}"#.to_vec());
    }

    #[test]
    fn test_decode_multi_pair_frame() {
        let pairs = decode_frame(br#"{"zone2Max":"150","zone3Min":"151"}"#).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs["zone3Min"], "151");
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(matches!(
            decode_frame(b"not json"),
            Err(SyncError::MalformedFrame(_))
        ));
        assert!(decode_frame(br#"{"zone2Max":150}"#).is_err());
        assert!(decode_frame(br#"["zone2Max","150"]"#).is_err());
    }
}
