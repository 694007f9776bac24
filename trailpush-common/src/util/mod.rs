//! Various small utilities shared by the push crates
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;

use crate::errors::Result;

/// Seconds since the UNIX epoch. Clocks set before 1970 read as 0.
pub fn sec_since_epoch() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

/// Encode bytes as base64url (RFC 4648 §5) without `=` padding.
pub fn b64_encode_url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode base64url, tolerating missing or present `=` padding.
///
/// NOTE: Keys pasted from other tooling frequently arrive in the standard
/// alphabet (`+`, `/`) and with padding. Both are accepted.
pub fn b64_decode_url(data: &str) -> Result<Vec<u8>> {
    let data = data.trim().trim_end_matches('=');
    if data.contains(['/', '+']) {
        trace!("base64 value uses the standard alphabet");
        return b64_decode_std(data);
    }
    Ok(URL_SAFE_NO_PAD.decode(data)?)
}

/// Decode standard alphabet base64, ignoring any padding.
pub fn b64_decode_std(data: &str) -> Result<Vec<u8>> {
    Ok(STANDARD_NO_PAD.decode(data.trim().trim_end_matches('='))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ApcErrorKind;
    use rand::{Rng, RngCore};

    #[test]
    fn url_encoding_round_trips() {
        let mut rng = rand::thread_rng();
        for len in 0..80 {
            let mut data = vec![0u8; len];
            rng.fill_bytes(&mut data);
            let encoded = b64_encode_url(&data);
            assert!(!encoded.contains(['+', '/', '=']), "{encoded}");
            assert_eq!(b64_decode_url(&encoded).unwrap(), data);
        }
        // Make sure the characters that differ between alphabets show up.
        let data: Vec<u8> = (0..64).map(|_| rng.gen_range(0xf8..=0xff)).collect();
        let encoded = b64_encode_url(&data);
        assert!(encoded.contains(['-', '_']));
        assert_eq!(b64_decode_url(&encoded).unwrap(), data);
    }

    #[test]
    fn decode_repads_and_accepts_standard_alphabet() {
        assert_eq!(b64_decode_url("Zm9vYmE").unwrap(), b"fooba");
        assert_eq!(b64_decode_url("Zm9vYmE=").unwrap(), b"fooba");
        assert_eq!(b64_decode_url("Zm9vYg==").unwrap(), b"foob");
        assert_eq!(b64_decode_url("-_8").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(b64_decode_url("+/8=").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(b64_decode_std("+/8").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(b64_decode_url("not base64!").is_err());
        let err = b64_decode_url("A").unwrap_err();
        assert!(matches!(err.kind, ApcErrorKind::Base64(_)));
    }

    #[test]
    fn epoch_seconds_are_current() {
        // 2024-01-01T00:00:00Z
        assert!(sec_since_epoch() > 1_704_067_200);
    }
}
