//! Conversion between the two ECDSA signature encodings VAPID touches.
//!
//! OpenSSL (like most general purpose libraries) produces and consumes the
//! ASN.1 DER form:
//!
//! ```text
//! 30 <len> 02 <rlen> <r...> 02 <slen> <s...>
//! ```
//!
//! while JWS `ES256` requires the fixed width 64 byte `r || s` form
//! ([RFC 7518 §3.4](https://datatracker.ietf.org/doc/html/rfc7518#section-3.4)).

use crate::error::{PushErrorKind, PushResult};

/// Width of a P-256 scalar in bytes.
pub const SCALAR_LEN: usize = 32;
/// Width of a raw `r || s` signature.
pub const RAW_SIGNATURE_LEN: usize = SCALAR_LEN * 2;

const TAG_SEQUENCE: u8 = 0x30;
const TAG_INTEGER: u8 = 0x02;

/// Error stage names for the tag, length and value of each INTEGER.
type IntegerStages = (&'static str, &'static str, &'static str);
const R_STAGES: IntegerStages = ("r integer tag", "r integer length", "r integer value");
const S_STAGES: IntegerStages = ("s integer tag", "s integer length", "s integer value");

/// Encode `r` and `s` as a DER `SEQUENCE { INTEGER r, INTEGER s }`.
pub fn raw_to_der(r: &[u8; SCALAR_LEN], s: &[u8; SCALAR_LEN]) -> Vec<u8> {
    let r = der_integer(r);
    let s = der_integer(s);

    let mut content = Vec::with_capacity(r.len() + s.len());
    content.extend_from_slice(&r);
    content.extend_from_slice(&s);

    let mut der = Vec::with_capacity(content.len() + 3);
    der.push(TAG_SEQUENCE);
    push_length(&mut der, content.len());
    der.extend_from_slice(&content);
    der
}

/// Decode a DER signature into fixed width `(r, s)`.
pub fn der_to_raw(der: &[u8]) -> PushResult<([u8; SCALAR_LEN], [u8; SCALAR_LEN])> {
    let mut reader = DerReader { data: der, pos: 0 };

    if reader.byte("sequence tag")? != TAG_SEQUENCE {
        return Err(PushErrorKind::MalformedSignature("sequence tag").into());
    }
    let seq_len = reader.length("sequence length")?;
    if seq_len != reader.remaining() {
        return Err(PushErrorKind::MalformedSignature("sequence length").into());
    }

    let r = reader.integer(R_STAGES)?;
    let s = reader.integer(S_STAGES)?;
    if reader.remaining() != 0 {
        return Err(PushErrorKind::MalformedSignature("trailing data").into());
    }
    Ok((r, s))
}

/// Decode a DER signature straight into the 64 byte `r || s` form.
pub fn raw_signature(der: &[u8]) -> PushResult<[u8; RAW_SIGNATURE_LEN]> {
    let (r, s) = der_to_raw(der)?;
    let mut raw = [0u8; RAW_SIGNATURE_LEN];
    raw[..SCALAR_LEN].copy_from_slice(&r);
    raw[SCALAR_LEN..].copy_from_slice(&s);
    Ok(raw)
}

/// Split a 64 byte `r || s` signature into its halves.
pub fn split_raw(raw: &[u8]) -> PushResult<([u8; SCALAR_LEN], [u8; SCALAR_LEN])> {
    if raw.len() != RAW_SIGNATURE_LEN {
        return Err(PushErrorKind::MalformedSignature("raw signature length").into());
    }
    let mut r = [0u8; SCALAR_LEN];
    let mut s = [0u8; SCALAR_LEN];
    r.copy_from_slice(&raw[..SCALAR_LEN]);
    s.copy_from_slice(&raw[SCALAR_LEN..]);
    Ok((r, s))
}

/// Minimal DER INTEGER for an unsigned big-endian value.
fn der_integer(value: &[u8]) -> Vec<u8> {
    // Keep at least one byte so zero encodes as `02 01 00`.
    let first = value
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(value.len().saturating_sub(1));
    let digits = &value[first..];
    let pad = digits.first().map_or(false, |b| b & 0x80 != 0);

    let len = digits.len() + usize::from(pad);
    let mut out = Vec::with_capacity(len + 2);
    out.push(TAG_INTEGER);
    push_length(&mut out, len);
    if pad {
        out.push(0x00);
    }
    out.extend_from_slice(digits);
    out
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        // Signatures never get near 256 bytes of content.
        out.push(0x81);
        out.push(len as u8);
    }
}

struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn byte(&mut self, stage: &'static str) -> PushResult<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or(PushErrorKind::MalformedSignature(stage))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize, stage: &'static str) -> PushResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(PushErrorKind::MalformedSignature(stage).into());
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Short form, or the single byte long form (`0x81 nn`).
    fn length(&mut self, stage: &'static str) -> PushResult<usize> {
        match self.byte(stage)? {
            len @ 0x00..=0x7f => Ok(len as usize),
            0x81 => {
                let len = self.byte(stage)?;
                if len < 0x80 {
                    // Not the minimal encoding.
                    return Err(PushErrorKind::MalformedSignature(stage).into());
                }
                Ok(len as usize)
            }
            _ => Err(PushErrorKind::MalformedSignature(stage).into()),
        }
    }

    fn integer(&mut self, stages: IntegerStages) -> PushResult<[u8; SCALAR_LEN]> {
        let (tag_stage, len_stage, value_stage) = stages;
        if self.byte(tag_stage)? != TAG_INTEGER {
            return Err(PushErrorKind::MalformedSignature(tag_stage).into());
        }
        let len = self.length(len_stage)?;
        if len == 0 {
            return Err(PushErrorKind::MalformedSignature(value_stage).into());
        }
        let value = self.take(len, value_stage)?;
        let first = value.iter().position(|b| *b != 0).unwrap_or(value.len());
        let digits = &value[first..];
        if digits.len() > SCALAR_LEN {
            return Err(PushErrorKind::MalformedSignature(value_stage).into());
        }

        let mut out = [0u8; SCALAR_LEN];
        out[SCALAR_LEN - digits.len()..].copy_from_slice(digits);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::bn::BigNum;
    use openssl::ecdsa::EcdsaSig;
    use rand::RngCore;

    fn random_scalar(rng: &mut impl RngCore) -> [u8; SCALAR_LEN] {
        let mut out = [0u8; SCALAR_LEN];
        rng.fill_bytes(&mut out);
        out
    }

    fn malformed_stage(der: &[u8]) -> &'static str {
        match der_to_raw(der).unwrap_err().kind {
            PushErrorKind::MalformedSignature(stage) => stage,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn round_trips_random_pairs() {
        let mut rng = rand::thread_rng();
        for i in 0..512 {
            let mut r = random_scalar(&mut rng);
            let mut s = random_scalar(&mut rng);
            // Force the interesting shapes: high bit set, leading zeros.
            match i % 4 {
                0 => r[0] |= 0x80,
                1 => s[0] |= 0x80,
                2 => {
                    r[0] = 0;
                    r[1] = 0;
                }
                _ => s[0] = 0,
            }
            let der = raw_to_der(&r, &s);
            assert_eq!(der_to_raw(&der).unwrap(), (r, s), "der = {der:02x?}");
        }
    }

    #[test]
    fn high_bit_gets_a_pad_byte() {
        let r = [0xffu8; SCALAR_LEN];
        let s = [0x01u8; SCALAR_LEN];
        let der = raw_to_der(&r, &s);
        assert_eq!(&der[..5], &[0x30, 0x45, 0x02, 0x21, 0x00]);
        assert_eq!(der[5], 0xff);
        assert_eq!(&der[37..39], &[0x02, 0x20]);
        assert_eq!(der.len(), 2 + 35 + 34);
    }

    #[test]
    fn leading_zeros_are_stripped() {
        let mut r = [0u8; SCALAR_LEN];
        r[31] = 0x05;
        let s = [0u8; SCALAR_LEN];
        let der = raw_to_der(&r, &s);
        assert_eq!(der, vec![0x30, 0x06, 0x02, 0x01, 0x05, 0x02, 0x01, 0x00]);
        assert_eq!(der_to_raw(&der).unwrap(), (r, s));
    }

    #[test]
    fn matches_openssl_encoding() {
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let r = random_scalar(&mut rng);
            let s = random_scalar(&mut rng);
            let sig = EcdsaSig::from_private_components(
                BigNum::from_slice(&r).unwrap(),
                BigNum::from_slice(&s).unwrap(),
            )
            .unwrap();
            let openssl_der = sig.to_der().unwrap();
            assert_eq!(raw_to_der(&r, &s), openssl_der);
            assert_eq!(der_to_raw(&openssl_der).unwrap(), (r, s));
        }
    }

    #[test]
    fn raw_signature_concatenates() {
        let r = [0x11u8; SCALAR_LEN];
        let s = [0x92u8; SCALAR_LEN];
        let raw = raw_signature(&raw_to_der(&r, &s)).unwrap();
        assert_eq!(&raw[..32], &r);
        assert_eq!(&raw[32..], &s);
        assert_eq!(split_raw(&raw).unwrap(), (r, s));
        assert!(split_raw(&raw[..63]).is_err());
    }

    #[test]
    fn rejects_bad_tags() {
        let good = raw_to_der(&[0x01; SCALAR_LEN], &[0x02; SCALAR_LEN]);

        let mut bad = good.clone();
        bad[0] = 0x31;
        assert_eq!(malformed_stage(&bad), "sequence tag");

        let mut bad = good.clone();
        bad[2] = 0x03;
        assert_eq!(malformed_stage(&bad), "r integer tag");

        let mut bad = good;
        bad[36] = 0x04;
        assert_eq!(malformed_stage(&bad), "s integer tag");
    }

    #[test]
    fn rejects_truncation_and_trailing_data() {
        let good = raw_to_der(&[0x7f; SCALAR_LEN], &[0x7f; SCALAR_LEN]);

        assert_eq!(malformed_stage(&[]), "sequence tag");
        assert_eq!(malformed_stage(&good[..good.len() - 1]), "sequence length");

        let mut long = good.clone();
        long.push(0x00);
        assert_eq!(malformed_stage(&long), "sequence length");

        // Sequence length covers an extra byte that is not an integer.
        let mut trailing = good;
        trailing.push(0x00);
        trailing[1] += 1;
        assert_eq!(malformed_stage(&trailing), "trailing data");
    }

    #[test]
    fn rejects_oversized_integers() {
        // 33 significant bytes for r.
        let mut der = vec![0x30, 0x26, 0x02, 0x21];
        der.extend_from_slice(&[0x01; 33]);
        der.extend_from_slice(&[0x02, 0x01, 0x01]);
        assert_eq!(malformed_stage(&der), "r integer value");

        // A padded value is fine as long as it fits after stripping.
        let mut der = vec![0x30, 0x26, 0x02, 0x21, 0x00];
        der.extend_from_slice(&[0x80; 32]);
        der.extend_from_slice(&[0x02, 0x01, 0x01]);
        let (r, s) = der_to_raw(&der).unwrap();
        assert_eq!(r, [0x80; SCALAR_LEN]);
        assert_eq!(s[31], 0x01);
    }

    #[test]
    fn rejects_empty_integer() {
        let der = vec![0x30, 0x05, 0x02, 0x00, 0x02, 0x01, 0x01];
        assert_eq!(malformed_stage(&der), "r integer value");
    }
}
