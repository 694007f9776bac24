//! The server's VAPID key pair, held in raw (non-PEM) form.

use std::fmt;

use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, EcPoint, PointConversionForm};
use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::pkey::Private;
use trailpush_common::util::{b64_decode_url, b64_encode_url};

use crate::error::{PushErrorKind, PushResult};

/// Length of the raw private scalar.
pub const PRIVATE_KEY_LEN: usize = 32;
/// Length of the uncompressed SEC1 public point.
pub const PUBLIC_KEY_LEN: usize = 65;
/// SEC1 prefix marking an uncompressed point.
pub const UNCOMPRESSED_POINT_TAG: u8 = 0x04;

const MAX_GENERATE_ATTEMPTS: usize = 3;

pub(crate) fn p256() -> Result<EcGroup, ErrorStack> {
    EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)
}

/// A P-256 key pair.
///
/// Immutable once built, so it can be shared between callers freely. The
/// private scalar is never printed, logged or included in errors.
#[derive(Clone)]
pub struct KeyPair {
    private_scalar: [u8; PRIVATE_KEY_LEN],
    public_point: [u8; PUBLIC_KEY_LEN],
    ec_key: EcKey<Private>,
}

impl KeyPair {
    /// Generate a fresh key pair from OpenSSL's CSPRNG.
    pub fn generate() -> PushResult<Self> {
        let group = p256().map_err(|e| PushErrorKind::KeyGeneration(e.to_string()))?;
        let mut ctx = BigNumContext::new().map_err(|e| PushErrorKind::KeyGeneration(e.to_string()))?;

        for attempt in 1..=MAX_GENERATE_ATTEMPTS {
            let ec_key =
                EcKey::generate(&group).map_err(|e| PushErrorKind::KeyGeneration(e.to_string()))?;
            let private = ec_key
                .private_key()
                .to_vec_padded(PRIVATE_KEY_LEN as i32)
                .map_err(|e| PushErrorKind::KeyGeneration(e.to_string()))?;
            let public = ec_key
                .public_key()
                .to_bytes(&group, PointConversionForm::UNCOMPRESSED, &mut ctx)
                .map_err(|e| PushErrorKind::KeyGeneration(e.to_string()))?;

            match check_raw_lengths(&private, &public) {
                Ok(()) => {
                    debug!("🔑 Generated VAPID key pair"; "attempt" => attempt);
                    return Ok(Self::from_parts(&private, &public, ec_key));
                }
                Err(e) => {
                    warn!("🔑 Generated key failed validation, retrying";
                          "attempt" => attempt, "error" => e.to_string());
                }
            }
        }
        Err(PushErrorKind::KeyGeneration(format!(
            "no valid key after {MAX_GENERATE_ATTEMPTS} attempts"
        ))
        .into())
    }

    /// Build a key pair from a raw 32 byte scalar and a raw 65 byte point.
    ///
    /// Besides the length and prefix checks, the point must lie on P-256 and
    /// belong to the scalar.
    pub fn load(raw_private: &[u8], raw_public: &[u8]) -> PushResult<Self> {
        check_raw_lengths(raw_private, raw_public)?;

        let group = p256().map_err(|e| PushErrorKind::InvalidKeyFormat(e.to_string()))?;
        let mut ctx = BigNumContext::new().map_err(|e| PushErrorKind::InvalidKeyFormat(e.to_string()))?;
        let point = EcPoint::from_bytes(&group, raw_public, &mut ctx).map_err(|_| {
            PushErrorKind::InvalidKeyFormat("public key is not a point on P-256".to_owned())
        })?;
        let scalar = BigNum::from_slice(raw_private)
            .map_err(|e| PushErrorKind::InvalidKeyFormat(e.to_string()))?;
        let ec_key = EcKey::from_private_components(&group, &scalar, &point)
            .and_then(|key| key.check_key().map(|_| key))
            .map_err(|_| {
                PushErrorKind::InvalidKeyFormat(
                    "public key does not match the private key".to_owned(),
                )
            })?;

        Ok(Self::from_parts(raw_private, raw_public, ec_key))
    }

    /// Load from the base64url strings used for storage and display.
    pub fn from_base64(private_b64: &str, public_b64: &str) -> PushResult<Self> {
        let private = b64_decode_url(private_b64).map_err(|e| {
            PushErrorKind::InvalidKeyFormat(format!("private key is not base64url: {}", e.kind))
        })?;
        let public = b64_decode_url(public_b64).map_err(|e| {
            PushErrorKind::InvalidKeyFormat(format!("public key is not base64url: {}", e.kind))
        })?;
        Self::load(&private, &public)
    }

    fn from_parts(private: &[u8], public: &[u8], ec_key: EcKey<Private>) -> Self {
        let mut private_scalar = [0u8; PRIVATE_KEY_LEN];
        private_scalar.copy_from_slice(private);
        let mut public_point = [0u8; PUBLIC_KEY_LEN];
        public_point.copy_from_slice(public);
        Self {
            private_scalar,
            public_point,
            ec_key,
        }
    }

    pub fn private_scalar(&self) -> &[u8; PRIVATE_KEY_LEN] {
        &self.private_scalar
    }

    pub fn public_point(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_point
    }

    /// The public key as sent in the `k=` parameter.
    pub fn public_key_b64(&self) -> String {
        b64_encode_url(&self.public_point)
    }

    pub fn private_key_b64(&self) -> String {
        b64_encode_url(&self.private_scalar)
    }

    pub(crate) fn ec_key(&self) -> &EcKey<Private> {
        &self.ec_key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_b64())
            .field("private_key", &"[redacted]")
            .finish()
    }
}

fn check_raw_lengths(private: &[u8], public: &[u8]) -> PushResult<()> {
    if private.len() != PRIVATE_KEY_LEN {
        return Err(PushErrorKind::InvalidKeyFormat(format!(
            "private key must be {PRIVATE_KEY_LEN} bytes, got {}",
            private.len()
        ))
        .into());
    }
    if public.len() != PUBLIC_KEY_LEN {
        return Err(PushErrorKind::InvalidKeyFormat(format!(
            "public key must be {PUBLIC_KEY_LEN} bytes, got {}",
            public.len()
        ))
        .into());
    }
    if public[0] != UNCOMPRESSED_POINT_TAG {
        return Err(PushErrorKind::InvalidKeyFormat(format!(
            "public key must start with 0x04, got {:#04x}",
            public[0]
        ))
        .into());
    }
    Ok(())
}
