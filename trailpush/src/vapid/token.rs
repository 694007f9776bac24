//! VAPID token construction ([RFC 8292](https://datatracker.ietf.org/doc/html/rfc8292)).
//!
//! A token is a compact JWS: `base64url(header).base64url(claims).base64url(sig)`
//! signed with ES256 (ECDSA over P-256 with SHA-256).

use std::fmt;

use openssl::bn::BigNumContext;
use openssl::ec::{EcKey, EcPoint};
use openssl::ecdsa::EcdsaSig;
use openssl::error::ErrorStack;
use openssl::pkey::Public;
use openssl::sha::sha256;
use serde::{Deserialize, Serialize};
use trailpush_common::util::{b64_decode_url, b64_encode_url, sec_since_epoch};

use crate::error::{PushErrorKind, PushResult};
use crate::vapid::keys::{p256, KeyPair};
use crate::vapid::signature::{raw_signature, raw_to_der, split_raw};

/// How long a token stays valid after it is issued.
pub const VAPID_EXPIRY_SECS: u64 = 60 * 60;

const JWT_TYPE: &str = "JWT";
const JWT_ALG: &str = "ES256";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct JwtHeader {
    typ: String,
    alg: String,
}

impl Default for JwtHeader {
    fn default() -> Self {
        Self {
            typ: JWT_TYPE.to_owned(),
            alg: JWT_ALG.to_owned(),
        }
    }
}

/// The claims carried by every VAPID token.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VapidClaims {
    /// Origin of the push service the token is for.
    pub aud: String,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
    /// Contact URI for the sender (`mailto:` or `https:`).
    pub sub: String,
}

impl VapidClaims {
    pub fn new(audience: &str, subject: &str) -> Self {
        Self {
            aud: audience.to_owned(),
            exp: sec_since_epoch() + VAPID_EXPIRY_SECS,
            sub: subject.to_owned(),
        }
    }
}

/// A signed token, kept as its three base64url segments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub header_segment: String,
    pub claims_segment: String,
    pub signature_segment: String,
}

impl Token {
    /// Split a compact token. Exactly three non-empty segments are required.
    pub fn parse(token: &str) -> PushResult<Self> {
        let segments: Vec<&str> = token.split('.').collect();
        match segments.as_slice() {
            [header, claims, signature]
                if !header.is_empty() && !claims.is_empty() && !signature.is_empty() =>
            {
                Ok(Self {
                    header_segment: (*header).to_owned(),
                    claims_segment: (*claims).to_owned(),
                    signature_segment: (*signature).to_owned(),
                })
            }
            [_, _, _] => Err(PushErrorKind::InvalidToken("empty segment".to_owned()).into()),
            _ => Err(PushErrorKind::InvalidToken(format!(
                "expected 3 segments, got {}",
                segments.len()
            ))
            .into()),
        }
    }

    /// The bytes covered by the signature.
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header_segment, self.claims_segment)
    }

    /// Decode the claims segment. The signature is not checked.
    pub fn claims(&self) -> PushResult<VapidClaims> {
        let raw = b64_decode_url(&self.claims_segment).map_err(|e| {
            PushErrorKind::InvalidToken(format!("claims are not base64url: {}", e.kind))
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn header(&self) -> PushResult<JwtHeader> {
        let raw = b64_decode_url(&self.header_segment).map_err(|e| {
            PushErrorKind::InvalidToken(format!("header is not base64url: {}", e.kind))
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.header_segment, self.claims_segment, self.signature_segment
        )
    }
}

/// Signs VAPID tokens for a fixed contact subject.
#[derive(Clone, Debug)]
pub struct VapidSigner {
    subject: String,
}

impl VapidSigner {
    pub fn new(subject: &str) -> Self {
        Self {
            subject: subject.to_owned(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Sign a token for `audience`, valid for [`VAPID_EXPIRY_SECS`].
    pub fn sign(&self, audience: &str, key_pair: &KeyPair) -> PushResult<Token> {
        sign(audience, &self.subject, key_pair)
    }
}

/// Build and sign a token for `audience` on behalf of `subject`.
///
/// ECDSA nonces are random, so two calls never return the same token.
pub fn sign(audience: &str, subject: &str, key_pair: &KeyPair) -> PushResult<Token> {
    let header_segment = b64_encode_url(&serde_json::to_vec(&JwtHeader::default())?);
    let claims = VapidClaims::new(audience, subject);
    let claims_segment = b64_encode_url(&serde_json::to_vec(&claims)?);

    let digest = sha256(format!("{header_segment}.{claims_segment}").as_bytes());
    let der = EcdsaSig::sign(&digest, key_pair.ec_key())
        .and_then(|sig| sig.to_der())
        .map_err(PushErrorKind::Signing)?;
    let signature = raw_signature(&der)?;

    trace!("🔐 Signed VAPID token"; "aud" => audience, "exp" => claims.exp);
    Ok(Token {
        header_segment,
        claims_segment,
        signature_segment: b64_encode_url(&signature),
    })
}

/// Check a token's signature against a raw public point and return its
/// claims. Expired tokens are rejected.
pub fn verify(token: &Token, public_point: &[u8]) -> PushResult<VapidClaims> {
    let header = token.header()?;
    if header.alg != JWT_ALG {
        return Err(PushErrorKind::InvalidToken(format!("unsupported alg {:?}", header.alg)).into());
    }

    let raw = b64_decode_url(&token.signature_segment).map_err(|e| {
        PushErrorKind::InvalidToken(format!("signature is not base64url: {}", e.kind))
    })?;
    let (r, s) = split_raw(&raw)?;
    let sig = EcdsaSig::from_der(&raw_to_der(&r, &s))
        .map_err(|_| PushErrorKind::MalformedSignature("signature components"))?;

    let public_key = public_ec_key(public_point)?;
    let digest = sha256(token.signing_input().as_bytes());
    let valid = sig
        .verify(&digest, &public_key)
        .map_err(|e| PushErrorKind::InvalidToken(e.to_string()))?;
    if !valid {
        return Err(PushErrorKind::InvalidToken("signature does not verify".to_owned()).into());
    }

    let claims = token.claims()?;
    if claims.exp <= sec_since_epoch() {
        return Err(PushErrorKind::InvalidToken("token has expired".to_owned()).into());
    }
    Ok(claims)
}

fn public_ec_key(public_point: &[u8]) -> PushResult<EcKey<Public>> {
    let invalid = |_: ErrorStack| {
        PushErrorKind::InvalidKeyFormat("public key is not a point on P-256".to_owned())
    };
    let group = p256().map_err(invalid)?;
    let mut ctx = BigNumContext::new().map_err(invalid)?;
    let point = EcPoint::from_bytes(&group, public_point, &mut ctx).map_err(invalid)?;
    let key = EcKey::from_public_key(&group, &point).map_err(invalid)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vapid::keys::tests::known_pair;
    use jsonwebtoken::{Algorithm, DecodingKey, Validation};
    use serde_json::Value;

    const FCM_AUD: &str = "https://fcm.googleapis.com";
    const SUB: &str = "mailto:trails@example.com";

    fn decode_segment(segment: &str) -> Value {
        serde_json::from_slice(&b64_decode_url(segment).unwrap()).unwrap()
    }

    #[test]
    fn token_has_three_segments() {
        let pair = KeyPair::generate().unwrap();
        let token = sign(FCM_AUD, SUB, &pair).unwrap().to_string();

        assert_eq!(token.matches('.').count(), 2);
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| !s.is_empty()));
        assert!(!token.contains(['+', '/', '=']));

        // 64 raw signature bytes.
        assert_eq!(b64_decode_url(segments[2]).unwrap().len(), 64);
    }

    #[test]
    fn header_and_claims_decode() {
        let pair = KeyPair::generate().unwrap();
        let before = sec_since_epoch();
        let token = sign(FCM_AUD, SUB, &pair).unwrap();

        assert_eq!(
            decode_segment(&token.header_segment),
            serde_json::json!({"typ": "JWT", "alg": "ES256"})
        );
        let claims = decode_segment(&token.claims_segment);
        assert_eq!(claims["aud"], FCM_AUD);
        assert_eq!(claims["sub"], SUB);
        let exp = claims["exp"].as_u64().unwrap();
        assert!(exp > sec_since_epoch());
        assert!(exp >= before + VAPID_EXPIRY_SECS);
        assert!(exp <= sec_since_epoch() + VAPID_EXPIRY_SECS);
    }

    #[test]
    fn signature_verifies() {
        let pair = KeyPair::generate().unwrap();
        let token = VapidSigner::new(SUB).sign(FCM_AUD, &pair).unwrap();
        let claims = verify(&token, pair.public_point()).unwrap();
        assert_eq!(claims.aud, FCM_AUD);
        assert_eq!(claims.sub, SUB);
    }

    #[test]
    fn signature_verifies_with_jsonwebtoken() {
        let pair = known_pair();
        let token = sign(FCM_AUD, SUB, &pair).unwrap().to_string();

        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_audience(&[FCM_AUD]);
        validation.set_required_spec_claims(&["exp", "aud", "sub"]);
        let decoded = jsonwebtoken::decode::<VapidClaims>(
            &token,
            &DecodingKey::from_ec_der(pair.public_point()),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, SUB);
    }

    #[test]
    fn tokens_are_unique_per_call() {
        let pair = KeyPair::generate().unwrap();
        let first = sign(FCM_AUD, SUB, &pair).unwrap();
        let second = sign(FCM_AUD, SUB, &pair).unwrap();
        assert_ne!(first.signature_segment, second.signature_segment);
        assert!(verify(&first, pair.public_point()).is_ok());
        assert!(verify(&second, pair.public_point()).is_ok());
    }

    #[test]
    fn tampering_is_detected() {
        let pair = KeyPair::generate().unwrap();
        let mut token = sign(FCM_AUD, SUB, &pair).unwrap();
        let forged = VapidClaims {
            aud: "https://updates.push.services.mozilla.com".to_owned(),
            ..token.claims().unwrap()
        };
        token.claims_segment = b64_encode_url(&serde_json::to_vec(&forged).unwrap());
        assert!(matches!(
            verify(&token, pair.public_point()).unwrap_err().kind,
            PushErrorKind::InvalidToken(_)
        ));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let pair = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();
        let token = sign(FCM_AUD, SUB, &pair).unwrap();
        assert!(verify(&token, other.public_point()).is_err());
    }

    #[test]
    fn parse_round_trips_and_rejects_bad_shapes() {
        let pair = KeyPair::generate().unwrap();
        let token = sign(FCM_AUD, SUB, &pair).unwrap();
        assert_eq!(Token::parse(&token.to_string()).unwrap(), token);

        for bad in ["", "a.b", "a..c", "a.b.c.d", ".b.c"] {
            assert!(Token::parse(bad).is_err(), "{bad:?} parsed");
        }
    }

    #[test]
    fn parse_errors_count_every_segment() {
        let message = |token: &str| Token::parse(token).unwrap_err().kind.to_string();
        assert_eq!(message("a..c"), "Invalid VAPID token: empty segment");
        assert_eq!(message(".b.c"), "Invalid VAPID token: empty segment");
        assert_eq!(
            message("a.b"),
            "Invalid VAPID token: expected 3 segments, got 2"
        );
        assert_eq!(
            message("a.b.c.d"),
            "Invalid VAPID token: expected 3 segments, got 4"
        );
    }
}
