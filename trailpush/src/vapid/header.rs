use std::collections::HashMap;
use std::fmt;

use crate::error::{PushErrorKind, PushResult};
use crate::vapid::token::Token;

pub const VAPID_SCHEME: &str = "vapid";

/// The `Authorization` header value sent with every push request:
/// `vapid t=<token>, k=<public key>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VapidHeader {
    pub token: String,
    pub public_key: String,
}

impl VapidHeader {
    pub fn new(token: &Token, public_key: &str) -> Self {
        Self {
            token: token.to_string(),
            public_key: public_key.to_owned(),
        }
    }

    /// Parse a `vapid` scheme authorization header back into its parts.
    pub fn parse(header: &str) -> PushResult<VapidHeader> {
        let mut scheme_split = header.trim().splitn(2, ' ');
        let scheme = scheme_split
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PushErrorKind::InvalidToken("missing auth scheme".to_owned()))?
            .to_lowercase();
        if scheme != VAPID_SCHEME {
            return Err(PushErrorKind::InvalidToken(format!("unknown auth scheme {scheme:?}")).into());
        }
        let data = scheme_split
            .next()
            .ok_or_else(|| PushErrorKind::InvalidToken("missing token".to_owned()))?
            .replace(' ', "");

        let data: HashMap<&str, &str> = data.split(',').filter_map(split_key_value).collect();
        let token = data
            .get("t")
            .ok_or_else(|| PushErrorKind::InvalidToken("missing token".to_owned()))?;
        let public_key = data
            .get("k")
            .ok_or_else(|| PushErrorKind::InvalidToken("missing public key".to_owned()))?;

        Ok(Self {
            token: (*token).to_owned(),
            public_key: (*public_key).to_owned(),
        })
    }
}

impl fmt::Display for VapidHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{VAPID_SCHEME} t={}, k={}", self.token, self.public_key)
    }
}

/// Split a key-value pair on the first `=`.
fn split_key_value(item: &str) -> Option<(&str, &str)> {
    let mut splitter = item.splitn(2, '=');

    Some((splitter.next()?, splitter.next()?))
}
