//! Pick the VAPID `aud` claim for a subscriber endpoint.
//!
//! The audience is looked up by the endpoint's parsed host, never by
//! substring matching on the raw URL.

use std::collections::HashMap;

use url::Url;

use crate::error::{PushErrorKind, PushResult};

pub const FCM_AUDIENCE: &str = "https://fcm.googleapis.com";
pub const MOZILLA_AUDIENCE: &str = "https://updates.push.services.mozilla.com";

/// Known push services.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Provider {
    Fcm,
    Mozilla,
    Other,
}

impl Provider {
    /// Tag value for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Fcm => "fcm",
            Provider::Mozilla => "mozilla",
            Provider::Other => "other",
        }
    }
}

/// The resolved audience for one endpoint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Audience {
    pub uri: String,
    pub provider: Provider,
}

#[derive(Clone, Debug)]
struct Entry {
    /// Matches this host and any subdomain of it.
    host: String,
    audience: String,
    provider: Provider,
}

impl Entry {
    fn matches(&self, host: &str) -> bool {
        host == self.host
            || host
                .strip_suffix(self.host.as_str())
                .map_or(false, |prefix| prefix.ends_with('.'))
    }
}

/// Host to audience table.
#[derive(Clone, Debug)]
pub struct AudienceTable {
    entries: Vec<Entry>,
    default_audience: Option<String>,
}

impl Default for AudienceTable {
    fn default() -> Self {
        Self::new(&HashMap::new(), None)
    }
}

impl AudienceTable {
    /// Build the table from the built-in providers plus `overrides`
    /// (host -> audience). Overrides win over the built-in entries.
    pub fn new(overrides: &HashMap<String, String>, default_audience: Option<String>) -> Self {
        let mut entries: Vec<Entry> = overrides
            .iter()
            .map(|(host, audience)| Entry {
                host: host.trim().to_ascii_lowercase(),
                audience: audience.trim_end_matches('/').to_owned(),
                provider: provider_for_audience(audience),
            })
            .collect();
        // Longest host first, so the most specific override is found first.
        entries.sort_by(|a, b| b.host.len().cmp(&a.host.len()));

        entries.push(Entry {
            host: "fcm.googleapis.com".to_owned(),
            audience: FCM_AUDIENCE.to_owned(),
            provider: Provider::Fcm,
        });
        entries.push(Entry {
            host: "push.services.mozilla.com".to_owned(),
            audience: MOZILLA_AUDIENCE.to_owned(),
            provider: Provider::Mozilla,
        });

        Self {
            entries,
            default_audience: default_audience.filter(|aud| !aud.is_empty()),
        }
    }

    /// Resolve the audience for a subscriber endpoint.
    ///
    /// Unknown hosts use the configured default audience, or the endpoint's
    /// own origin when none is configured.
    pub fn resolve(&self, endpoint: &str) -> PushResult<Audience> {
        let url = Url::parse(endpoint).map_err(|e| PushErrorKind::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(PushErrorKind::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                reason: format!("unsupported scheme {:?}", url.scheme()),
            }
            .into());
        }
        let host = url
            .host_str()
            .ok_or_else(|| PushErrorKind::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                reason: "missing host".to_owned(),
            })?
            .to_ascii_lowercase();

        if let Some(entry) = self.entries.iter().find(|entry| entry.matches(&host)) {
            return Ok(Audience {
                uri: entry.audience.clone(),
                provider: entry.provider,
            });
        }

        let uri = match &self.default_audience {
            Some(default) => default.clone(),
            None => url.origin().ascii_serialization(),
        };
        debug!("🔐 No audience entry for host, using fallback"; "host" => &host, "aud" => &uri);
        Ok(Audience {
            uri,
            provider: Provider::Other,
        })
    }
}

fn provider_for_audience(audience: &str) -> Provider {
    match audience.trim_end_matches('/') {
        FCM_AUDIENCE => Provider::Fcm,
        MOZILLA_AUDIENCE => Provider::Mozilla,
        _ => Provider::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(table: &AudienceTable, endpoint: &str) -> Audience {
        table.resolve(endpoint).unwrap()
    }

    #[test]
    fn fcm_endpoints() {
        let table = AudienceTable::default();
        let aud = resolve(&table, "https://fcm.googleapis.com/fcm/send/dGVzdC10b2tlbg:APA91b");
        assert_eq!(aud.uri, FCM_AUDIENCE);
        assert_eq!(aud.provider, Provider::Fcm);
        // Hosts are case insensitive.
        assert_eq!(
            resolve(&table, "https://FCM.googleapis.com/fcm/send/x").provider,
            Provider::Fcm
        );
    }

    #[test]
    fn mozilla_endpoints() {
        let table = AudienceTable::default();
        let aud = resolve(
            &table,
            "https://updates.push.services.mozilla.com/wpush/v2/gAAAAABk",
        );
        assert_eq!(aud.uri, MOZILLA_AUDIENCE);
        assert_eq!(aud.provider, Provider::Mozilla);
        assert_eq!(
            resolve(&table, "https://push.services.mozilla.com/wpush/v1/x").provider,
            Provider::Mozilla
        );
    }

    #[test]
    fn substrings_do_not_match() {
        let table = AudienceTable::default();
        let aud = resolve(&table, "https://evil.example/fcm.googleapis.com/send");
        assert_eq!(aud.uri, "https://evil.example");
        assert_eq!(aud.provider, Provider::Other);

        let aud = resolve(&table, "https://fcm.googleapis.com.evil.example/send");
        assert_eq!(aud.provider, Provider::Other);

        let aud = resolve(&table, "https://notpush.services.mozilla.com/x");
        assert_eq!(aud.provider, Provider::Other);
    }

    #[test]
    fn unknown_hosts_fall_back_to_origin() {
        let table = AudienceTable::default();
        let aud = resolve(&table, "https://web.push.apple.com/QGuQyavXutnMH");
        assert_eq!(aud.uri, "https://web.push.apple.com");
        let aud = resolve(&table, "http://127.0.0.1:1234/push/abc");
        assert_eq!(aud.uri, "http://127.0.0.1:1234");
    }

    #[test]
    fn default_audience_is_used_when_configured() {
        let table = AudienceTable::new(&HashMap::new(), Some("https://push.example.org".to_owned()));
        let aud = resolve(&table, "https://unknown.example/abc");
        assert_eq!(aud.uri, "https://push.example.org");
        assert_eq!(aud.provider, Provider::Other);
        // Known hosts still win.
        assert_eq!(
            resolve(&table, "https://fcm.googleapis.com/fcm/send/x").uri,
            FCM_AUDIENCE
        );
        // An empty default means "not configured".
        let table = AudienceTable::new(&HashMap::new(), Some(String::new()));
        assert_eq!(resolve(&table, "https://unknown.example/abc").uri, "https://unknown.example");
    }

    #[test]
    fn overrides_take_precedence() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "wns2-par02p.notify.windows.com".to_owned(),
            "https://wns2-par02p.notify.windows.com".to_owned(),
        );
        overrides.insert(
            "fcm.googleapis.com".to_owned(),
            "https://fcm.googleapis.com/".to_owned(),
        );
        let table = AudienceTable::new(&overrides, None);

        let aud = resolve(&table, "https://wns2-par02p.notify.windows.com/w/?token=abc");
        assert_eq!(aud.uri, "https://wns2-par02p.notify.windows.com");
        assert_eq!(aud.provider, Provider::Other);

        let aud = resolve(&table, "https://fcm.googleapis.com/fcm/send/x");
        assert_eq!(aud.uri, FCM_AUDIENCE);
        assert_eq!(aud.provider, Provider::Fcm);
    }

    #[test]
    fn invalid_endpoints() {
        let table = AudienceTable::default();
        for endpoint in ["", "not a url", "/relative/path", "mailto:someone@example.com"] {
            let err = table.resolve(endpoint).unwrap_err();
            assert!(
                matches!(err.kind, PushErrorKind::InvalidEndpoint { .. }),
                "{endpoint:?}: {err}"
            );
        }
    }
}
