//! Application settings

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::{PushErrorKind, PushResult};
use crate::message::DEFAULT_TTL;
use crate::vapid::{AudienceTable, KeyPair};

pub const ENV_PREFIX: &str = "trailpush";

/// Settings read from an optional config file, then the environment
/// (`TRAILPUSH__VAPID_SUBJECT`, ...).
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base64url encoded uncompressed P-256 public point
    pub vapid_public_key: Option<String>,
    /// Base64url encoded raw P-256 private scalar
    pub vapid_private_key: Option<String>,
    /// Contact URI sent as the token `sub` claim (`mailto:` or `https:`)
    pub vapid_subject: String,
    /// Extra host -> audience entries, overriding the built-in ones
    pub audiences: HashMap<String, String>,
    /// Audience for hosts with no entry. The endpoint origin is used when unset.
    pub default_audience: Option<String>,
    /// Seconds the push service should hold an undelivered message
    pub ttl: u32,
    /// Request timeout in seconds
    pub timeout: u64,
    /// Largest JSON payload accepted for sending
    pub max_data_bytes: usize,
    pub user_agent: String,
    /// Global switch for outbound notifications
    pub push_enabled: bool,
    pub icon: Option<String>,
    pub badge: Option<String>,
    /// URL opened when a notification is clicked
    pub click_url: Option<String>,
    /// JSON subscriber list used by the CLI
    pub subscribers_file: Option<String>,
    /// Use human readable (simplified, non-JSON) logs
    pub human_logs: bool,
    pub statsd_host: Option<String>,
    pub statsd_port: u16,
    pub statsd_label: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vapid_public_key: None,
            vapid_private_key: None,
            vapid_subject: "mailto:noreply@example.com".to_owned(),
            audiences: HashMap::new(),
            default_audience: None,
            ttl: DEFAULT_TTL,
            timeout: 30,
            max_data_bytes: 4096,
            user_agent: format!("trailpush/{}", env!("CARGO_PKG_VERSION")),
            push_enabled: true,
            icon: None,
            badge: None,
            click_url: None,
            subscribers_file: None,
            human_logs: false,
            statsd_host: None,
            statsd_port: 8125,
            statsd_label: "trailpush".to_owned(),
        }
    }
}

// Never print the private key.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("vapid_public_key", &self.vapid_public_key)
            .field(
                "vapid_private_key",
                &self.vapid_private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("vapid_subject", &self.vapid_subject)
            .field("audiences", &self.audiences)
            .field("default_audience", &self.default_audience)
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .field("max_data_bytes", &self.max_data_bytes)
            .field("user_agent", &self.user_agent)
            .field("push_enabled", &self.push_enabled)
            .field("icon", &self.icon)
            .field("badge", &self.badge)
            .field("click_url", &self.click_url)
            .field("subscribers_file", &self.subscribers_file)
            .field("human_logs", &self.human_logs)
            .field("statsd_host", &self.statsd_host)
            .field("statsd_port", &self.statsd_port)
            .field("statsd_label", &self.statsd_label)
            .finish()
    }
}

impl Settings {
    /// Load the settings from the config file if supplied, then the environment.
    pub fn with_env_and_config_file(filename: &Option<String>) -> Result<Self, ConfigError> {
        let mut s = Config::builder();

        // Merge the config file if supplied
        if let Some(config_filename) = filename {
            s = s.add_source(File::with_name(config_filename));
        }

        // Merge the environment overrides
        s = s.add_source(Environment::with_prefix(&ENV_PREFIX.to_uppercase()).separator("__"));

        let built = s.build()?;
        let settings = built.try_deserialize::<Settings>().map_err(|error| match error {
            ConfigError::Message(error_msg) => {
                error!("Configuration error: Value undefined {:?}", &error_msg);
                ConfigError::NotFound(error_msg)
            }
            _ => {
                error!("Configuration error: Other: {:?}", &error);
                error
            }
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name: &str, msg: &str| {
            Err(ConfigError::Message(format!(
                "Invalid {}__{}: {}",
                ENV_PREFIX.to_uppercase(),
                name,
                msg
            )))
        };
        if !(self.vapid_subject.starts_with("mailto:") || self.vapid_subject.starts_with("https:"))
        {
            return invalid("VAPID_SUBJECT", "must be a mailto: or https: URI");
        }
        if self.timeout == 0 {
            return invalid("TIMEOUT", "cannot be 0");
        }
        if self.max_data_bytes == 0 {
            return invalid("MAX_DATA_BYTES", "cannot be 0");
        }
        Ok(())
    }

    /// The configured VAPID key pair. `Ok(None)` when neither key is set.
    pub fn key_pair(&self) -> PushResult<Option<KeyPair>> {
        let non_empty = |key: &Option<String>| key.clone().filter(|k| !k.trim().is_empty());
        match (
            non_empty(&self.vapid_private_key),
            non_empty(&self.vapid_public_key),
        ) {
            (None, None) => Ok(None),
            (Some(private_key), Some(public_key)) => {
                Ok(Some(KeyPair::from_base64(&private_key, &public_key)?))
            }
            (Some(_), None) => Err(PushErrorKind::Configuration(
                "vapid_private_key is set but vapid_public_key is missing".to_owned(),
            )
            .into()),
            (None, Some(_)) => Err(PushErrorKind::Configuration(
                "vapid_public_key is set but vapid_private_key is missing".to_owned(),
            )
            .into()),
        }
    }

    pub fn audience_table(&self) -> AudienceTable {
        AudienceTable::new(&self.audiences, self.default_audience.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
