//! Notification subscribers, as kept in the board's JSON subscriber list.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PushResult;

/// Which trails a subscriber wants updates for.
///
/// Stored as `["all"]` or a list of trail ids. An empty or missing list means
/// every trail. A `Trails` set with no ids is stored as `["none"]`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum TrailFilter {
    #[default]
    All,
    Trails(BTreeSet<u64>),
}

impl TrailFilter {
    pub fn matches(&self, trail_id: u64) -> bool {
        match self {
            Self::All => true,
            Self::Trails(ids) => ids.contains(&trail_id),
        }
    }
}

/// Never a trail name or id, so it reloads as an empty set.
const NO_TRAILS: &str = "none";

#[derive(Deserialize)]
#[serde(untagged)]
enum TrailRef {
    Id(u64),
    Name(String),
}

impl<'de> Deserialize<'de> for TrailFilter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let refs: Option<Vec<TrailRef>> = Deserialize::deserialize(deserializer)?;
        let refs = match refs {
            Some(refs) if !refs.is_empty() => refs,
            _ => return Ok(Self::All),
        };
        let mut ids = BTreeSet::new();
        for trail in refs {
            match trail {
                TrailRef::Id(id) => {
                    ids.insert(id);
                }
                TrailRef::Name(name) if name.trim().eq_ignore_ascii_case("all") => {
                    return Ok(Self::All)
                }
                // Unrecognized names never match a trail.
                TrailRef::Name(name) => {
                    if let Ok(id) = name.trim().parse() {
                        ids.insert(id);
                    }
                }
            }
        }
        Ok(Self::Trails(ids))
    }
}

impl Serialize for TrailFilter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::All => ["all"].serialize(serializer),
            // An empty list would reload as `All`.
            Self::Trails(ids) if ids.is_empty() => [NO_TRAILS].serialize(serializer),
            Self::Trails(ids) => ids.serialize(serializer),
        }
    }
}

fn default_active() -> bool {
    true
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub endpoint: String,
    /// Device encryption key. Carried but unused while payloads are plaintext.
    #[serde(default, alias = "p256dh_key")]
    pub p256dh: String,
    #[serde(default, alias = "auth_key")]
    pub auth: String,
    #[serde(default)]
    pub trails: TrailFilter,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Subscriber {
    pub fn new(endpoint: &str, p256dh: &str, auth: &str) -> Self {
        Self {
            id: None,
            endpoint: endpoint.to_owned(),
            p256dh: p256dh.to_owned(),
            auth: auth.to_owned(),
            trails: TrailFilter::All,
            active: true,
            user_agent: None,
            created_at: None,
        }
    }

    /// Whether this subscriber should receive an update for `trail_id`.
    pub fn wants(&self, trail_id: u64) -> bool {
        self.active && self.trails.matches(trail_id)
    }
}

/// Read a JSON subscriber list. A missing or empty file is an empty list.
pub fn load_subscribers(path: &Path) -> PushResult<Vec<Subscriber>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("📋 No subscriber file"; "path" => path.display().to_string());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&raw)?)
}

/// Write the subscriber list back as pretty printed JSON.
pub fn save_subscribers(path: &Path, subscribers: &[Subscriber]) -> PushResult<()> {
    fs::write(path, serde_json::to_vec_pretty(subscribers)?)?;
    Ok(())
}

/// Mark every subscriber whose endpoint is in `endpoints` inactive. Returns the
/// number of subscribers changed.
pub fn deactivate(subscribers: &mut [Subscriber], endpoints: &[String]) -> usize {
    let mut changed = 0;
    for subscriber in subscribers
        .iter_mut()
        .filter(|s| s.active && endpoints.contains(&s.endpoint))
    {
        subscriber.active = false;
        changed += 1;
    }
    changed
}
