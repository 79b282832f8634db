//! Character snapshots, cooldown records, and the on-disk character cache.
//!
//! Snapshots are server-authoritative: they are created by observing the
//! remote service and updated after every successful action. The cache
//! persists the latest snapshot per character as JSON under the state
//! directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{PersistError, StateError};
use crate::state::{AgentState, StateKey, StateValue};

/// Characters below this hp fraction are not considered combat-ready.
const SAFE_HP_FRACTION: f64 = 0.3;

// ---------------------------------------------------------------------------
// Cooldown
// ---------------------------------------------------------------------------

/// Why the server imposed the current cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownReason {
    Movement,
    Fight,
    Gathering,
    Crafting,
    Rest,
    Equip,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Server-imposed minimum interval before the character may act again.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CooldownRecord {
    pub character: String,
    /// When the cooldown elapses. `None` when the server response carried a
    /// malformed or missing timestamp.
    pub expires_at: Option<DateTime<Utc>>,
    pub total_seconds: f64,
    /// Remaining seconds as reported at observation time; the fallback
    /// readiness signal when `expires_at` is unavailable.
    pub remaining_seconds: f64,
    pub reason: CooldownReason,
}

impl CooldownRecord {
    /// A record for a character that is ready now.
    pub fn ready(character: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            expires_at: None,
            total_seconds: 0.0,
            remaining_seconds: 0.0,
            reason: CooldownReason::Unknown,
        }
    }

    /// Whether the character may act at `now`. Falls back to the reported
    /// remaining seconds when the expiration timestamp is absent.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => self.remaining_seconds <= 0.0,
        }
    }

    /// Seconds left until ready at `now`, clamped at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> f64 {
        match self.expires_at {
            Some(expires) => {
                let millis = (expires - now).num_milliseconds();
                (millis as f64 / 1000.0).max(0.0)
            }
            None => self.remaining_seconds.max(0.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One occupied inventory slot.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InventorySlot {
    pub code: String,
    pub quantity: u32,
}

/// Server-authoritative view of a character at one point in time.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CharacterSnapshot {
    pub name: String,
    pub level: u32,
    pub xp: u64,
    pub hp_current: i32,
    pub hp_max: i32,
    pub x: i32,
    pub y: i32,
    /// Skill name → level.
    #[serde(default)]
    pub skills: BTreeMap<String, u32>,
    /// Equipment slot → item code.
    #[serde(default)]
    pub equipment: BTreeMap<String, String>,
    #[serde(default)]
    pub inventory: Vec<InventorySlot>,
    pub inventory_capacity: u32,
    #[serde(default)]
    pub cooldown_total_seconds: f64,
    #[serde(default)]
    pub cooldown_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cooldown_reason: CooldownReason,
}

impl CharacterSnapshot {
    /// Check the structural invariants a server snapshot must satisfy.
    pub fn validate(&self) -> Result<(), StateError> {
        if self.hp_max <= 0 || self.hp_current < 0 || self.hp_current > self.hp_max {
            return Err(StateError::HpOutOfRange {
                hp_current: self.hp_current,
                hp_max: self.hp_max,
            });
        }
        if !(1..=45).contains(&self.level) {
            return Err(StateError::LevelOutOfRange {
                what: "character".into(),
                level: self.level,
            });
        }
        for (skill, level) in &self.skills {
            if !(1..=45).contains(level) {
                return Err(StateError::LevelOutOfRange {
                    what: skill.clone(),
                    level: *level,
                });
            }
        }
        let used = self.space_used();
        if used > self.inventory_capacity {
            return Err(StateError::InventoryIncoherent {
                space_used: used,
                space_available: 0,
                capacity: self.inventory_capacity,
            });
        }
        Ok(())
    }

    /// Occupied inventory slots.
    pub fn space_used(&self) -> u32 {
        self.inventory.iter().filter(|s| s.quantity > 0).count() as u32
    }

    /// Free inventory slots.
    pub fn space_available(&self) -> u32 {
        self.inventory_capacity.saturating_sub(self.space_used())
    }

    /// The cooldown record derived from this snapshot, with remaining time
    /// evaluated at `now`.
    pub fn cooldown(&self, now: DateTime<Utc>) -> CooldownRecord {
        let mut record = CooldownRecord {
            character: self.name.clone(),
            expires_at: self.cooldown_expires_at,
            total_seconds: self.cooldown_total_seconds,
            remaining_seconds: self.cooldown_total_seconds,
            reason: self.cooldown_reason,
        };
        record.remaining_seconds = record.remaining(now);
        record
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.cooldown(now).is_ready(now)
    }

    fn hp_percentage(&self) -> i64 {
        if self.hp_max <= 0 {
            return 0;
        }
        (self.hp_current as i64 * 100) / self.hp_max as i64
    }

    /// Translate the snapshot into the agent's enum-keyed observation.
    pub fn to_agent_state(&self, now: DateTime<Utc>) -> AgentState {
        let ready = self.is_ready(now);
        let hp_pct = self.hp_percentage();
        let safe = hp_pct >= (SAFE_HP_FRACTION * 100.0) as i64;

        let mut state = AgentState::new();
        state.set(StateKey::CharacterLevel, self.level as i64);
        state.set(StateKey::CharacterXp, self.xp as i64);
        state.set(StateKey::HpCurrent, self.hp_current as i64);
        state.set(StateKey::HpMax, self.hp_max as i64);
        state.set(StateKey::CooldownReady, ready);
        state.set(StateKey::CanFight, self.hp_current > 0 && safe);
        state.set(StateKey::InventoryCapacity, self.inventory_capacity as i64);
        state.set(StateKey::SpaceUsed, self.space_used() as i64);
        state.set(StateKey::SpaceAvailable, self.space_available() as i64);
        state.set(
            StateKey::CurrentLocation,
            StateValue::Record(
                [
                    ("x".to_string(), StateValue::Int(self.x as i64)),
                    ("y".to_string(), StateValue::Int(self.y as i64)),
                ]
                .into(),
            ),
        );
        state.set(
            StateKey::CharacterStatus,
            StateValue::Record(
                [
                    ("alive".to_string(), StateValue::Bool(self.hp_current > 0)),
                    ("safe".to_string(), StateValue::Bool(safe)),
                    ("hp_percentage".to_string(), StateValue::Int(hp_pct)),
                    ("cooldown_active".to_string(), StateValue::Bool(!ready)),
                ]
                .into(),
            ),
        );
        state
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Per-character snapshot records persisted as JSON, keyed by name.
#[derive(Debug)]
pub struct CharacterCache {
    path: Option<PathBuf>,
    entries: BTreeMap<String, CharacterSnapshot>,
}

impl CharacterCache {
    /// An in-memory cache that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache from `path`; a missing file yields an empty cache.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| PersistError::Serialization {
                path: path.display().to_string(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(PersistError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };
        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    pub fn get(&self, name: &str) -> Option<&CharacterSnapshot> {
        self.entries.get(name)
    }

    /// Record the latest snapshot for its character.
    pub fn update(&mut self, snapshot: CharacterSnapshot) {
        self.entries.insert(snapshot.name.clone(), snapshot);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the cache to disk. In-memory caches are a no-op.
    pub fn save(&self) -> Result<(), PersistError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PersistError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let raw =
            serde_json::to_string_pretty(&self.entries).map_err(|e| PersistError::Serialization {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        std::fs::write(path, raw).map_err(|e| PersistError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(name: &str) -> CharacterSnapshot {
        CharacterSnapshot {
            name: name.into(),
            level: 5,
            xp: 1200,
            hp_current: 90,
            hp_max: 100,
            x: 2,
            y: -3,
            skills: [("mining".to_string(), 4u32)].into(),
            equipment: [("weapon".to_string(), "copper_dagger".to_string())].into(),
            inventory: vec![InventorySlot {
                code: "copper_ore".into(),
                quantity: 12,
            }],
            inventory_capacity: 20,
            cooldown_total_seconds: 0.0,
            cooldown_expires_at: None,
            cooldown_reason: CooldownReason::Unknown,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn readiness_follows_expiration_timestamp() {
        let record = CooldownRecord {
            character: "ranger".into(),
            expires_at: Some(at(30)),
            total_seconds: 30.0,
            remaining_seconds: 30.0,
            reason: CooldownReason::Fight,
        };
        assert!(!record.is_ready(at(0)));
        assert!(record.is_ready(at(30)));
        assert!(record.is_ready(at(31)));
        assert_eq!(record.remaining(at(10)), 20.0);
        assert_eq!(record.remaining(at(40)), 0.0);
    }

    #[test]
    fn malformed_timestamp_falls_back_to_remaining_seconds() {
        let mut record = CooldownRecord::ready("ranger");
        record.remaining_seconds = 4.0;
        assert!(!record.is_ready(at(0)));
        record.remaining_seconds = 0.0;
        assert!(record.is_ready(at(0)));
    }

    #[test]
    fn snapshot_invariants_validate() {
        let mut snap = snapshot("ranger");
        snap.validate().unwrap();

        snap.hp_current = 120;
        assert!(matches!(
            snap.validate(),
            Err(StateError::HpOutOfRange { .. })
        ));

        snap.hp_current = 90;
        snap.level = 46;
        assert!(matches!(
            snap.validate(),
            Err(StateError::LevelOutOfRange { .. })
        ));
    }

    #[test]
    fn inventory_counters_are_coherent() {
        let snap = snapshot("ranger");
        assert_eq!(snap.space_used() + snap.space_available(), snap.inventory_capacity);
    }

    #[test]
    fn observation_carries_nested_records() {
        let snap = snapshot("ranger");
        let state = snap.to_agent_state(at(0)).flatten();
        assert_eq!(state.get("character_level"), Some(&StateValue::Int(5)));
        assert_eq!(state.get("cooldown_ready"), Some(&StateValue::Bool(true)));
        let Some(StateValue::Record(location)) = state.get("current_location") else {
            panic!("current_location must be a record");
        };
        assert_eq!(location.get("x"), Some(&StateValue::Int(2)));
        assert_eq!(location.get("y"), Some(&StateValue::Int(-3)));
    }

    #[test]
    fn low_hp_clears_can_fight() {
        let mut snap = snapshot("ranger");
        snap.hp_current = 10;
        let state = snap.to_agent_state(at(0)).flatten();
        assert_eq!(state.get("can_fight"), Some(&StateValue::Bool(false)));
    }
}
