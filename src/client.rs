//! The remote game service client.
//!
//! The core consumes the service through the narrow [`GameClient`] trait;
//! `HttpGameClient` is the production implementation over the game's JSON
//! API. The transport is rate-limited out of band — nothing here throttles
//! beyond honoring cooldown errors.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::character::{CharacterSnapshot, CooldownReason, CooldownRecord, InventorySlot};

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Failures from the remote game service, distinguished by HTTP status
/// class. The execution manager's recovery policy keys on these variants.
#[derive(Debug, Error, Diagnostic)]
pub enum ClientError {
    #[error("unauthorized: the server rejected the API token")]
    #[diagnostic(
        code(wayfarer::client::unauthorized),
        help(
            "Check the WAYFARER_TOKEN environment variable. Authentication \
             failures are fatal — the agent never retries them."
        )
    )]
    Unauthorized,

    #[error("inventory full")]
    #[diagnostic(
        code(wayfarer::client::inventory_full),
        help(
            "Deposit or discard items before gathering more. Goal selection \
             above this layer is expected to intervene."
        )
    )]
    InventoryFull,

    #[error("character on cooldown: {remaining_seconds:.1}s remaining")]
    #[diagnostic(
        code(wayfarer::client::cooldown),
        help("The agent inserts a wait step and retries after the cooldown elapses.")
    )]
    CooldownActive { remaining_seconds: f64 },

    #[error("transient server error (status {status})")]
    #[diagnostic(
        code(wayfarer::client::transient),
        help("The server failed temporarily. The agent replans; repeated failures surface.")
    )]
    Transient { status: u16 },

    #[error("connection error: {message}")]
    #[diagnostic(
        code(wayfarer::client::connection),
        help("Check network connectivity and the configured API base URL.")
    )]
    Connection { message: String },

    #[error("failed to decode server response: {message}")]
    #[diagnostic(
        code(wayfarer::client::decode),
        help(
            "The server returned a payload this client does not understand; \
             it may have changed its API."
        )
    )]
    Decode { message: String },
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

// ---------------------------------------------------------------------------
// GameClient trait
// ---------------------------------------------------------------------------

/// Result of a server-side action: the new authoritative snapshot, the
/// imposed cooldown, and any action-specific payload.
#[derive(Debug, Clone)]
pub struct ActionResponse {
    pub character: CharacterSnapshot,
    pub cooldown: CooldownRecord,
    pub message: String,
    /// Action-specific details (fight outcome, drops, gathered items).
    pub details: serde_json::Value,
}

/// The narrow interface the core consumes. One call per game verb; each call
/// may fail with any [`ClientError`] variant.
pub trait GameClient: Send {
    fn get_character(&self, name: &str) -> ClientResult<CharacterSnapshot>;
    fn move_character(&self, name: &str, x: i32, y: i32) -> ClientResult<ActionResponse>;
    fn fight_monster(&self, name: &str) -> ClientResult<ActionResponse>;
    fn gather_resource(&self, name: &str) -> ClientResult<ActionResponse>;
    fn craft_item(&self, name: &str, code: &str, quantity: u32) -> ClientResult<ActionResponse>;
    fn equip_item(&self, name: &str, code: &str, slot: &str) -> ClientResult<ActionResponse>;
    fn rest(&self, name: &str) -> ClientResult<ActionResponse>;
    fn bank_deposit(&self, name: &str, code: &str, quantity: u32) -> ClientResult<ActionResponse>;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ApiCooldown {
    #[serde(default)]
    total_seconds: f64,
    #[serde(default)]
    remaining_seconds: f64,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiInventorySlot {
    #[serde(default)]
    code: String,
    #[serde(default)]
    quantity: u32,
}

#[derive(Debug, Deserialize)]
struct ApiCharacter {
    name: String,
    level: u32,
    #[serde(default)]
    xp: u64,
    hp: i32,
    max_hp: i32,
    x: i32,
    y: i32,
    #[serde(default)]
    skills: std::collections::BTreeMap<String, u32>,
    #[serde(default)]
    equipment: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    inventory: Vec<ApiInventorySlot>,
    #[serde(default)]
    inventory_max_items: u32,
    #[serde(default)]
    cooldown: f64,
    #[serde(default)]
    cooldown_expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiActionResult {
    character: ApiCharacter,
    #[serde(default)]
    cooldown: Option<ApiCooldown>,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    details: serde_json::Value,
}

fn parse_reason(raw: Option<&str>) -> CooldownReason {
    match raw {
        Some("movement") => CooldownReason::Movement,
        Some("fight") => CooldownReason::Fight,
        Some("gathering") => CooldownReason::Gathering,
        Some("crafting") => CooldownReason::Crafting,
        Some("rest") => CooldownReason::Rest,
        Some("equip") => CooldownReason::Equip,
        _ => CooldownReason::Unknown,
    }
}

impl ApiCharacter {
    fn into_snapshot(self, reason: CooldownReason) -> CharacterSnapshot {
        CharacterSnapshot {
            name: self.name,
            level: self.level,
            xp: self.xp,
            hp_current: self.hp,
            hp_max: self.max_hp,
            x: self.x,
            y: self.y,
            skills: self.skills,
            equipment: self.equipment,
            inventory: self
                .inventory
                .into_iter()
                .filter(|slot| !slot.code.is_empty())
                .map(|slot| InventorySlot {
                    code: slot.code,
                    quantity: slot.quantity,
                })
                .collect(),
            inventory_capacity: self.inventory_max_items,
            cooldown_total_seconds: self.cooldown,
            cooldown_expires_at: self.cooldown_expiration,
            cooldown_reason: reason,
        }
    }
}

impl ApiActionResult {
    fn into_response(self) -> ActionResponse {
        let reason = parse_reason(self.cooldown.as_ref().and_then(|c| c.reason.as_deref()));
        let character = self.character.into_snapshot(reason);
        let cooldown = match self.cooldown {
            Some(api) => CooldownRecord {
                character: character.name.clone(),
                expires_at: api.expiration,
                total_seconds: api.total_seconds,
                remaining_seconds: api.remaining_seconds,
                reason,
            },
            None => CooldownRecord::ready(&character.name),
        };
        ActionResponse {
            cooldown,
            message: self.message.unwrap_or_default(),
            details: self.details,
            character,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Production client over the game's JSON API.
pub struct HttpGameClient {
    base_url: String,
    token: String,
    http: ureq::Agent,
}

impl HttpGameClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            http: ureq::Agent::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    fn map_error(err: ureq::Error) -> ClientError {
        match err {
            ureq::Error::Status(status @ (401 | 403), _) => {
                tracing::error!(status, "server rejected credentials");
                ClientError::Unauthorized
            }
            ureq::Error::Status(497, _) => ClientError::InventoryFull,
            ureq::Error::Status(status @ (486 | 499), response) => {
                // The refusal body carries the remaining time; fall back to
                // zero when it doesn't parse.
                let remaining = response
                    .into_json::<serde_json::Value>()
                    .ok()
                    .and_then(|v| {
                        v.pointer("/error/data/remaining_seconds")
                            .or_else(|| v.pointer("/error/remaining_seconds"))
                            .and_then(serde_json::Value::as_f64)
                    })
                    .unwrap_or(0.0);
                tracing::debug!(status, remaining, "action refused: cooldown active");
                ClientError::CooldownActive {
                    remaining_seconds: remaining,
                }
            }
            ureq::Error::Status(status, _) => ClientError::Transient { status },
            ureq::Error::Transport(transport) => ClientError::Connection {
                message: transport.to_string(),
            },
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let resp = self
            .http
            .get(&self.url(path))
            .set("Authorization", &format!("Bearer {}", self.token))
            .call()
            .map_err(Self::map_error)?;
        resp.into_json().map_err(|e| ClientError::Decode {
            message: e.to_string(),
        })
    }

    fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let resp = self
            .http
            .post(&self.url(path))
            .set("Authorization", &format!("Bearer {}", self.token))
            .send_json(body)
            .map_err(Self::map_error)?;
        resp.into_json().map_err(|e| ClientError::Decode {
            message: e.to_string(),
        })
    }

    fn action<B: Serialize>(&self, path: &str, body: &B) -> ClientResult<ActionResponse> {
        let envelope: Envelope<ApiActionResult> = self.post_json(path, body)?;
        Ok(envelope.data.into_response())
    }
}

impl GameClient for HttpGameClient {
    fn get_character(&self, name: &str) -> ClientResult<CharacterSnapshot> {
        let envelope: Envelope<ApiCharacter> = self.get_json(&format!("/characters/{name}"))?;
        Ok(envelope.data.into_snapshot(CooldownReason::Unknown))
    }

    fn move_character(&self, name: &str, x: i32, y: i32) -> ClientResult<ActionResponse> {
        self.action(
            &format!("/my/{name}/action/move"),
            &serde_json::json!({ "x": x, "y": y }),
        )
    }

    fn fight_monster(&self, name: &str) -> ClientResult<ActionResponse> {
        self.action(&format!("/my/{name}/action/fight"), &serde_json::json!({}))
    }

    fn gather_resource(&self, name: &str) -> ClientResult<ActionResponse> {
        self.action(
            &format!("/my/{name}/action/gathering"),
            &serde_json::json!({}),
        )
    }

    fn craft_item(&self, name: &str, code: &str, quantity: u32) -> ClientResult<ActionResponse> {
        self.action(
            &format!("/my/{name}/action/crafting"),
            &serde_json::json!({ "code": code, "quantity": quantity }),
        )
    }

    fn equip_item(&self, name: &str, code: &str, slot: &str) -> ClientResult<ActionResponse> {
        self.action(
            &format!("/my/{name}/action/equip"),
            &serde_json::json!({ "code": code, "slot": slot }),
        )
    }

    fn rest(&self, name: &str) -> ClientResult<ActionResponse> {
        self.action(&format!("/my/{name}/action/rest"), &serde_json::json!({}))
    }

    fn bank_deposit(&self, name: &str, code: &str, quantity: u32) -> ClientResult<ActionResponse> {
        self.action(
            &format!("/my/{name}/action/bank/deposit"),
            &serde_json::json!({ "code": code, "quantity": quantity }),
        )
    }
}
