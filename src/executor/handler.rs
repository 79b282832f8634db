//! Action execution: the handler trait, the registry, and the built-in
//! server-backed handlers.
//!
//! Concrete action tactics live behind [`ActionHandler`]; the execution
//! manager only sees declared preconditions, effects, and an opaque
//! `execute`. Handlers receive the current state and the shared discovery
//! context, call the game client, and report an [`ActionOutcome`].

use std::collections::BTreeMap;

use miette::Diagnostic;
use thiserror::Error;

use crate::client::{ClientError, GameClient};
use crate::character::CharacterSnapshot;
use crate::error::CatalogError;
use crate::knowledge::{ActionContext, KnowledgeBase, MapState};
use crate::planner::{ActionCatalog, ActionFamily};
use crate::state::{Requirement, StateValue, WorldState};

// ---------------------------------------------------------------------------
// Outcome & errors
// ---------------------------------------------------------------------------

/// What an executed action reported back.
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    /// Fresh server-authoritative snapshot, when the action returned one.
    pub snapshot: Option<CharacterSnapshot>,
    /// State keys the action observed changing, beyond its declared effects.
    pub state_delta: BTreeMap<String, StateValue>,
    /// Server-imposed cooldown in seconds (0 when none).
    pub cooldown_seconds: f64,
}

impl ActionOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn from_response(response: crate::client::ActionResponse) -> Self {
        Self {
            success: true,
            message: response.message,
            cooldown_seconds: response.cooldown.remaining_seconds,
            snapshot: Some(response.character),
            state_delta: BTreeMap::new(),
        }
    }
}

/// Failures surfaced by action handlers. The execution manager's recovery
/// policy dispatches on these.
#[derive(Debug, Error, Diagnostic)]
pub enum HandlerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Client(#[from] ClientError),

    #[error("move for \"{action}\" has no target coordinates")]
    #[diagnostic(
        code(wayfarer::handler::coordinate_unknown),
        help(
            "The action context lacks target coordinates. The manager \
             recovers by prepending a monster-discovery step and replanning."
        )
    )]
    CoordinateUnknown { action: String },

    #[error("no handler registered for action \"{action}\"")]
    #[diagnostic(
        code(wayfarer::handler::not_registered),
        help("Register a handler for this action name before executing plans that contain it.")
    )]
    NotRegistered { action: String },

    #[error("action \"{action}\" failed: {message}")]
    #[diagnostic(
        code(wayfarer::handler::failed),
        help("The handler reported a non-recoverable local failure.")
    )]
    Failed { action: String, message: String },
}

// ---------------------------------------------------------------------------
// Handler trait & registry
// ---------------------------------------------------------------------------

/// Everything a handler may read and write while executing one action.
pub struct ExecutionContext<'a> {
    pub character: &'a str,
    pub state: &'a WorldState,
    /// Parameter bindings from the plan step.
    pub parameters: &'a BTreeMap<String, StateValue>,
    pub context: &'a mut ActionContext,
    pub knowledge: &'a mut KnowledgeBase,
    pub map: &'a mut MapState,
}

/// An opaque, server-calling action implementation.
pub trait ActionHandler: Send {
    fn execute(
        &self,
        client: &dyn GameClient,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<ActionOutcome, HandlerError>;
}

/// Name → handler dispatch table.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: BTreeMap<String, Box<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Box<dyn ActionHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn execute(
        &self,
        name: &str,
        client: &dyn GameClient,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<ActionOutcome, HandlerError> {
        let Some(handler) = self.handlers.get(name) else {
            return Err(HandlerError::NotRegistered {
                action: name.into(),
            });
        };
        handler.execute(client, ctx)
    }
}

/// Contributes parameterized actions to the catalog at plan time, resolving
/// unknowns from learned knowledge.
pub trait ActionFactory: Send {
    fn contribute(
        &self,
        catalog: &mut ActionCatalog,
        knowledge: &KnowledgeBase,
        context: &ActionContext,
    ) -> Result<(), CatalogError>;
}

// ---------------------------------------------------------------------------
// Built-in handlers
// ---------------------------------------------------------------------------

/// Moves to the coordinates bound in the action context (or step
/// parameters). Missing coordinates are the canonical coordinate failure.
pub struct MoveHandler;

impl ActionHandler for MoveHandler {
    fn execute(
        &self,
        client: &dyn GameClient,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<ActionOutcome, HandlerError> {
        let from_params = match (
            ctx.parameters.get("x").and_then(StateValue::as_f64),
            ctx.parameters.get("y").and_then(StateValue::as_f64),
        ) {
            (Some(x), Some(y)) => Some((x as i32, y as i32)),
            _ => None,
        };
        let Some((x, y)) = from_params.or_else(|| ctx.context.target_coordinates()) else {
            return Err(HandlerError::CoordinateUnknown {
                action: "move".into(),
            });
        };
        let response = client.move_character(ctx.character, x, y)?;
        ctx.map.record_tile(crate::knowledge::TileInfo {
            x,
            y,
            content_type: None,
            content_code: None,
        });
        Ok(ActionOutcome::from_response(response))
    }
}

/// Fights the monster on the current tile.
pub struct FightHandler;

impl ActionHandler for FightHandler {
    fn execute(
        &self,
        client: &dyn GameClient,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<ActionOutcome, HandlerError> {
        let response = client.fight_monster(ctx.character)?;
        let mut outcome = ActionOutcome::from_response(response);
        // A lost fight is a soft failure: the call succeeded, the tactic
        // didn't.
        if outcome
            .message
            .to_ascii_lowercase()
            .contains("lost")
        {
            outcome.success = false;
        }
        Ok(outcome)
    }
}

/// Gathers the resource on the current tile.
pub struct GatherHandler;

impl ActionHandler for GatherHandler {
    fn execute(
        &self,
        client: &dyn GameClient,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<ActionOutcome, HandlerError> {
        let response = client.gather_resource(ctx.character)?;
        Ok(ActionOutcome::from_response(response))
    }
}

/// Crafts the item bound in the step parameters or the shared context.
pub struct CraftHandler;

impl ActionHandler for CraftHandler {
    fn execute(
        &self,
        client: &dyn GameClient,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<ActionOutcome, HandlerError> {
        let code = match ctx.parameters.get("item_code") {
            Some(StateValue::Str(code)) => code.clone(),
            _ => ctx
                .context
                .selected_item()
                .map(str::to_string)
                .ok_or_else(|| HandlerError::Failed {
                    action: "craft_item".into(),
                    message: "no item code bound in context".into(),
                })?,
        };
        let quantity = ctx
            .parameters
            .get("quantity")
            .and_then(StateValue::as_f64)
            .map(|q| q as u32)
            .unwrap_or(1);
        let response = client.craft_item(ctx.character, &code, quantity)?;
        Ok(ActionOutcome::from_response(response))
    }
}

/// Rests until hp recovers.
pub struct RestHandler;

impl ActionHandler for RestHandler {
    fn execute(
        &self,
        client: &dyn GameClient,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<ActionOutcome, HandlerError> {
        let response = client.rest(ctx.character)?;
        Ok(ActionOutcome::from_response(response))
    }
}

/// Equips the item bound in the step parameters or the shared context.
pub struct EquipHandler;

impl ActionHandler for EquipHandler {
    fn execute(
        &self,
        client: &dyn GameClient,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<ActionOutcome, HandlerError> {
        let code = match ctx.parameters.get("item_code") {
            Some(StateValue::Str(code)) => code.clone(),
            _ => ctx
                .context
                .selected_item()
                .map(str::to_string)
                .ok_or_else(|| HandlerError::Failed {
                    action: "equip_item".into(),
                    message: "no item code bound in context".into(),
                })?,
        };
        let slot = match ctx.parameters.get("slot") {
            Some(StateValue::Str(slot)) => slot.clone(),
            _ => "weapon".to_string(),
        };
        let response = client.equip_item(ctx.character, &code, &slot)?;
        Ok(ActionOutcome::from_response(response))
    }
}

/// Resolves a monster location from learned knowledge or the map cache and
/// binds it as the movement target.
pub struct FindMonstersHandler;

impl ActionHandler for FindMonstersHandler {
    fn execute(
        &self,
        _client: &dyn GameClient,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<ActionOutcome, HandlerError> {
        let location = ctx
            .knowledge
            .any_monster_location()
            .or_else(|| ctx.map.find_content("monster", None).into_iter().next());
        let Some((x, y)) = location else {
            return Err(HandlerError::Failed {
                action: "find_monsters".into(),
                message: "no monster locations known".into(),
            });
        };
        ctx.context.set_target_coordinates(x, y);
        Ok(ActionOutcome::success(format!(
            "monster target bound at ({x}, {y})"
        )))
    }
}

// ---------------------------------------------------------------------------
// Built-in factory
// ---------------------------------------------------------------------------

/// Generates one gathering action per resource with a known location.
pub struct GatheringActionFactory;

impl ActionFactory for GatheringActionFactory {
    fn contribute(
        &self,
        catalog: &mut ActionCatalog,
        knowledge: &KnowledgeBase,
        _context: &ActionContext,
    ) -> Result<(), CatalogError> {
        for code in knowledge.known_resources() {
            let name = format!("gather_{code}");
            if catalog.contains(&name) {
                continue;
            }
            catalog.add_condition(
                &name,
                crate::state::COOLDOWN_READY,
                Requirement::Value(StateValue::Bool(true)),
            )?;
            catalog.add_condition(
                &name,
                "at_target_location",
                Requirement::Value(StateValue::Bool(true)),
            )?;
            catalog.add_reaction(&name, &format!("has_{code}"), StateValue::Bool(true))?;
            catalog.add_reaction(&name, crate::state::COOLDOWN_READY, StateValue::Bool(false))?;
            catalog.set_family(&name, ActionFamily::Gathering)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ActionResponse, ClientResult};
    use crate::character::CooldownRecord;

    fn snapshot(name: &str) -> CharacterSnapshot {
        CharacterSnapshot {
            name: name.into(),
            level: 5,
            xp: 1200,
            hp_current: 90,
            hp_max: 100,
            x: 0,
            y: 0,
            skills: BTreeMap::new(),
            equipment: BTreeMap::new(),
            inventory: Vec::new(),
            inventory_capacity: 20,
            cooldown_total_seconds: 0.0,
            cooldown_expires_at: None,
            cooldown_reason: crate::character::CooldownReason::Unknown,
        }
    }

    struct StubClient;

    impl StubClient {
        fn response(name: &str) -> ActionResponse {
            ActionResponse {
                character: snapshot(name),
                cooldown: CooldownRecord::ready(name),
                message: String::new(),
                details: serde_json::Value::Null,
            }
        }
    }

    impl GameClient for StubClient {
        fn get_character(&self, name: &str) -> ClientResult<CharacterSnapshot> {
            Ok(snapshot(name))
        }
        fn move_character(&self, name: &str, _x: i32, _y: i32) -> ClientResult<ActionResponse> {
            Ok(Self::response(name))
        }
        fn fight_monster(&self, name: &str) -> ClientResult<ActionResponse> {
            Ok(Self::response(name))
        }
        fn gather_resource(&self, name: &str) -> ClientResult<ActionResponse> {
            Ok(Self::response(name))
        }
        fn craft_item(&self, name: &str, _c: &str, _q: u32) -> ClientResult<ActionResponse> {
            Ok(Self::response(name))
        }
        fn equip_item(&self, name: &str, _c: &str, _s: &str) -> ClientResult<ActionResponse> {
            Ok(Self::response(name))
        }
        fn rest(&self, name: &str) -> ClientResult<ActionResponse> {
            Ok(Self::response(name))
        }
        fn bank_deposit(&self, name: &str, _c: &str, _q: u32) -> ClientResult<ActionResponse> {
            Ok(Self::response(name))
        }
    }

    fn with_context<R>(f: impl FnOnce(&mut ExecutionContext<'_>) -> R) -> R {
        let state = WorldState::new();
        let parameters = BTreeMap::new();
        let mut context = ActionContext::new();
        let mut knowledge = KnowledgeBase::in_memory();
        let mut map = MapState::in_memory();
        let mut ctx = ExecutionContext {
            character: "ranger",
            state: &state,
            parameters: &parameters,
            context: &mut context,
            knowledge: &mut knowledge,
            map: &mut map,
        };
        f(&mut ctx)
    }

    #[test]
    fn move_without_coordinates_is_coordinate_failure() {
        let err = with_context(|ctx| MoveHandler.execute(&StubClient, ctx)).unwrap_err();
        assert!(matches!(err, HandlerError::CoordinateUnknown { .. }));
    }

    #[test]
    fn move_uses_context_target() {
        let outcome = with_context(|ctx| {
            ctx.context.set_target_coordinates(3, 4);
            MoveHandler.execute(&StubClient, ctx)
        })
        .unwrap();
        assert!(outcome.success);
        assert!(outcome.snapshot.is_some());
    }

    #[test]
    fn unregistered_action_is_reported() {
        let registry = ActionRegistry::new();
        let err = with_context(|ctx| registry.execute("unknown", &StubClient, ctx)).unwrap_err();
        assert!(matches!(err, HandlerError::NotRegistered { .. }));
    }

    #[test]
    fn find_monsters_binds_known_location() {
        let outcome = with_context(|ctx| {
            ctx.knowledge.record_monster_location("chicken", 8, 9);
            FindMonstersHandler.execute(&StubClient, ctx).map(|o| {
                assert_eq!(ctx.context.target_coordinates(), Some((8, 9)));
                o
            })
        })
        .unwrap();
        assert!(outcome.success);
    }

    #[test]
    fn gathering_factory_contributes_per_resource_actions() {
        let mut knowledge = KnowledgeBase::in_memory();
        knowledge.record_resource_location("copper_ore", 1, 1);
        knowledge.record_resource_location("ash_wood", 2, 2);

        let mut catalog = ActionCatalog::new();
        GatheringActionFactory
            .contribute(&mut catalog, &knowledge, &ActionContext::new())
            .unwrap();

        assert!(catalog.contains("gather_copper_ore"));
        assert!(catalog.contains("gather_ash_wood"));
        assert_eq!(
            catalog.get("gather_copper_ore").unwrap().family,
            ActionFamily::Gathering
        );
    }
}
