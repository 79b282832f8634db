//! Learned game knowledge shared across plans.
//!
//! The knowledge base holds facts discovery actions have revealed (recipes,
//! workshop and monster locations); the map state holds explored tiles; the
//! action context carries short-lived parameter bindings between plan steps
//! (selected weapon, target coordinates). All three persist as JSON under
//! the state directory. One agent per character writes them; the core
//! assumes single-writer discipline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::PersistError;
use crate::state::{StateKey, StateValue, WorldState};

// ---------------------------------------------------------------------------
// Knowledge base
// ---------------------------------------------------------------------------

/// One material requirement of a recipe.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Material {
    pub code: String,
    pub quantity: u32,
}

/// A crafting recipe learned from the game.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Recipe {
    pub item_code: String,
    pub skill: String,
    pub level: u32,
    pub materials: Vec<Material>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct KnowledgeData {
    #[serde(default)]
    recipes: BTreeMap<String, Recipe>,
    /// Workshop skill → coordinates.
    #[serde(default)]
    workshops: BTreeMap<String, (i32, i32)>,
    /// Monster code → coordinates.
    #[serde(default)]
    monsters: BTreeMap<String, (i32, i32)>,
    /// Resource code → coordinates.
    #[serde(default)]
    resources: BTreeMap<String, (i32, i32)>,
}

/// Facts the agent has learned about the game world, with typed accessors.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    path: Option<PathBuf>,
    data: KnowledgeData,
    /// Bumped on every mutation; the execution manager invalidates its plan
    /// cache when this moves.
    generation: u64,
}

impl KnowledgeBase {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing file yields an empty knowledge base.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| PersistError::Serialization {
                path: path.display().to_string(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => KnowledgeData::default(),
            Err(e) => {
                return Err(PersistError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };
        Ok(Self {
            path: Some(path),
            data,
            generation: 0,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_recipe(&self, item_code: &str) -> bool {
        self.data.recipes.contains_key(item_code)
    }

    pub fn recipe(&self, item_code: &str) -> Option<&Recipe> {
        self.data.recipes.get(item_code)
    }

    pub fn record_recipe(&mut self, recipe: Recipe) {
        self.data.recipes.insert(recipe.item_code.clone(), recipe);
        self.generation += 1;
    }

    pub fn workshop_location(&self, skill: &str) -> Option<(i32, i32)> {
        self.data.workshops.get(skill).copied()
    }

    pub fn record_workshop_location(&mut self, skill: impl Into<String>, x: i32, y: i32) {
        self.data.workshops.insert(skill.into(), (x, y));
        self.generation += 1;
    }

    pub fn monster_location(&self, code: &str) -> Option<(i32, i32)> {
        self.data.monsters.get(code).copied()
    }

    pub fn record_monster_location(&mut self, code: impl Into<String>, x: i32, y: i32) {
        self.data.monsters.insert(code.into(), (x, y));
        self.generation += 1;
    }

    pub fn resource_location(&self, code: &str) -> Option<(i32, i32)> {
        self.data.resources.get(code).copied()
    }

    pub fn record_resource_location(&mut self, code: impl Into<String>, x: i32, y: i32) {
        self.data.resources.insert(code.into(), (x, y));
        self.generation += 1;
    }

    pub fn any_monster_location(&self) -> Option<(i32, i32)> {
        self.data.monsters.values().next().copied()
    }

    /// Resource codes with a known location, in deterministic order.
    pub fn known_resources(&self) -> impl Iterator<Item = &str> {
        self.data.resources.keys().map(String::as_str)
    }

    /// Knowledge-derived state keys overlaid onto the planner start state,
    /// so knowledge-based planning can gate actions on what is already
    /// known.
    pub fn state_overlay(&self, context: &ActionContext) -> WorldState {
        let mut state = WorldState::new();
        state.set(
            StateKey::MonsterLocationKnown.as_str(),
            !self.data.monsters.is_empty(),
        );
        state.set(
            StateKey::WorkshopLocationKnown.as_str(),
            !self.data.workshops.is_empty(),
        );
        let recipe_known = context
            .selected_item()
            .map(|item| self.has_recipe(item))
            .unwrap_or(false);
        state.set(StateKey::RecipeKnown.as_str(), recipe_known);
        state.set(
            StateKey::SelectedWeapon.as_str(),
            match context.selected_item() {
                Some(code) => StateValue::Str(code.to_string()),
                None => StateValue::Null,
            },
        );
        state
    }

    /// Write to disk. In-memory instances are a no-op.
    pub fn save(&self) -> Result<(), PersistError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_json(path, &self.data)
    }
}

// ---------------------------------------------------------------------------
// Map state
// ---------------------------------------------------------------------------

/// What occupies one explored map tile.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TileInfo {
    pub x: i32,
    pub y: i32,
    /// "monster", "resource", "workshop", "bank", …
    pub content_type: Option<String>,
    pub content_code: Option<String>,
}

/// Explored tiles keyed by `"x,y"`.
#[derive(Debug, Default)]
pub struct MapState {
    path: Option<PathBuf>,
    tiles: BTreeMap<String, TileInfo>,
}

impl MapState {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref().to_path_buf();
        let tiles = match std::fs::read_to_string(&path) {
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
            tiles,
        })
    }

    fn key(x: i32, y: i32) -> String {
        format!("{x},{y}")
    }

    pub fn record_tile(&mut self, tile: TileInfo) {
        self.tiles.insert(Self::key(tile.x, tile.y), tile);
    }

    pub fn tile(&self, x: i32, y: i32) -> Option<&TileInfo> {
        self.tiles.get(&Self::key(x, y))
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// All tiles holding the given content kind (and code, when given).
    pub fn find_content(&self, content_type: &str, code: Option<&str>) -> Vec<(i32, i32)> {
        self.tiles
            .values()
            .filter(|tile| tile.content_type.as_deref() == Some(content_type))
            .filter(|tile| code.is_none() || tile.content_code.as_deref() == code)
            .map(|tile| (tile.x, tile.y))
            .collect()
    }

    pub fn save(&self) -> Result<(), PersistError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_json(path, &self.tiles)
    }
}

// ---------------------------------------------------------------------------
// Action context
// ---------------------------------------------------------------------------

const KEY_SELECTED_ITEM: &str = "item_code";
const KEY_TARGET_X: &str = "target_x";
const KEY_TARGET_Y: &str = "target_y";
const KEY_WORKSHOP_X: &str = "workshop_x";
const KEY_WORKSHOP_Y: &str = "workshop_y";

/// Keys that survive a location reset (crafting intent is kept; stale
/// coordinates are not).
const PRESERVED_ON_LOCATION_RESET: &[&str] = &[KEY_SELECTED_ITEM, "recipe_item_code", "craft_skill"];

/// Short-lived parameter bindings flowing between plan steps: the item a
/// discovery step selected, the coordinates a lookup resolved.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ActionContext {
    values: BTreeMap<String, StateValue>,
}

impl ActionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<StateValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The item code a weapon-evaluation step selected, if any.
    pub fn selected_item(&self) -> Option<&str> {
        match self.values.get(KEY_SELECTED_ITEM) {
            Some(StateValue::Str(code)) => Some(code),
            _ => None,
        }
    }

    pub fn set_selected_item(&mut self, code: impl Into<String>) {
        self.set(KEY_SELECTED_ITEM, StateValue::Str(code.into()));
    }

    /// Movement target, when both coordinates are bound and non-null.
    pub fn target_coordinates(&self) -> Option<(i32, i32)> {
        let x = self.values.get(KEY_TARGET_X)?.as_f64()?;
        let y = self.values.get(KEY_TARGET_Y)?.as_f64()?;
        Some((x as i32, y as i32))
    }

    pub fn set_target_coordinates(&mut self, x: i32, y: i32) {
        self.set(KEY_TARGET_X, x as i64);
        self.set(KEY_TARGET_Y, y as i64);
    }

    pub fn workshop_coordinates(&self) -> Option<(i32, i32)> {
        let x = self.values.get(KEY_WORKSHOP_X)?.as_f64()?;
        let y = self.values.get(KEY_WORKSHOP_Y)?.as_f64()?;
        Some((x as i32, y as i32))
    }

    pub fn set_workshop_coordinates(&mut self, x: i32, y: i32) {
        self.set(KEY_WORKSHOP_X, x as i64);
        self.set(KEY_WORKSHOP_Y, y as i64);
    }

    /// Drop location bindings while keeping crafting intent. Used by the
    /// coordinate-failure recovery path to force fresh discovery.
    pub fn clear_location_data(&mut self) {
        self.values
            .retain(|key, _| PRESERVED_ON_LOCATION_RESET.contains(&key.as_str()));
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PersistError::Io {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    let raw = serde_json::to_string_pretty(value).map_err(|e| PersistError::Serialization {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(path, raw).map_err(|e| PersistError::Io {
        path: path.display().to_string(),
        source: e,
    })
}
