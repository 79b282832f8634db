//! Declarative TOML configuration: action definitions, state defaults, and
//! goal templates.
//!
//! Actions are declared as condition/reaction tables with a weight, a
//! classification (`execution` or `discovery`), and a family. Values may be
//! literals, the wildcard sentinel `"*"`, or threshold strings (`">80"`,
//! `"!null"`); thresholds are parsed into [`Requirement`] operators at load
//! time.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::planner::{ActionCatalog, ActionClassification, ActionFamily};
use crate::state::{Goal, Requirement, StateValue};

// ---------------------------------------------------------------------------
// Raw schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ActionsFile {
    #[serde(default)]
    actions: BTreeMap<String, ActionDef>,
}

#[derive(Debug, Deserialize)]
struct ActionDef {
    #[serde(default)]
    conditions: toml::Table,
    #[serde(default)]
    reactions: toml::Table,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default)]
    classification: ActionClassification,
    #[serde(default)]
    family: ActionFamily,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct DefaultsFile {
    #[serde(default)]
    state_defaults: toml::Table,
}

#[derive(Debug, Deserialize)]
struct GoalsFile {
    #[serde(default)]
    goals: BTreeMap<String, toml::Table>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    toml::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Load the action catalog from an `actions.toml` file.
///
/// Every action must declare at least one condition and one reaction; the
/// catalog's own validation (orphan reactions, minimum weight) applies on
/// top.
pub fn load_actions(path: &Path) -> Result<ActionCatalog, ConfigError> {
    let file: ActionsFile = read_toml(path)?;
    let mut catalog = ActionCatalog::new();

    for (name, def) in &file.actions {
        if def.conditions.is_empty() {
            return Err(ConfigError::MissingConditions { name: name.clone() });
        }
        if def.reactions.is_empty() {
            return Err(ConfigError::MissingReactions { name: name.clone() });
        }

        for (key, value) in &def.conditions {
            let requirement = Requirement::parse(&StateValue::from_toml(value));
            catalog.add_condition(name, key, requirement)?;
        }
        for (key, value) in &def.reactions {
            catalog.add_reaction(name, key, StateValue::from_toml(value))?;
        }
        catalog.set_weight(name, def.weight)?;
        catalog.set_classification(name, def.classification)?;
        catalog.set_family(name, def.family)?;
    }

    tracing::debug!(actions = catalog.len(), path = %path.display(), "loaded action catalog");
    Ok(catalog)
}

/// Load declared state defaults (nested tables become record values).
pub fn load_state_defaults(path: &Path) -> Result<BTreeMap<String, StateValue>, ConfigError> {
    let file: DefaultsFile = read_toml(path)?;
    Ok(file
        .state_defaults
        .iter()
        .map(|(key, value)| (key.clone(), StateValue::from_toml(value)))
        .collect())
}

/// Load named goal templates.
pub fn load_goal_templates(path: &Path) -> Result<BTreeMap<String, Goal>, ConfigError> {
    let file: GoalsFile = read_toml(path)?;
    Ok(file
        .goals
        .iter()
        .map(|(name, table)| {
            let goal = Goal::from_values(
                table
                    .iter()
                    .map(|(key, value)| (key.clone(), StateValue::from_toml(value))),
            );
            (name.clone(), goal)
        })
        .collect())
}

/// Resolve one named goal template.
pub fn goal_template(
    templates: &BTreeMap<String, Goal>,
    name: &str,
) -> Result<Goal, ConfigError> {
    templates
        .get(name)
        .cloned()
        .ok_or_else(|| ConfigError::GoalNotFound { name: name.into() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn actions_load_with_thresholds_and_classification() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(
            &dir,
            "actions.toml",
            r#"
[actions.fight]
weight = 2.0
family = "combat"
[actions.fight.conditions]
cooldown_ready = true
hp_percentage = ">30"
[actions.fight.reactions]
character_level = 2
cooldown_ready = false

[actions.find_monsters]
classification = "discovery"
[actions.find_monsters.conditions]
cooldown_ready = true
[actions.find_monsters.reactions]
monster_location_known = true
"#,
        );

        let catalog = load_actions(&path).unwrap();
        assert_eq!(catalog.len(), 2);

        let fight = catalog.get("fight").unwrap();
        assert_eq!(fight.weight, 2.0);
        assert_eq!(fight.family, ActionFamily::Combat);
        assert_eq!(
            fight.conditions.get("hp_percentage"),
            Some(&Requirement::GreaterThan(30.0))
        );

        let find = catalog.get("find_monsters").unwrap();
        assert_eq!(find.classification, ActionClassification::Discovery);
    }

    #[test]
    fn action_without_conditions_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(
            &dir,
            "actions.toml",
            r#"
[actions.broken]
[actions.broken.reactions]
done = true
"#,
        );
        let err = load_actions(&path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingConditions { .. }));
    }

    #[test]
    fn invalid_weight_propagates_catalog_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(
            &dir,
            "actions.toml",
            r#"
[actions.cheap]
weight = 0.2
[actions.cheap.conditions]
ready = true
[actions.cheap.reactions]
done = true
"#,
        );
        let err = load_actions(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Catalog(_)));
    }

    #[test]
    fn state_defaults_keep_nested_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(
            &dir,
            "state_defaults.toml",
            r#"
[state_defaults]
character_level = 1
cooldown_ready = true

[state_defaults.character_status]
alive = true
safe = true
"#,
        );
        let defaults = load_state_defaults(&path).unwrap();
        assert_eq!(defaults.get("character_level"), Some(&StateValue::Int(1)));
        let Some(StateValue::Record(status)) = defaults.get("character_status") else {
            panic!("character_status must be a record");
        };
        assert_eq!(status.get("alive"), Some(&StateValue::Bool(true)));
    }

    #[test]
    fn goal_templates_parse_thresholds() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(
            &dir,
            "goals.toml",
            r#"
[goals.level_up]
character_level = ">5"

[goals.equip_weapon]
selected_weapon = "!null"
has_better_weapon = true
"#,
        );
        let templates = load_goal_templates(&path).unwrap();
        let level_up = goal_template(&templates, "level_up").unwrap();
        assert_eq!(level_up.get("character_level"), Some(&Requirement::GreaterThan(5.0)));

        assert!(matches!(
            goal_template(&templates, "missing"),
            Err(ConfigError::GoalNotFound { .. })
        ));
    }
}
