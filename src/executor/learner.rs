//! Learning from action responses, and the discovery replan policy.
//!
//! Discovery actions exist for the information their responses reveal. The
//! learner routes each completed action's side-effect data into the shared
//! knowledge base and map state, then answers whether the acquired knowledge
//! materially changes the optimal plan. Replans are bounded per action name
//! to guard against thrashing.

use std::collections::BTreeMap;

use crate::character::CharacterSnapshot;
use crate::knowledge::{ActionContext, KnowledgeBase, MapState, TileInfo};

use super::handler::ActionOutcome;

/// Well-known action names the learning dispatch and replan policy key on.
pub mod action_names {
    pub const EVALUATE_WEAPON_RECIPES: &str = "evaluate_weapon_recipes";
    pub const FIND_CORRECT_WORKSHOP: &str = "find_correct_workshop";
    pub const ANALYZE_CRAFTING_CHAIN: &str = "analyze_crafting_chain";
    pub const TRANSFORM_RAW_MATERIALS: &str = "transform_raw_materials";
    pub const CRAFT_ITEM: &str = "craft_item";
    pub const FIND_MONSTERS: &str = "find_monsters";
    pub const FIND_RESOURCES: &str = "find_resources";
    pub const MOVE: &str = "move";
    pub const GATHER_RESOURCES: &str = "gather_resources";
}

/// What a learning pass concluded.
#[derive(Debug, Clone, Default)]
pub struct LearnReport {
    /// Whether the action revealed something the knowledge base did not
    /// already hold.
    pub new_knowledge: bool,
    pub detail: String,
}

/// Everything the learner may read and write.
pub struct LearnContext<'a> {
    pub context: &'a ActionContext,
    pub knowledge: &'a mut KnowledgeBase,
    pub map: &'a mut MapState,
    /// Snapshot from before the action, for inventory diffs.
    pub previous: Option<&'a CharacterSnapshot>,
}

/// Consumes discovery-action responses and bounds the replans they trigger.
#[derive(Debug, Default)]
pub struct OutcomeLearner {
    replans_by_action: BTreeMap<String, u32>,
}

impl OutcomeLearner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget per-run replan counts. Called at the start of every goal run.
    pub fn reset(&mut self) {
        self.replans_by_action.clear();
    }

    /// How many replans this action name has triggered in the current run.
    pub fn replan_count(&self, action_name: &str) -> u32 {
        self.replans_by_action
            .get(action_name)
            .copied()
            .unwrap_or(0)
    }

    /// Route an action's response into the knowledge base and map state.
    pub fn learn(
        &mut self,
        action_name: &str,
        outcome: &ActionOutcome,
        ctx: &mut LearnContext<'_>,
    ) -> LearnReport {
        match action_name {
            action_names::EVALUATE_WEAPON_RECIPES => self.learn_weapon_evaluation(ctx),
            action_names::FIND_CORRECT_WORKSHOP => self.learn_workshop_discovery(ctx),
            action_names::TRANSFORM_RAW_MATERIALS | action_names::CRAFT_ITEM => {
                self.learn_inventory_diff(action_name, outcome, ctx)
            }
            action_names::MOVE
            | action_names::GATHER_RESOURCES
            | action_names::FIND_RESOURCES
            | action_names::FIND_MONSTERS => self.learn_exploration(outcome, ctx),
            _ => LearnReport::default(),
        }
    }

    fn learn_weapon_evaluation(&self, ctx: &mut LearnContext<'_>) -> LearnReport {
        match ctx.context.selected_item() {
            Some(code) => {
                tracing::info!(item = code, "learned: weapon selected for crafting");
                LearnReport {
                    new_knowledge: true,
                    detail: format!("selected weapon {code}"),
                }
            }
            None => LearnReport::default(),
        }
    }

    fn learn_workshop_discovery(&self, ctx: &mut LearnContext<'_>) -> LearnReport {
        let Some((x, y)) = ctx.context.workshop_coordinates() else {
            return LearnReport::default();
        };
        let skill = match ctx.context.get("craft_skill") {
            Some(crate::state::StateValue::Str(skill)) => skill.clone(),
            _ => "weaponcrafting".to_string(),
        };
        let known_before = ctx.knowledge.workshop_location(&skill).is_some();
        if !known_before {
            ctx.knowledge.record_workshop_location(&skill, x, y);
            ctx.map.record_tile(TileInfo {
                x,
                y,
                content_type: Some("workshop".into()),
                content_code: Some(skill.clone()),
            });
            tracing::info!(skill = %skill, x, y, "learned: workshop location");
        }
        LearnReport {
            new_knowledge: !known_before,
            detail: format!("workshop {skill} at ({x}, {y})"),
        }
    }

    fn learn_inventory_diff(
        &self,
        action_name: &str,
        outcome: &ActionOutcome,
        ctx: &mut LearnContext<'_>,
    ) -> LearnReport {
        let (Some(before), Some(after)) = (ctx.previous, outcome.snapshot.as_ref()) else {
            return LearnReport::default();
        };
        let mut diffs = Vec::new();
        let quantities = |snapshot: &CharacterSnapshot| -> BTreeMap<String, i64> {
            snapshot
                .inventory
                .iter()
                .map(|slot| (slot.code.clone(), slot.quantity as i64))
                .collect()
        };
        let before_q = quantities(before);
        let after_q = quantities(after);
        for code in before_q.keys().chain(after_q.keys()) {
            let delta = after_q.get(code).unwrap_or(&0) - before_q.get(code).unwrap_or(&0);
            if delta != 0 && !diffs.iter().any(|(c, _)| c == code) {
                diffs.push((code.clone(), delta));
            }
        }
        if !diffs.is_empty() {
            tracing::info!(action = action_name, ?diffs, "learned: inventory changes");
        }
        LearnReport {
            new_knowledge: false,
            detail: diffs
                .iter()
                .map(|(code, delta)| format!("{code}{delta:+}"))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn learn_exploration(
        &self,
        outcome: &ActionOutcome,
        ctx: &mut LearnContext<'_>,
    ) -> LearnReport {
        let Some(snapshot) = outcome.snapshot.as_ref() else {
            return LearnReport::default();
        };
        let new_tile = ctx.map.tile(snapshot.x, snapshot.y).is_none();
        if new_tile {
            ctx.map.record_tile(TileInfo {
                x: snapshot.x,
                y: snapshot.y,
                content_type: None,
                content_code: None,
            });
            tracing::debug!(x = snapshot.x, y = snapshot.y, "learned: map tile explored");
        }
        LearnReport {
            new_knowledge: new_tile,
            detail: format!("at ({}, {})", snapshot.x, snapshot.y),
        }
    }

    /// Whether the knowledge acquired by `action_name` warrants replanning
    /// the remaining plan suffix.
    ///
    /// Policy:
    /// - `find_correct_workshop`: replan only when the workshop was not
    ///   already known.
    /// - `analyze_crafting_chain`: at most one replan per goal run.
    /// - `evaluate_weapon_recipes`: always (the weapon choice cascades into
    ///   later steps).
    /// - everything else: never.
    pub fn should_replan(&mut self, action_name: &str, report: &LearnReport) -> bool {
        match action_name {
            action_names::FIND_CORRECT_WORKSHOP => report.new_knowledge,
            action_names::ANALYZE_CRAFTING_CHAIN => {
                let count = self
                    .replans_by_action
                    .entry(action_names::ANALYZE_CRAFTING_CHAIN.to_string())
                    .or_insert(0);
                if *count >= 1 {
                    tracing::debug!("crafting-chain replan already spent for this run");
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            action_names::EVALUATE_WEAPON_RECIPES => {
                self.replans_by_action
                    .entry(action_names::EVALUATE_WEAPON_RECIPES.to_string())
                    .and_modify(|c| *c += 1)
                    .or_insert(1);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learn_ctx<'a>(
        context: &'a ActionContext,
        knowledge: &'a mut KnowledgeBase,
        map: &'a mut MapState,
    ) -> LearnContext<'a> {
        LearnContext {
            context,
            knowledge,
            map,
            previous: None,
        }
    }

    #[test]
    fn weapon_evaluation_always_replans() {
        let mut learner = OutcomeLearner::new();
        let report = LearnReport {
            new_knowledge: true,
            detail: String::new(),
        };
        assert!(learner.should_replan(action_names::EVALUATE_WEAPON_RECIPES, &report));
        assert!(learner.should_replan(action_names::EVALUATE_WEAPON_RECIPES, &report));
    }

    #[test]
    fn crafting_chain_replans_at_most_once() {
        let mut learner = OutcomeLearner::new();
        let report = LearnReport::default();
        assert!(learner.should_replan(action_names::ANALYZE_CRAFTING_CHAIN, &report));
        assert!(!learner.should_replan(action_names::ANALYZE_CRAFTING_CHAIN, &report));
        assert!(!learner.should_replan(action_names::ANALYZE_CRAFTING_CHAIN, &report));

        // A fresh run gets its one replan back.
        learner.reset();
        assert!(learner.should_replan(action_names::ANALYZE_CRAFTING_CHAIN, &report));
    }

    #[test]
    fn known_workshop_suppresses_replan() {
        let mut learner = OutcomeLearner::new();
        let mut knowledge = KnowledgeBase::in_memory();
        let mut map = MapState::in_memory();
        let mut context = ActionContext::new();
        context.set_workshop_coordinates(4, 5);

        // First discovery: new knowledge, replan warranted.
        let report = learner.learn(
            action_names::FIND_CORRECT_WORKSHOP,
            &ActionOutcome::success(""),
            &mut learn_ctx(&context, &mut knowledge, &mut map),
        );
        assert!(report.new_knowledge);
        assert!(learner.should_replan(action_names::FIND_CORRECT_WORKSHOP, &report));
        assert_eq!(knowledge.workshop_location("weaponcrafting"), Some((4, 5)));

        // Second discovery of the same workshop: nothing new, no replan.
        let report = learner.learn(
            action_names::FIND_CORRECT_WORKSHOP,
            &ActionOutcome::success(""),
            &mut learn_ctx(&context, &mut knowledge, &mut map),
        );
        assert!(!report.new_knowledge);
        assert!(!learner.should_replan(action_names::FIND_CORRECT_WORKSHOP, &report));
    }

    #[test]
    fn execution_actions_never_replan() {
        let mut learner = OutcomeLearner::new();
        let report = LearnReport {
            new_knowledge: true,
            detail: String::new(),
        };
        assert!(!learner.should_replan(action_names::MOVE, &report));
        assert!(!learner.should_replan("attack", &report));
    }

    #[test]
    fn weapon_selection_is_learned_from_context() {
        let mut learner = OutcomeLearner::new();
        let mut knowledge = KnowledgeBase::in_memory();
        let mut map = MapState::in_memory();
        let mut context = ActionContext::new();
        context.set_selected_item("iron_sword");

        let report = learner.learn(
            action_names::EVALUATE_WEAPON_RECIPES,
            &ActionOutcome::success(""),
            &mut learn_ctx(&context, &mut knowledge, &mut map),
        );
        assert!(report.new_knowledge);
        assert!(report.detail.contains("iron_sword"));
    }
}
