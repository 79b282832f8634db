//! The execution manager: develop a plan, execute it step by step, learn
//! from responses, and repair or regenerate the plan when execution reveals
//! it is no longer valid.
//!
//! The loop is single-threaded cooperative. Suspension points — server
//! calls, wait steps, state refreshes — are explicit, and a stop token is
//! polled at every iteration boundary and before every suspension. The
//! current action always completes; cancelling mid-action would desync local
//! state from the server.

pub mod error;
pub mod handler;
pub mod learner;

use std::collections::{HashMap, VecDeque};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::character::{CharacterCache, CooldownRecord};
use crate::client::{ClientError, GameClient};
use crate::knowledge::{ActionContext, KnowledgeBase, MapState};
use crate::plan::{Plan, PlanStep, StepKind};
use crate::planner::{ActionCatalog, ActionClassification, CooldownAwarePlanner};
use crate::state::{Goal, StateValue, WorldState, WorldStateAdapter};

pub use error::{ExecutorError, ExecutorResult};
pub use handler::{
    ActionFactory, ActionHandler, ActionOutcome, ActionRegistry, CraftHandler, EquipHandler,
    ExecutionContext, FightHandler, FindMonstersHandler, GatherHandler, GatheringActionFactory,
    HandlerError, MoveHandler, RestHandler,
};
pub use learner::{LearnContext, LearnReport, OutcomeLearner, action_names};

// ---------------------------------------------------------------------------
// Clock & stop token
// ---------------------------------------------------------------------------

/// Time source and sleeper, injected so tests never wall-wait.
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

/// Production clock: `Utc::now` and `std::thread::sleep`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Cooperative cancellation flag, polled at iteration boundaries and before
/// suspension points.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Phase, status, config
// ---------------------------------------------------------------------------

/// Where the execution loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecPhase {
    #[default]
    Idle,
    PlanDeveloped,
    Executing,
    Waiting,
    Replanning,
    DoneOk,
    DoneFail,
}

impl std::fmt::Display for ExecPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::PlanDeveloped => "plan_developed",
            Self::Executing => "executing",
            Self::Waiting => "waiting",
            Self::Replanning => "replanning",
            Self::DoneOk => "done_ok",
            Self::DoneFail => "done_fail",
        };
        f.write_str(label)
    }
}

/// Compact snapshot summary for status reports.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSummary {
    pub level: u32,
    pub hp_current: i32,
    pub hp_max: i32,
    pub x: i32,
    pub y: i32,
}

/// Live view of the loop, shared with the control surface.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub character: String,
    pub phase: ExecPhase,
    pub goal: Option<String>,
    pub plan_length: usize,
    pub plan_position: usize,
    pub iterations: usize,
    pub replans: usize,
    pub waits_inserted: usize,
    pub actions_executed: usize,
    pub last_snapshot: Option<SnapshotSummary>,
}

/// Tunables for the execution loop.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Maximum loop iterations per goal run.
    pub max_iterations: usize,
    /// Expansion bound handed to the A* search.
    pub max_expansions: usize,
    /// FIFO capacity of the plan cache.
    pub plan_cache_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_expansions: crate::planner::DEFAULT_MAX_EXPANSIONS,
            plan_cache_capacity: 100,
        }
    }
}

/// Counters from one completed goal run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    pub iterations: usize,
    pub actions_executed: usize,
    pub waits_inserted: usize,
    pub replans: usize,
}

// ---------------------------------------------------------------------------
// Plan cache
// ---------------------------------------------------------------------------

/// FIFO-capped memo of planner results, keyed by (start state, goal,
/// catalog) fingerprints. Cleared whenever the knowledge base mutates so a
/// stale plan never survives learning.
struct PlanCache {
    capacity: usize,
    entries: HashMap<(u64, u64, u64), Plan>,
    order: VecDeque<(u64, u64, u64)>,
    knowledge_generation: u64,
}

impl PlanCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
            knowledge_generation: 0,
        }
    }

    fn sync_generation(&mut self, generation: u64) {
        if generation != self.knowledge_generation {
            self.entries.clear();
            self.order.clear();
            self.knowledge_generation = generation;
        }
    }

    fn get(&self, key: &(u64, u64, u64)) -> Option<&Plan> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: (u64, u64, u64), plan: Plan) {
        if self.capacity == 0 || self.entries.contains_key(&key) {
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, plan);
        self.order.push_back(key);
    }
}

fn goal_fingerprint(goal: &Goal) -> u64 {
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(goal).unwrap_or_default().hash(&mut hasher);
    hasher.finish()
}

fn catalog_fingerprint(catalog: &ActionCatalog) -> u64 {
    let mut hasher = DefaultHasher::new();
    for (name, spec) in catalog.iter() {
        name.hash(&mut hasher);
        spec.weight.to_bits().hash(&mut hasher);
        for key in spec.conditions.keys() {
            key.hash(&mut hasher);
        }
        for key in spec.reactions.keys() {
            key.hash(&mut hasher);
        }
    }
    hasher.finish()
}

// ---------------------------------------------------------------------------
// Execution manager
// ---------------------------------------------------------------------------

/// Drives one character toward one goal at a time.
pub struct ExecutionManager {
    character: String,
    client: Box<dyn GameClient>,
    registry: ActionRegistry,
    factories: Vec<Box<dyn ActionFactory>>,
    base_catalog: ActionCatalog,
    adapter: WorldStateAdapter,
    planner: CooldownAwarePlanner,
    clock: Box<dyn Clock>,
    stop: StopToken,
    /// Set by the control surface when a new goal supersedes the current
    /// run; the loop abandons its plan at the next iteration boundary.
    invalidate: StopToken,
    cache: CharacterCache,
    knowledge: KnowledgeBase,
    map: MapState,
    context: ActionContext,
    learner: OutcomeLearner,
    runtime_state: WorldState,
    config: ExecutionConfig,
    plan_cache: PlanCache,
    status: Arc<Mutex<StatusReport>>,
    phase: ExecPhase,
}

impl ExecutionManager {
    pub fn new(
        character: impl Into<String>,
        client: Box<dyn GameClient>,
        base_catalog: ActionCatalog,
        adapter: WorldStateAdapter,
    ) -> Self {
        let character = character.into();
        let config = ExecutionConfig::default();
        let status = Arc::new(Mutex::new(StatusReport {
            character: character.clone(),
            ..Default::default()
        }));
        Self {
            character,
            client,
            registry: ActionRegistry::new(),
            factories: Vec::new(),
            base_catalog,
            adapter,
            planner: CooldownAwarePlanner::with_max_expansions(config.max_expansions),
            clock: Box::new(SystemClock),
            stop: StopToken::new(),
            invalidate: StopToken::new(),
            cache: CharacterCache::in_memory(),
            knowledge: KnowledgeBase::in_memory(),
            map: MapState::in_memory(),
            context: ActionContext::new(),
            learner: OutcomeLearner::new(),
            runtime_state: WorldState::new(),
            plan_cache: PlanCache::new(config.plan_cache_capacity),
            config,
            status,
            phase: ExecPhase::Idle,
        }
    }

    pub fn with_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_factory(mut self, factory: Box<dyn ActionFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.planner = CooldownAwarePlanner::with_max_expansions(config.max_expansions);
        self.plan_cache = PlanCache::new(config.plan_cache_capacity);
        self.config = config;
        self
    }

    pub fn with_cache(mut self, cache: CharacterCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_map(mut self, map: MapState) -> Self {
        self.map = map;
        self
    }

    pub fn with_stop_token(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn knowledge_mut(&mut self) -> &mut KnowledgeBase {
        &mut self.knowledge
    }

    pub fn context(&self) -> &ActionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ActionContext {
        &mut self.context
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Token that abandons the current goal run (without stopping the
    /// agent) when a new goal is installed.
    pub fn invalidate_token(&self) -> StopToken {
        self.invalidate.clone()
    }

    /// Shared handle for live status reads.
    pub fn status_handle(&self) -> Arc<Mutex<StatusReport>> {
        Arc::clone(&self.status)
    }

    pub fn phase(&self) -> ExecPhase {
        self.phase
    }

    /// Reset per-session state before the first goal: stale coordinates are
    /// cleared and the runtime state reseeded from declared defaults.
    pub fn initialize_session(&mut self) {
        self.context.clear_location_data();
        let mut state = WorldState::new();
        for (key, value) in self.adapter.defaults() {
            state.set(key.clone(), value.clone());
        }
        self.runtime_state = state;
        tracing::info!(
            character = %self.character,
            defaults = self.adapter.defaults().len(),
            "session state initialized"
        );
    }

    /// Flush persisted state on shutdown. Failures are logged, never raised.
    pub fn shutdown(&mut self) {
        self.set_phase(ExecPhase::Idle);
        if let Err(e) = self.cache.save() {
            tracing::warn!(error = %e, "character cache persist failed on shutdown");
        }
        self.persist_knowledge();
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// Pull current world state: cache-first, API on force or cache miss.
    /// The client call is a suspension point.
    fn observe(&mut self, force_refresh: bool) -> ExecutorResult<WorldState> {
        if force_refresh || self.cache.get(&self.character).is_none() {
            if self.stop.is_stop_requested() {
                return Err(ExecutorError::Interrupted);
            }
            let snapshot = match self.client.get_character(&self.character) {
                Ok(snapshot) => snapshot,
                Err(ClientError::Unauthorized) => return Err(ExecutorError::AuthenticationFailed),
                Err(e) => return Err(e.into()),
            };
            if let Err(e) = snapshot.validate() {
                tracing::warn!(error = %e, "server snapshot violates invariants");
            }
            self.cache.update(snapshot);
        }

        let snapshot = self
            .cache
            .get(&self.character)
            .cloned()
            .expect("snapshot present after refresh");
        let now = self.clock.now();
        self.runtime_state
            .merge(&snapshot.to_agent_state(now).flatten());
        let overlay = self.knowledge.state_overlay(&self.context);
        self.runtime_state.merge(&overlay);

        self.with_status(|s| {
            s.last_snapshot = Some(SnapshotSummary {
                level: snapshot.level,
                hp_current: snapshot.hp_current,
                hp_max: snapshot.hp_max,
                x: snapshot.x,
                y: snapshot.y,
            });
        });
        Ok(self.runtime_state.clone())
    }

    fn current_cooldown(&self, now: DateTime<Utc>) -> CooldownRecord {
        match self.cache.get(&self.character) {
            Some(snapshot) => snapshot.cooldown(now),
            None => CooldownRecord::ready(&self.character),
        }
    }

    // -----------------------------------------------------------------------
    // Planning
    // -----------------------------------------------------------------------

    /// Build the catalog for this plan call: declarative config plus
    /// factory-generated parameterized actions.
    fn build_catalog(&self) -> ExecutorResult<ActionCatalog> {
        let mut catalog = self.base_catalog.clone();
        for factory in &self.factories {
            factory.contribute(&mut catalog, &self.knowledge, &self.context)?;
        }
        Ok(catalog)
    }

    /// One cooldown-aware planning attempt over the given catalog, memoized.
    fn try_plan(&mut self, state: &WorldState, goal: &Goal, catalog: &ActionCatalog) -> Option<Plan> {
        if catalog.is_empty() {
            return None;
        }
        let now = self.clock.now();
        let cooldown = self.current_cooldown(now);
        let planner_state = self.adapter.build_planner_state(state, goal, catalog);
        let minimal_goal = self.adapter.minimal_goal(goal);

        self.plan_cache.sync_generation(self.knowledge.generation());
        let key = (
            planner_state.fingerprint(),
            goal_fingerprint(&minimal_goal),
            catalog_fingerprint(catalog),
        );
        if let Some(plan) = self.plan_cache.get(&key) {
            tracing::debug!("plan cache hit");
            return Some(plan.clone());
        }

        match self
            .planner
            .plan(&planner_state, &minimal_goal, catalog, &cooldown, now)
        {
            Ok(actions) => {
                let plan = Plan::from_actions(actions);
                self.plan_cache.insert(key, plan.clone());
                Some(plan)
            }
            Err(e) => {
                tracing::debug!(error = %e, "planning attempt found no plan");
                None
            }
        }
    }

    /// Knowledge-based pass: no discovery calls allowed, parameter unknowns
    /// resolved from the knowledge base (via the state overlay).
    fn knowledge_based_plan(
        &mut self,
        state: &WorldState,
        goal: &Goal,
        catalog: &ActionCatalog,
    ) -> Option<Plan> {
        let execution_only = catalog.without_discovery();
        let plan = self.try_plan(state, goal, &execution_only)?;
        if plan.is_empty() {
            return None;
        }
        Some(plan)
    }

    /// Discovery-biased pass: the full catalog, discovery actions included.
    fn discovery_plan(
        &mut self,
        state: &WorldState,
        goal: &Goal,
        catalog: &ActionCatalog,
    ) -> Option<Plan> {
        self.try_plan(state, goal, catalog)
    }

    /// Phase I: observe, check the goal, and develop a complete plan.
    ///
    /// When both planning passes fail while the character is on cooldown,
    /// a lone wait step is returned so the loop can retry planning with the
    /// full catalog once the cooldown elapses.
    pub fn develop_plan(&mut self, goal: &Goal) -> ExecutorResult<Plan> {
        let state = self.observe(false)?;
        if goal.satisfied_by(&state) {
            tracing::info!(goal = %goal, "goal already achieved");
            return Ok(Plan::new());
        }

        let catalog = self.build_catalog()?;

        tracing::info!(actions = catalog.len(), "attempting knowledge-based planning");
        if let Some(plan) = self.knowledge_based_plan(&state, goal, &catalog) {
            tracing::info!(steps = plan.len(), plan = %plan, "knowledge-based plan adopted");
            return Ok(plan);
        }

        tracing::info!("knowledge-based planning failed, attempting discovery planning");
        if let Some(plan) = self.discovery_plan(&state, goal, &catalog) {
            if !plan.is_empty() {
                tracing::info!(steps = plan.len(), plan = %plan, "discovery plan adopted");
                return Ok(plan);
            }
        }

        let now = self.clock.now();
        let cooldown = self.current_cooldown(now);
        if !cooldown.is_ready(now) {
            let remaining = cooldown.remaining(now);
            if remaining > 0.0 {
                tracing::info!(
                    seconds = remaining,
                    "planning deferred until cooldown expires"
                );
                return Ok(Plan::from_steps(vec![PlanStep::wait(remaining)]));
            }
        }

        tracing::error!(goal = %goal, "both knowledge-based and discovery planning failed");
        Err(ExecutorError::PlanningFailed {
            goal: goal.summary(),
        })
    }

    /// Replan from the current position: knowledge-based first, discovery
    /// fallback. Forces a fresh observation.
    fn replan_from_current(
        &mut self,
        goal: &Goal,
        catalog: &ActionCatalog,
    ) -> ExecutorResult<Option<Plan>> {
        let state = self.observe(true)?;
        if let Some(plan) = self.knowledge_based_plan(&state, goal, catalog) {
            return Ok(Some(plan));
        }
        Ok(self.discovery_plan(&state, goal, catalog))
    }

    /// Recovery plan for coordinate failures: location knowledge is wiped
    /// from the working state so the planner is forced through a
    /// monster-discovery step before any move.
    fn recovery_plan(&mut self, goal: &Goal) -> ExecutorResult<Option<Plan>> {
        self.context.clear_location_data();
        let mut state = self.observe(false)?;
        state.set("monsters_available", StateValue::Bool(false));
        state.set("monster_present", StateValue::Bool(false));
        state.set("at_target_location", StateValue::Bool(false));

        let catalog = self.build_catalog()?;
        if let Some(plan) = self.knowledge_based_plan(&state, goal, &catalog) {
            return Ok(Some(plan));
        }
        Ok(self.discovery_plan(&state, goal, &catalog))
    }

    // -----------------------------------------------------------------------
    // Goal achievement
    // -----------------------------------------------------------------------

    /// Achieve a goal: Phase I plan development, then Phase II execution
    /// with selective replanning.
    pub fn achieve_goal(&mut self, goal: &Goal) -> ExecutorResult<ExecutionReport> {
        self.learner.reset();
        self.set_phase(ExecPhase::Idle);
        self.with_status(|s| {
            s.goal = Some(goal.summary());
            s.iterations = 0;
            s.replans = 0;
            s.waits_inserted = 0;
            s.actions_executed = 0;
        });

        tracing::info!(character = %self.character, goal = %goal, "developing plan");
        let plan = match self.develop_plan(goal) {
            Ok(plan) => plan,
            Err(e) => {
                self.set_phase(ExecPhase::DoneFail);
                return Err(e);
            }
        };
        self.set_phase(ExecPhase::PlanDeveloped);

        tracing::info!(steps = plan.len(), plan = %plan, "executing plan");
        self.execute_with_selective_replanning(plan, goal)
    }

    /// Phase II: step the plan, classify outcomes, repair or replan.
    fn execute_with_selective_replanning(
        &mut self,
        mut plan: Plan,
        goal: &Goal,
    ) -> ExecutorResult<ExecutionReport> {
        let mut catalog = self.build_catalog()?;
        let mut index = 0usize;
        let mut report = ExecutionReport::default();

        loop {
            if self.stop.is_stop_requested() {
                tracing::info!("stop requested — leaving execution loop");
                self.set_phase(ExecPhase::Idle);
                return Err(ExecutorError::Interrupted);
            }
            if self.invalidate.is_stop_requested() {
                tracing::info!("current plan invalidated — abandoning goal run");
                self.invalidate.clear();
                self.set_phase(ExecPhase::Idle);
                return Err(ExecutorError::Interrupted);
            }
            report.iterations += 1;
            if report.iterations > self.config.max_iterations {
                self.set_phase(ExecPhase::DoneFail);
                return Err(ExecutorError::IterationCapExceeded {
                    max_iterations: self.config.max_iterations,
                });
            }
            self.with_status(|s| {
                s.iterations = report.iterations;
                s.plan_length = plan.len();
                s.plan_position = index;
                s.replans = report.replans;
                s.waits_inserted = report.waits_inserted;
                s.actions_executed = report.actions_executed;
            });

            // Plan exhausted: either the goal holds, or we try one more
            // planning pass from wherever execution left us.
            if index >= plan.len() {
                let state = self.observe(true)?;
                if goal.satisfied_by(&state) {
                    self.set_phase(ExecPhase::DoneOk);
                    return Ok(report);
                }
                self.set_phase(ExecPhase::Replanning);
                catalog = self.build_catalog()?;
                match self.replan_from_current(goal, &catalog)? {
                    Some(next) if !next.is_empty() => {
                        tracing::info!(plan = %next, "plan exhausted — continuing with fresh plan");
                        report.replans += 1;
                        plan = next;
                        index = 0;
                        continue;
                    }
                    _ => {
                        self.set_phase(ExecPhase::DoneFail);
                        return Err(ExecutorError::GoalNotAchieved {
                            iterations: report.iterations,
                        });
                    }
                }
            }

            // (a) Cooldown check against cached state; insert a wait step
            // unless one is already next.
            let state = self.observe(false)?;
            let now = self.clock.now();
            let cooldown = self.current_cooldown(now);
            if !cooldown.is_ready(now) {
                let current_is_wait = plan.get(index).map(PlanStep::is_wait).unwrap_or(false);
                let remaining = cooldown.remaining(now);
                if !current_is_wait && remaining > 0.0 {
                    tracing::info!(seconds = remaining, "cooldown active — inserting wait step");
                    plan = plan.with_wait_at(index, remaining);
                    index = 0;
                    report.waits_inserted += 1;
                    self.set_phase(ExecPhase::Waiting);
                    continue;
                }
            }

            // (b) Goal check.
            if goal.satisfied_by(&state) {
                tracing::info!(goal = %goal, "goal achieved during plan execution");
                self.set_phase(ExecPhase::DoneOk);
                return Ok(report);
            }

            // (c) Dispatch the step at `index`.
            let step = plan.get(index).cloned().expect("index bounded above");

            if let StepKind::Wait { seconds } = step.kind {
                self.set_phase(ExecPhase::Waiting);
                self.wait(seconds)?;
                self.observe(true)?;
                index += 1;
                continue;
            }

            // A precondition miss means the plan went stale, not that the
            // action failed; replan from the current position.
            let preconditions_hold = catalog
                .get(&step.name)
                .map(|spec| state.satisfies(&spec.conditions))
                .unwrap_or(true);
            if !preconditions_hold {
                tracing::debug!(
                    action = %step.name,
                    "preconditions no longer hold — replanning from current position"
                );
                self.set_phase(ExecPhase::Replanning);
                catalog = self.build_catalog()?;
                match self.replan_from_current(goal, &catalog)? {
                    Some(suffix) if !suffix.is_empty() => {
                        report.replans += 1;
                        plan = plan.spliced(index, suffix);
                        continue;
                    }
                    _ => {
                        self.set_phase(ExecPhase::DoneFail);
                        return Err(ExecutorError::ReplanFailed {
                            action: step.name,
                            message: "preconditions no longer hold".into(),
                        });
                    }
                }
            }

            self.set_phase(ExecPhase::Executing);
            tracing::info!(
                action = %step.name,
                position = index + 1,
                total = plan.len(),
                "executing action"
            );
            let previous_snapshot = self.cache.get(&self.character).cloned();
            let result = {
                let mut ctx = ExecutionContext {
                    character: &self.character,
                    state: &state,
                    parameters: &step.parameters,
                    context: &mut self.context,
                    knowledge: &mut self.knowledge,
                    map: &mut self.map,
                };
                self.registry.execute(&step.name, &*self.client, &mut ctx)
            };

            match result {
                Ok(outcome) if outcome.success => {
                    report.actions_executed += 1;
                    if let Some(snapshot) = &outcome.snapshot {
                        self.cache.update(snapshot.clone());
                    }
                    if let Some(spec) = catalog.get(&step.name) {
                        let reactions = spec.reactions.clone();
                        self.adapter
                            .apply_effects_back(&mut self.runtime_state, &reactions);
                    }
                    if !outcome.state_delta.is_empty() {
                        self.adapter
                            .apply_effects_back(&mut self.runtime_state, &outcome.state_delta);
                    }

                    // (e) Discovery actions feed the learner and may replan
                    // the remaining suffix, bounded per action name.
                    let classification = catalog
                        .get(&step.name)
                        .map(|s| s.classification)
                        .unwrap_or_default();
                    if classification == ActionClassification::Discovery {
                        let learn_report = {
                            let mut lctx = LearnContext {
                                context: &self.context,
                                knowledge: &mut self.knowledge,
                                map: &mut self.map,
                                previous: previous_snapshot.as_ref(),
                            };
                            self.learner.learn(&step.name, &outcome, &mut lctx)
                        };
                        self.persist_knowledge();
                        self.observe(true)?;
                        if self.learner.should_replan(&step.name, &learn_report) {
                            tracing::info!(
                                action = %step.name,
                                "new knowledge acquired — replanning remaining actions"
                            );
                            self.set_phase(ExecPhase::Replanning);
                            report.replans += 1;
                            catalog = self.build_catalog()?;
                            if let Some(suffix) = self.replan_from_current(goal, &catalog)? {
                                plan = plan.spliced(index + 1, suffix);
                            }
                        }
                    }

                    index += 1;

                    // (f) Cooldown-inducing families get a recheck before
                    // the next iteration.
                    let family = catalog
                        .get(&step.name)
                        .map(|s| s.family)
                        .unwrap_or_default();
                    if family.induces_cooldown() {
                        self.observe(true)?;
                        let now = self.clock.now();
                        let cooldown = self.current_cooldown(now);
                        if !cooldown.is_ready(now) {
                            let next_is_wait =
                                plan.get(index).map(PlanStep::is_wait).unwrap_or(false);
                            let remaining = cooldown.remaining(now);
                            if !next_is_wait && remaining > 0.0 && index < plan.len() {
                                tracing::info!(
                                    seconds = remaining,
                                    "cooldown after action — inserting wait step"
                                );
                                plan = plan.with_wait_at(index, remaining);
                                index = 0;
                                report.waits_inserted += 1;
                            }
                        }
                    }
                }

                Ok(outcome) => {
                    // The call succeeded but the tactic failed. Replan from
                    // the current position.
                    tracing::warn!(
                        action = %step.name,
                        message = %outcome.message,
                        "action reported failure — replanning from current position"
                    );
                    self.set_phase(ExecPhase::Replanning);
                    catalog = self.build_catalog()?;
                    match self.replan_from_current(goal, &catalog)? {
                        Some(suffix) if !suffix.is_empty() => {
                            report.replans += 1;
                            plan = plan.spliced(index, suffix);
                            continue;
                        }
                        _ => {
                            self.set_phase(ExecPhase::DoneFail);
                            return Err(ExecutorError::ReplanFailed {
                                action: step.name,
                                message: outcome.message,
                            });
                        }
                    }
                }

                Err(HandlerError::Client(ClientError::Unauthorized)) => {
                    tracing::error!(action = %step.name, "authentication failure — aborting execution");
                    self.set_phase(ExecPhase::DoneFail);
                    return Err(ExecutorError::AuthenticationFailed);
                }

                Err(HandlerError::Client(ClientError::InventoryFull)) => {
                    tracing::warn!(action = %step.name, "inventory full — surfacing to goal selection");
                    self.set_phase(ExecPhase::DoneFail);
                    return Err(ClientError::InventoryFull.into());
                }

                Err(HandlerError::Client(ClientError::CooldownActive { remaining_seconds })) => {
                    // The server knows better than the cached state.
                    let seconds = remaining_seconds.max(1.0);
                    tracing::info!(seconds, "server reports cooldown — inserting wait step");
                    plan = plan.with_wait_at(index, seconds);
                    index = 0;
                    report.waits_inserted += 1;
                    self.set_phase(ExecPhase::Waiting);
                    continue;
                }

                Err(HandlerError::CoordinateUnknown { action }) => {
                    tracing::warn!(
                        action = %action,
                        "coordinate failure — forcing monster-discovery recovery plan"
                    );
                    self.set_phase(ExecPhase::Replanning);
                    match self.recovery_plan(goal)? {
                        Some(recovery) if !recovery.is_empty() => {
                            report.replans += 1;
                            plan = recovery;
                            index = 0;
                            continue;
                        }
                        _ => {
                            self.set_phase(ExecPhase::DoneFail);
                            return Err(ExecutorError::ReplanFailed {
                                action,
                                message: "no recovery plan available".into(),
                            });
                        }
                    }
                }

                Err(e) => {
                    tracing::warn!(
                        action = %step.name,
                        error = %e,
                        "action failed — replanning from current position"
                    );
                    self.set_phase(ExecPhase::Replanning);
                    catalog = self.build_catalog()?;
                    match self.replan_from_current(goal, &catalog)? {
                        Some(suffix) if !suffix.is_empty() => {
                            report.replans += 1;
                            plan = plan.spliced(index, suffix);
                            continue;
                        }
                        _ => {
                            self.set_phase(ExecPhase::DoneFail);
                            return Err(ExecutorError::ReplanFailed {
                                action: step.name,
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Suspension helpers
    // -----------------------------------------------------------------------

    /// Sleep out a wait step. Stop requests are honored before sleeping; an
    /// in-flight wait completes like any other action.
    fn wait(&mut self, seconds: f64) -> ExecutorResult<()> {
        if self.stop.is_stop_requested() {
            return Err(ExecutorError::Interrupted);
        }
        tracing::info!(seconds, "waiting out cooldown");
        self.clock.sleep(Duration::from_secs_f64(seconds.max(0.0)));
        Ok(())
    }

    /// Persist the knowledge base and map state; failures are logged at
    /// warn and never interrupt execution.
    fn persist_knowledge(&self) {
        if let Err(e) = self.knowledge.save() {
            tracing::warn!(error = %e, "knowledge base persist failed");
        }
        if let Err(e) = self.map.save() {
            tracing::warn!(error = %e, "map state persist failed");
        }
    }

    fn set_phase(&mut self, phase: ExecPhase) {
        self.phase = phase;
        self.with_status(|s| s.phase = phase);
    }

    fn with_status(&self, f: impl FnOnce(&mut StatusReport)) {
        if let Ok(mut status) = self.status.lock() {
            f(&mut status);
        }
    }
}
