//! wayfarer CLI: autonomous game agent.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;

use wayfarer::character::CharacterCache;
use wayfarer::client::HttpGameClient;
use wayfarer::config;
use wayfarer::executor::{
    ActionRegistry, CraftHandler, EquipHandler, ExecutionManager, FightHandler,
    FindMonstersHandler, GatherHandler, MoveHandler, RestHandler,
};
use wayfarer::knowledge::{KnowledgeBase, MapState};
use wayfarer::paths::WayfarerPaths;
use wayfarer::planner::{ActionCatalog, estimate_duration};
use wayfarer::state::{Goal, Requirement, StateValue, WorldState, WorldStateAdapter};

#[derive(Parser)]
#[command(name = "wayfarer", version, about = "Autonomous goal-driven game agent")]
struct Cli {
    /// Config directory (overrides the XDG config path).
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// State directory for persisted caches (overrides the XDG state path).
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration files (actions, state defaults, goal templates).
    Validate,

    /// List available goal templates.
    Goals,

    /// Compute a plan for a goal without executing anything.
    Plan {
        /// Character name (uses its cached snapshot when available).
        #[arg(long)]
        character: String,

        /// Goal template name from goals.toml.
        #[arg(long)]
        goal: Option<String>,

        /// Inline goal entries, `key=value` (value may be a threshold like ">5").
        #[arg(long = "set", value_name = "KEY=VALUE")]
        sets: Vec<String>,
    },

    /// Run the agent until the goal is achieved or fails.
    Run {
        /// Character name.
        #[arg(long)]
        character: String,

        /// Goal template name from goals.toml.
        #[arg(long)]
        goal: Option<String>,

        /// Inline goal entries, `key=value`.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        sets: Vec<String>,

        /// Game API base URL.
        #[arg(long, env = "WAYFARER_API_URL", default_value = "https://api.artifactsmmo.com")]
        api_url: String,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ureq=warn")),
        )
        .init();

    let cli = Cli::parse();
    let paths = resolve_paths(&cli)?;

    match cli.command {
        Commands::Validate => validate(&paths),
        Commands::Goals => list_goals(&paths),
        Commands::Plan {
            character,
            goal,
            sets,
        } => plan_dry_run(&paths, &character, goal.as_deref(), &sets),
        Commands::Run {
            character,
            goal,
            sets,
            api_url,
        } => run_agent(&paths, &character, goal.as_deref(), &sets, &api_url),
    }
}

fn resolve_paths(cli: &Cli) -> Result<WayfarerPaths> {
    let mut paths = WayfarerPaths::resolve()?;
    if let Some(dir) = &cli.config_dir {
        paths.config_dir = dir.clone();
    }
    if let Some(dir) = &cli.state_dir {
        paths.state_dir = dir.clone();
    }
    Ok(paths)
}

fn load_config(
    paths: &WayfarerPaths,
) -> Result<(ActionCatalog, WorldStateAdapter, BTreeMap<String, Goal>)> {
    let catalog = config::load_actions(&paths.actions_file())?;
    let defaults = config::load_state_defaults(&paths.state_defaults_file())?;
    let templates = config::load_goal_templates(&paths.goals_file())?;
    Ok((catalog, WorldStateAdapter::new(defaults), templates))
}

fn validate(paths: &WayfarerPaths) -> Result<()> {
    let (catalog, adapter, templates) = load_config(paths)?;
    println!(
        "ok: {} actions, {} state defaults, {} goal templates",
        catalog.len(),
        adapter.defaults().len(),
        templates.len()
    );
    Ok(())
}

fn list_goals(paths: &WayfarerPaths) -> Result<()> {
    let templates = config::load_goal_templates(&paths.goals_file())?;
    if templates.is_empty() {
        println!("no goal templates defined in {}", paths.goals_file().display());
        return Ok(());
    }
    for (name, goal) in &templates {
        println!("{name}: {goal}");
    }
    Ok(())
}

/// Build the requested goal from a template and/or inline `key=value` pairs.
fn resolve_goal(
    templates: &BTreeMap<String, Goal>,
    template: Option<&str>,
    sets: &[String],
) -> Result<Goal> {
    let mut goal = match template {
        Some(name) => config::goal_template(templates, name)?,
        None => Goal::new(),
    };
    for entry in sets {
        let Some((key, raw)) = entry.split_once('=') else {
            return Err(miette::miette!("invalid --set entry \"{entry}\", expected KEY=VALUE"));
        };
        goal.insert(key.trim(), Requirement::parse(&parse_value(raw.trim())));
    }
    if goal.is_empty() {
        return Err(miette::miette!(
            "no goal given — use --goal <template> or --set key=value"
        ));
    }
    Ok(goal)
}

/// Parse an inline value: bool, integer, float, or string (threshold strings
/// stay strings for `Requirement::parse`).
fn parse_value(raw: &str) -> StateValue {
    match raw {
        "true" => StateValue::Bool(true),
        "false" => StateValue::Bool(false),
        "null" => StateValue::Null,
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                StateValue::Int(n)
            } else if let Ok(x) = raw.parse::<f64>() {
                StateValue::Float(x)
            } else {
                StateValue::Str(raw.to_string())
            }
        }
    }
}

fn plan_dry_run(
    paths: &WayfarerPaths,
    character: &str,
    template: Option<&str>,
    sets: &[String],
) -> Result<()> {
    let (catalog, adapter, templates) = load_config(paths)?;
    let goal = resolve_goal(&templates, template, sets)?;

    // Cache-only observation: the dry run never calls the API.
    let cache = CharacterCache::load(paths.character_cache_file())?;
    let mut start = WorldState::new();
    match cache.get(character) {
        Some(snapshot) => {
            start.merge(&snapshot.to_agent_state(chrono::Utc::now()).flatten());
        }
        None => {
            tracing::warn!(character, "no cached snapshot — planning from declared defaults only");
        }
    }

    let planner_state = adapter.build_planner_state(&start, &goal, &catalog);
    let actions = wayfarer::planner::plan(&planner_state, &goal, &catalog)?;
    let plan = wayfarer::plan::Plan::from_actions(actions);

    if plan.is_empty() {
        println!("goal already satisfied — empty plan");
        return Ok(());
    }
    println!("plan ({} steps, cost {}):", plan.len(), plan.total_cost());
    for (i, step) in plan.iter().enumerate() {
        println!("  {}. {}", i + 1, step.name);
    }
    println!(
        "estimated duration: {:.0?}",
        estimate_duration(&plan, &catalog)
    );
    Ok(())
}

fn run_agent(
    paths: &WayfarerPaths,
    character: &str,
    template: Option<&str>,
    sets: &[String],
    api_url: &str,
) -> Result<()> {
    let (catalog, adapter, templates) = load_config(paths)?;
    let goal = resolve_goal(&templates, template, sets)?;

    let token = std::env::var("WAYFARER_TOKEN")
        .map_err(|_| miette::miette!("WAYFARER_TOKEN is not set — export your API token first"))?;
    let client = HttpGameClient::new(api_url, token);

    paths.ensure_dirs()?;
    let cache = CharacterCache::load(paths.character_cache_file())?;
    let knowledge = KnowledgeBase::load(paths.knowledge_file())?;
    let map = MapState::load(paths.map_file())?;

    let mut registry = ActionRegistry::new();
    registry.register("move", Box::new(MoveHandler));
    registry.register("fight", Box::new(FightHandler));
    registry.register("attack", Box::new(FightHandler));
    registry.register("gather_resources", Box::new(GatherHandler));
    registry.register("craft_item", Box::new(CraftHandler));
    registry.register("rest", Box::new(RestHandler));
    registry.register("equip_item", Box::new(EquipHandler));
    registry.register("find_monsters", Box::new(FindMonstersHandler));
    for code in knowledge.known_resources() {
        registry.register(format!("gather_{code}"), Box::new(GatherHandler));
    }

    let mut manager = ExecutionManager::new(character, Box::new(client), catalog, adapter)
        .with_registry(registry)
        .with_cache(cache)
        .with_knowledge(knowledge)
        .with_map(map);

    manager.initialize_session();
    let outcome = manager.achieve_goal(&goal);
    manager.shutdown();

    let report = outcome?;
    println!(
        "goal achieved: {} iterations, {} actions, {} waits, {} replans",
        report.iterations, report.actions_executed, report.waits_inserted, report.replans
    );
    Ok(())
}
