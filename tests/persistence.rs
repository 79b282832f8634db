//! Persistence round-trips for the character cache, knowledge base, and map
//! state.
//!
//! All three are small JSON documents under the state directory; missing
//! files yield empty stores, corrupted files surface serialization errors.

use wayfarer::character::{CharacterCache, CharacterSnapshot, CooldownReason, InventorySlot};
use wayfarer::error::PersistError;
use wayfarer::knowledge::{KnowledgeBase, MapState, Material, Recipe, TileInfo};

fn snapshot(name: &str, level: u32) -> CharacterSnapshot {
    CharacterSnapshot {
        name: name.into(),
        level,
        xp: 3400,
        hp_current: 75,
        hp_max: 100,
        x: 3,
        y: -1,
        skills: [("mining".to_string(), 7u32)].into(),
        equipment: [("weapon".to_string(), "copper_dagger".to_string())].into(),
        inventory: vec![InventorySlot {
            code: "copper_ore".into(),
            quantity: 9,
        }],
        inventory_capacity: 20,
        cooldown_total_seconds: 0.0,
        cooldown_expires_at: None,
        cooldown_reason: CooldownReason::Unknown,
    }
}

#[test]
fn character_cache_survives_reload() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("characters.json");

    {
        let mut cache = CharacterCache::load(&path).unwrap();
        cache.update(snapshot("ranger", 7));
        cache.update(snapshot("miner", 12));
        cache.save().unwrap();
    }

    let cache = CharacterCache::load(&path).unwrap();
    assert_eq!(cache.len(), 2);
    let ranger = cache.get("ranger").unwrap();
    assert_eq!(ranger.level, 7);
    assert_eq!(ranger.inventory[0].code, "copper_ore");
    assert_eq!(ranger.skills.get("mining"), Some(&7));
}

#[test]
fn updating_a_character_replaces_its_entry() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("characters.json");

    let mut cache = CharacterCache::load(&path).unwrap();
    cache.update(snapshot("ranger", 7));
    cache.update(snapshot("ranger", 8));
    cache.save().unwrap();

    let reloaded = CharacterCache::load(&path).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded.get("ranger").unwrap().level, 8);
}

#[test]
fn knowledge_base_survives_reload() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("knowledge.json");

    {
        let mut kb = KnowledgeBase::load(&path).unwrap();
        kb.record_recipe(Recipe {
            item_code: "iron_sword".into(),
            skill: "weaponcrafting".into(),
            level: 10,
            materials: vec![Material {
                code: "iron_bar".into(),
                quantity: 3,
            }],
        });
        kb.record_workshop_location("weaponcrafting", 2, 1);
        kb.record_monster_location("chicken", 0, 1);
        kb.record_resource_location("iron_rocks", 1, 7);
        kb.save().unwrap();
    }

    let kb = KnowledgeBase::load(&path).unwrap();
    assert!(kb.has_recipe("iron_sword"));
    assert_eq!(kb.recipe("iron_sword").unwrap().materials[0].quantity, 3);
    assert_eq!(kb.workshop_location("weaponcrafting"), Some((2, 1)));
    assert_eq!(kb.monster_location("chicken"), Some((0, 1)));
    assert_eq!(kb.resource_location("iron_rocks"), Some((1, 7)));
}

#[test]
fn map_state_survives_reload() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("map.json");

    {
        let mut map = MapState::load(&path).unwrap();
        map.record_tile(TileInfo {
            x: 0,
            y: 1,
            content_type: Some("monster".into()),
            content_code: Some("chicken".into()),
        });
        map.record_tile(TileInfo {
            x: 5,
            y: 5,
            content_type: None,
            content_code: None,
        });
        map.save().unwrap();
    }

    let map = MapState::load(&path).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map.find_content("monster", Some("chicken")), vec![(0, 1)]);
    assert!(map.tile(5, 5).is_some());
}

#[test]
fn missing_files_yield_empty_stores() {
    let dir = tempfile::TempDir::new().unwrap();
    assert!(CharacterCache::load(dir.path().join("none.json")).unwrap().is_empty());
    assert!(!KnowledgeBase::load(dir.path().join("none.json")).unwrap().has_recipe("x"));
    assert!(MapState::load(dir.path().join("none.json")).unwrap().is_empty());
}

#[test]
fn corrupted_file_surfaces_serialization_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("characters.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = CharacterCache::load(&path).unwrap_err();
    assert!(matches!(err, PersistError::Serialization { .. }));
}
