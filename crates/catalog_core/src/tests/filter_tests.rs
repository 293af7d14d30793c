use super::*;
use crate::test_support::species;
use shared::domain::EntityId;

fn entity(value: serde_json::Value) -> Entity {
    Entity::from_raw(serde_json::from_value(value).expect("raw")).expect("entity")
}

fn fixture() -> Vec<Entity> {
    vec![
        entity(species(4, "charmander", &["fire"], 39, 52)),
        entity(species(7, "squirtle", &["water"], 44, 48)),
        entity(species(250, "ho-oh", &["fire", "flying"], 106, 130)),
    ]
}

fn record(controller: &FilterController) -> Arc<Mutex<Vec<ActiveFilters>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    controller
        .events()
        .subscribe(FilterTopic::Changed, move |event| {
            let FilterEvent::Changed(filters) = event;
            sink.lock().unwrap().push(filters.clone());
            Ok(())
        });
    seen
}

fn ids(items: &[Entity]) -> Vec<EntityId> {
    items.iter().map(Entity::id).collect()
}

#[test]
fn fire_type_selects_only_intersecting_items() {
    let controller = FilterController::new();
    controller.toggle_type("fire");

    let filtered = controller.apply_filters(&fixture());
    assert_eq!(ids(&filtered), vec![EntityId(4), EntityId(250)]);
}

#[test]
fn no_selection_passes_everything() {
    let controller = FilterController::new();
    assert_eq!(controller.apply_filters(&fixture()).len(), 3);
    assert!(!controller.has_active_filters());
}

#[test]
fn generation_and_stat_ranges_narrow_further() {
    let controller = FilterController::new();
    controller.set_generation(Some(Generation::I));
    assert_eq!(
        ids(&controller.apply_filters(&fixture())),
        vec![EntityId(4), EntityId(7)]
    );

    controller.set_stat_range("hp", 40, 255);
    assert_eq!(
        ids(&controller.apply_filters(&fixture())),
        vec![EntityId(7)]
    );
}

#[test]
fn every_mutation_publishes_a_snapshot() {
    let controller = FilterController::new();
    let seen = record(&controller);

    assert_eq!(controller.toggle_type("Fire"), Some(true));
    controller.set_generation(Some(Generation::II));
    controller.set_stat_range("attack", 10, 90);
    assert_eq!(controller.toggle_type("fire"), Some(false));
    controller.clear_all();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    assert!(seen[0].types.contains("fire"));
    assert_eq!(seen[1].generation, Some(Generation::II));
    assert_eq!(seen[2].stat_ranges["attack"], StatRange::new(10, 90));
    assert!(seen[3].types.is_empty());
    assert_eq!(seen[4].generation, None);
    assert_eq!(seen[4].stat_ranges["attack"], StatRange::FULL);
}

#[test]
fn unknown_type_is_ignored_without_an_event() {
    let controller = FilterController::new();
    let seen = record(&controller);

    assert_eq!(controller.toggle_type("plasma"), None);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn snapshots_are_detached_from_later_mutations() {
    let controller = FilterController::new();
    controller.toggle_type("water");
    let snapshot = controller.active_filters();

    controller.toggle_type("grass");

    assert_eq!(snapshot.types.len(), 1);
    assert_eq!(controller.active_filters().types.len(), 2);
}

#[test]
fn narrowed_range_alone_counts_as_active() {
    let controller = FilterController::new();
    controller.set_stat_range("hp", 0, 255);
    assert!(!controller.has_active_filters());

    controller.set_stat_range("hp", 50, 255);
    assert!(controller.has_active_filters());
}

#[test]
fn inverted_range_collapses_min_onto_max() {
    let controller = FilterController::new();
    controller.set_stat_range("special-attack", 120, 80);
    assert_eq!(
        controller.active_filters().stat_ranges["special_attack"],
        StatRange { min: 80, max: 80 }
    );
}

#[test]
fn apply_filters_does_not_publish() {
    let controller = FilterController::new();
    controller.toggle_type("fire");
    let seen = record(&controller);

    controller.apply_filters(&fixture());
    assert!(seen.lock().unwrap().is_empty());
}
