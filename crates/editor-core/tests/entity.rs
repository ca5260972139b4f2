use std::sync::{Arc, Mutex};

use richedit_editor_core::{
    EditorCore, EditorOptions, EditorPlugin, MemorySurface, PluginEvent, PluginEventType,
    create_editor_core, dispatch_dom_event, initialize_core,
};
use serde_json::json;

struct RecorderPlugin {
    seen: Arc<Mutex<Vec<PluginEvent>>>,
}

impl EditorPlugin for RecorderPlugin {
    fn name(&self) -> &'static str {
        "Recorder"
    }

    fn on_plugin_event(&self, _core: &mut EditorCore, event: &PluginEvent) {
        self.seen.lock().unwrap().push(event.clone());
    }
}

fn recorded_core() -> (EditorCore, Arc<Mutex<Vec<PluginEvent>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let options = EditorOptions {
        plugins: vec![Arc::new(RecorderPlugin { seen: seen.clone() })],
        ..EditorOptions::default()
    };
    let core = create_editor_core(Arc::new(MemorySurface::new()), options);
    (core, seen)
}

fn entity_operations(seen: &Arc<Mutex<Vec<PluginEvent>>>) -> Vec<serde_json::Value> {
    seen.lock()
        .unwrap()
        .iter()
        .filter(|event| event.event_type == PluginEventType::EntityOperation)
        .filter_map(|event| event.data.clone())
        .collect()
}

#[test]
fn content_scan_raises_new_and_removed_entity_operations() {
    let (mut core, seen) = recorded_core();

    let set_content = core.api().set_content.clone();
    set_content(
        &mut core,
        "<span data-entity-id=\"e1\"></span>",
        true,
    );

    assert_eq!(core.entity().known_entities, vec!["e1".to_string()]);
    assert_eq!(
        entity_operations(&seen),
        vec![json!({ "operation": "newEntity", "id": "e1" })]
    );

    seen.lock().unwrap().clear();
    set_content(&mut core, "", true);

    assert!(core.entity().known_entities.is_empty());
    assert_eq!(
        entity_operations(&seen),
        vec![json!({ "operation": "removedEntity", "id": "e1" })]
    );
}

#[test]
fn duplicate_entity_markers_count_once() {
    let (mut core, _seen) = recorded_core();

    let set_content = core.api().set_content.clone();
    set_content(
        &mut core,
        "<span data-entity-id=\"e1\"></span><span data-entity-id=\"e1\"></span>",
        true,
    );

    assert_eq!(core.entity().known_entities, vec!["e1".to_string()]);
}

#[test]
fn entities_are_discovered_at_editor_ready() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let options = EditorOptions {
        plugins: vec![Arc::new(RecorderPlugin { seen: seen.clone() })],
        initial_content: Some("<span data-entity-id=\"boot\"></span>".to_string()),
        ..EditorOptions::default()
    };
    let mut core = create_editor_core(Arc::new(MemorySurface::new()), options);
    initialize_core(&mut core);

    assert_eq!(core.entity().known_entities, vec!["boot".to_string()]);
    assert_eq!(
        entity_operations(&seen),
        vec![json!({ "operation": "newEntity", "id": "boot" })]
    );
}

#[test]
fn mouse_click_on_the_same_point_raises_a_click_operation() {
    let (mut core, seen) = recorded_core();
    initialize_core(&mut core);
    seen.lock().unwrap().clear();

    dispatch_dom_event(&mut core, "mousedown", Some(json!({ "x": 10, "y": 20 })));
    assert_eq!(core.entity().clicking_point, Some((10, 20)));

    dispatch_dom_event(&mut core, "mouseup", Some(json!({ "x": 10, "y": 20 })));
    assert_eq!(core.entity().clicking_point, None);
    assert_eq!(
        entity_operations(&seen),
        vec![json!({ "operation": "click" })]
    );
}

#[test]
fn mouse_release_elsewhere_is_not_a_click() {
    let (mut core, seen) = recorded_core();
    initialize_core(&mut core);
    seen.lock().unwrap().clear();

    dispatch_dom_event(&mut core, "mousedown", Some(json!({ "x": 10, "y": 20 })));
    dispatch_dom_event(&mut core, "mouseup", Some(json!({ "x": 99, "y": 20 })));

    assert_eq!(core.entity().clicking_point, None);
    assert!(entity_operations(&seen).is_empty());
}
