use std::sync::Arc;

use richedit_editor_core::{
    EditorCore, EditorOptions, GetContentMode, MemorySurface, PluginEvent, SnapshotsService,
    can_redo, can_undo, create_editor_core, initialize_core, redo, undo,
};
use serde_json::json;

fn initialized_core_with(content: &str) -> EditorCore {
    let options = EditorOptions {
        initial_content: Some(content.to_string()),
        ..EditorOptions::default()
    };
    let mut core = create_editor_core(Arc::new(MemorySurface::new()), options);
    initialize_core(&mut core);
    core
}

fn content_of(core: &mut EditorCore) -> String {
    let get_content = core.api().get_content.clone();
    get_content(core, GetContentMode::RawHtmlOnly)
}

#[test]
fn add_then_move_round_trips() {
    let mut service = SnapshotsService::new(1_000);
    service.add_snapshot("one".to_string());
    service.add_snapshot("two".to_string());

    assert_eq!(service.move_by(-1).as_deref(), Some("one"));
    assert_eq!(service.move_by(1).as_deref(), Some("two"));
    assert_eq!(service.current(), Some("two"));
}

#[test]
fn empty_service_has_nothing_to_move_to() {
    let mut service = SnapshotsService::new(1_000);
    assert!(service.is_empty());
    assert_eq!(service.current(), None);
    assert!(!service.can_move(-1));
    assert!(!service.can_move(1));
    assert_eq!(service.move_by(-1), None);
    assert_eq!(service.move_by(1), None);
}

#[test]
fn adding_discards_the_redoable_tail() {
    let mut service = SnapshotsService::new(1_000);
    service.add_snapshot("a".to_string());
    service.add_snapshot("b".to_string());
    service.add_snapshot("c".to_string());

    assert_eq!(service.move_by(-1).as_deref(), Some("b"));
    service.add_snapshot("d".to_string());

    assert_eq!(service.len(), 3);
    assert!(!service.can_move(1));
    assert_eq!(service.current(), Some("d"));
    assert_eq!(service.move_by(-1).as_deref(), Some("b"));
    assert_eq!(service.move_by(-1).as_deref(), Some("a"));
}

#[test]
fn exceeding_the_byte_bound_evicts_oldest_first() {
    let mut service = SnapshotsService::new(10);
    service.add_snapshot("aaaa".to_string());
    service.add_snapshot("bbbb".to_string());
    service.add_snapshot("cccc".to_string());

    // "aaaa" fell off the head; the newest entries stay reachable.
    assert_eq!(service.len(), 2);
    assert_eq!(service.current(), Some("cccc"));
    assert_eq!(service.move_by(-1).as_deref(), Some("bbbb"));
    assert!(!service.can_move(-1));
    assert_eq!(service.move_by(1).as_deref(), Some("cccc"));
}

#[test]
fn oversized_single_snapshot_is_kept() {
    let mut service = SnapshotsService::new(4);
    service.add_snapshot("0123456789".to_string());
    assert_eq!(service.len(), 1);
    assert_eq!(service.current(), Some("0123456789"));
}

#[test]
fn undo_and_redo_restore_content() {
    let mut core = initialized_core_with("start");
    assert_eq!(core.undo().snapshots.len(), 1);

    let set_content = core.api().set_content.clone();
    set_content(&mut core, "edited", true);
    assert!(core.undo().has_new_content);
    assert!(can_undo(&core));

    undo(&mut core);
    assert_eq!(content_of(&mut core), "start");
    assert!(!core.undo().has_new_content);
    assert!(can_redo(&core));

    redo(&mut core);
    assert_eq!(content_of(&mut core), "edited");
    assert!(!can_redo(&core));
}

#[test]
fn ctrl_z_and_ctrl_y_drive_history() {
    let mut core = initialized_core_with("start");
    let set_content = core.api().set_content.clone();
    set_content(&mut core, "edited", true);

    let trigger_event = core.api().trigger_event.clone();
    trigger_event(
        &mut core,
        PluginEvent::with_data(
            richedit_editor_core::PluginEventType::KeyDown,
            json!({ "which": 90, "ctrlKey": true }),
        ),
        false,
    );
    assert_eq!(content_of(&mut core), "start");

    trigger_event(
        &mut core,
        PluginEvent::with_data(
            richedit_editor_core::PluginEventType::KeyDown,
            json!({ "which": 89, "ctrlKey": true }),
        ),
        false,
    );
    assert_eq!(content_of(&mut core), "edited");
}

#[test]
fn word_boundary_keypress_snapshots_dirty_content() {
    let mut core = initialized_core_with("start");
    let set_content = core.api().set_content.clone();
    set_content(&mut core, "start words", true);
    assert!(core.undo().has_new_content);
    assert_eq!(core.undo().snapshots.len(), 1);

    let trigger_event = core.api().trigger_event.clone();
    trigger_event(&mut core, PluginEvent::key_press(32), false);

    assert!(!core.undo().has_new_content);
    assert_eq!(core.undo().snapshots.len(), 2);
}
