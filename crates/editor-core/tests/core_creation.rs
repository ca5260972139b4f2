use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use richedit_editor_core::{
    CoreApiOverride, CorePluginOverride, EditFeature, EditorCore, EditorOptions, EditorPlugin,
    GetContentFn, GetContentMode, KEY_DELETE, MemorySurface, PluginEvent, PluginWithState,
    SnapshotsService, UndoState, create_editor_core,
};

struct NamedPlugin(&'static str);

impl EditorPlugin for NamedPlugin {
    fn name(&self) -> &'static str {
        self.0
    }
}

#[test]
fn plugin_chain_has_the_fixed_order_with_user_plugins_spliced_in() {
    let options = EditorOptions {
        plugins: vec![Arc::new(NamedPlugin("UserA")), Arc::new(NamedPlugin("UserB"))],
        ..EditorOptions::default()
    };
    let core = create_editor_core(Arc::new(MemorySurface::new()), options);

    let names: Vec<&str> = core.plugins().iter().map(|plugin| plugin.name()).collect();
    assert_eq!(
        names,
        [
            "TypeInContainer",
            "Edit",
            "AutoComplete",
            "UserA",
            "UserB",
            "TypeAfterLink",
            "Undo",
            "DOMEvent",
            "PendingFormatState",
            "MouseUp",
            "DarkMode",
            "CorePaste",
            "Entity",
            "Lifecycle",
        ]
    );
}

#[test]
fn api_override_replaces_the_default_wholesale() {
    let options = EditorOptions {
        core_api_override: CoreApiOverride {
            get_content: Some(Arc::new(|_: &mut EditorCore, _: GetContentMode| "fixed".to_string()) as Arc<GetContentFn>),
            ..CoreApiOverride::default()
        },
        ..EditorOptions::default()
    };
    let mut core = create_editor_core(Arc::new(MemorySurface::new()), options);

    let get_content = core.api().get_content.clone();
    assert_eq!(get_content(&mut core, GetContentMode::PlainText), "fixed");

    // The orchestrator snapshots through the overridden entry.
    let edit_with_undo = core.api().edit_with_undo.clone();
    edit_with_undo(&mut core, None, None, false).unwrap();
    assert_eq!(core.undo().snapshots.current(), Some("fixed"));

    // Unspecified entries still use the defaults.
    let get_selection_range = core.api().get_selection_range.clone();
    assert_eq!(get_selection_range(&mut core, true), None);
}

struct PreloadedUndoPlugin;

impl EditorPlugin for PreloadedUndoPlugin {
    fn name(&self) -> &'static str {
        "CustomUndo"
    }
}

impl PluginWithState<UndoState> for PreloadedUndoPlugin {
    fn initial_state(&self) -> UndoState {
        UndoState {
            snapshots: SnapshotsService::new(123),
            outer_undo_snapshot: None,
            has_new_content: true,
            is_restoring: false,
        }
    }
}

#[test]
fn plugin_override_replaces_the_builtin_and_supplies_its_state() {
    let options = EditorOptions {
        core_plugin_override: CorePluginOverride {
            undo: Some(Arc::new(PreloadedUndoPlugin)),
            ..CorePluginOverride::default()
        },
        ..EditorOptions::default()
    };
    let core = create_editor_core(Arc::new(MemorySurface::new()), options);

    let names: Vec<&str> = core.plugins().iter().map(|plugin| plugin.name()).collect();
    assert!(names.contains(&"CustomUndo"));
    assert!(!names.contains(&"Undo"));
    assert!(core.undo().has_new_content);
}

#[test]
fn edit_features_are_keyed_and_dispatched_on_key_down() {
    let fired = Arc::new(AtomicBool::new(false));
    let fired_in_feature = fired.clone();
    let options = EditorOptions {
        edit_features: vec![EditFeature::new(
            vec![KEY_DELETE],
            |_core, _event| true,
            move |_core: &mut EditorCore, _event: &PluginEvent| {
                fired_in_feature.store(true, Ordering::Relaxed);
            },
        )],
        ..EditorOptions::default()
    };
    let mut core = create_editor_core(Arc::new(MemorySurface::new()), options);
    assert_eq!(core.edit().features.len(), 1);

    let trigger_event = core.api().trigger_event.clone();
    trigger_event(&mut core, PluginEvent::key_down(KEY_DELETE), false);
    assert!(fired.load(Ordering::Relaxed));

    // A key with no registered feature is ignored.
    fired.store(false, Ordering::Relaxed);
    trigger_event(&mut core, PluginEvent::key_down(65), false);
    assert!(!fired.load(Ordering::Relaxed));
}
