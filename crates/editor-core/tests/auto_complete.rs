use std::sync::{Arc, Mutex};

use richedit_editor_core::{
    ChangeSource, EditError, EditorCore, EditorOptions, EditorPlugin, GetContentMode, KEY_BACKSPACE,
    MemorySurface, PluginEvent, PluginEventType, Position, create_editor_core,
};
use serde_json::Value;

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

/// Core with "before" as content and the backspace-undo snapshot armed by an
/// orchestrated edit that rewrote the content to "after".
fn armed_core() -> (EditorCore, Arc<Mutex<Vec<PluginEvent>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let options = EditorOptions {
        plugins: vec![Arc::new(RecorderPlugin { seen: seen.clone() })],
        ..EditorOptions::default()
    };
    let mut core = create_editor_core(Arc::new(MemorySurface::with_content("before")), options);

    let mut callback = |core: &mut EditorCore,
                        _start: Option<Position>,
                        _end: Option<Position>,
                        _snapshot: &str|
     -> Result<Option<Value>, EditError> {
        let set_content = core.api().set_content.clone();
        set_content(core, "after", false);
        Ok(None)
    };
    let edit_with_undo = core.api().edit_with_undo.clone();
    edit_with_undo(
        &mut core,
        Some(&mut callback),
        Some(ChangeSource::Format),
        true,
    )
    .unwrap();

    assert_eq!(core.auto_complete().snapshot.as_deref(), Some("before"));
    (core, seen)
}

fn content_of(core: &mut EditorCore) -> String {
    let get_content = core.api().get_content.clone();
    get_content(core, GetContentMode::RawHtmlOnly)
}

#[test]
fn backspace_restores_the_armed_snapshot_exclusively() {
    let (mut core, seen) = armed_core();
    seen.lock().unwrap().clear();

    let trigger_event = core.api().trigger_event.clone();
    trigger_event(&mut core, PluginEvent::key_down(KEY_BACKSPACE), false);

    assert_eq!(content_of(&mut core), "before");
    assert!(core.auto_complete().snapshot.is_none());

    // The claimed key-down never reached the rest of the chain; the restore's
    // own content-changed broadcast did.
    let seen = seen.lock().unwrap();
    assert!(
        !seen
            .iter()
            .any(|event| event.event_type == PluginEventType::KeyDown)
    );
    assert!(seen.iter().any(|event| {
        event.event_type == PluginEventType::ContentChanged
            && event.source == Some(ChangeSource::SetContent)
    }));
}

#[test]
fn any_content_change_disarms_the_snapshot() {
    let (mut core, _seen) = armed_core();

    let trigger_event = core.api().trigger_event.clone();
    trigger_event(
        &mut core,
        PluginEvent::content_changed(ChangeSource::Format, None),
        true,
    );

    assert!(core.auto_complete().snapshot.is_none());
    assert_eq!(content_of(&mut core), "after");
}

#[test]
fn mouse_down_disarms_the_snapshot() {
    let (mut core, _seen) = armed_core();

    let trigger_event = core.api().trigger_event.clone();
    trigger_event(&mut core, PluginEvent::new(PluginEventType::MouseDown), false);

    assert!(core.auto_complete().snapshot.is_none());
}

#[test]
fn unrelated_key_down_disarms_without_restoring() {
    let (mut core, _seen) = armed_core();

    let trigger_event = core.api().trigger_event.clone();
    trigger_event(&mut core, PluginEvent::key_down(65), false);

    assert!(core.auto_complete().snapshot.is_none());
    assert_eq!(content_of(&mut core), "after");
}
