use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::core::{
    EditError, EditorCore, EditorOptions, detach_dom_event,
};
use crate::event::{
    ChangeSource, KEY_BACKSPACE, KEY_DELETE, KEY_ENTER, KEY_SPACE, KEY_Y, KEY_Z, PluginEvent,
    PluginEventType,
};
use crate::snapshots::{DEFAULT_SNAPSHOT_LIMIT, SnapshotsService};
use crate::surface::{
    ClipboardData, DefaultFormat, GetContentMode, InsertOption, ListenerHandle, PendableFormatState,
    Position, SelectionRange,
};

/// A unit of editing behavior. Plugins are shared, immutable objects; all of
/// their mutable state lives in the core's state slots, which keeps dispatch
/// re-entrant under nested events.
pub trait EditorPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn initialize(&self, _core: &mut EditorCore) {}

    fn dispose(&self, _core: &mut EditorCore) {}

    /// A plugin returning true here claims sole delivery of a non-broadcast
    /// event; broadcast events ignore the claim.
    fn will_handle_event_exclusively(&self, _core: &EditorCore, _event: &PluginEvent) -> bool {
        false
    }

    fn on_plugin_event(&self, _core: &mut EditorCore, _event: &PluginEvent) {}
}

/// A built-in plugin owning one of the core's state slots; the factory pulls
/// the slot's initial value from the plugin itself.
pub trait PluginWithState<S>: EditorPlugin {
    fn initial_state(&self) -> S;
}

// ---------------------------------------------------------------------------
// Type-in-container

/// Makes sure typing always has a target: a key press with no usable
/// selection places a collapsed selection at the end of content.
pub struct TypeInContainerPlugin;

impl EditorPlugin for TypeInContainerPlugin {
    fn name(&self) -> &'static str {
        "TypeInContainer"
    }

    fn on_plugin_event(&self, core: &mut EditorCore, event: &PluginEvent) {
        if event.event_type != PluginEventType::KeyPress {
            return;
        }
        let get_selection_range = core.api().get_selection_range.clone();
        if get_selection_range(core, true).is_some() {
            return;
        }
        let get_content = core.api().get_content.clone();
        let end = get_content(core, GetContentMode::RawHtmlOnly).len();
        let select_range = core.api().select_range.clone();
        select_range(
            core,
            &SelectionRange::collapsed(Position::new(vec![0], end)),
        );
    }
}

// ---------------------------------------------------------------------------
// Edit features

/// A keyboard-driven editing behavior: candidate key codes plus a pair of
/// check/apply handlers.
#[derive(Clone)]
pub struct EditFeature {
    pub keys: Vec<u32>,
    pub should_handle: Arc<dyn Fn(&mut EditorCore, &PluginEvent) -> bool + Send + Sync>,
    pub handle: Arc<dyn Fn(&mut EditorCore, &PluginEvent) + Send + Sync>,
}

impl EditFeature {
    pub fn new(
        keys: Vec<u32>,
        should_handle: impl Fn(&mut EditorCore, &PluginEvent) -> bool + Send + Sync + 'static,
        handle: impl Fn(&mut EditorCore, &PluginEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            keys,
            should_handle: Arc::new(should_handle),
            handle: Arc::new(handle),
        }
    }
}

#[derive(Clone, Default)]
pub struct EditState {
    pub features: HashMap<u32, Vec<EditFeature>>,
}

/// Dispatches key-down events to the registered edit features; the first
/// feature whose check accepts handles the key.
pub struct EditPlugin {
    features: Vec<EditFeature>,
}

impl EditPlugin {
    pub fn new(options: &EditorOptions) -> Self {
        Self {
            features: options.edit_features.clone(),
        }
    }
}

impl EditorPlugin for EditPlugin {
    fn name(&self) -> &'static str {
        "Edit"
    }

    fn on_plugin_event(&self, core: &mut EditorCore, event: &PluginEvent) {
        if event.event_type != PluginEventType::KeyDown {
            return;
        }
        let Some(which) = event.key() else {
            return;
        };
        let features = core.edit().features.get(&which).cloned().unwrap_or_default();
        for feature in features {
            if (feature.should_handle)(core, event) {
                (feature.handle)(core, event);
                break;
            }
        }
    }
}

impl PluginWithState<EditState> for EditPlugin {
    fn initial_state(&self) -> EditState {
        let mut features: HashMap<u32, Vec<EditFeature>> = HashMap::new();
        for feature in &self.features {
            for &key in &feature.keys {
                features.entry(key).or_default().push(feature.clone());
            }
        }
        EditState { features }
    }
}

// ---------------------------------------------------------------------------
// Auto-complete

/// State slot holding the backspace-undo snapshot: while armed, a single
/// Backspace reverts the most recent auto-complete style insertion.
#[derive(Clone, Default)]
pub struct AutoCompleteState {
    pub snapshot: Option<String>,
}

pub struct AutoCompletePlugin;

impl EditorPlugin for AutoCompletePlugin {
    fn name(&self) -> &'static str {
        "AutoComplete"
    }

    fn will_handle_event_exclusively(&self, core: &EditorCore, event: &PluginEvent) -> bool {
        event.event_type == PluginEventType::KeyDown
            && event.key() == Some(KEY_BACKSPACE)
            && core.auto_complete().snapshot.is_some()
    }

    fn on_plugin_event(&self, core: &mut EditorCore, event: &PluginEvent) {
        match event.event_type {
            PluginEventType::KeyDown if event.key() == Some(KEY_BACKSPACE) => {
                if let Some(snapshot) = core.auto_complete_mut().snapshot.take() {
                    let set_content = core.api().set_content.clone();
                    set_content(core, &snapshot, true);
                }
            }
            PluginEventType::KeyDown
            | PluginEventType::MouseDown
            | PluginEventType::ContentChanged => {
                core.auto_complete_mut().snapshot = None;
            }
            _ => {}
        }
    }
}

impl PluginWithState<AutoCompleteState> for AutoCompletePlugin {
    fn initial_state(&self) -> AutoCompleteState {
        AutoCompleteState::default()
    }
}

// ---------------------------------------------------------------------------
// Type-after-link

#[derive(Clone, Default)]
pub struct TypeAfterLinkState {
    pub link_boundary: Option<Position>,
}

/// Keeps text typed right after a link from extending the link: when the
/// caret sits at a link close tag, announces a cleared pending format.
pub struct TypeAfterLinkPlugin;

impl EditorPlugin for TypeAfterLinkPlugin {
    fn name(&self) -> &'static str {
        "TypeAfterLink"
    }

    fn on_plugin_event(&self, core: &mut EditorCore, event: &PluginEvent) {
        if event.event_type != PluginEventType::KeyPress {
            return;
        }
        let get_selection_range = core.api().get_selection_range.clone();
        let Some(range) = get_selection_range(core, true) else {
            return;
        };
        if !range.is_collapsed() {
            return;
        }
        let get_content = core.api().get_content.clone();
        let content = get_content(core, GetContentMode::RawHtmlOnly);
        let after_link = content
            .get(..range.start.offset)
            .is_some_and(|prefix| prefix.ends_with("</a>"));
        if after_link {
            core.type_after_link_mut().link_boundary = Some(range.start.clone());
            let trigger_event = core.api().trigger_event.clone();
            trigger_event(
                core,
                PluginEvent::with_data(
                    PluginEventType::PendingFormatStateChanged,
                    serde_json::to_value(PendableFormatState::default()).unwrap_or(Value::Null),
                ),
                true,
            );
        } else {
            core.type_after_link_mut().link_boundary = None;
        }
    }
}

impl PluginWithState<TypeAfterLinkState> for TypeAfterLinkPlugin {
    fn initial_state(&self) -> TypeAfterLinkState {
        TypeAfterLinkState::default()
    }
}

// ---------------------------------------------------------------------------
// Undo

pub struct UndoState {
    pub snapshots: SnapshotsService,
    /// Non-null exactly while a top-level orchestrated edit (and anything
    /// nested inside it) is running.
    pub outer_undo_snapshot: Option<String>,
    /// Content changed without a snapshot being taken yet.
    pub has_new_content: bool,
    pub is_restoring: bool,
}

/// Owns the snapshot history: takes the initial snapshot on `EditorReady`,
/// snapshots at word boundaries and before deletion bursts, and handles the
/// undo/redo key bindings.
pub struct UndoPlugin {
    snapshot_limit: usize,
}

impl UndoPlugin {
    pub fn new(options: &EditorOptions) -> Self {
        Self {
            snapshot_limit: options
                .undo_snapshot_limit
                .unwrap_or(DEFAULT_SNAPSHOT_LIMIT),
        }
    }
}

impl EditorPlugin for UndoPlugin {
    fn name(&self) -> &'static str {
        "Undo"
    }

    fn on_plugin_event(&self, core: &mut EditorCore, event: &PluginEvent) {
        match event.event_type {
            PluginEventType::EditorReady => {
                let edit_with_undo = core.api().edit_with_undo.clone();
                let _ = edit_with_undo(core, None, None, false);
            }
            PluginEventType::KeyDown => {
                let Some(which) = event.key() else {
                    return;
                };
                if event.ctrl_key() && which == KEY_Z {
                    undo(core);
                } else if event.ctrl_key() && which == KEY_Y {
                    redo(core);
                } else if (which == KEY_BACKSPACE || which == KEY_DELETE)
                    && core.undo().has_new_content
                {
                    let edit_with_undo = core.api().edit_with_undo.clone();
                    let _ = edit_with_undo(core, None, None, false);
                }
            }
            PluginEventType::KeyPress => {
                let Some(which) = event.key() else {
                    return;
                };
                if (which == KEY_SPACE || which == KEY_ENTER) && core.undo().has_new_content {
                    let edit_with_undo = core.api().edit_with_undo.clone();
                    let _ = edit_with_undo(core, None, None, false);
                }
            }
            PluginEventType::CompositionEnd => {
                if core.undo().has_new_content {
                    let edit_with_undo = core.api().edit_with_undo.clone();
                    let _ = edit_with_undo(core, None, None, false);
                }
            }
            PluginEventType::ContentChanged => {
                if !core.undo().is_restoring && event.source != Some(ChangeSource::Undo) {
                    core.undo_mut().has_new_content = true;
                }
            }
            _ => {}
        }
    }
}

impl PluginWithState<UndoState> for UndoPlugin {
    fn initial_state(&self) -> UndoState {
        UndoState {
            snapshots: SnapshotsService::new(self.snapshot_limit),
            outer_undo_snapshot: None,
            has_new_content: false,
            is_restoring: false,
        }
    }
}

pub fn can_undo(core: &EditorCore) -> bool {
    core.undo().has_new_content || core.undo().snapshots.can_move(-1)
}

pub fn can_redo(core: &EditorCore) -> bool {
    core.undo().snapshots.can_move(1)
}

/// Restores the previous history snapshot, first recording current content
/// when it changed since the last snapshot (so redo can return here).
pub fn undo(core: &mut EditorCore) {
    if core.undo().is_restoring {
        return;
    }
    if core.undo().has_new_content {
        let edit_with_undo = core.api().edit_with_undo.clone();
        let _ = edit_with_undo(core, None, None, false);
    }
    restore_snapshot(core, -1);
}

pub fn redo(core: &mut EditorCore) {
    if core.undo().is_restoring {
        return;
    }
    restore_snapshot(core, 1);
}

fn restore_snapshot(core: &mut EditorCore, delta: isize) {
    let Some(snapshot) = core.undo_mut().snapshots.move_by(delta) else {
        return;
    };
    debug!(delta, "restoring history snapshot");
    core.undo_mut().is_restoring = true;
    let set_content = core.api().set_content.clone();
    set_content(core, &snapshot, false);
    let trigger_event = core.api().trigger_event.clone();
    trigger_event(
        core,
        PluginEvent::content_changed(ChangeSource::Undo, None),
        true,
    );
    let undo_state = core.undo_mut();
    undo_state.is_restoring = false;
    undo_state.has_new_content = false;
}

// ---------------------------------------------------------------------------
// DOM events

#[derive(Debug, Clone)]
pub struct DomEventBinding {
    pub handle: ListenerHandle,
    pub event_name: String,
    pub plugin_event_type: Option<PluginEventType>,
}

#[derive(Debug, Clone, Default)]
pub struct DomEventState {
    pub is_in_ime: bool,
    /// Last known selection, served when the surface has lost focus.
    pub selection_range: Option<SelectionRange>,
    pub listeners: Vec<DomEventBinding>,
}

/// Relays browser events into the plugin chain: attaches the standard DOM
/// listener set, tracks composition state, and swallows keyboard events while
/// an IME composition is in flight.
pub struct DomEventPlugin;

const DOM_EVENT_BINDINGS: &[(&str, PluginEventType)] = &[
    ("keydown", PluginEventType::KeyDown),
    ("keypress", PluginEventType::KeyPress),
    ("keyup", PluginEventType::KeyUp),
    ("mousedown", PluginEventType::MouseDown),
    ("compositionstart", PluginEventType::CompositionStart),
    ("compositionend", PluginEventType::CompositionEnd),
    ("scroll", PluginEventType::Scroll),
];

impl EditorPlugin for DomEventPlugin {
    fn name(&self) -> &'static str {
        "DOMEvent"
    }

    fn initialize(&self, core: &mut EditorCore) {
        let attach_dom_event = core.api().attach_dom_event.clone();
        for (event_name, event_type) in DOM_EVENT_BINDINGS {
            attach_dom_event(core, event_name, Some(*event_type));
        }
    }

    fn dispose(&self, core: &mut EditorCore) {
        let bindings = std::mem::take(&mut core.dom_event_mut().listeners);
        for binding in &bindings {
            core.content_root().detach_dom_event(binding.handle);
        }
    }

    fn will_handle_event_exclusively(&self, core: &EditorCore, event: &PluginEvent) -> bool {
        core.dom_event().is_in_ime
            && matches!(
                event.event_type,
                PluginEventType::KeyDown | PluginEventType::KeyPress | PluginEventType::KeyUp
            )
    }

    fn on_plugin_event(&self, core: &mut EditorCore, event: &PluginEvent) {
        match event.event_type {
            PluginEventType::CompositionStart => core.dom_event_mut().is_in_ime = true,
            PluginEventType::CompositionEnd => core.dom_event_mut().is_in_ime = false,
            _ => {}
        }
    }
}

impl PluginWithState<DomEventState> for DomEventPlugin {
    fn initial_state(&self) -> DomEventState {
        DomEventState::default()
    }
}

// ---------------------------------------------------------------------------
// Pending format state

#[derive(Debug, Clone, Default)]
pub struct PendingFormatState {
    pub pendable_format_state: Option<PendableFormatState>,
    pub position: Option<Position>,
}

/// Remembers a format announced for the caret before any text is typed, and
/// forgets it as soon as the selection moves away.
pub struct PendingFormatStatePlugin;

impl EditorPlugin for PendingFormatStatePlugin {
    fn name(&self) -> &'static str {
        "PendingFormatState"
    }

    fn on_plugin_event(&self, core: &mut EditorCore, event: &PluginEvent) {
        match event.event_type {
            PluginEventType::PendingFormatStateChanged => {
                let format = event
                    .data
                    .as_ref()
                    .and_then(|data| serde_json::from_value(data.clone()).ok());
                let get_selection_range = core.api().get_selection_range.clone();
                let position = get_selection_range(core, true).map(|range| range.start);
                let state = core.pending_format_state_mut();
                state.pendable_format_state = format;
                state.position = position;
            }
            PluginEventType::KeyDown
            | PluginEventType::MouseDown
            | PluginEventType::ContentChanged => {
                let recorded = core.pending_format_state().position.clone();
                if recorded.is_some() {
                    let get_selection_range = core.api().get_selection_range.clone();
                    let current = get_selection_range(core, true).map(|range| range.start);
                    if current != recorded {
                        let state = core.pending_format_state_mut();
                        state.pendable_format_state = None;
                        state.position = None;
                    }
                }
            }
            _ => {}
        }
    }
}

impl PluginWithState<PendingFormatState> for PendingFormatStatePlugin {
    fn initial_state(&self) -> PendingFormatState {
        PendingFormatState::default()
    }
}

/// The pending format at the caret, if the selection still sits where it was
/// announced.
pub fn get_pending_format_state(core: &mut EditorCore) -> Option<PendableFormatState> {
    let recorded = core.pending_format_state().position.clone()?;
    let get_selection_range = core.api().get_selection_range.clone();
    let current = get_selection_range(core, true)?.start;
    if current == recorded {
        core.pending_format_state().pendable_format_state.clone()
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Mouse up

/// Attaches a one-shot document-level mouseup listener on mouse down, so a
/// `MouseUp` plugin event fires even when the pointer is released outside the
/// editor.
pub struct MouseUpPlugin {
    mouse_up_handle: AtomicU64,
}

impl MouseUpPlugin {
    pub fn new() -> Self {
        Self {
            mouse_up_handle: AtomicU64::new(0),
        }
    }
}

impl Default for MouseUpPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorPlugin for MouseUpPlugin {
    fn name(&self) -> &'static str {
        "MouseUp"
    }

    fn on_plugin_event(&self, core: &mut EditorCore, event: &PluginEvent) {
        match event.event_type {
            PluginEventType::MouseDown => {
                if self.mouse_up_handle.load(Ordering::Relaxed) == 0 {
                    let attach_dom_event = core.api().attach_dom_event.clone();
                    let handle =
                        attach_dom_event(core, "mouseup", Some(PluginEventType::MouseUp));
                    self.mouse_up_handle.store(handle.0, Ordering::Relaxed);
                }
            }
            PluginEventType::MouseUp => {
                let handle = self.mouse_up_handle.swap(0, Ordering::Relaxed);
                if handle != 0 {
                    detach_dom_event(core, ListenerHandle(handle));
                }
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Dark mode

#[derive(Debug, Clone, Default)]
pub struct DarkModeState {
    pub is_dark_mode: bool,
}

pub struct DarkModePlugin {
    in_dark_mode: bool,
}

impl DarkModePlugin {
    pub fn new(options: &EditorOptions) -> Self {
        Self {
            in_dark_mode: options.in_dark_mode,
        }
    }
}

impl EditorPlugin for DarkModePlugin {
    fn name(&self) -> &'static str {
        "DarkMode"
    }
}

impl PluginWithState<DarkModeState> for DarkModePlugin {
    fn initial_state(&self) -> DarkModeState {
        DarkModeState {
            is_dark_mode: self.in_dark_mode,
        }
    }
}

/// Flips the dark-mode slot, recomputes the default format, and broadcasts
/// the change.
pub fn set_dark_mode(core: &mut EditorCore, is_dark_mode: bool) {
    if core.dark_mode().is_dark_mode == is_dark_mode {
        return;
    }
    core.dark_mode_mut().is_dark_mode = is_dark_mode;
    let calc_default_format = core.api().calc_default_format.clone();
    calc_default_format(core);
    let trigger_event = core.api().trigger_event.clone();
    trigger_event(core, PluginEvent::new(PluginEventType::DarkModeChanged), true);
}

// ---------------------------------------------------------------------------
// Paste

/// Observes paste announcements; the actual paste flow runs through
/// [`paste`], which wraps fragment creation and insertion in an orchestrated
/// edit.
pub struct CorePastePlugin;

impl EditorPlugin for CorePastePlugin {
    fn name(&self) -> &'static str {
        "CorePaste"
    }

    fn on_plugin_event(&self, _core: &mut EditorCore, event: &PluginEvent) {
        if event.event_type == PluginEventType::BeforePaste {
            trace!("paste fragment prepared");
        }
    }
}

/// Pastes clipboard content as an orchestrated edit: creates a fragment
/// through the API table, inserts it at the selection, and reports the
/// clipboard payload as the content-changed event data.
pub fn paste(
    core: &mut EditorCore,
    clipboard: &ClipboardData,
    paste_as_text: bool,
    apply_current_format: bool,
) -> Result<Option<Value>, EditError> {
    let clipboard_value = serde_json::to_value(clipboard).unwrap_or(Value::Null);
    let mut callback = |core: &mut EditorCore,
                        _start: Option<Position>,
                        _end: Option<Position>,
                        _snapshot: &str|
     -> Result<Option<Value>, EditError> {
        let create_paste_fragment = core.api().create_paste_fragment.clone();
        let Some(fragment) =
            create_paste_fragment(core, clipboard, paste_as_text, apply_current_format)
        else {
            return Ok(None);
        };
        let insert_node = core.api().insert_node.clone();
        insert_node(core, &fragment, &InsertOption::default());
        Ok(Some(clipboard_value.clone()))
    };
    let edit_with_undo = core.api().edit_with_undo.clone();
    edit_with_undo(core, Some(&mut callback), Some(ChangeSource::Paste), false)
}

// ---------------------------------------------------------------------------
// Entities

#[derive(Debug, Clone, Default)]
pub struct EntityState {
    pub known_entities: Vec<String>,
    pub clicking_point: Option<(i64, i64)>,
}

/// Tracks entity markers embedded in content and raises `EntityOperation`
/// events when entities appear or disappear.
pub struct EntityPlugin;

const ENTITY_ID_MARKER: &str = "data-entity-id=\"";

impl EditorPlugin for EntityPlugin {
    fn name(&self) -> &'static str {
        "Entity"
    }

    fn on_plugin_event(&self, core: &mut EditorCore, event: &PluginEvent) {
        match event.event_type {
            PluginEventType::EditorReady | PluginEventType::ContentChanged => {
                rescan_entities(core);
            }
            PluginEventType::MouseDown => {
                core.entity_mut().clicking_point = mouse_point(event);
            }
            PluginEventType::MouseUp => {
                let pressed = core.entity_mut().clicking_point.take();
                if pressed.is_some() && pressed == mouse_point(event) {
                    let trigger_event = core.api().trigger_event.clone();
                    trigger_event(
                        core,
                        PluginEvent::with_data(
                            PluginEventType::EntityOperation,
                            json!({ "operation": "click" }),
                        ),
                        false,
                    );
                }
            }
            _ => {}
        }
    }
}

impl PluginWithState<EntityState> for EntityPlugin {
    fn initial_state(&self) -> EntityState {
        EntityState::default()
    }
}

fn mouse_point(event: &PluginEvent) -> Option<(i64, i64)> {
    let data = event.data.as_ref()?;
    Some((data.get("x")?.as_i64()?, data.get("y")?.as_i64()?))
}

fn rescan_entities(core: &mut EditorCore) {
    let get_content = core.api().get_content.clone();
    let content = get_content(core, GetContentMode::RawHtmlOnly);
    let found = scan_entity_ids(&content);
    let known = core.entity().known_entities.clone();
    let added: Vec<String> = found
        .iter()
        .filter(|id| !known.contains(id))
        .cloned()
        .collect();
    let removed: Vec<String> = known
        .iter()
        .filter(|id| !found.contains(id))
        .cloned()
        .collect();
    if added.is_empty() && removed.is_empty() {
        return;
    }
    core.entity_mut().known_entities = found;
    let trigger_event = core.api().trigger_event.clone();
    for id in added {
        trigger_event(
            core,
            PluginEvent::with_data(
                PluginEventType::EntityOperation,
                json!({ "operation": "newEntity", "id": id }),
            ),
            false,
        );
    }
    for id in removed {
        trigger_event(
            core,
            PluginEvent::with_data(
                PluginEventType::EntityOperation,
                json!({ "operation": "removedEntity", "id": id }),
            ),
            false,
        );
    }
}

fn scan_entity_ids(content: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    let mut rest = content;
    while let Some(ix) = rest.find(ENTITY_ID_MARKER) {
        rest = &rest[ix + ENTITY_ID_MARKER.len()..];
        let Some(end) = rest.find('"') else {
            break;
        };
        let id = &rest[..end];
        if !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
        rest = &rest[end..];
    }
    ids
}

// ---------------------------------------------------------------------------
// Lifecycle

#[derive(Debug, Clone, Default)]
pub struct LifecycleState {
    pub custom_data: HashMap<String, Value>,
    /// Fully resolved default format, recomputed by `calc_default_format`.
    pub default_format: DefaultFormat,
    /// The host's partial format request, kept so recomputation (dark-mode
    /// flips) can re-merge against the surface baseline.
    pub requested_default_format: DefaultFormat,
}

impl LifecycleState {
    pub fn get_custom_data(
        &mut self,
        key: &str,
        create: impl FnOnce() -> Value,
    ) -> &mut Value {
        self.custom_data
            .entry(key.to_string())
            .or_insert_with(create)
    }
}

/// Runs editor startup and teardown: writes the initial content, computes the
/// default format, and brackets the session with `EditorReady` and
/// `BeforeDispose` broadcasts. Sits last in the chain so `EditorReady`
/// reaches a fully initialized plugin set.
pub struct LifecyclePlugin {
    initial_content: Option<String>,
    default_format: DefaultFormat,
}

impl LifecyclePlugin {
    pub fn new(options: &EditorOptions) -> Self {
        Self {
            initial_content: options.initial_content.clone(),
            default_format: options.default_format.clone(),
        }
    }
}

impl EditorPlugin for LifecyclePlugin {
    fn name(&self) -> &'static str {
        "Lifecycle"
    }

    fn initialize(&self, core: &mut EditorCore) {
        if let Some(content) = &self.initial_content {
            let set_content = core.api().set_content.clone();
            set_content(core, content, false);
        }
        let calc_default_format = core.api().calc_default_format.clone();
        calc_default_format(core);
        let trigger_event = core.api().trigger_event.clone();
        trigger_event(core, PluginEvent::new(PluginEventType::EditorReady), true);
        debug!("editor ready");
    }

    fn dispose(&self, core: &mut EditorCore) {
        let trigger_event = core.api().trigger_event.clone();
        trigger_event(core, PluginEvent::new(PluginEventType::BeforeDispose), true);
    }
}

impl PluginWithState<LifecycleState> for LifecyclePlugin {
    fn initial_state(&self) -> LifecycleState {
        LifecycleState {
            custom_data: HashMap::new(),
            default_format: self.default_format.clone(),
            requested_default_format: self.default_format.clone(),
        }
    }
}
