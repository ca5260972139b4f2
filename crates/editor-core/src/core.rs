use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::event::{ChangeSource, PluginEvent, PluginEventType};
use crate::plugin::{
    AutoCompletePlugin, AutoCompleteState, CorePastePlugin, DarkModePlugin, DarkModeState,
    DomEventBinding, DomEventPlugin, DomEventState, EditFeature, EditPlugin, EditState,
    EditorPlugin, EntityPlugin, EntityState, LifecyclePlugin, LifecycleState, MouseUpPlugin,
    PendingFormatState, PendingFormatStatePlugin, PluginWithState, TypeAfterLinkPlugin,
    TypeAfterLinkState, TypeInContainerPlugin, UndoPlugin, UndoState,
};
use crate::surface::{
    ClipboardData, DefaultFormat, EditSurface, GetContentMode, InsertOption, ListenerHandle,
    Position, SelectionRange, StyleBasedFormatState, decode_content_with_selection,
};

const DARK_MODE_TEXT_COLOR: &str = "#ffffff";
const DARK_MODE_BACKGROUND_COLOR: &str = "#333333";

/// Failure raised by an editing callback and propagated, after re-entrancy
/// cleanup, to the orchestrator's caller.
#[derive(Debug, Clone)]
pub struct EditError {
    message: String,
}

impl EditError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Editing callback run inside an orchestrated edit. Receives the core (so it
/// may issue nested core-API calls), the normalized selection start/end, and
/// the pre-edit snapshot of the outermost wrapping call.
pub type EditCallback<'a> = &'a mut dyn FnMut(
    &mut EditorCore,
    Option<Position>,
    Option<Position>,
    &str,
) -> Result<Option<Value>, EditError>;

pub type AttachDomEventFn =
    dyn Fn(&mut EditorCore, &str, Option<PluginEventType>) -> ListenerHandle + Send + Sync;
pub type CalcDefaultFormatFn = dyn Fn(&mut EditorCore) + Send + Sync;
pub type EditWithUndoFn = dyn for<'a, 'b> Fn(
        &'a mut EditorCore,
        Option<EditCallback<'b>>,
        Option<ChangeSource>,
        bool,
    ) -> Result<Option<Value>, EditError>
    + Send
    + Sync;
pub type FocusFn = dyn Fn(&mut EditorCore) + Send + Sync;
pub type GetContentFn = dyn Fn(&mut EditorCore, GetContentMode) -> String + Send + Sync;
pub type GetSelectionRangeFn =
    dyn Fn(&mut EditorCore, bool) -> Option<SelectionRange> + Send + Sync;
pub type GetStyleBasedFormatStateFn =
    dyn Fn(&mut EditorCore, Option<&Position>) -> StyleBasedFormatState + Send + Sync;
pub type HasFocusFn = dyn Fn(&mut EditorCore) -> bool + Send + Sync;
pub type InsertNodeFn = dyn Fn(&mut EditorCore, &str, &InsertOption) -> bool + Send + Sync;
pub type CreatePasteFragmentFn =
    dyn Fn(&mut EditorCore, &ClipboardData, bool, bool) -> Option<String> + Send + Sync;
pub type SelectRangeFn = dyn Fn(&mut EditorCore, &SelectionRange) -> bool + Send + Sync;
pub type SetContentFn = dyn Fn(&mut EditorCore, &str, bool) + Send + Sync;
pub type TriggerEventFn = dyn Fn(&mut EditorCore, PluginEvent, bool) + Send + Sync;

/// The overridable primitive-operation table. Every entry is replaced
/// wholesale or not at all; the table is immutable once the core is built.
#[derive(Clone)]
pub struct CoreApi {
    pub attach_dom_event: Arc<AttachDomEventFn>,
    pub calc_default_format: Arc<CalcDefaultFormatFn>,
    pub edit_with_undo: Arc<EditWithUndoFn>,
    pub focus: Arc<FocusFn>,
    pub get_content: Arc<GetContentFn>,
    pub get_selection_range: Arc<GetSelectionRangeFn>,
    pub get_style_based_format_state: Arc<GetStyleBasedFormatStateFn>,
    pub has_focus: Arc<HasFocusFn>,
    pub insert_node: Arc<InsertNodeFn>,
    pub create_paste_fragment: Arc<CreatePasteFragmentFn>,
    pub select_range: Arc<SelectRangeFn>,
    pub set_content: Arc<SetContentFn>,
    pub trigger_event: Arc<TriggerEventFn>,
}

/// Partial mirror of [`CoreApi`]; any entry present replaces the default for
/// the lifetime of the core.
#[derive(Clone, Default)]
pub struct CoreApiOverride {
    pub attach_dom_event: Option<Arc<AttachDomEventFn>>,
    pub calc_default_format: Option<Arc<CalcDefaultFormatFn>>,
    pub edit_with_undo: Option<Arc<EditWithUndoFn>>,
    pub focus: Option<Arc<FocusFn>>,
    pub get_content: Option<Arc<GetContentFn>>,
    pub get_selection_range: Option<Arc<GetSelectionRangeFn>>,
    pub get_style_based_format_state: Option<Arc<GetStyleBasedFormatStateFn>>,
    pub has_focus: Option<Arc<HasFocusFn>>,
    pub insert_node: Option<Arc<InsertNodeFn>>,
    pub create_paste_fragment: Option<Arc<CreatePasteFragmentFn>>,
    pub select_range: Option<Arc<SelectRangeFn>>,
    pub set_content: Option<Arc<SetContentFn>>,
    pub trigger_event: Option<Arc<TriggerEventFn>>,
}

fn create_core_api(overrides: CoreApiOverride) -> CoreApi {
    CoreApi {
        attach_dom_event: overrides
            .attach_dom_event
            .unwrap_or_else(|| Arc::new(attach_dom_event)),
        calc_default_format: overrides
            .calc_default_format
            .unwrap_or_else(|| Arc::new(calc_default_format)),
        edit_with_undo: overrides
            .edit_with_undo
            .unwrap_or_else(|| Arc::new(edit_with_undo)),
        focus: overrides.focus.unwrap_or_else(|| Arc::new(focus)),
        get_content: overrides
            .get_content
            .unwrap_or_else(|| Arc::new(get_content)),
        get_selection_range: overrides
            .get_selection_range
            .unwrap_or_else(|| Arc::new(get_selection_range)),
        get_style_based_format_state: overrides
            .get_style_based_format_state
            .unwrap_or_else(|| Arc::new(get_style_based_format_state)),
        has_focus: overrides.has_focus.unwrap_or_else(|| Arc::new(has_focus)),
        insert_node: overrides
            .insert_node
            .unwrap_or_else(|| Arc::new(insert_node)),
        create_paste_fragment: overrides
            .create_paste_fragment
            .unwrap_or_else(|| Arc::new(create_paste_fragment)),
        select_range: overrides
            .select_range
            .unwrap_or_else(|| Arc::new(select_range)),
        set_content: overrides
            .set_content
            .unwrap_or_else(|| Arc::new(set_content)),
        trigger_event: overrides
            .trigger_event
            .unwrap_or_else(|| Arc::new(trigger_event)),
    }
}

/// Per-built-in plugin replacements. A replacement for a stateful slot must
/// supply that slot's initial state.
#[derive(Clone, Default)]
pub struct CorePluginOverride {
    pub type_in_container: Option<Arc<dyn EditorPlugin>>,
    pub edit: Option<Arc<dyn PluginWithState<EditState>>>,
    pub auto_complete: Option<Arc<dyn PluginWithState<AutoCompleteState>>>,
    pub type_after_link: Option<Arc<dyn PluginWithState<TypeAfterLinkState>>>,
    pub undo: Option<Arc<dyn PluginWithState<UndoState>>>,
    pub dom_event: Option<Arc<dyn PluginWithState<DomEventState>>>,
    pub pending_format_state: Option<Arc<dyn PluginWithState<PendingFormatState>>>,
    pub mouse_up: Option<Arc<dyn EditorPlugin>>,
    pub dark_mode: Option<Arc<dyn PluginWithState<DarkModeState>>>,
    pub paste: Option<Arc<dyn EditorPlugin>>,
    pub entity: Option<Arc<dyn PluginWithState<EntityState>>>,
    pub lifecycle: Option<Arc<dyn PluginWithState<LifecycleState>>>,
}

/// Construction-time configuration for [`create_editor_core`].
#[derive(Default)]
pub struct EditorOptions {
    /// User plugins, spliced into the chain between the auto-complete and
    /// type-after-link built-ins.
    pub plugins: Vec<Arc<dyn EditorPlugin>>,
    pub core_plugin_override: CorePluginOverride,
    pub core_api_override: CoreApiOverride,
    pub initial_content: Option<String>,
    pub default_format: DefaultFormat,
    pub in_dark_mode: bool,
    pub undo_snapshot_limit: Option<usize>,
    pub edit_features: Vec<EditFeature>,
}

/// Shared mutable state of one editor session: the content-root handle, the
/// primitive-operation table, the ordered plugin chain, and one state slot per
/// stateful built-in plugin. Each slot is mutated only by its owning plugin;
/// everyone else reads.
pub struct EditorCore {
    content_root: Arc<dyn EditSurface>,
    api: CoreApi,
    plugins: Vec<Arc<dyn EditorPlugin>>,
    auto_complete: AutoCompleteState,
    dark_mode: DarkModeState,
    dom_event: DomEventState,
    edit: EditState,
    entity: EntityState,
    lifecycle: LifecycleState,
    pending_format_state: PendingFormatState,
    type_after_link: TypeAfterLinkState,
    undo: UndoState,
}

impl EditorCore {
    pub fn content_root(&self) -> &Arc<dyn EditSurface> {
        &self.content_root
    }

    pub fn api(&self) -> &CoreApi {
        &self.api
    }

    pub fn plugins(&self) -> &[Arc<dyn EditorPlugin>] {
        &self.plugins
    }

    pub fn auto_complete(&self) -> &AutoCompleteState {
        &self.auto_complete
    }

    pub fn auto_complete_mut(&mut self) -> &mut AutoCompleteState {
        &mut self.auto_complete
    }

    pub fn dark_mode(&self) -> &DarkModeState {
        &self.dark_mode
    }

    pub fn dark_mode_mut(&mut self) -> &mut DarkModeState {
        &mut self.dark_mode
    }

    pub fn dom_event(&self) -> &DomEventState {
        &self.dom_event
    }

    pub fn dom_event_mut(&mut self) -> &mut DomEventState {
        &mut self.dom_event
    }

    pub fn edit(&self) -> &EditState {
        &self.edit
    }

    pub fn edit_mut(&mut self) -> &mut EditState {
        &mut self.edit
    }

    pub fn entity(&self) -> &EntityState {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut EntityState {
        &mut self.entity
    }

    pub fn lifecycle(&self) -> &LifecycleState {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut LifecycleState {
        &mut self.lifecycle
    }

    pub fn pending_format_state(&self) -> &PendingFormatState {
        &self.pending_format_state
    }

    pub fn pending_format_state_mut(&mut self) -> &mut PendingFormatState {
        &mut self.pending_format_state
    }

    pub fn type_after_link(&self) -> &TypeAfterLinkState {
        &self.type_after_link
    }

    pub fn type_after_link_mut(&mut self) -> &mut TypeAfterLinkState {
        &mut self.type_after_link
    }

    pub fn undo(&self) -> &UndoState {
        &self.undo
    }

    pub fn undo_mut(&mut self) -> &mut UndoState {
        &mut self.undo
    }
}

/// Assembles one [`EditorCore`] from a content root and configuration:
/// defaults merged with API overrides, built-in plugins merged with plugin
/// overrides, user plugins spliced in at their reserved position, and each
/// built-in's initial state pulled from the plugin itself.
pub fn create_editor_core(
    content_root: Arc<dyn EditSurface>,
    options: EditorOptions,
) -> EditorCore {
    let api = create_core_api(options.core_api_override.clone());
    let overrides = options.core_plugin_override.clone();

    let type_in_container = overrides
        .type_in_container
        .unwrap_or_else(|| Arc::new(TypeInContainerPlugin));
    let edit = overrides
        .edit
        .unwrap_or_else(|| Arc::new(EditPlugin::new(&options)));
    let auto_complete = overrides
        .auto_complete
        .unwrap_or_else(|| Arc::new(AutoCompletePlugin));
    let type_after_link = overrides
        .type_after_link
        .unwrap_or_else(|| Arc::new(TypeAfterLinkPlugin));
    let undo = overrides
        .undo
        .unwrap_or_else(|| Arc::new(UndoPlugin::new(&options)));
    let dom_event = overrides
        .dom_event
        .unwrap_or_else(|| Arc::new(DomEventPlugin));
    let pending_format_state = overrides
        .pending_format_state
        .unwrap_or_else(|| Arc::new(PendingFormatStatePlugin));
    let mouse_up = overrides
        .mouse_up
        .unwrap_or_else(|| Arc::new(MouseUpPlugin::new()));
    let dark_mode = overrides
        .dark_mode
        .unwrap_or_else(|| Arc::new(DarkModePlugin::new(&options)));
    let paste = overrides.paste.unwrap_or_else(|| Arc::new(CorePastePlugin));
    let entity = overrides.entity.unwrap_or_else(|| Arc::new(EntityPlugin));
    let lifecycle = overrides
        .lifecycle
        .unwrap_or_else(|| Arc::new(LifecyclePlugin::new(&options)));

    let auto_complete_state = auto_complete.initial_state();
    let dark_mode_state = dark_mode.initial_state();
    let dom_event_state = dom_event.initial_state();
    let edit_state = edit.initial_state();
    let entity_state = entity.initial_state();
    let lifecycle_state = lifecycle.initial_state();
    let pending_state = pending_format_state.initial_state();
    let type_after_link_state = type_after_link.initial_state();
    let undo_state = undo.initial_state();

    // Order matters: event-handling priority follows this list exactly, with
    // user plugins spliced in after auto-complete.
    let mut plugins: Vec<Arc<dyn EditorPlugin>> = vec![
        type_in_container,
        edit as Arc<dyn EditorPlugin>,
        auto_complete as Arc<dyn EditorPlugin>,
    ];
    plugins.extend(options.plugins.iter().cloned());
    plugins.extend([
        type_after_link as Arc<dyn EditorPlugin>,
        undo as Arc<dyn EditorPlugin>,
        dom_event as Arc<dyn EditorPlugin>,
        pending_format_state as Arc<dyn EditorPlugin>,
        mouse_up,
        dark_mode as Arc<dyn EditorPlugin>,
        paste,
        entity as Arc<dyn EditorPlugin>,
        lifecycle as Arc<dyn EditorPlugin>,
    ]);

    debug!(plugins = plugins.len(), "created editor core");

    EditorCore {
        content_root,
        api,
        plugins,
        auto_complete: auto_complete_state,
        dark_mode: dark_mode_state,
        dom_event: dom_event_state,
        edit: edit_state,
        entity: entity_state,
        lifecycle: lifecycle_state,
        pending_format_state: pending_state,
        type_after_link: type_after_link_state,
        undo: undo_state,
    }
}

/// Runs every plugin's `initialize` in chain order. The lifecycle plugin sits
/// last, so its `EditorReady` broadcast reaches a fully initialized chain.
pub fn initialize_core(core: &mut EditorCore) {
    let plugins = core.plugins.to_vec();
    for plugin in &plugins {
        trace!(plugin = plugin.name(), "initializing plugin");
        plugin.initialize(core);
    }
}

/// Runs every plugin's `dispose` in reverse chain order (so `BeforeDispose`
/// is broadcast before anything tears down), then detaches any remaining DOM
/// listeners.
pub fn dispose_core(core: &mut EditorCore) {
    let plugins = core.plugins.to_vec();
    for plugin in plugins.iter().rev() {
        trace!(plugin = plugin.name(), "disposing plugin");
        plugin.dispose(core);
    }
    let bindings = std::mem::take(&mut core.dom_event.listeners);
    for binding in bindings {
        core.content_root.detach_dom_event(binding.handle);
    }
    debug!("editor core disposed");
}

/// Default `edit_with_undo`: wraps an editing callback with before/after
/// snapshots, re-entrancy suppression, a content-changed broadcast, and
/// backspace-undo bookkeeping.
///
/// Nested calls contribute no snapshots of their own. On callback failure the
/// post-edit snapshot, the broadcast, and the backspace-undo write are all
/// skipped; the nesting flag is cleared on every exit path before the error
/// propagates.
pub fn edit_with_undo(
    core: &mut EditorCore,
    callback: Option<EditCallback<'_>>,
    change_source: Option<ChangeSource>,
    can_undo_by_backspace: bool,
) -> Result<Option<Value>, EditError> {
    let outer = core.undo.outer_undo_snapshot.clone();
    let is_nested = outer.is_some();
    let outer_snapshot = match outer {
        Some(snapshot) => snapshot,
        None => {
            let snapshot = take_snapshot(core);
            core.undo.outer_undo_snapshot = Some(snapshot.clone());
            snapshot
        }
    };

    let backspace_undo_snapshot = can_undo_by_backspace.then(|| outer_snapshot.clone());

    let had_callback = callback.is_some();
    let mut data = None;
    let mut callback_result = Ok(());
    if let Some(mut callback) = callback {
        let get_selection_range = core.api.get_selection_range.clone();
        let range = get_selection_range(core, true);
        let (start, end) = match &range {
            Some(range) => (Some(range.start.normalize()), Some(range.end.normalize())),
            None => (None, None),
        };
        match callback(core, start, end, &outer_snapshot) {
            Ok(value) => {
                data = value;
                if !is_nested {
                    take_snapshot(core);
                }
            }
            Err(err) => callback_result = Err(err),
        }
    }

    if !is_nested {
        core.undo.outer_undo_snapshot = None;
    }
    callback_result?;

    if had_callback {
        if let Some(source) = change_source {
            let trigger_event = core.api.trigger_event.clone();
            trigger_event(
                core,
                PluginEvent::content_changed(source, data.clone()),
                true,
            );
        }
    }

    // Written after the broadcast: a handler reacting to the content-changed
    // event may clear this slot, and must not be overwritten by it.
    if can_undo_by_backspace {
        core.auto_complete.snapshot = backspace_undo_snapshot;
    }

    Ok(data)
}

fn take_snapshot(core: &mut EditorCore) -> String {
    let get_content = core.api.get_content.clone();
    let snapshot = get_content(core, GetContentMode::RawHtmlWithSelection);
    core.undo.snapshots.add_snapshot(snapshot.clone());
    core.undo.has_new_content = false;
    snapshot
}

/// Default `trigger_event`: dispatches to the plugin chain in order. With
/// `broadcast` set, every plugin sees the event; otherwise the first plugin
/// claiming exclusive handling is the only one to receive it.
pub fn trigger_event(core: &mut EditorCore, event: PluginEvent, broadcast: bool) {
    trace!(event_type = ?event.event_type, broadcast, "dispatching plugin event");
    let plugins = core.plugins.to_vec();
    if !broadcast {
        for plugin in &plugins {
            if plugin.will_handle_event_exclusively(core, &event) {
                plugin.on_plugin_event(core, &event);
                return;
            }
        }
    }
    for plugin in &plugins {
        plugin.on_plugin_event(core, &event);
    }
}

/// Default `attach_dom_event`: registers interest with the surface and
/// records the binding so host DOM events can be relayed into plugin events.
pub fn attach_dom_event(
    core: &mut EditorCore,
    event_name: &str,
    plugin_event_type: Option<PluginEventType>,
) -> ListenerHandle {
    let handle = core.content_root.attach_dom_event(event_name);
    core.dom_event.listeners.push(DomEventBinding {
        handle,
        event_name: event_name.to_string(),
        plugin_event_type,
    });
    handle
}

/// Removes a binding created by `attach_dom_event`.
pub fn detach_dom_event(core: &mut EditorCore, handle: ListenerHandle) {
    core.dom_event.listeners.retain(|binding| binding.handle != handle);
    core.content_root.detach_dom_event(handle);
}

/// Host entry point: relays a DOM event into the plugin chain through the
/// bindings registered via `attach_dom_event`. Relayed events are dispatched
/// non-broadcast, so a plugin may claim them exclusively.
pub fn dispatch_dom_event(core: &mut EditorCore, event_name: &str, data: Option<Value>) {
    let event_type = core
        .dom_event
        .listeners
        .iter()
        .find(|binding| binding.event_name == event_name)
        .and_then(|binding| binding.plugin_event_type);
    if let Some(event_type) = event_type {
        let trigger_event = core.api.trigger_event.clone();
        let mut event = PluginEvent::new(event_type);
        event.data = data;
        trigger_event(core, event, false);
    }
}

/// Default `calc_default_format`: merges the host-requested format over the
/// surface baseline, substituting dark-mode colors when active; the result
/// lands in the lifecycle state slot.
pub fn calc_default_format(core: &mut EditorCore) {
    let baseline = core.content_root.calc_default_format();
    let mut format = core.lifecycle.requested_default_format.clone();
    if format.font_family.is_none() {
        format.font_family = baseline.font_family;
    }
    if format.font_size.is_none() {
        format.font_size = baseline.font_size;
    }
    if format.text_color.is_none() {
        format.text_color = baseline.text_color;
    }
    if format.background_color.is_none() {
        format.background_color = baseline.background_color;
    }
    if core.dark_mode.is_dark_mode {
        format.text_color = Some(DARK_MODE_TEXT_COLOR.to_string());
        format.background_color = Some(DARK_MODE_BACKGROUND_COLOR.to_string());
    }
    core.lifecycle.default_format = format;
}

/// Default `focus`: restores the cached selection before focusing when the
/// surface is not already focused.
pub fn focus(core: &mut EditorCore) {
    if !core.content_root.has_focus() {
        if let Some(range) = core.dom_event.selection_range.clone() {
            core.content_root.select_range(&range);
        }
        core.content_root.focus();
    }
}

pub fn get_content(core: &mut EditorCore, mode: GetContentMode) -> String {
    core.content_root.get_content(mode)
}

/// Default `get_selection_range`: reads the live selection when `try_cache`
/// is unset or the surface has focus (refreshing the cache), falling back to
/// the cached range otherwise.
pub fn get_selection_range(core: &mut EditorCore, try_cache: bool) -> Option<SelectionRange> {
    if !try_cache || core.content_root.has_focus() {
        if let Some(range) = core.content_root.get_selection_range() {
            core.dom_event.selection_range = Some(range.clone());
            return Some(range);
        }
    }
    if try_cache {
        return core.dom_event.selection_range.clone();
    }
    None
}

pub fn get_style_based_format_state(
    core: &mut EditorCore,
    position: Option<&Position>,
) -> StyleBasedFormatState {
    core.content_root.get_style_based_format_state(position)
}

pub fn has_focus(core: &mut EditorCore) -> bool {
    core.content_root.has_focus()
}

pub fn insert_node(core: &mut EditorCore, fragment: &str, option: &InsertOption) -> bool {
    core.content_root.insert_node(fragment, option)
}

/// Default `create_paste_fragment`: builds the fragment through the surface
/// and announces it with a broadcast `BeforePaste` event.
pub fn create_paste_fragment(
    core: &mut EditorCore,
    clipboard: &ClipboardData,
    paste_as_text: bool,
    apply_current_format: bool,
) -> Option<String> {
    let fragment =
        core.content_root
            .create_paste_fragment(clipboard, paste_as_text, apply_current_format)?;
    let trigger_event = core.api.trigger_event.clone();
    trigger_event(
        core,
        PluginEvent::with_data(
            PluginEventType::BeforePaste,
            json!({ "fragment": fragment, "pasteAsText": paste_as_text }),
        ),
        true,
    );
    Some(fragment)
}

pub fn select_range(core: &mut EditorCore, range: &SelectionRange) -> bool {
    let selected = core.content_root.select_range(range);
    if selected {
        core.dom_event.selection_range = Some(range.clone());
    }
    selected
}

/// Default `set_content`: writes through the surface (restoring any embedded
/// selection trailer) and broadcasts a content-changed event with source
/// `SetContent` when the content actually changed and the flag is set.
pub fn set_content(core: &mut EditorCore, content: &str, trigger_content_changed_event: bool) {
    let (new_content, _) = decode_content_with_selection(content);
    let changed = core.content_root.get_content(GetContentMode::RawHtmlOnly) != new_content;
    core.content_root.set_content(content);
    if changed && trigger_content_changed_event {
        let trigger_event = core.api.trigger_event.clone();
        trigger_event(
            core,
            PluginEvent::content_changed(ChangeSource::SetContent, None),
            true,
        );
    }
}
