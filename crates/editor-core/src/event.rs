use serde_json::{Value, json};

pub const KEY_BACKSPACE: u32 = 8;
pub const KEY_ENTER: u32 = 13;
pub const KEY_SPACE: u32 = 32;
pub const KEY_DELETE: u32 = 46;
pub const KEY_Y: u32 = 89;
pub const KEY_Z: u32 = 90;

/// Closed enumeration of events flowing through the plugin chain, both DOM
/// relays and synthetic notifications raised by the core itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginEventType {
    EditorReady,
    BeforeDispose,
    KeyDown,
    KeyPress,
    KeyUp,
    CompositionStart,
    CompositionEnd,
    MouseDown,
    MouseUp,
    ContentChanged,
    BeforePaste,
    Scroll,
    EntityOperation,
    PendingFormatStateChanged,
    DarkModeChanged,
}

/// Tag describing what caused a content change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSource {
    AutoLink,
    CreateLink,
    Cut,
    Drop,
    Format,
    InsertEntity,
    Paste,
    SetContent,
    Undo,
    Custom(String),
}

/// Event object delivered to every active plugin. `data` is a free-form
/// payload owned by whoever raised the event.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginEvent {
    pub event_type: PluginEventType,
    pub source: Option<ChangeSource>,
    pub data: Option<Value>,
}

impl PluginEvent {
    pub fn new(event_type: PluginEventType) -> Self {
        Self {
            event_type,
            source: None,
            data: None,
        }
    }

    pub fn with_data(event_type: PluginEventType, data: Value) -> Self {
        Self {
            event_type,
            source: None,
            data: Some(data),
        }
    }

    pub fn content_changed(source: ChangeSource, data: Option<Value>) -> Self {
        Self {
            event_type: PluginEventType::ContentChanged,
            source: Some(source),
            data,
        }
    }

    pub fn key_down(which: u32) -> Self {
        Self::with_data(PluginEventType::KeyDown, json!({ "which": which }))
    }

    pub fn key_press(which: u32) -> Self {
        Self::with_data(PluginEventType::KeyPress, json!({ "which": which }))
    }

    /// Key code carried by a keyboard event payload.
    pub fn key(&self) -> Option<u32> {
        self.data
            .as_ref()?
            .get("which")?
            .as_u64()
            .map(|which| which as u32)
    }

    pub fn ctrl_key(&self) -> bool {
        self.data
            .as_ref()
            .and_then(|data| data.get("ctrlKey"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
