use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// A location inside the editable surface: an opaque node path plus a
/// character offset within that node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub path: Vec<usize>,
    pub offset: usize,
}

impl Position {
    pub fn new(path: Vec<usize>, offset: usize) -> Self {
        Self { path, offset }
    }

    /// Returns an equivalent position with a concrete, non-empty path.
    pub fn normalize(&self) -> Self {
        let path = if self.path.is_empty() {
            vec![0]
        } else {
            self.path.clone()
        };
        Self {
            path,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: Position,
    pub end: Position,
}

impl SelectionRange {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn collapsed(at: Position) -> Self {
        Self {
            start: at.clone(),
            end: at,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Serialization mode for reading content out of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetContentMode {
    CleanHtml,
    RawHtmlOnly,
    RawHtmlWithSelection,
    PlainText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Begin,
    End,
    SelectionStart,
}

#[derive(Debug, Clone)]
pub struct InsertOption {
    pub position: InsertPosition,
    pub update_cursor: bool,
    pub replace_selection: bool,
    pub insert_on_new_line: bool,
}

impl Default for InsertOption {
    fn default() -> Self {
        Self {
            position: InsertPosition::SelectionStart,
            update_cursor: true,
            replace_selection: true,
            insert_on_new_line: false,
        }
    }
}

/// Format applied to otherwise-unstyled typed text. Unset fields fall back to
/// the surface baseline when the default format is computed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
}

/// Computed-style formatting at a position, as reported by the surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleBasedFormatState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

/// Formats that can be pending at the cursor before any text is typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendableFormatState {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub subscript: bool,
    #[serde(default)]
    pub superscript: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipboardData {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data_uri: Option<String>,
}

/// Identifier for an attached DOM listener, used for detaching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub u64);

const SELECTION_TRAILER_START: &str = "<!--selection:";
const SELECTION_TRAILER_END: &str = "-->";

/// Appends a selection trailer to serialized content so a snapshot captures
/// both content and selection in one string.
pub fn encode_content_with_selection(content: &str, selection: Option<&SelectionRange>) -> String {
    match selection.and_then(|range| serde_json::to_string(range).ok()) {
        Some(json) => format!("{content}{SELECTION_TRAILER_START}{json}{SELECTION_TRAILER_END}"),
        None => content.to_string(),
    }
}

/// Splits content from its optional selection trailer.
pub fn decode_content_with_selection(content: &str) -> (String, Option<SelectionRange>) {
    if let Some(ix) = content.rfind(SELECTION_TRAILER_START) {
        let tail = &content[ix + SELECTION_TRAILER_START.len()..];
        if let Some(end) = tail.rfind(SELECTION_TRAILER_END) {
            if tail[end + SELECTION_TRAILER_END.len()..].is_empty() {
                if let Ok(range) = serde_json::from_str::<SelectionRange>(&tail[..end]) {
                    return (content[..ix].to_string(), Some(range));
                }
            }
        }
    }
    (content.to_string(), None)
}

/// The editable surface the core drives. Implementations own the actual
/// content and selection; the core only ever reaches them through the
/// (overridable) primitive-operation table.
pub trait EditSurface: Send + Sync {
    fn get_content(&self, mode: GetContentMode) -> String;
    fn set_content(&self, content: &str);
    fn get_selection_range(&self) -> Option<SelectionRange>;
    fn select_range(&self, range: &SelectionRange) -> bool;
    fn insert_node(&self, fragment: &str, option: &InsertOption) -> bool;
    fn focus(&self);
    fn has_focus(&self) -> bool;
    fn attach_dom_event(&self, event_name: &str) -> ListenerHandle;
    fn detach_dom_event(&self, handle: ListenerHandle);
    fn calc_default_format(&self) -> DefaultFormat;
    fn get_style_based_format_state(&self, position: Option<&Position>) -> StyleBasedFormatState;
    fn create_paste_fragment(
        &self,
        clipboard: &ClipboardData,
        paste_as_text: bool,
        apply_current_format: bool,
    ) -> Option<String>;
}

#[derive(Default)]
struct MemorySurfaceState {
    content: String,
    selection: Option<SelectionRange>,
    focused: bool,
    listeners: Vec<(ListenerHandle, String)>,
}

/// In-memory [`EditSurface`] holding content as a flat markup string with a
/// single text block at path `[0]`. Used headlessly and by the test suite.
#[derive(Default)]
pub struct MemorySurface {
    state: Mutex<MemorySurfaceState>,
    next_listener: AtomicU64,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: &str) -> Self {
        let surface = Self::default();
        surface.state().content = content.to_string();
        surface
    }

    fn state(&self) -> MutexGuard<'_, MemorySurfaceState> {
        self.state.lock().expect("surface state lock")
    }

    /// Drops focus, as a host would on a blur event.
    pub fn blur(&self) {
        self.state().focused = false;
    }

    /// Names of currently attached DOM listeners.
    pub fn listener_names(&self) -> Vec<String> {
        self.state()
            .listeners
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }
}

impl EditSurface for MemorySurface {
    fn get_content(&self, mode: GetContentMode) -> String {
        let state = self.state();
        match mode {
            GetContentMode::CleanHtml | GetContentMode::RawHtmlOnly => state.content.clone(),
            GetContentMode::RawHtmlWithSelection => {
                encode_content_with_selection(&state.content, state.selection.as_ref())
            }
            GetContentMode::PlainText => strip_tags(&state.content),
        }
    }

    fn set_content(&self, content: &str) {
        let (content, selection) = decode_content_with_selection(content);
        let mut state = self.state();
        state.content = content;
        state.selection = selection;
    }

    fn get_selection_range(&self) -> Option<SelectionRange> {
        self.state().selection.clone()
    }

    fn select_range(&self, range: &SelectionRange) -> bool {
        let mut state = self.state();
        let len = state.content.len();
        let mut range = range.clone();
        range.start.offset = clamp_to_char_boundary(&state.content, range.start.offset.min(len));
        range.end.offset = clamp_to_char_boundary(&state.content, range.end.offset.min(len));
        state.selection = Some(range);
        true
    }

    fn insert_node(&self, fragment: &str, option: &InsertOption) -> bool {
        let mut state = self.state();
        let at = match option.position {
            InsertPosition::Begin => 0,
            InsertPosition::End => state.content.len(),
            InsertPosition::SelectionStart => {
                let (start, end) = match &state.selection {
                    Some(range) => (
                        range.start.offset.min(range.end.offset),
                        range.start.offset.max(range.end.offset),
                    ),
                    None => (state.content.len(), state.content.len()),
                };
                let start = clamp_to_char_boundary(&state.content, start.min(state.content.len()));
                let end = clamp_to_char_boundary(&state.content, end.min(state.content.len()));
                if option.replace_selection && end > start {
                    state.content.replace_range(start..end, "");
                }
                start
            }
        };
        let mut fragment = fragment.to_string();
        if option.insert_on_new_line && at > 0 {
            fragment.insert(0, '\n');
        }
        state.content.insert_str(at, &fragment);
        if option.update_cursor {
            let caret = Position::new(vec![0], at + fragment.len());
            state.selection = Some(SelectionRange::collapsed(caret));
        }
        true
    }

    fn focus(&self) {
        self.state().focused = true;
    }

    fn has_focus(&self) -> bool {
        self.state().focused
    }

    fn attach_dom_event(&self, event_name: &str) -> ListenerHandle {
        let handle = ListenerHandle(self.next_listener.fetch_add(1, Ordering::Relaxed) + 1);
        self.state()
            .listeners
            .push((handle, event_name.to_string()));
        handle
    }

    fn detach_dom_event(&self, handle: ListenerHandle) {
        self.state().listeners.retain(|(other, _)| *other != handle);
    }

    fn calc_default_format(&self) -> DefaultFormat {
        DefaultFormat {
            font_family: Some("sans-serif".to_string()),
            font_size: Some("12pt".to_string()),
            text_color: Some("#000000".to_string()),
            background_color: Some("#ffffff".to_string()),
            ..DefaultFormat::default()
        }
    }

    fn get_style_based_format_state(&self, _position: Option<&Position>) -> StyleBasedFormatState {
        let format = self.calc_default_format();
        StyleBasedFormatState {
            font_name: format.font_family,
            font_size: format.font_size,
            text_color: format.text_color,
            background_color: format.background_color,
        }
    }

    fn create_paste_fragment(
        &self,
        clipboard: &ClipboardData,
        paste_as_text: bool,
        _apply_current_format: bool,
    ) -> Option<String> {
        if !paste_as_text {
            if let Some(html) = &clipboard.html {
                return Some(html.clone());
            }
        }
        if clipboard.text.is_empty() {
            None
        } else {
            Some(escape_text(&clipboard.text))
        }
    }
}

fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

fn strip_tags(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_tag = false;
    for ch in content.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
