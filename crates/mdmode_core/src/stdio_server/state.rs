//! Per-document mode state, the single source of truth for the rest of the
//! backend.
//!
//! [`FileStates`] is the plain in-memory map with the bookkeeping rules
//! (lazy creation, change detection, clearing); [`StateService`] wraps it
//! with the host handle and owns the user-visible announcements so that a
//! mode transition is announced exactly once. All consumers share one
//! `Arc<Mutex<StateService>>` constructed in `Client::new`; nothing else
//! writes modes.

use crate::stdio_server::editor::Editor;
use std::collections::HashMap;
use std::time::SystemTime;

pub const EDIT_MODE_CONTEXT: &str = "mdmode.editMode";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Preview,
    Edit,
}

/// 0-based cursor position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub mode: Mode,
    /// Diagnostic only, never compared across restarts.
    pub last_mode_change: SystemTime,
    pub editor_visible: bool,
    pub last_selection: Option<Position>,
}

impl Default for FileState {
    fn default() -> Self {
        Self {
            mode: Mode::Preview,
            last_mode_change: SystemTime::now(),
            editor_visible: false,
            last_selection: None,
        }
    }
}

/// The per-URI state map. Entries are created lazily and live until the
/// document loses its last open representation.
#[derive(Debug, Default)]
pub struct FileStates(HashMap<String, FileState>);

impl FileStates {
    /// Returns the entry for `uri`, creating defaults on first access.
    pub fn state(&mut self, uri: &str) -> &FileState {
        self.0.entry(uri.to_string()).or_default()
    }

    /// Non-creating lookup for read-only consumers.
    pub fn existing(&self, uri: &str) -> Option<&FileState> {
        self.0.get(uri)
    }

    /// Updates the mode, returning `true` iff it actually changed.
    pub fn set_mode(&mut self, uri: &str, mode: Mode) -> bool {
        let entry = self.0.entry(uri.to_string()).or_default();
        if entry.mode == mode {
            return false;
        }
        entry.mode = mode;
        entry.last_mode_change = SystemTime::now();
        true
    }

    pub fn set_editor_visible(&mut self, uri: &str, visible: bool) {
        self.0.entry(uri.to_string()).or_default().editor_visible = visible;
    }

    pub fn set_last_selection(&mut self, uri: &str, position: Position) {
        self.0.entry(uri.to_string()).or_default().last_selection = Some(position);
    }

    pub fn last_selection(&self, uri: &str) -> Option<Position> {
        self.0.get(uri).and_then(|state| state.last_selection)
    }

    /// Deletes the entry entirely; a later access recreates defaults, which
    /// is what resets a closed-and-reopened file to Preview.
    pub fn clear(&mut self, uri: &str) {
        self.0.remove(uri);
    }
}

/// [`FileStates`] plus the announcement side of `set_mode`.
#[derive(Debug)]
pub struct StateService {
    editor: Editor,
    states: FileStates,
}

impl StateService {
    pub fn new(editor: Editor) -> Self {
        Self {
            editor,
            states: FileStates::default(),
        }
    }

    pub fn get_state(&mut self, uri: &str) -> FileState {
        self.states.state(uri).clone()
    }

    pub fn get_existing_state(&self, uri: &str) -> Option<FileState> {
        self.states.existing(uri).cloned()
    }

    /// Sets the mode, announcing the change to the user when, and only
    /// when, the mode actually flipped.
    pub fn set_mode(&mut self, uri: &str, mode: Mode) {
        if !self.states.set_mode(uri, mode) {
            return;
        }

        tracing::debug!(uri, ?mode, "Mode changed");

        let (edit, message) = match mode {
            Mode::Edit => (true, "Edit mode enabled"),
            Mode::Preview => (false, "Preview mode enabled"),
        };
        if let Err(error) = self.editor.set_context(EDIT_MODE_CONTEXT, edit) {
            tracing::warn!(?error, uri, "Failed to update edit mode context");
        }
        if let Err(error) = self.editor.status_message(message) {
            tracing::warn!(?error, uri, "Failed to show status message");
        }
    }

    pub fn set_editor_visible(&mut self, uri: &str, visible: bool) {
        self.states.set_editor_visible(uri, visible);
    }

    pub fn set_last_selection(&mut self, uri: &str, position: Position) {
        self.states.set_last_selection(uri, position);
    }

    pub fn last_selection(&self, uri: &str) -> Option<Position> {
        self.states.last_selection(uri)
    }

    pub fn clear(&mut self, uri: &str) {
        self.states.clear(uri);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URI: &str = "file:///tmp/notes.md";

    #[test]
    fn lookup_never_creates() {
        let mut states = FileStates::default();
        assert!(states.existing(URI).is_none());
        assert!(states.last_selection(URI).is_none());

        states.state(URI);
        assert!(states.existing(URI).is_some());
        assert!(states.existing("file:///other.md").is_none());
    }

    #[test]
    fn first_access_defaults_to_preview() {
        let mut states = FileStates::default();
        let state = states.state(URI);
        assert_eq!(state.mode, Mode::Preview);
        assert!(!state.editor_visible);
        assert!(state.last_selection.is_none());
    }

    #[test]
    fn creation_does_not_clobber_later_mutation() {
        let mut states = FileStates::default();
        states.set_mode(URI, Mode::Edit);
        states.state(URI);
        assert_eq!(states.existing(URI).unwrap().mode, Mode::Edit);
    }

    #[test]
    fn redundant_set_mode_reports_no_change() {
        let mut states = FileStates::default();
        assert!(states.set_mode(URI, Mode::Edit));
        assert!(!states.set_mode(URI, Mode::Edit));
        assert!(states.set_mode(URI, Mode::Preview));
        // Announcement suppression: a Preview set on a fresh entry is not a
        // change either, since entries default to Preview.
        assert!(!FileStates::default().set_mode(URI, Mode::Preview));
    }

    #[test]
    fn selection_round_trip() {
        let mut states = FileStates::default();
        let position = Position {
            line: 42,
            character: 7,
        };
        states.set_last_selection(URI, position);
        assert_eq!(states.last_selection(URI), Some(position));
    }

    #[test]
    fn clear_resets_to_defaults() {
        let mut states = FileStates::default();
        states.set_mode(URI, Mode::Edit);
        states.set_editor_visible(URI, true);
        states.set_last_selection(URI, Position { line: 1, character: 2 });

        states.clear(URI);
        assert!(states.existing(URI).is_none());

        let state = states.state(URI);
        assert_eq!(state.mode, Mode::Preview);
        assert!(!state.editor_visible);
        assert!(state.last_selection.is_none());
    }
}
