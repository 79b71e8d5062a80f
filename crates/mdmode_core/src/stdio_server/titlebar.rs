//! Read-side projection of the current state into UI context flags.

use crate::stdio_server::editor::{Editor, EditorError};
use crate::stdio_server::state::{Mode, StateService, EDIT_MODE_CONTEXT};
use crate::stdio_server::validation;
use crate::uri;
use parking_lot::Mutex;
use std::sync::Arc;

pub const IS_MARKDOWN_CONTEXT: &str = "mdmode.isMarkdown";

/// Keeps the `is markdown` / `edit mode` context flags in sync with the
/// focused document. Pure projection: reads existing state only, never
/// materializes an entry.
#[derive(Debug)]
pub struct TitleBarController {
    editor: Editor,
    states: Arc<Mutex<StateService>>,
}

impl TitleBarController {
    pub fn new(editor: Editor, states: Arc<Mutex<StateService>>) -> Self {
        Self { editor, states }
    }

    /// Recomputes both flags from the active editor, or from the active tab
    /// input when no text editor has focus.
    pub async fn refresh(&self) -> Result<(), EditorError> {
        let (relevant_uri, is_markdown) = match self.editor.active_editor().await? {
            Some(active) => {
                let is_markdown = validation::is_markdown(&active.language_id);
                (Some(active.uri), is_markdown)
            }
            None => match self.editor.tabs().await?.active_tab_uri() {
                Some(tab_uri) => (
                    Some(tab_uri.to_string()),
                    uri::has_markdown_extension(tab_uri),
                ),
                None => (None, false),
            },
        };

        let in_edit_mode = relevant_uri
            .as_deref()
            .and_then(|uri| self.states.lock().get_existing_state(uri))
            .map(|state| state.mode == Mode::Edit)
            .unwrap_or(false);

        self.editor.set_context(IS_MARKDOWN_CONTEXT, is_markdown)?;
        self.editor.set_context(EDIT_MODE_CONTEXT, in_edit_mode)?;

        Ok(())
    }
}
