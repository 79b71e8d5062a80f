//! Mode transitions: entering/exiting edit mode and showing previews.

use crate::stdio_server::config::ConfigService;
use crate::stdio_server::editor::{Editor, EditorError, PromptLevel};
use crate::stdio_server::input::Document;
use crate::stdio_server::state::{Mode, Position, StateService};
use crate::stdio_server::validation;
use crate::uri;
use parking_lot::Mutex;
use std::sync::Arc;

/// Column the text editor opens in when entering edit mode.
const EDIT_COLUMN: u32 = 1;

const OPEN_ANYWAY: &str = "Open Anyway";
const DONT_SHOW_AGAIN: &str = "Don't Show Again";
const SAVE_AND_EXIT: &str = "Save and Exit";
const EXIT_WITHOUT_SAVING: &str = "Exit Without Saving";
const CANCEL: &str = "Cancel";
const OPEN_AS_PLAIN_TEXT: &str = "Open as Plain Text";

fn large_file_opt_out_key(uri: &str) -> String {
    format!("large-file-opt-out:{uri}")
}

#[derive(Debug)]
pub struct PreviewService {
    editor: Editor,
    states: Arc<Mutex<StateService>>,
    config: Arc<ConfigService>,
}

impl PreviewService {
    pub fn new(
        editor: Editor,
        states: Arc<Mutex<StateService>>,
        config: Arc<ConfigService>,
    ) -> Self {
        Self {
            editor,
            states,
            config,
        }
    }

    /// The preview decision gate, evaluated in strict order with the first
    /// disqualifier winning.
    ///
    /// Note the large-file branch: choosing "Open Anyway" performs the
    /// preview itself and still reports `false`, so the caller must not show
    /// a second one.
    pub async fn should_show_preview(&self, doc: &Document) -> Result<bool, EditorError> {
        let config = self.config.get_config(Some(&doc.uri)).await;
        if !config.enabled {
            return Ok(false);
        }
        if !validation::is_markdown(&doc.language_id) {
            return Ok(false);
        }
        if uri::is_untitled(&doc.uri) {
            return Ok(false);
        }
        if validation::is_diff_view(&doc.uri) {
            return Ok(false);
        }
        if self.config.is_excluded(&doc.uri).await {
            tracing::debug!(uri = doc.uri, "Document matches an exclude pattern");
            return Ok(false);
        }

        if let Some(path) = uri::to_file_path(&doc.uri) {
            if validation::is_large_file(&path, config.max_file_size) {
                return self.confirm_large_file(&doc.uri).await;
            }
            if validation::is_binary_file(&path) {
                tracing::info!(uri = doc.uri, "Skipping preview for binary file");
                self.editor.show_message(
                    PromptLevel::Error,
                    "This file appears to be binary and cannot be previewed as markdown.",
                )?;
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Large-file prompt with a persisted per-URI opt-out. Always resolves
    /// to `false`; "Open Anyway" triggers the preview as a side effect.
    async fn confirm_large_file(&self, uri: &str) -> Result<bool, EditorError> {
        let opted_out = self
            .editor
            .workspace_state_get::<bool>(&large_file_opt_out_key(uri))
            .await?
            .unwrap_or(false);
        if opted_out {
            tracing::debug!(uri, "Large file previously opted out");
            return Ok(false);
        }

        let choice = self
            .editor
            .prompt(
                PromptLevel::Info,
                "This markdown file exceeds the configured size limit. Showing the preview may be slow.",
                &[OPEN_ANYWAY, DONT_SHOW_AGAIN],
            )
            .await?;

        // The document may have closed while the prompt was pending.
        if !self.editor.tabs().await?.has_representation(uri) {
            tracing::debug!(uri, "Document closed during large file prompt");
            return Ok(false);
        }

        match choice.as_deref() {
            Some(OPEN_ANYWAY) => {
                self.show_preview(uri).await?;
            }
            Some(DONT_SHOW_AGAIN) => {
                self.editor
                    .workspace_state_update(&large_file_opt_out_key(uri), true)?;
            }
            _ => {}
        }

        Ok(false)
    }

    /// Shows the rendered preview and records Preview mode. A failing host
    /// command degrades to an offer to open the raw text instead.
    pub async fn show_preview(&self, uri: &str) -> Result<(), EditorError> {
        if let Err(error) = self.editor.show_preview(uri).await {
            tracing::error!(?error, uri, "Preview command failed");
            let choice = self
                .editor
                .prompt(
                    PromptLevel::Error,
                    "Failed to open the markdown preview.",
                    &[OPEN_AS_PLAIN_TEXT],
                )
                .await?;
            if choice.as_deref() == Some(OPEN_AS_PLAIN_TEXT) {
                self.editor.open_text_editor(uri, EDIT_COLUMN).await?;
            }
            return Ok(());
        }

        let mut states = self.states.lock();
        states.set_mode(uri, Mode::Preview);
        states.set_editor_visible(uri, false);
        Ok(())
    }

    /// Opens the live editing surface plus a synchronized side preview and
    /// restores the last cursor position.
    pub async fn enter_edit_mode(&self, uri: &str) -> Result<(), EditorError> {
        self.editor.open_text_editor(uri, EDIT_COLUMN).await?;

        if let Err(error) = self.editor.show_preview_beside(uri).await {
            // Editing still works without the side preview.
            tracing::warn!(?error, uri, "Failed to open side-by-side preview");
        }

        let selection = {
            let mut states = self.states.lock();
            states.set_mode(uri, Mode::Edit);
            states.set_editor_visible(uri, true);
            states.last_selection(uri).unwrap_or_default()
        };
        self.editor.set_cursor(selection.line, selection.character)?;

        Ok(())
    }

    /// Leaves edit mode for `uri`, prompting about unsaved changes when the
    /// active editor is this document and autosave is off. Cancelling the
    /// prompt aborts the transition with state untouched.
    pub async fn exit_edit_mode(&self, uri: &str) -> Result<(), EditorError> {
        let is_active = self
            .editor
            .active_editor()
            .await?
            .map(|active| active.uri == uri)
            .unwrap_or(false);

        let mut already_closed = false;

        if is_active {
            // Capture while this document's editor is still the active one;
            // after the prompt or a close, the cursor belongs to whichever
            // editor took over.
            if let Ok((line, character)) = self.editor.cursor_position().await {
                self.states
                    .lock()
                    .set_last_selection(uri, Position { line, character });
            }

            let modified = self.editor.document_modified(uri).await.unwrap_or(false);
            let autosave = self.editor.autosave_enabled().await.unwrap_or(false);

            if modified && !autosave {
                let choice = self
                    .editor
                    .prompt(
                        PromptLevel::Warning,
                        "This document has unsaved changes.",
                        &[SAVE_AND_EXIT, EXIT_WITHOUT_SAVING, CANCEL],
                    )
                    .await?;
                match choice.as_deref() {
                    Some(SAVE_AND_EXIT) => {
                        self.editor.save_document(uri).await?;
                    }
                    Some(EXIT_WITHOUT_SAVING) => {
                        self.editor.revert_and_close_active_editor().await?;
                        already_closed = true;
                    }
                    // Explicit Cancel and dismissal both abort the exit.
                    _ => {
                        tracing::debug!(uri, "Exit cancelled, staying in edit mode");
                        return Ok(());
                    }
                }
            }
        }

        {
            let mut states = self.states.lock();
            states.set_mode(uri, Mode::Preview);
            states.set_editor_visible(uri, false);
        }

        if is_active && !already_closed {
            if let Err(error) = self.editor.close_active_editor().await {
                tracing::warn!(?error, uri, "Failed to close the edit surface");
            }
        }

        self.show_preview(uri).await
    }
}
