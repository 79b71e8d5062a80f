//! The document decision pipeline.
//!
//! Reconciles three independent signals on every document event: the opened
//! document itself, the existing mode state (if any) and the host's current
//! tab/editor shape, then drives the preview service accordingly. Open
//! events are debounced per URI so session-restore bursts and quick-open
//! flicker collapse into one decision.

use crate::stdio_server::config::ConfigService;
use crate::stdio_server::editor::{Editor, EditorError, PromptLevel};
use crate::stdio_server::input::{ClosedTab, Document};
use crate::stdio_server::preview::PreviewService;
use crate::stdio_server::state::{Mode, StateService};
use crate::stdio_server::tabs::TabKind;
use crate::stdio_server::validation;
use crate::uri;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Settle window for bursts of open events on the same URI.
const OPEN_DEBOUNCE: Duration = Duration::from_millis(75);

const WELCOME_SHOWN_KEY: &str = "welcome-shown";
const OPEN_TUTORIAL: &str = "Open Tutorial";

/// Outcome of the synchronous part of the open pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenDecision {
    Skip(SkipReason),
    /// The user opened a text editor for a file we had in Preview: flip to
    /// Edit without touching any preview command.
    ImplicitEdit,
    /// Untitled documents go straight to edit mode.
    EditUntitled,
    /// Conflict markers force edit mode; a rendered preview cannot help
    /// resolve a conflict.
    EditConflicted,
    /// No early verdict; defer to `PreviewService::should_show_preview`.
    ConsultPreview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    NotMarkdown,
    Disabled,
    AlreadyEdit,
    DiffView,
}

#[derive(Debug)]
pub(crate) struct OpenInput<'a> {
    pub language_id: &'a str,
    pub enabled: bool,
    pub existing_mode: Option<Mode>,
    pub is_active_editor: bool,
    pub untitled: bool,
    pub diff_view: bool,
}

/// The open-event decision order. `has_conflicts` is only consulted once
/// every earlier disqualifier has passed, so callers can hand in a lazy
/// file scan.
pub(crate) fn decide_open(
    input: OpenInput<'_>,
    has_conflicts: impl FnOnce() -> bool,
) -> OpenDecision {
    if !validation::is_markdown(input.language_id) {
        return OpenDecision::Skip(SkipReason::NotMarkdown);
    }
    if !input.enabled {
        return OpenDecision::Skip(SkipReason::Disabled);
    }
    match input.existing_mode {
        Some(Mode::Edit) => return OpenDecision::Skip(SkipReason::AlreadyEdit),
        Some(Mode::Preview) if input.is_active_editor => return OpenDecision::ImplicitEdit,
        _ => {}
    }
    if input.untitled {
        return OpenDecision::EditUntitled;
    }
    if input.diff_view {
        return OpenDecision::Skip(SkipReason::DiffView);
    }
    if has_conflicts() {
        return OpenDecision::EditConflicted;
    }
    OpenDecision::ConsultPreview
}

/// Outcome for one document after one of its tabs closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TabCloseOutcome {
    /// No open surface of any kind remains: forget the document.
    Clear,
    /// The text editing surface vanished while the document stays
    /// represented elsewhere.
    FallbackToPreview,
    Keep,
}

pub(crate) fn decide_tab_close(
    kind: TabKind,
    still_represented: bool,
    was_edit: bool,
) -> TabCloseOutcome {
    if !still_represented {
        return TabCloseOutcome::Clear;
    }
    if kind == TabKind::Text && was_edit {
        return TabCloseOutcome::FallbackToPreview;
    }
    TabCloseOutcome::Keep
}

#[derive(Debug)]
pub struct MarkdownFileHandler {
    editor: Editor,
    states: Arc<Mutex<StateService>>,
    config: Arc<ConfigService>,
    preview: Arc<PreviewService>,
    /// At most one pending debounced open task per URI.
    pending_opens: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl MarkdownFileHandler {
    pub fn new(
        editor: Editor,
        states: Arc<Mutex<StateService>>,
        config: Arc<ConfigService>,
        preview: Arc<PreviewService>,
    ) -> Self {
        Self {
            editor,
            states,
            config,
            preview,
            pending_opens: Mutex::new(HashMap::new()),
        }
    }

    /// Schedules the decision for an opened document. A second open for the
    /// same URI within the window cancels and restarts the timer.
    pub fn on_document_open(self: Arc<Self>, doc: Document) {
        let handler = self.clone();
        let uri = doc.uri.clone();
        let task = tokio::spawn({
            let uri = uri.clone();
            async move {
                tokio::time::sleep(OPEN_DEBOUNCE).await;
                handler.pending_opens.lock().remove(&uri);
                if let Err(error) = handler.handle_settled_open(&doc).await {
                    tracing::error!(?error, uri, "Error handling opened document");
                }
            }
        });

        if let Some(stale) = self.pending_opens.lock().insert(uri, task) {
            stale.abort();
        }
    }

    /// Runs the decision pipeline once the open event has settled.
    async fn handle_settled_open(&self, doc: &Document) -> Result<(), EditorError> {
        let config = self.config.get_config(Some(&doc.uri)).await;
        let existing_mode = self
            .states
            .lock()
            .get_existing_state(&doc.uri)
            .map(|state| state.mode);
        let is_active_editor = self
            .editor
            .active_editor()
            .await?
            .map(|active| active.uri == doc.uri)
            .unwrap_or(false);

        let path = uri::to_file_path(&doc.uri);
        let decision = decide_open(
            OpenInput {
                language_id: &doc.language_id,
                enabled: config.enabled,
                existing_mode,
                is_active_editor,
                untitled: uri::is_untitled(&doc.uri),
                diff_view: validation::is_diff_view(&doc.uri),
            },
            || {
                path.as_deref()
                    .map(validation::has_conflict_markers)
                    .unwrap_or(false)
            },
        );

        match decision {
            OpenDecision::Skip(reason @ (SkipReason::Disabled | SkipReason::AlreadyEdit)) => {
                tracing::info!(uri = doc.uri, ?reason, "Leaving opened document alone");
            }
            OpenDecision::Skip(reason) => {
                tracing::debug!(uri = doc.uri, ?reason, "Leaving opened document alone");
            }
            OpenDecision::ImplicitEdit => {
                tracing::debug!(uri = doc.uri, "Editor opened manually, entering edit mode");
                let mut states = self.states.lock();
                states.set_mode(&doc.uri, Mode::Edit);
                states.set_editor_visible(&doc.uri, true);
            }
            OpenDecision::EditUntitled => {
                self.preview.enter_edit_mode(&doc.uri).await?;
                self.show_welcome_once().await?;
            }
            OpenDecision::EditConflicted => {
                self.editor.show_message(
                    PromptLevel::Warning,
                    "Merge conflict markers detected; opening in edit mode.",
                )?;
                self.preview.enter_edit_mode(&doc.uri).await?;
                self.show_welcome_once().await?;
            }
            OpenDecision::ConsultPreview => {
                if self.preview.should_show_preview(doc).await? {
                    // Close the raw editor the host just opened, unless focus
                    // moved elsewhere while we were deciding.
                    let still_active = self
                        .editor
                        .active_editor()
                        .await?
                        .map(|active| active.uri == doc.uri)
                        .unwrap_or(false);
                    if still_active {
                        self.editor.close_active_editor().await?;
                    }
                    self.preview.show_preview(&doc.uri).await?;
                    self.show_welcome_once().await?;
                }
            }
        }

        Ok(())
    }

    /// Close discards any pending decision and forgets the document; a
    /// reopen starts over in Preview.
    pub fn on_document_close(&self, uri: &str) {
        if let Some(pending) = self.pending_opens.lock().remove(uri) {
            pending.abort();
        }
        self.states.lock().clear(uri);
    }

    pub fn on_files_deleted(&self, uris: &[String]) {
        for uri in uris {
            tracing::debug!(uri, "File deleted, clearing state");
            self.on_document_close(uri);
        }
    }

    /// Reconciles state with the tabs that remain after a tab-group change.
    ///
    /// A closed tab of any kind may have been the last open surface for its
    /// document, so the no-representation sweep covers them all; only the
    /// Edit-to-Preview fallback is specific to losing the text surface.
    pub async fn on_tabs_changed(&self, closed: &[ClosedTab]) -> Result<(), EditorError> {
        let closed_uris: Vec<(TabKind, &str)> = closed
            .iter()
            .filter_map(|tab| tab.uri.as_deref().map(|uri| (tab.kind, uri)))
            .collect();

        if closed_uris.is_empty() {
            return Ok(());
        }

        let snapshot = self.editor.tabs().await?;

        for (kind, uri) in closed_uris {
            let was_edit = self
                .states
                .lock()
                .get_existing_state(uri)
                .map(|state| state.mode == Mode::Edit)
                .unwrap_or(false);

            match decide_tab_close(kind, snapshot.has_representation(uri), was_edit) {
                TabCloseOutcome::Clear => {
                    tracing::debug!(uri, "No open representation left, clearing state");
                    self.states.lock().clear(uri);
                }
                TabCloseOutcome::FallbackToPreview => {
                    // The edit surface vanished but the document is still
                    // represented; fall back to its preview instead of
                    // leaving a dangling Edit state.
                    tracing::debug!(uri, "Edit surface closed, falling back to preview");
                    self.states.lock().set_editor_visible(uri, false);
                    self.preview.show_preview(uri).await?;
                }
                TabCloseOutcome::Keep => {}
            }
        }

        Ok(())
    }

    /// One-time welcome prompt, persisted for the install lifetime. The
    /// flag is written before awaiting the prompt so overlapping opens
    /// cannot re-trigger it.
    async fn show_welcome_once(&self) -> Result<(), EditorError> {
        let shown = self
            .editor
            .global_state_get::<bool>(WELCOME_SHOWN_KEY)
            .await?
            .unwrap_or(false);
        if shown {
            return Ok(());
        }
        self.editor.global_state_update(WELCOME_SHOWN_KEY, true)?;

        let choice = self
            .editor
            .prompt(
                PromptLevel::Info,
                "Markdown edit mode is active for this file. Would you like a quick tour?",
                &[OPEN_TUTORIAL],
            )
            .await?;
        if choice.as_deref() == Some(OPEN_TUTORIAL) {
            self.editor.show_tutorial()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markdown_input() -> OpenInput<'static> {
        OpenInput {
            language_id: "markdown",
            enabled: true,
            existing_mode: None,
            is_active_editor: false,
            untitled: false,
            diff_view: false,
        }
    }

    #[test]
    fn plaintext_is_ignored() {
        let decision = decide_open(
            OpenInput {
                language_id: "plaintext",
                ..markdown_input()
            },
            || panic!("conflict scan must not run for non-markdown"),
        );
        assert_eq!(decision, OpenDecision::Skip(SkipReason::NotMarkdown));
    }

    #[test]
    fn disabled_is_ignored_before_state_checks() {
        let decision = decide_open(
            OpenInput {
                enabled: false,
                existing_mode: Some(Mode::Edit),
                ..markdown_input()
            },
            || false,
        );
        assert_eq!(decision, OpenDecision::Skip(SkipReason::Disabled));
    }

    #[test]
    fn existing_edit_state_wins() {
        let decision = decide_open(
            OpenInput {
                existing_mode: Some(Mode::Edit),
                is_active_editor: true,
                ..markdown_input()
            },
            || false,
        );
        assert_eq!(decision, OpenDecision::Skip(SkipReason::AlreadyEdit));
    }

    #[test]
    fn manual_editor_open_over_preview_state_becomes_edit() {
        let decision = decide_open(
            OpenInput {
                existing_mode: Some(Mode::Preview),
                is_active_editor: true,
                ..markdown_input()
            },
            || false,
        );
        assert_eq!(decision, OpenDecision::ImplicitEdit);

        // Without focus it is just a background open.
        let decision = decide_open(
            OpenInput {
                existing_mode: Some(Mode::Preview),
                is_active_editor: false,
                ..markdown_input()
            },
            || false,
        );
        assert_eq!(decision, OpenDecision::ConsultPreview);
    }

    #[test]
    fn untitled_enters_edit_before_diff_check() {
        let decision = decide_open(
            OpenInput {
                untitled: true,
                diff_view: true,
                ..markdown_input()
            },
            || false,
        );
        assert_eq!(decision, OpenDecision::EditUntitled);
    }

    #[test]
    fn diff_view_is_ignored() {
        let decision = decide_open(
            OpenInput {
                diff_view: true,
                ..markdown_input()
            },
            || true,
        );
        assert_eq!(decision, OpenDecision::Skip(SkipReason::DiffView));
    }

    #[test]
    fn conflicts_force_edit_mode() {
        let decision = decide_open(markdown_input(), || true);
        assert_eq!(decision, OpenDecision::EditConflicted);
    }

    #[test]
    fn clean_markdown_defers_to_preview_gate() {
        let decision = decide_open(markdown_input(), || false);
        assert_eq!(decision, OpenDecision::ConsultPreview);
    }

    #[test]
    fn tab_close_decision_matrix() {
        use TabCloseOutcome::*;
        // Losing the last surface clears, whatever kind of tab closed.
        assert_eq!(decide_tab_close(TabKind::Preview, false, false), Clear);
        assert_eq!(decide_tab_close(TabKind::Diff, false, true), Clear);
        assert_eq!(decide_tab_close(TabKind::Text, false, true), Clear);
        // The fallback is specific to the text surface of an Edit document.
        assert_eq!(
            decide_tab_close(TabKind::Text, true, true),
            FallbackToPreview
        );
        assert_eq!(decide_tab_close(TabKind::Text, true, false), Keep);
        assert_eq!(decide_tab_close(TabKind::Preview, true, true), Keep);
    }

    mod tab_changes {
        use super::*;
        use crate::stdio_server::config::ConfigService;
        use crate::stdio_server::preview::PreviewService;
        use crate::stdio_server::state::StateService;
        use crate::stdio_server::testing::{Host, HostStub};
        use serde_json::json;

        const URI: &str = "file:///ws/notes.md";

        fn handler_with(stub: HostStub) -> (MarkdownFileHandler, Host, Arc<Mutex<StateService>>) {
            let (editor, host) = stub.spawn();
            let states = Arc::new(Mutex::new(StateService::new(editor.clone())));
            let config = Arc::new(ConfigService::new(editor.clone()));
            let preview = Arc::new(PreviewService::new(
                editor.clone(),
                states.clone(),
                config.clone(),
            ));
            let handler = MarkdownFileHandler::new(editor, states.clone(), config, preview);
            (handler, host, states)
        }

        #[tokio::test]
        async fn closing_the_last_preview_surface_clears_state() {
            let stub = HostStub::new().on("tabs", json!({ "groups": [] }));
            let (handler, _host, states) = handler_with(stub);
            states.lock().set_mode(URI, Mode::Preview);
            assert!(states.lock().get_existing_state(URI).is_some());

            handler
                .on_tabs_changed(&[ClosedTab {
                    kind: TabKind::Preview,
                    uri: Some(URI.to_string()),
                }])
                .await
                .unwrap();

            assert!(states.lock().get_existing_state(URI).is_none());
        }

        #[tokio::test]
        async fn closing_the_edit_surface_falls_back_to_preview() {
            let stub = HostStub::new()
                .on(
                    "tabs",
                    json!({ "groups": [{ "active": true, "tabs": [
                        { "kind": "preview", "uri": URI, "active": true }
                    ]}]}),
                )
                .on("show_preview", json!(null));
            let (handler, host, states) = handler_with(stub);
            states.lock().set_mode(URI, Mode::Edit);
            states.lock().set_editor_visible(URI, true);

            handler
                .on_tabs_changed(&[ClosedTab {
                    kind: TabKind::Text,
                    uri: Some(URI.to_string()),
                }])
                .await
                .unwrap();

            assert!(host.position_of("show_preview").is_some());
            let state = states.lock().get_existing_state(URI).unwrap();
            assert_eq!(state.mode, Mode::Preview);
            assert!(!state.editor_visible);
        }
    }
}
