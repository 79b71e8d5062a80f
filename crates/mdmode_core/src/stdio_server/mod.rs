mod config;
mod editor;
mod handler;
mod input;
mod preview;
mod state;
mod tabs;
#[cfg(test)]
mod testing;
mod titlebar;
mod validation;

use self::config::ConfigService;
use self::editor::{Editor, EditorError};
use self::handler::MarkdownFileHandler;
use self::input::{
    ActionParams, CloseDocumentParams, ConfigChangedParams, DeletedFilesParams, Document,
    DocumentEventType, Event, TabsChangedParams,
};
use self::preview::PreviewService;
use self::state::{Mode, StateService};
use self::titlebar::TitleBarController;
use parking_lot::Mutex;
use rpc::{EditorMessage, RpcClient, RpcNotification, RpcRequest};
use std::io::{BufReader, BufWriter};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

const ASSOCIATIONS_REGISTERED_KEY: &str = "editor-associations-registered";

/// Starts and keeps running the server on top of stdio.
pub async fn start() {
    let (call_tx, call_rx) = tokio::sync::mpsc::unbounded_channel();

    let rpc_client = Arc::new(RpcClient::new(
        BufReader::new(std::io::stdin()),
        BufWriter::new(std::io::stdout()),
        call_tx,
    ));

    let client = Client::new(Editor::new(rpc_client));

    tokio::spawn({
        let client = client.clone();
        async move {
            if let Err(error) = client.register_editor_associations_once().await {
                tracing::warn!(?error, "Failed to register editor associations");
            }
        }
    });

    client.loop_call(call_rx).await;
}

/// The bridge between the editor host and the backend; one instance per
/// process, cheaply cloned into the per-event tasks.
#[derive(Clone)]
struct Client {
    editor: Editor,
    states: Arc<Mutex<StateService>>,
    config: Arc<ConfigService>,
    preview: Arc<PreviewService>,
    handler: Arc<MarkdownFileHandler>,
    titlebar: Arc<TitleBarController>,
}

impl Client {
    /// Constructs the component graph: the state map is created once here
    /// and injected into every consumer.
    fn new(editor: Editor) -> Self {
        let states = Arc::new(Mutex::new(StateService::new(editor.clone())));
        let config = Arc::new(ConfigService::new(editor.clone()));
        let preview = Arc::new(PreviewService::new(
            editor.clone(),
            states.clone(),
            config.clone(),
        ));
        let handler = Arc::new(MarkdownFileHandler::new(
            editor.clone(),
            states.clone(),
            config.clone(),
            preview.clone(),
        ));
        let titlebar = Arc::new(TitleBarController::new(editor.clone(), states.clone()));
        Self {
            editor,
            states,
            config,
            preview,
            handler,
            titlebar,
        }
    }

    /// Entry of the host-to-backend direction: every message initiated from
    /// the host lands here.
    async fn loop_call(self, mut rx: UnboundedReceiver<EditorMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                EditorMessage::Notification(notification) => {
                    let client = self.clone();
                    tokio::spawn(async move {
                        let method = notification.method.clone();
                        if let Err(error) = client.process_notification(notification).await {
                            tracing::error!(?error, method, "Error processing host notification");
                        }
                    });
                }
                EditorMessage::Request(request) => {
                    let client = self.clone();
                    tokio::spawn(async move {
                        client.process_request(request);
                    });
                }
            }
        }
    }

    /// The backend exposes no host-callable requests today; answer anything
    /// with a proper JSON-RPC error instead of going silent.
    fn process_request(&self, request: RpcRequest) {
        tracing::debug!(method = request.method, "Unknown host request");
        if let Err(error) = self.editor.send(
            request.id,
            Err::<serde_json::Value, _>(rpc::Error::method_not_found().into()),
        ) {
            tracing::debug!(?error, "Failed to send the error response");
        }
    }

    async fn process_notification(&self, notification: RpcNotification) -> Result<(), EditorError> {
        let RpcNotification { method, params } = notification;

        match Event::from_method(&method) {
            Event::Document(DocumentEventType::DidOpen) => {
                let doc: Document = params.parse().map_err(rpc::RpcError::from)?;
                self.handler.clone().on_document_open(doc);
            }
            Event::Document(DocumentEventType::DidClose) => {
                let CloseDocumentParams { uri } = params.parse().map_err(rpc::RpcError::from)?;
                self.handler.on_document_close(&uri);
            }
            Event::Document(DocumentEventType::DidDeleteFiles) => {
                let DeletedFilesParams { uris } = params.parse().map_err(rpc::RpcError::from)?;
                self.handler.on_files_deleted(&uris);
            }
            Event::TabsChanged => {
                let TabsChangedParams { closed } = params.parse().map_err(rpc::RpcError::from)?;
                self.handler.on_tabs_changed(&closed).await?;
                self.titlebar.refresh().await?;
            }
            Event::ActiveEditorChanged => {
                self.titlebar.refresh().await?;
            }
            Event::ConfigChanged => {
                let ConfigChangedParams { scope } = params.parse().map_err(rpc::RpcError::from)?;
                self.config.reload(scope.as_deref()).await;
            }
            Event::Action(action) => {
                let ActionParams { uri } = params.parse().map_err(rpc::RpcError::from)?;
                self.process_action(&action, uri).await?;
            }
            Event::Other(method) => {
                tracing::debug!(method, "Unknown host notification");
            }
        }

        Ok(())
    }

    async fn process_action(
        &self,
        action: &str,
        explicit_uri: Option<String>,
    ) -> Result<(), EditorError> {
        let Some(uri) = self.resolve_command_target(explicit_uri).await? else {
            tracing::info!(action, "No markdown document to act on");
            return Ok(());
        };

        match action {
            "enter-edit-mode" => self.preview.enter_edit_mode(&uri).await?,
            "exit-edit-mode" => self.preview.exit_edit_mode(&uri).await?,
            "toggle-edit-mode" => {
                let mode = self
                    .states
                    .lock()
                    .get_existing_state(&uri)
                    .map(|state| state.mode)
                    .unwrap_or(Mode::Preview);
                match mode {
                    Mode::Edit => self.preview.exit_edit_mode(&uri).await?,
                    Mode::Preview => self.preview.enter_edit_mode(&uri).await?,
                }
            }
            "inspect-config" => {
                let config = self.config.get_config(Some(&uri)).await;
                let rendered = serde_json::to_string_pretty(&config)?;
                tracing::info!(uri, %rendered, "Effective configuration");
                let excluded = self.config.is_excluded(&uri).await;
                self.editor.status_message(&format!(
                    "mdmode: enabled={}, excluded={excluded}, maxFileSize={}",
                    config.enabled, config.max_file_size
                ))?;
            }
            unknown => {
                tracing::debug!(unknown, "Unknown action");
            }
        }

        Ok(())
    }

    /// Commands operate on the active markdown document, falling back to
    /// any visible markdown document when no editor has focus.
    async fn resolve_command_target(
        &self,
        explicit_uri: Option<String>,
    ) -> Result<Option<String>, EditorError> {
        if explicit_uri.is_some() {
            return Ok(explicit_uri);
        }

        if let Some(active) = self.editor.active_editor().await? {
            if validation::is_markdown(&active.language_id) {
                return Ok(Some(active.uri));
            }
        }

        Ok(self
            .editor
            .visible_markdown_editor()
            .await?
            .map(|editor| editor.uri))
    }

    /// One-time (per workspace) request to make the preview the default
    /// editor for markdown extensions, when enabled.
    async fn register_editor_associations_once(&self) -> Result<(), EditorError> {
        if !self.config.get_config(None).await.editor_associations {
            return Ok(());
        }

        let registered = self
            .editor
            .workspace_state_get::<bool>(ASSOCIATIONS_REGISTERED_KEY)
            .await?
            .unwrap_or(false);
        if registered {
            return Ok(());
        }

        self.editor.register_editor_associations()?;
        self.editor
            .workspace_state_update(ASSOCIATIONS_REGISTERED_KEY, true)?;
        tracing::debug!("Editor associations registered");

        Ok(())
    }
}
