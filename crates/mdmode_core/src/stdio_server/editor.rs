use crate::stdio_server::input::Document;
use crate::stdio_server::tabs::TabSnapshot;
use rpc::{RpcClient, RpcError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

/// Severity of a user-facing prompt or message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptLevel {
    Info,
    Warning,
    Error,
}

impl PromptLevel {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

// Hosts may report booleans as 1/0.
#[inline(always)]
fn from_host_bool(value: Value) -> bool {
    match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_u64().map(|n| n == 1).unwrap_or(false),
        _ => false,
    }
}

/// Shareable editor host instance.
///
/// All communication with the host funnels through here; components never
/// touch the RPC client directly.
#[derive(Debug, Clone)]
pub struct Editor {
    rpc_client: Arc<RpcClient>,
}

impl Editor {
    pub fn new(rpc_client: Arc<RpcClient>) -> Self {
        Self { rpc_client }
    }

    /// Calls the method with given params in the host and returns the result.
    pub async fn call<R: DeserializeOwned>(
        &self,
        method: impl AsRef<str>,
        params: impl Serialize,
    ) -> Result<R, EditorError> {
        Ok(self.rpc_client.request(method, params).await?)
    }

    /// Calls the method with no arguments.
    pub async fn bare_call<R: DeserializeOwned>(
        &self,
        method: impl AsRef<str>,
    ) -> Result<R, EditorError> {
        Ok(self.rpc_client.request(method, json!([])).await?)
    }

    /// Executes the method in the host, ignoring the call result.
    pub fn exec(
        &self,
        method: impl AsRef<str>,
        params: impl Serialize,
    ) -> Result<(), EditorError> {
        Ok(self.rpc_client.notify(method, params)?)
    }

    /// Send back the result of a host-initiated request.
    pub fn send(
        &self,
        id: rpc::Id,
        output_result: Result<impl Serialize, RpcError>,
    ) -> Result<(), EditorError> {
        Ok(self.rpc_client.send_response(id, output_result)?)
    }

    /////////////////////////////////////////////////////////////////
    //    Editor surface queries
    /////////////////////////////////////////////////////////////////
    /// The currently focused text editor, if any.
    pub async fn active_editor(&self) -> Result<Option<Document>, EditorError> {
        self.bare_call("active_editor").await
    }

    /// Any visible markdown editor, the fallback target for commands when no
    /// editor has focus.
    pub async fn visible_markdown_editor(&self) -> Result<Option<Document>, EditorError> {
        self.bare_call("visible_markdown_editor").await
    }

    /// Snapshot of all currently open tabs.
    pub async fn tabs(&self) -> Result<TabSnapshot, EditorError> {
        self.bare_call("tabs").await
    }

    pub async fn document_modified(&self, uri: &str) -> Result<bool, EditorError> {
        let value: Value = self.call("document_modified", json!([uri])).await?;
        Ok(from_host_bool(value))
    }

    pub async fn autosave_enabled(&self) -> Result<bool, EditorError> {
        let value: Value = self.bare_call("autosave_enabled").await?;
        Ok(from_host_bool(value))
    }

    /// Cursor position of the active editor as (line, character), 0-based.
    pub async fn cursor_position(&self) -> Result<(u32, u32), EditorError> {
        let [line, character]: [u32; 2] = self.bare_call("cursor_position").await?;
        Ok((line, character))
    }

    /////////////////////////////////////////////////////////////////
    //    Editor surface commands
    /////////////////////////////////////////////////////////////////
    pub async fn show_preview(&self, uri: &str) -> Result<(), EditorError> {
        self.call::<Value>("show_preview", json!([uri])).await?;
        Ok(())
    }

    pub async fn show_preview_beside(&self, uri: &str) -> Result<(), EditorError> {
        self.call::<Value>("show_preview_beside", json!([uri]))
            .await?;
        Ok(())
    }

    pub async fn open_text_editor(&self, uri: &str, column: u32) -> Result<(), EditorError> {
        self.call::<Value>("open_text_editor", json!([uri, column]))
            .await?;
        Ok(())
    }

    pub async fn close_active_editor(&self) -> Result<(), EditorError> {
        self.bare_call::<Value>("close_active_editor").await?;
        Ok(())
    }

    pub async fn revert_and_close_active_editor(&self) -> Result<(), EditorError> {
        self.bare_call::<Value>("revert_and_close_active_editor")
            .await?;
        Ok(())
    }

    pub async fn save_document(&self, uri: &str) -> Result<(), EditorError> {
        self.call::<Value>("save_document", json!([uri])).await?;
        Ok(())
    }

    /// Moves the active editor cursor and reveals the position.
    pub fn set_cursor(&self, line: u32, character: u32) -> Result<(), EditorError> {
        self.exec("set_cursor", json!([line, character]))
    }

    /////////////////////////////////////////////////////////////////
    //    UI primitives
    /////////////////////////////////////////////////////////////////
    /// Shows a prompt with labeled actions and returns the chosen label, or
    /// `None` when dismissed.
    pub async fn prompt(
        &self,
        level: PromptLevel,
        message: &str,
        actions: &[&str],
    ) -> Result<Option<String>, EditorError> {
        self.call("prompt", json!([level.as_str(), message, actions]))
            .await
    }

    /// Fire-and-forget notification message.
    pub fn show_message(&self, level: PromptLevel, message: &str) -> Result<(), EditorError> {
        self.exec("show_message", json!([level.as_str(), message]))
    }

    /// Transient status-bar message.
    pub fn status_message(&self, message: &str) -> Result<(), EditorError> {
        self.exec("status_message", json!([message]))
    }

    /// Sets a context flag gating conditional UI visibility.
    pub fn set_context(&self, key: &str, value: bool) -> Result<(), EditorError> {
        self.exec("set_context", json!([key, value]))
    }

    pub fn show_tutorial(&self) -> Result<(), EditorError> {
        self.exec("show_tutorial", json!([]))
    }

    /////////////////////////////////////////////////////////////////
    //    Persisted key-value stores
    /////////////////////////////////////////////////////////////////
    /// Workspace-lifetime store.
    pub async fn workspace_state_get<R: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<R>, EditorError> {
        self.call("workspace_state_get", json!([key])).await
    }

    pub fn workspace_state_update(
        &self,
        key: &str,
        value: impl Serialize,
    ) -> Result<(), EditorError> {
        self.exec("workspace_state_update", json!([key, value]))
    }

    /// Global/install-lifetime store.
    pub async fn global_state_get<R: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<R>, EditorError> {
        self.call("global_state_get", json!([key])).await
    }

    pub fn global_state_update(
        &self,
        key: &str,
        value: impl Serialize,
    ) -> Result<(), EditorError> {
        self.exec("global_state_update", json!([key, value]))
    }

    /// Asks the host to pre-register the preview view as the default editor
    /// for markdown extensions.
    pub fn register_editor_associations(&self) -> Result<(), EditorError> {
        self.exec("register_editor_associations", json!([]))
    }
}
