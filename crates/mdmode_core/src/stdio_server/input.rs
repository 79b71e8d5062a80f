use crate::stdio_server::tabs::TabKind;
use serde::Deserialize;

/// Host-initiated events, decoded from the RPC method name.
#[derive(Debug)]
pub enum Event {
    Document(DocumentEventType),
    TabsChanged,
    ActiveEditorChanged,
    ConfigChanged,
    /// User-facing command.
    Action(String),
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEventType {
    DidOpen,
    DidClose,
    DidDeleteFiles,
}

impl Event {
    pub fn from_method(method: &str) -> Self {
        match method {
            "did_open_document" => Self::Document(DocumentEventType::DidOpen),
            "did_close_document" => Self::Document(DocumentEventType::DidClose),
            "did_delete_files" => Self::Document(DocumentEventType::DidDeleteFiles),
            "tabs_changed" => Self::TabsChanged,
            "active_editor_changed" => Self::ActiveEditorChanged,
            "config_changed" => Self::ConfigChanged,
            "enter-edit-mode" | "exit-edit-mode" | "toggle-edit-mode" | "inspect-config" => {
                Self::Action(method.to_string())
            }
            other => Self::Other(other.to_string()),
        }
    }
}

/// A document as the host describes it in open/active-editor events.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub uri: String,
    pub language_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CloseDocumentParams {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub struct DeletedFilesParams {
    pub uris: Vec<String>,
}

/// A tab the host just closed, as reported in a `tabs_changed` notification.
#[derive(Debug, Clone, Deserialize)]
pub struct ClosedTab {
    pub kind: TabKind,
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TabsChangedParams {
    #[serde(default)]
    pub closed: Vec<ClosedTab>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigChangedParams {
    #[serde(default)]
    pub scope: Option<String>,
}

/// Optional explicit target of a user command.
#[derive(Debug, Deserialize)]
pub struct ActionParams {
    #[serde(default)]
    pub uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_methods_map_to_events() {
        assert!(matches!(
            Event::from_method("did_open_document"),
            Event::Document(DocumentEventType::DidOpen)
        ));
        assert!(matches!(
            Event::from_method("toggle-edit-mode"),
            Event::Action(_)
        ));
        assert!(matches!(Event::from_method("bogus"), Event::Other(_)));
    }
}
