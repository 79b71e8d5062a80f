//! Snapshot of the host's open tabs.
//!
//! The handler must know whether a document still has any live surface after
//! a tab closes, and the title bar needs the active tab when no text editor
//! has focus. Both questions are answered against a snapshot fetched from
//! the host, so the reconciliation logic stays a pure function over plain
//! data.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabKind {
    /// Plain text editor tab.
    Text,
    /// Rendered (custom/webview) preview tab.
    Preview,
    /// Diff/comparison tab referencing two document versions.
    Diff,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tab {
    pub kind: TabKind,
    #[serde(default)]
    pub uri: Option<String>,
    /// Left-hand side of a diff tab.
    #[serde(default)]
    pub original_uri: Option<String>,
    /// Right-hand side of a diff tab.
    #[serde(default)]
    pub modified_uri: Option<String>,
    #[serde(default)]
    pub active: bool,
}

impl Tab {
    fn references(&self, uri: &str) -> bool {
        self.uri.as_deref() == Some(uri)
            || self.original_uri.as_deref() == Some(uri)
            || self.modified_uri.as_deref() == Some(uri)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TabGroup {
    #[serde(default)]
    pub tabs: Vec<Tab>,
    #[serde(default)]
    pub active: bool,
}

/// All open tab groups at one point in time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TabSnapshot {
    #[serde(default)]
    pub groups: Vec<TabGroup>,
}

impl TabSnapshot {
    /// Whether any tab in any group still references `uri`, whatever its
    /// kind (text, preview or either side of a diff).
    pub fn has_representation(&self, uri: &str) -> bool {
        self.groups
            .iter()
            .flat_map(|group| group.tabs.iter())
            .any(|tab| tab.references(uri))
    }

    /// URI of the active tab in the active group, if it has one.
    pub fn active_tab_uri(&self) -> Option<&str> {
        self.groups
            .iter()
            .find(|group| group.active)?
            .tabs
            .iter()
            .find(|tab| tab.active)?
            .uri
            .as_deref()
    }
}
