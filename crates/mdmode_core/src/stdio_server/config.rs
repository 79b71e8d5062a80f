use crate::stdio_server::editor::{Editor, EditorError};
use crate::uri;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Effective settings for one configuration scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkdownModeConfig {
    /// Master switch for the whole extension.
    pub enabled: bool,
    /// Workspace-relative glob patterns exempt from automatic preview.
    pub exclude_patterns: Vec<String>,
    /// Files above this size (bytes) prompt before previewing.
    pub max_file_size: u64,
    /// Pre-register the preview view as default handler for markdown files.
    pub editor_associations: bool,
}

impl Default for MarkdownModeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exclude_patterns: vec!["**/node_modules/**".into(), "**/.git/**".into()],
            max_file_size: 1024 * 1024,
            editor_associations: true,
        }
    }
}

/// Compiled exclude patterns. Matching is case-insensitive and includes
/// dotfiles; any single invalid pattern is skipped with a warning rather
/// than poisoning the rest.
#[derive(Debug, Clone)]
pub struct ExcludeMatcher {
    globs: GlobSet,
}

impl ExcludeMatcher {
    pub fn new(patterns: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            match GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(false)
                .build()
            {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(error) => {
                    tracing::warn!(?error, pattern, "Ignoring invalid exclude pattern");
                }
            }
        }
        let globs = builder.build().unwrap_or_else(|error| {
            tracing::warn!(?error, "Failed to compile exclude patterns");
            GlobSet::empty()
        });
        Self { globs }
    }

    pub fn is_match(&self, relative_path: &str) -> bool {
        self.globs.is_match(relative_path)
    }
}

/// What the host hands back for a `workspace_config` request: the resolved
/// scope (workspace folder URI) plus whatever keys are set under our
/// namespace. Missing keys fall back to [`MarkdownModeConfig::default`].
#[derive(Debug, Deserialize)]
struct ScopedConfig {
    scope: String,
    #[serde(default)]
    config: MarkdownModeConfig,
}

#[derive(Debug, Clone)]
struct CachedScope {
    scope: String,
    config: MarkdownModeConfig,
    excludes: ExcludeMatcher,
}

/// Scope-aware configuration cache.
///
/// One host round trip per unseen scope; entries never expire on their own,
/// the owner must call [`reload`](Self::reload) on configuration-change
/// events.
#[derive(Debug)]
pub struct ConfigService {
    editor: Editor,
    /// Resolved scope key -> effective config.
    scopes: Mutex<HashMap<String, CachedScope>>,
    /// Resource URI -> resolved scope key memo.
    resource_scopes: Mutex<HashMap<String, String>>,
}

impl ConfigService {
    /// Cache key for resource-less (global) lookups.
    const GLOBAL_SCOPE: &'static str = "";

    pub fn new(editor: Editor) -> Self {
        Self {
            editor,
            scopes: Mutex::new(HashMap::new()),
            resource_scopes: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_config(&self, resource: Option<&str>) -> MarkdownModeConfig {
        self.scoped(resource).await.config
    }

    /// Whether `uri` matches any exclude pattern of its scope, tested
    /// against the workspace-relative path.
    pub async fn is_excluded(&self, uri: &str) -> bool {
        let scoped = self.scoped(Some(uri)).await;
        let relative = match uri::workspace_relative(uri, &scoped.scope) {
            Some(relative) => relative,
            // Out-of-workspace files are matched on their full path so that
            // absolute patterns still apply.
            None => match uri::to_file_path(uri) {
                Some(path) => path.to_string_lossy().into_owned(),
                None => return false,
            },
        };
        scoped.excludes.is_match(&relative)
    }

    /// Re-resolves configuration after a change event. A change without a
    /// scope is a global settings edit and invalidates every cached scope,
    /// since each folder's effective config inherits from the global level.
    pub async fn reload(&self, scope: Option<&str>) {
        self.invalidate(scope);
        // Re-fetch eagerly so the next consumer sees fresh values.
        self.scoped(scope).await;
    }

    fn invalidate(&self, scope: Option<&str>) {
        let Some(scope) = scope else {
            self.clear_cache();
            return;
        };
        // The host may report the change against a resource inside the
        // scope rather than the scope itself.
        let resolved = self.resource_scopes.lock().get(scope).cloned();
        let mut scopes = self.scopes.lock();
        scopes.remove(scope);
        if let Some(key) = resolved {
            scopes.remove(&key);
        }
    }

    pub fn clear_cache(&self) {
        self.scopes.lock().clear();
        self.resource_scopes.lock().clear();
    }

    fn lookup_scope_key(&self, resource: Option<&str>) -> Option<String> {
        match resource {
            Some(resource) => self.resource_scopes.lock().get(resource).cloned(),
            None => Some(Self::GLOBAL_SCOPE.to_string()),
        }
    }

    async fn scoped(&self, resource: Option<&str>) -> CachedScope {
        if let Some(scope_key) = self.lookup_scope_key(resource) {
            if let Some(cached) = self.scopes.lock().get(&scope_key) {
                return cached.clone();
            }
        }

        let fetched: Result<ScopedConfig, EditorError> =
            self.editor.call("workspace_config", [resource]).await;

        match fetched {
            Ok(ScopedConfig { scope, config }) => {
                let cached = CachedScope {
                    excludes: ExcludeMatcher::new(&config.exclude_patterns),
                    scope: scope.clone(),
                    config,
                };
                let scope_key = match resource {
                    Some(resource) => {
                        self.resource_scopes
                            .lock()
                            .insert(resource.to_string(), scope.clone());
                        scope
                    }
                    None => Self::GLOBAL_SCOPE.to_string(),
                };
                self.scopes.lock().insert(scope_key, cached.clone());
                cached
            }
            Err(error) => {
                // Absent/unreachable configuration degrades to defaults and
                // is not cached, so a later lookup can still succeed.
                tracing::warn!(?error, ?resource, "Failed to resolve configuration");
                let config = MarkdownModeConfig::default();
                CachedScope {
                    scope: String::new(),
                    excludes: ExcludeMatcher::new(&config.exclude_patterns),
                    config,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = MarkdownModeConfig::default();
        assert!(config.enabled);
        assert_eq!(
            config.exclude_patterns,
            vec!["**/node_modules/**".to_string(), "**/.git/**".to_string()]
        );
        assert_eq!(config.max_file_size, 1_048_576);
        assert!(config.editor_associations);
    }

    #[test]
    fn partial_host_payload_fills_defaults() {
        let config: MarkdownModeConfig =
            serde_json::from_str(r#"{"enabled": false}"#).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.max_file_size, 1_048_576);
    }

    #[test]
    fn exclude_matching_is_case_insensitive_and_ors_patterns() {
        let matcher = ExcludeMatcher::new(&["docs/**".into(), "**/*.draft.md".into()]);
        assert!(matcher.is_match("docs/readme.md"));
        assert!(matcher.is_match("DOCS/readme.md"));
        assert!(matcher.is_match("notes/plan.draft.md"));
        assert!(!matcher.is_match("src/readme.md"));
    }

    #[test]
    fn exclude_matching_includes_dotfiles() {
        let matcher = ExcludeMatcher::new(&["**/.git/**".into()]);
        assert!(matcher.is_match(".git/config.md"));
        assert!(matcher.is_match("repo/.git/HEAD.md"));
    }

    #[test]
    fn invalid_pattern_is_skipped_not_fatal() {
        let matcher = ExcludeMatcher::new(&["a{".into(), "docs/**".into()]);
        assert!(matcher.is_match("docs/readme.md"));
    }

    #[tokio::test]
    async fn global_change_invalidates_folder_scopes() {
        // The host flips `enabled` to false after the first resolution,
        // standing in for a global settings edit.
        let stub = crate::stdio_server::testing::HostStub::new().on_fn("workspace_config", {
            let mut first = true;
            move |_params| {
                let enabled = std::mem::take(&mut first);
                serde_json::json!({ "scope": "file:///ws", "config": { "enabled": enabled } })
            }
        });
        let (editor, _host) = stub.spawn();
        let service = ConfigService::new(editor);

        assert!(service.get_config(Some("file:///ws/a.md")).await.enabled);

        // A scope-less change event must not leave the folder scope cached.
        service.reload(None).await;

        assert!(!service.get_config(Some("file:///ws/a.md")).await.enabled);
        assert!(!service.get_config(Some("file:///ws/b.md")).await.enabled);
    }

    #[tokio::test]
    async fn scoped_change_refetches_only_that_scope() {
        let stub = crate::stdio_server::testing::HostStub::new().on_fn("workspace_config", {
            let mut calls = 0u32;
            move |_params| {
                calls += 1;
                serde_json::json!({
                    "scope": "file:///ws",
                    "config": { "maxFileSize": calls }
                })
            }
        });
        let (editor, _host) = stub.spawn();
        let service = ConfigService::new(editor);

        assert_eq!(service.get_config(Some("file:///ws/a.md")).await.max_file_size, 1);
        // Cached until the scope is reported changed.
        assert_eq!(service.get_config(Some("file:///ws/a.md")).await.max_file_size, 1);

        service.reload(Some("file:///ws")).await;

        assert_eq!(service.get_config(Some("file:///ws/a.md")).await.max_file_size, 2);
    }
}
