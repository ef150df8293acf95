use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::ConcordiaError;

/// Where a collection's configuration originates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum CollectionScope {
    /// Workspace settings (`.vscode/mcp.json`, workspace file, folder settings)
    Workspace,
    /// The local user profile
    #[serde(alias = "user")]
    Profile,
    /// Workspace settings of a remote host
    RemoteWorkspace,
    /// User profile of a remote host
    RemoteProfile,
}

impl CollectionScope {
    pub const ALL: [Self; 4] =
        [Self::Workspace, Self::Profile, Self::RemoteWorkspace, Self::RemoteProfile];
}

/// Where a collection's configuration applies. Independent of [`CollectionScope`]
/// because a collection can be sourced from one target yet apply to another.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigTarget {
    WorkspaceFolder,
    Workspace,
    UserRemote,
    UserLocal,
    User,
    Default,
}

impl ConfigTarget {
    pub const ALL: [Self; 6] = [
        Self::WorkspaceFolder,
        Self::Workspace,
        Self::UserRemote,
        Self::UserLocal,
        Self::User,
        Self::Default,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TrustBehavior {
    /// Servers may be started without asking
    Trusted,
    /// Servers need recorded consent before they are started
    Prompt,
    /// Servers are never started
    Untrusted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Http,
}

/// Launch configuration as contributed by a collection, before validation.
///
/// Contributors may populate fields of either transport; [`ServerDefinition::try_from`]
/// decides which variant (if any) this describes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawLaunch {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
}

/// A server definition exactly as a collection lists it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawServerDefinition {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub cache_nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch: Option<RawLaunch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StdioLaunch {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub env_file: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpLaunch {
    pub uri: String,
    /// Header order is preserved; it can be meaningful to the server.
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerLaunch {
    Stdio(StdioLaunch),
    Http(HttpLaunch),
}

impl ServerLaunch {
    #[must_use]
    pub const fn transport(&self) -> TransportKind {
        match self {
            Self::Stdio(_) => TransportKind::Stdio,
            Self::Http(_) => TransportKind::Http,
        }
    }
}

/// A validated server definition with exactly one launch variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerDefinition {
    pub id: String,
    pub label: String,
    /// Opaque version stamp; a change means "treat as changed and relaunch".
    pub cache_nonce: String,
    pub launch: ServerLaunch,
}

impl TryFrom<&RawServerDefinition> for ServerDefinition {
    type Error = ConcordiaError;

    fn try_from(raw: &RawServerDefinition) -> Result<Self, Self::Error> {
        let malformed = |reason: &str| ConcordiaError::MalformedDefinition {
            server_id: raw.id.clone(),
            reason: reason.to_string(),
        };

        if raw.id.trim().is_empty() {
            return Err(malformed("definition has no id"));
        }

        let launch = raw.launch.as_ref().ok_or_else(|| malformed("launch is missing"))?;

        let command = launch.command.as_deref().filter(|c| !c.trim().is_empty());
        let uri = launch.uri.as_deref().filter(|u| !u.trim().is_empty());

        let launch = match (command, uri) {
            (Some(_), Some(_)) => {
                return Err(malformed("both a command and a uri are set"));
            },
            (None, None) => {
                return Err(malformed("neither a command nor a uri is set"));
            },
            (Some(command), None) => {
                if launch.transport == Some(TransportKind::Http) {
                    return Err(malformed("http transport declared but only a command is set"));
                }
                ServerLaunch::Stdio(StdioLaunch {
                    command: command.to_string(),
                    args: launch.args.clone(),
                    env: launch.env.clone(),
                    env_file: launch.env_file.clone(),
                    cwd: launch.cwd.clone(),
                })
            },
            (None, Some(uri)) => {
                if launch.transport == Some(TransportKind::Stdio) {
                    return Err(malformed("stdio transport declared but only a uri is set"));
                }
                ServerLaunch::Http(HttpLaunch {
                    uri: uri.to_string(),
                    headers: launch.headers.clone(),
                })
            },
        };

        Ok(Self {
            id: raw.id.clone(),
            label: raw.label.clone(),
            cache_nonce: raw.cache_nonce.clone(),
            launch,
        })
    }
}

/// A scoped, independently sourced bundle of server definitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub scope: CollectionScope,
    pub config_target: ConfigTarget,
    pub trust_behavior: TrustBehavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_authority: Option<String>,
    #[serde(default)]
    pub server_definitions: Vec<RawServerDefinition>,
}

impl Collection {
    /// Creates an empty collection; definitions are added with [`Self::with_definitions`].
    pub fn new(
        id: impl Into<String>,
        scope: CollectionScope,
        config_target: ConfigTarget,
        trust_behavior: TrustBehavior,
    ) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            scope,
            config_target,
            trust_behavior,
            remote_authority: None,
            server_definitions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_definitions(mut self, definitions: Vec<RawServerDefinition>) -> Self {
        self.server_definitions = definitions;
        self
    }

    #[must_use]
    pub fn with_remote_authority(mut self, authority: impl Into<String>) -> Self {
        self.remote_authority = Some(authority.into());
        self
    }
}

/// Caller-facing identity of an aggregated entry: `(id, sourceCollectionId)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryKey {
    pub collection_id: String,
    pub server_id: String,
}

impl EntryKey {
    pub fn new(collection_id: impl Into<String>, server_id: impl Into<String>) -> Self {
        Self { collection_id: collection_id.into(), server_id: server_id.into() }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection_id, self.server_id)
    }
}

/// One canonical, priority-resolved unit of the merged server list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedEntry {
    pub definition: ServerDefinition,
    pub source_collection_id: String,
    pub priority_rank: u32,
    pub trust_behavior: TrustBehavior,
}

impl AggregatedEntry {
    #[must_use]
    pub fn key(&self) -> EntryKey {
        EntryKey::new(&self.source_collection_id, &self.definition.id)
    }
}
