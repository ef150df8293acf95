//! Canonical equality keys for server definitions.
//!
//! The key covers the definition's `id` and its launch configuration. `label`
//! and `cache_nonce` are left out: they can change without the server itself
//! becoming a different server.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::model::{ServerDefinition, ServerLaunch};

/// Canonical serialization of a definition; equal keys mean identical servers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FingerprintKey(String);

impl FingerprintKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FingerprintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Absent optionals serialize as JSON `null`, which can never equal a quoted `""`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Canonical<'a> {
    id: &'a str,
    remote_authority: Option<&'a str>,
    launch: CanonicalLaunch<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum CanonicalLaunch<'a> {
    Stdio {
        command: &'a str,
        args: &'a [String],
        env: BTreeMap<&'a str, &'a str>,
        #[serde(rename = "envFile")]
        env_file: Option<CanonicalPath<'a>>,
        cwd: Option<CanonicalPath<'a>>,
    },
    Http {
        uri: &'a str,
        headers: &'a [(String, String)],
    },
}

/// UTF-8 paths render as strings; anything else keeps its raw bytes, which
/// render as a JSON array and so never collide with a string.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum CanonicalPath<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
}

fn canonical_path(path: Option<&Path>) -> Option<CanonicalPath<'_>> {
    path.map(|p| {
        p.to_str().map_or_else(
            || CanonicalPath::Bytes(p.as_os_str().as_encoded_bytes()),
            CanonicalPath::Text,
        )
    })
}

/// Computes the fingerprint of a definition as contributed by a local collection.
#[must_use]
pub fn fingerprint(def: &ServerDefinition) -> FingerprintKey {
    fingerprint_for(def, None)
}

/// Computes the fingerprint of a definition contributed from `remote_authority`.
///
/// The same launch configuration on a different host is a different server,
/// so the authority is part of the key.
#[must_use]
pub fn fingerprint_for(def: &ServerDefinition, remote_authority: Option<&str>) -> FingerprintKey {
    let launch = match &def.launch {
        ServerLaunch::Stdio(stdio) => CanonicalLaunch::Stdio {
            command: &stdio.command,
            args: &stdio.args,
            env: stdio.env.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
            env_file: canonical_path(stdio.env_file.as_deref()),
            cwd: canonical_path(stdio.cwd.as_deref()),
        },
        ServerLaunch::Http(http) => CanonicalLaunch::Http { uri: &http.uri, headers: &http.headers },
    };

    let canonical = Canonical { id: &def.id, remote_authority, launch };

    // Serializing string-keyed maps and plain strings cannot fail; Debug output
    // is just as deterministic if it ever does.
    let text = serde_json::to_string(&canonical).unwrap_or_else(|_| format!("{canonical:?}"));
    FingerprintKey(text)
}
