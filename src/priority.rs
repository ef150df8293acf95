use crate::model::{CollectionScope, ConfigTarget};

/// Distance between adjacent scope weights. Larger than any target weight so
/// scope always dominates target.
const SCOPE_STRIDE: u32 = 10;

const fn scope_weight(scope: CollectionScope) -> u32 {
    match scope {
        CollectionScope::Workspace => 4,
        CollectionScope::Profile => 3,
        CollectionScope::RemoteWorkspace => 2,
        CollectionScope::RemoteProfile => 1,
    }
}

const fn target_weight(target: ConfigTarget) -> u32 {
    match target {
        ConfigTarget::WorkspaceFolder => 6,
        ConfigTarget::Workspace => 5,
        ConfigTarget::UserRemote => 4,
        ConfigTarget::UserLocal => 3,
        ConfigTarget::User => 2,
        ConfigTarget::Default => 1,
    }
}

/// Ranks a collection by where it comes from; higher wins a duplicate.
///
/// Workspace outranks profile, which outranks anything sourced from a remote
/// host. Within a scope the more specific target wins. Every distinct
/// `(scope, target)` pair maps to a distinct rank.
#[must_use]
pub const fn priority(scope: CollectionScope, target: ConfigTarget) -> u32 {
    scope_weight(scope) * SCOPE_STRIDE + target_weight(target)
}
