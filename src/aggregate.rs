//! The merge itself: group, deduplicate and order definitions from every
//! collection into the canonical server list.
//!
//! Everything here is a pure function of its input collections. Reactive
//! recomputation and diffing live in [`crate::engine`].

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::fingerprint::{fingerprint_for, FingerprintKey};
use crate::model::{AggregatedEntry, Collection, ServerDefinition};
use crate::priority::priority;
use crate::ConcordiaError;

/// A problem with one candidate. It never stops the rest of the merge.
#[derive(Debug)]
pub struct ResolutionIssue {
    pub collection_id: String,
    pub error: ConcordiaError,
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub entries: Vec<AggregatedEntry>,
    pub issues: Vec<ResolutionIssue>,
}

#[derive(Debug)]
struct Candidate<'a> {
    collection: &'a Collection,
    rank: u32,
    definition: ServerDefinition,
}

type Partitions<'a> = BTreeMap<FingerprintKey, Vec<Candidate<'a>>>;

/// Merges the definitions of `collections` into the canonical, ordered server list.
///
/// Input order does not affect the result.
pub fn resolve<'a, I>(collections: I) -> Vec<AggregatedEntry>
where
    I: IntoIterator<Item = &'a Collection>,
{
    resolve_with_report(collections).entries
}

/// Like [`resolve`], but also reports skipped definitions and ambiguous ranks.
pub fn resolve_with_report<'a, I>(collections: I) -> Resolution
where
    I: IntoIterator<Item = &'a Collection>,
{
    let mut issues = Vec::new();
    let groups = group_candidates(collections, &mut issues);

    let mut entries: Vec<AggregatedEntry> = groups
        .into_iter()
        .flat_map(|(_, partitions)| partitions.into_values())
        .filter_map(|partition| pick_winner(partition, &mut issues))
        .collect();

    entries.sort_by(|a, b| {
        b.priority_rank
            .cmp(&a.priority_rank)
            .then_with(|| a.definition.id.cmp(&b.definition.id))
            .then_with(|| a.source_collection_id.cmp(&b.source_collection_id))
    });

    debug!("Resolved {} server(s) with {} issue(s)", entries.len(), issues.len());
    Resolution { entries, issues }
}

/// Flattens every valid definition into candidates grouped by id, then by fingerprint.
fn group_candidates<'a, I>(
    collections: I,
    issues: &mut Vec<ResolutionIssue>,
) -> BTreeMap<String, Partitions<'a>>
where
    I: IntoIterator<Item = &'a Collection>,
{
    let mut groups: BTreeMap<String, Partitions<'a>> = BTreeMap::new();

    for collection in collections {
        let rank = priority(collection.scope, collection.config_target);
        let mut seen: HashMap<&str, FingerprintKey> = HashMap::new();

        for raw in &collection.server_definitions {
            let definition = match ServerDefinition::try_from(raw) {
                Ok(def) => def,
                Err(error) => {
                    warn!("Skipping definition in collection '{}': {}", collection.id, error);
                    issues.push(ResolutionIssue { collection_id: collection.id.clone(), error });
                    continue;
                },
            };

            let key = fingerprint_for(&definition, collection.remote_authority.as_deref());

            match seen.get(raw.id.as_str()) {
                Some(existing) if *existing == key => continue,
                Some(_) => {
                    let error = ConcordiaError::DuplicateDefinition {
                        collection_id: collection.id.clone(),
                        server_id: raw.id.clone(),
                    };
                    warn!("{}; keeping the first one", error);
                    issues.push(ResolutionIssue { collection_id: collection.id.clone(), error });
                    continue;
                },
                None => {
                    seen.insert(raw.id.as_str(), key.clone());
                },
            }

            groups
                .entry(definition.id.clone())
                .or_default()
                .entry(key)
                .or_default()
                .push(Candidate { collection, rank, definition });
        }
    }

    groups
}

/// Keeps the highest-ranked candidate of identical definitions. Equal ranks
/// fall back to the lexicographically smallest collection id.
fn pick_winner(
    mut partition: Vec<Candidate<'_>>,
    issues: &mut Vec<ResolutionIssue>,
) -> Option<AggregatedEntry> {
    partition.sort_by_key(|c| (Reverse(c.rank), c.collection.id.clone()));

    let mut iter = partition.into_iter();
    let winner = iter.next()?;

    if let Some(runner_up) = iter.next() {
        if runner_up.rank == winner.rank {
            let error = ConcordiaError::AmbiguousPriority {
                server_id: winner.definition.id.clone(),
                rank: winner.rank,
                first: winner.collection.id.clone(),
                second: runner_up.collection.id.clone(),
            };
            warn!("{}", error);
            issues.push(ResolutionIssue { collection_id: winner.collection.id.clone(), error });
        }
    }

    Some(AggregatedEntry {
        source_collection_id: winner.collection.id.clone(),
        priority_rank: winner.rank,
        trust_behavior: winner.collection.trust_behavior,
        definition: winner.definition,
    })
}
