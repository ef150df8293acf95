//! The set of contributing collections and its change notifications.
//!
//! The registry is owned by a single thread. Contributors that discover
//! definitions elsewhere post [`ContributorUpdate`]s through [`CollectionRegistry::mailbox`];
//! the owner applies them with [`CollectionRegistry::apply_pending`].

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::model::{Collection, RawServerDefinition};
use crate::ConcordiaError;

pub type SubscriptionId = u64;

/// Receiving end of a subscription. Dropping it, or passing its id to the
/// matching `unsubscribe`, ends the subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriptionId,
    receiver: Receiver<T>,
}

impl<T> Subscription<T> {
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the next queued event without blocking.
    #[must_use]
    pub fn try_next(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Takes every queued event.
    #[must_use]
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }
}

/// Fan-out list used by the registry and the engine.
#[derive(Debug)]
pub(crate) struct Subscribers<T> {
    next_id: SubscriptionId,
    senders: Vec<(SubscriptionId, Sender<T>)>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self { next_id: 0, senders: Vec::new() }
    }
}

impl<T: Clone> Subscribers<T> {
    pub(crate) fn subscribe(&mut self) -> Subscription<T> {
        let (sender, receiver) = mpsc::channel();
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.senders.push((id, sender));
        Subscription { id, receiver }
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.senders.len();
        self.senders.retain(|(existing, _)| *existing != id);
        self.senders.len() != before
    }

    /// Sends to every live subscriber and prunes the ones whose receiver is gone.
    pub(crate) fn emit(&mut self, event: &T) {
        self.senders.retain(|(_, sender)| sender.send(event.clone()).is_ok());
    }

    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    CollectionAdded(String),
    CollectionRemoved(String),
    DefinitionsChanged(String),
    DiscoveryCompleted(String),
}

impl RegistryChange {
    #[must_use]
    pub fn collection_id(&self) -> &str {
        match self {
            Self::CollectionAdded(id)
            | Self::CollectionRemoved(id)
            | Self::DefinitionsChanged(id)
            | Self::DiscoveryCompleted(id) => id,
        }
    }
}

/// A change posted by a contributor, possibly from another thread.
#[derive(Debug, Clone)]
pub enum ContributorUpdate {
    Register(Collection),
    RegisterLazy(Collection),
    Unregister(String),
    SetDefinitions { collection_id: String, definitions: Vec<RawServerDefinition> },
    CompleteDiscovery { collection_id: String, definitions: Vec<RawServerDefinition> },
}

#[derive(Debug)]
struct Slot {
    collection: Arc<Collection>,
    discovered: bool,
}

#[derive(Debug)]
pub struct CollectionRegistry {
    slots: Vec<Slot>,
    subscribers: Subscribers<RegistryChange>,
    mailbox_tx: Sender<ContributorUpdate>,
    mailbox_rx: Receiver<ContributorUpdate>,
}

impl Default for CollectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        let (mailbox_tx, mailbox_rx) = mpsc::channel();
        Self { slots: Vec::new(), subscribers: Subscribers::default(), mailbox_tx, mailbox_rx }
    }

    /// Registers a collection whose definitions are already known.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateCollection` if a collection with the same id is registered.
    pub fn register(&mut self, collection: Collection) -> Result<(), ConcordiaError> {
        self.insert(collection, true)
    }

    /// Registers a placeholder for a collection that is still being discovered.
    ///
    /// Its definitions stay out of [`Self::snapshot`] until
    /// [`Self::complete_discovery`] is called for it.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateCollection` if a collection with the same id is registered.
    pub fn register_lazy(&mut self, collection: Collection) -> Result<(), ConcordiaError> {
        self.insert(collection, false)
    }

    fn insert(&mut self, collection: Collection, discovered: bool) -> Result<(), ConcordiaError> {
        if self.position(&collection.id).is_some() {
            return Err(ConcordiaError::DuplicateCollection(collection.id));
        }

        let id = collection.id.clone();
        debug!("Registering collection '{}' (discovered: {})", id, discovered);
        self.slots.push(Slot { collection: Arc::new(collection), discovered });
        self.subscribers.emit(&RegistryChange::CollectionAdded(id));
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `UnknownCollection` if no collection has this id.
    pub fn unregister(&mut self, collection_id: &str) -> Result<(), ConcordiaError> {
        let index = self.require(collection_id)?;
        self.slots.remove(index);
        debug!("Unregistered collection '{}'", collection_id);
        self.subscribers.emit(&RegistryChange::CollectionRemoved(collection_id.to_string()));
        Ok(())
    }

    /// Replaces a collection's definition list. No notification is sent if the
    /// list is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCollection` if no collection has this id.
    pub fn set_definitions(
        &mut self,
        collection_id: &str,
        definitions: Vec<RawServerDefinition>,
    ) -> Result<(), ConcordiaError> {
        let index = self.require(collection_id)?;
        let Some(slot) = self.slots.get_mut(index) else {
            return Err(ConcordiaError::UnknownCollection(collection_id.to_string()));
        };

        if slot.collection.server_definitions == definitions {
            return Ok(());
        }

        Arc::make_mut(&mut slot.collection).server_definitions = definitions;
        self.subscribers.emit(&RegistryChange::DefinitionsChanged(collection_id.to_string()));
        Ok(())
    }

    /// Materializes a lazy collection with its discovered definitions.
    ///
    /// On an already discovered collection this behaves like [`Self::set_definitions`].
    ///
    /// # Errors
    ///
    /// Returns `UnknownCollection` if no collection has this id.
    pub fn complete_discovery(
        &mut self,
        collection_id: &str,
        definitions: Vec<RawServerDefinition>,
    ) -> Result<(), ConcordiaError> {
        let index = self.require(collection_id)?;
        let Some(slot) = self.slots.get_mut(index) else {
            return Err(ConcordiaError::UnknownCollection(collection_id.to_string()));
        };

        if slot.discovered {
            return self.set_definitions(collection_id, definitions);
        }

        Arc::make_mut(&mut slot.collection).server_definitions = definitions;
        slot.discovered = true;
        debug!("Discovery completed for collection '{}'", collection_id);
        self.subscribers.emit(&RegistryChange::DiscoveryCompleted(collection_id.to_string()));
        Ok(())
    }

    /// Applies one contributor update.
    ///
    /// # Errors
    ///
    /// Propagates the error of the underlying operation.
    pub fn apply(&mut self, update: ContributorUpdate) -> Result<(), ConcordiaError> {
        match update {
            ContributorUpdate::Register(collection) => self.register(collection),
            ContributorUpdate::RegisterLazy(collection) => self.register_lazy(collection),
            ContributorUpdate::Unregister(id) => self.unregister(&id),
            ContributorUpdate::SetDefinitions { collection_id, definitions } => {
                self.set_definitions(&collection_id, definitions)
            },
            ContributorUpdate::CompleteDiscovery { collection_id, definitions } => {
                self.complete_discovery(&collection_id, definitions)
            },
        }
    }

    /// Applies every update queued in the mailbox. A failing update is logged
    /// and skipped; the rest are still applied.
    pub fn apply_pending(&mut self) -> usize {
        let updates: Vec<ContributorUpdate> = self.mailbox_rx.try_iter().collect();
        let count = updates.len();

        for update in updates {
            if let Err(e) = self.apply(update) {
                warn!("Ignoring contributor update: {}", e);
            }
        }

        count
    }

    /// A sender contributors can clone and move to other threads.
    #[must_use]
    pub fn mailbox(&self) -> Sender<ContributorUpdate> {
        self.mailbox_tx.clone()
    }

    pub fn subscribe(&mut self) -> Subscription<RegistryChange> {
        self.subscribers.subscribe()
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Materialized collections in registration order. Lazy placeholders are
    /// left out until their discovery completes.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Collection>> {
        self.slots.iter().filter(|s| s.discovered).map(|s| Arc::clone(&s.collection)).collect()
    }

    /// Ids of collections still waiting for discovery.
    #[must_use]
    pub fn pending_discovery(&self) -> Vec<&str> {
        self.slots.iter().filter(|s| !s.discovered).map(|s| s.collection.id.as_str()).collect()
    }

    #[must_use]
    pub fn get(&self, collection_id: &str) -> Option<Arc<Collection>> {
        self.position(collection_id)
            .and_then(|i| self.slots.get(i))
            .map(|s| Arc::clone(&s.collection))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn position(&self, collection_id: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.collection.id == collection_id)
    }

    fn require(&self, collection_id: &str) -> Result<usize, ConcordiaError> {
        self.position(collection_id)
            .ok_or_else(|| ConcordiaError::UnknownCollection(collection_id.to_string()))
    }
}
