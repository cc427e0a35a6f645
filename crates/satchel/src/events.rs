// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Entry event types and the dispatch machinery behind listeners.
//!
//! Created, updated, and removed events originate as backing store change
//! notifications and are forwarded through a per-mode store subscription.
//! Expired events are detected lazily by cache operations, collected in an
//! [`EventBuffer`], and flushed through the same dispatcher after the store
//! mutation that the operation performed.

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use anyspawn::Spawner;
use parking_lot::RwLock;
use satchel_store::{StoreEvent, StoreEventKind, StoreSubscriber, WriteKind};

use crate::{
    convert::{ConverterPair, Internal},
    listener::{CacheEntryListener, ListenerConfig, ListenerId},
};

/// The kind of an entry lifecycle event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// A value was stored under a previously absent key.
    Created,
    /// An existing value was replaced.
    Updated,
    /// A value was explicitly removed.
    Removed,
    /// A value was found to be past its expiry time.
    Expired,
}

/// An entry lifecycle event as delivered to listeners.
#[derive(Clone, Debug)]
pub struct CacheEntryEvent<K, V> {
    /// What happened.
    pub kind: EventKind,
    /// The affected key.
    pub key: K,
    /// The previous value, when the listener asked for old values and the
    /// event has one (updates, removals, expiries).
    pub old_value: Option<V>,
    /// The current value, for creations and updates.
    pub value: Option<V>,
}

/// Whether a listener runs on the mutating task or on a background task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DispatchMode {
    Sync,
    Async,
}

pub(crate) struct Registration<K, V> {
    pub id: ListenerId,
    pub config: ListenerConfig,
    pub listener: Arc<dyn CacheEntryListener<K, V>>,
}

type RegistrationList<K, V> = Arc<Vec<Arc<Registration<K, V>>>>;

/// Routes entry events to registered listeners.
///
/// Listener sets are copy-on-write so that registration and deregistration
/// never block an in-flight dispatch. The spawner for asynchronous delivery
/// is created on first use and is never touched again after close.
pub(crate) struct EventDispatcher<K, V> {
    sync_listeners: RwLock<RegistrationList<K, V>>,
    async_listeners: RwLock<RegistrationList<K, V>>,
    spawner: OnceLock<Spawner>,
    closed: AtomicBool,
    next_id: AtomicU64,
}

impl<K, V> std::fmt::Debug for EventDispatcher<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("sync_listeners", &self.sync_listeners.read().len())
            .field("async_listeners", &self.async_listeners.read().len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl<K, V> EventDispatcher<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(spawner: Option<Spawner>) -> Self {
        let cell = OnceLock::new();
        if let Some(spawner) = spawner {
            // A freshly created cell accepts the first set.
            let _ = cell.set(spawner);
        }
        Self {
            sync_listeners: RwLock::new(Arc::new(Vec::new())),
            async_listeners: RwLock::new(Arc::new(Vec::new())),
            spawner: cell,
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn spawner(&self) -> &Spawner {
        self.spawner.get_or_init(Spawner::new_tokio)
    }

    /// Adds a listener to the set for `mode`. Returns the new identifier and
    /// whether the set was empty before the addition.
    pub(crate) fn add(
        &self,
        mode: DispatchMode,
        config: ListenerConfig,
        listener: Arc<dyn CacheEntryListener<K, V>>,
    ) -> (ListenerId, bool) {
        let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.list(mode).write();
        let was_empty = guard.is_empty();
        let mut list = guard.as_ref().clone();
        list.push(Arc::new(Registration { id, config, listener }));
        *guard = Arc::new(list);
        (id, was_empty)
    }

    /// Removes a listener by identifier. Returns the mode it was removed
    /// from (if found) and whether that set is now empty.
    pub(crate) fn remove(&self, id: ListenerId) -> Option<(DispatchMode, bool)> {
        for mode in [DispatchMode::Sync, DispatchMode::Async] {
            let mut guard = self.list(mode).write();
            if guard.iter().any(|reg| reg.id == id) {
                let list: Vec<_> = guard.iter().filter(|reg| reg.id != id).cloned().collect();
                let now_empty = list.is_empty();
                *guard = Arc::new(list);
                return Some((mode, now_empty));
            }
        }
        None
    }

    /// Dispatches an event to both listener sets.
    ///
    /// Used for buffered expiry events, which do not pass through a store
    /// subscription.
    pub(crate) fn dispatch(&self, event: &CacheEntryEvent<K, V>) {
        self.dispatch_to(DispatchMode::Sync, event);
        self.dispatch_to(DispatchMode::Async, event);
    }

    /// Dispatches an event to the listener set for one mode.
    pub(crate) fn dispatch_to(&self, mode: DispatchMode, event: &CacheEntryEvent<K, V>) {
        let interested: Vec<_> = self
            .list(mode)
            .read()
            .iter()
            .filter(|reg| reg.config.accepts(event.kind))
            .cloned()
            .collect();
        if interested.is_empty() {
            return;
        }
        match mode {
            DispatchMode::Sync => {
                for reg in &interested {
                    deliver(reg, event);
                }
            }
            DispatchMode::Async => {
                if self.closed.load(Ordering::Acquire) {
                    return;
                }
                let event = event.clone();
                drop(self.spawner().spawn(async move {
                    for reg in &interested {
                        deliver(reg, &event);
                    }
                }));
            }
        }
    }

    /// Stops asynchronous delivery; subsequent dispatches to the
    /// asynchronous set are dropped.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn list(&self, mode: DispatchMode) -> &RwLock<RegistrationList<K, V>> {
        match mode {
            DispatchMode::Sync => &self.sync_listeners,
            DispatchMode::Async => &self.async_listeners,
        }
    }
}

fn deliver<K, V>(reg: &Registration<K, V>, event: &CacheEntryEvent<K, V>)
where
    K: Clone,
    V: Clone,
{
    let result = if reg.config.wants_old_value() || event.old_value.is_none() {
        reg.listener.on_event(event)
    } else {
        let stripped = CacheEntryEvent {
            old_value: None,
            ..event.clone()
        };
        reg.listener.on_event(&stripped)
    };
    if let Err(error) = result {
        tracing::warn!(%error, "cache entry listener failed");
    }
}

/// Collects expiry events detected during one cache operation.
///
/// Events are flushed after the operation's store mutations, in detection
/// order.
#[derive(Debug)]
pub(crate) struct EventBuffer<K, V> {
    events: Vec<CacheEntryEvent<K, V>>,
}

impl<K, V> EventBuffer<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub(crate) fn push(&mut self, event: CacheEntryEvent<K, V>) {
        self.events.push(event);
    }

    pub(crate) fn flush(&mut self, dispatcher: &EventDispatcher<K, V>) {
        for event in self.events.drain(..) {
            dispatcher.dispatch(&event);
        }
    }
}

/// Forwards natural store mutations to one listener set as entry events.
///
/// One forwarding subscription exists per non-empty listener set; synthetic
/// mutations (access bookkeeping, lazy expiry deletions) are filtered out
/// here so listeners never see them.
pub(crate) struct ForwardingSubscriber<K, V> {
    pub dispatcher: Arc<EventDispatcher<K, V>>,
    pub mode: DispatchMode,
    pub key_converter: ConverterPair<K>,
    pub value_converter: ConverterPair<V>,
}

impl<K, V> StoreSubscriber<Internal<K>, Internal<V>> for ForwardingSubscriber<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn on_event(&self, event: &StoreEvent<Internal<K>, Internal<V>>) {
        if event.write == WriteKind::Synthetic {
            return;
        }
        let kind = match event.kind {
            StoreEventKind::Inserted => EventKind::Created,
            StoreEventKind::Updated => EventKind::Updated,
            StoreEventKind::Removed => EventKind::Removed,
        };
        let converted = convert_event(self, kind, event);
        match converted {
            Ok(event) => self.dispatcher.dispatch_to(self.mode, &event),
            Err(error) => tracing::warn!(%error, "dropping undeliverable cache entry event"),
        }
    }
}

fn convert_event<K, V>(
    forwarder: &ForwardingSubscriber<K, V>,
    kind: EventKind,
    event: &StoreEvent<Internal<K>, Internal<V>>,
) -> Result<CacheEntryEvent<K, V>, crate::Error> {
    Ok(CacheEntryEvent {
        kind,
        key: forwarder.key_converter.from_internal(&event.key)?,
        old_value: event
            .old
            .as_ref()
            .map(|sv| forwarder.value_converter.from_internal(sv.value()))
            .transpose()?,
        value: event
            .new
            .as_ref()
            .map(|sv| forwarder.value_converter.from_internal(sv.value()))
            .transpose()?,
    })
}
