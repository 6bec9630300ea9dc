//! The id-keyed, ordered collection of flows that live views observe.
//!
//! The store is fed by the out-of-scope transport layer: `add`, `update`,
//! `remove` and `reset` mirror the event classes the feed delivers. Every
//! mutation notifies subscribed listeners synchronously, in registration
//! order, with a read-only snapshot of the post-mutation state — listeners
//! must not call back into the store.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::flow::Flow;

/// A change the store just applied.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Add(Arc<Flow>),
    Update(Arc<Flow>),
    Remove(String),
    /// The whole list was replaced; observers should rebuild from the
    /// snapshot they were handed.
    Reset,
}

/// Read-only access to the store's state during event dispatch.
#[derive(Clone, Copy)]
pub struct SourceSnapshot<'a> {
    list: &'a [Arc<Flow>],
    positions: &'a HashMap<String, usize>,
}

impl<'a> SourceSnapshot<'a> {
    pub fn list(&self) -> &'a [Arc<Flow>] {
        self.list
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }
}

/// Handle returned by [`FlowStore::subscribe`], used to unsubscribe.
pub type SubscriptionId = u64;

/// A store listener. Receives a snapshot of the post-mutation state along
/// with the event that was applied.
pub type StoreListener = Box<dyn FnMut(SourceSnapshot<'_>, &StoreEvent)>;

/// In-memory backing collection of flows, ordered by insertion.
#[derive(Default)]
pub struct FlowStore {
    list: Vec<Arc<Flow>>,
    positions: HashMap<String, usize>,
    listeners: Vec<(SubscriptionId, StoreListener)>,
    next_subscription: SubscriptionId,
}

impl FlowStore {
    pub fn new() -> Self {
        FlowStore::default()
    }

    /// A store pre-populated with `flows`, without notifying anyone.
    pub fn with_flows(flows: Vec<Flow>) -> Self {
        let mut store = FlowStore::new();
        store.list = flows.into_iter().map(Arc::new).collect();
        store.rebuild_positions();
        store
    }

    pub fn list(&self) -> &[Arc<Flow>] {
        &self.list
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Flow>> {
        self.positions.get(id).map(|&idx| &self.list[idx])
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn snapshot(&self) -> SourceSnapshot<'_> {
        SourceSnapshot {
            list: &self.list,
            positions: &self.positions,
        }
    }

    /// Appends a flow. A flow whose id is already present is ignored.
    pub fn add(&mut self, flow: Flow) {
        if self.positions.contains_key(&flow.id) {
            trace!(id = %flow.id, "ignoring add for known flow id");
            return;
        }
        let flow = Arc::new(flow);
        self.positions.insert(flow.id.clone(), self.list.len());
        self.list.push(Arc::clone(&flow));
        self.notify(&StoreEvent::Add(flow));
    }

    /// Replaces the flow with the same id in place. Unknown ids are ignored.
    pub fn update(&mut self, flow: Flow) {
        let Some(&idx) = self.positions.get(&flow.id) else {
            trace!(id = %flow.id, "ignoring update for unknown flow id");
            return;
        };
        let flow = Arc::new(flow);
        self.list[idx] = Arc::clone(&flow);
        self.notify(&StoreEvent::Update(flow));
    }

    /// Removes the flow with the given id. Unknown ids are ignored.
    pub fn remove(&mut self, id: &str) {
        let Some(idx) = self.positions.remove(id) else {
            trace!(id, "ignoring remove for unknown flow id");
            return;
        };
        self.list.remove(idx);
        for pos in self.positions.values_mut() {
            if *pos > idx {
                *pos -= 1;
            }
        }
        self.notify(&StoreEvent::Remove(id.to_string()));
    }

    /// Replaces the whole list, as on a feed reconnect.
    pub fn reset(&mut self, flows: Vec<Flow>) {
        self.list = flows.into_iter().map(Arc::new).collect();
        self.rebuild_positions();
        self.notify(&StoreEvent::Reset);
    }

    pub fn subscribe(&mut self, listener: StoreListener) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    fn rebuild_positions(&mut self) {
        self.positions = self
            .list
            .iter()
            .enumerate()
            .map(|(idx, flow)| (flow.id.clone(), idx))
            .collect();
    }

    fn notify(&mut self, event: &StoreEvent) {
        trace!(listeners = self.listeners.len(), ?event, "store event");
        let snapshot = SourceSnapshot {
            list: &self.list,
            positions: &self.positions,
        };
        for (_, listener) in self.listeners.iter_mut() {
            listener(snapshot, event);
        }
    }
}
