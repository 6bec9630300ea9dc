//! Live views: sorted, filtered projections of a [`FlowStore`] that stay in
//! sync as the store changes.
//!
//! A view is created attached to its store and reacts to every store event
//! until [`FlowView::close`] detaches it. Consumers read the projection via
//! [`FlowView::ordered`] and may subscribe to incremental change events;
//! everything runs synchronously on the caller's thread, so an event has
//! been fully applied by the time the notification fires.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::filter::Predicate;
use crate::flow::Flow;
use crate::store::{FlowStore, SourceSnapshot, StoreEvent, SubscriptionId};

/// An orderable key value produced by a sort key function.
///
/// Keys are totally ordered: floats compare via `total_cmp`, and values of
/// different variants order by variant (`Int` < `Float` < `Text`). A sort
/// key function should stick to one variant for all flows.
#[derive(Debug, Clone)]
pub enum SortValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl SortValue {
    fn rank(&self) -> u8 {
        match self {
            SortValue::Int(_) => 0,
            SortValue::Float(_) => 1,
            SortValue::Text(_) => 2,
        }
    }
}

impl Ord for SortValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Int(a), SortValue::Int(b)) => a.cmp(b),
            (SortValue::Float(a), SortValue::Float(b)) => a.total_cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SortValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortValue {}

impl From<i64> for SortValue {
    fn from(value: i64) -> Self {
        SortValue::Int(value)
    }
}

impl From<f64> for SortValue {
    fn from(value: f64) -> Self {
        SortValue::Float(value)
    }
}

impl From<String> for SortValue {
    fn from(value: String) -> Self {
        SortValue::Text(value)
    }
}

impl From<&str> for SortValue {
    fn from(value: &str) -> Self {
        SortValue::Text(value.to_string())
    }
}

/// How a view orders its projection.
#[derive(Clone)]
pub enum SortKey {
    /// Keep the store's insertion order (the default).
    StoreOrder,
    /// Order by the key the function derives from each flow.
    By(Rc<dyn Fn(&Flow) -> SortValue>),
}

impl SortKey {
    pub fn by<F>(key: F) -> Self
    where
        F: Fn(&Flow) -> SortValue + 'static,
    {
        SortKey::By(Rc::new(key))
    }
}

impl fmt::Debug for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::StoreOrder => f.write_str("SortKey::StoreOrder"),
            SortKey::By(_) => f.write_str("SortKey::By(..)"),
        }
    }
}

/// Ready-made sort keys for the columns the flow table offers.
pub mod sort_keys {
    use super::{SortKey, SortValue};
    use crate::flow::Flow;

    /// Request scheme, so plaintext and TLS flows group together.
    pub fn scheme() -> SortKey {
        SortKey::by(|flow: &Flow| {
            SortValue::Text(
                flow.request
                    .as_ref()
                    .map(|req| req.scheme.clone())
                    .unwrap_or_default(),
            )
        })
    }

    /// Full display URL.
    pub fn url() -> SortKey {
        SortKey::by(|flow: &Flow| {
            SortValue::Text(
                flow.request
                    .as_ref()
                    .map(|req| req.pretty_url())
                    .unwrap_or_default(),
            )
        })
    }

    /// Request method.
    pub fn method() -> SortKey {
        SortKey::by(|flow: &Flow| {
            SortValue::Text(
                flow.request
                    .as_ref()
                    .map(|req| req.method.clone())
                    .unwrap_or_default(),
            )
        })
    }

    /// Response status code; flows without a response sort first.
    pub fn status() -> SortKey {
        SortKey::by(|flow: &Flow| {
            SortValue::Int(
                flow.response
                    .as_ref()
                    .map_or(-1, |resp| i64::from(resp.status_code)),
            )
        })
    }

    /// Combined request and response body size.
    pub fn size() -> SortKey {
        SortKey::by(|flow: &Flow| {
            let request = flow
                .request
                .as_ref()
                .and_then(|req| req.content_length)
                .unwrap_or(0);
            let response = flow
                .response
                .as_ref()
                .and_then(|resp| resp.content_length)
                .unwrap_or(0);
            SortValue::Int((request + response) as i64)
        })
    }

    /// Elapsed time from request start to response end; incomplete flows
    /// sort first.
    pub fn duration() -> SortKey {
        SortKey::by(|flow: &Flow| {
            let start = flow.request.as_ref().and_then(|req| req.timestamp_start);
            let end = flow.response.as_ref().and_then(|resp| resp.timestamp_end);
            match (start, end) {
                (Some(start), Some(end)) => SortValue::Float(end - start),
                _ => SortValue::Float(-1.0),
            }
        })
    }
}

/// An incremental change to a view's projection.
#[derive(Debug, Clone)]
pub enum ViewEvent {
    Added { flow: Arc<Flow>, index: usize },
    Updated { flow: Arc<Flow>, index: usize },
    Removed { id: String, index: usize },
    /// The projection was rebuilt from scratch; read it anew.
    Recalculated,
}

/// A view listener. Called synchronously while the change is being applied,
/// so it must not read back into the view; inspect the event itself and
/// read the view after the current store mutation returns.
pub type ViewListener = Box<dyn FnMut(&ViewEvent)>;

struct ViewInner {
    predicate: Predicate,
    sort: SortKey,
    ordered: Vec<Arc<Flow>>,
    listeners: Vec<(SubscriptionId, ViewListener)>,
    next_subscription: SubscriptionId,
    closed: bool,
}

impl ViewInner {
    fn key_of(&self, snapshot: &SourceSnapshot<'_>, flow: &Flow) -> SortValue {
        match &self.sort {
            SortKey::StoreOrder => SortValue::Int(
                snapshot
                    .index_of(&flow.id)
                    .map_or(i64::MAX, |idx| idx as i64),
            ),
            SortKey::By(key) => key(flow),
        }
    }

    /// The position at which `flow` keeps `ordered` sorted. Equal keys
    /// insert after the elements already there, so arrival order is kept.
    fn insertion_index(&self, snapshot: &SourceSnapshot<'_>, flow: &Flow) -> usize {
        let key = self.key_of(snapshot, flow);
        self.ordered
            .partition_point(|existing| self.key_of(snapshot, existing) <= key)
    }

    fn rebuild(&mut self, snapshot: &SourceSnapshot<'_>) {
        let mut ordered: Vec<Arc<Flow>> = snapshot
            .list()
            .iter()
            .filter(|flow| self.predicate.matches(flow))
            .cloned()
            .collect();
        // the filtered list is already in store order; only a custom key
        // needs sorting, and the stable sort keeps store order on ties
        if let SortKey::By(key) = &self.sort {
            ordered.sort_by(|a, b| key(a).cmp(&key(b)));
        }
        self.ordered = ordered;
        debug!(
            total = snapshot.list().len(),
            matching = self.ordered.len(),
            "view recalculated"
        );
        self.emit(&ViewEvent::Recalculated);
    }

    fn handle_event(&mut self, snapshot: &SourceSnapshot<'_>, event: &StoreEvent) {
        if self.closed {
            return;
        }
        match event {
            StoreEvent::Add(flow) => self.source_add(snapshot, Arc::clone(flow)),
            StoreEvent::Update(flow) => self.source_update(snapshot, Arc::clone(flow)),
            StoreEvent::Remove(id) => self.source_remove(id),
            StoreEvent::Reset => self.rebuild(snapshot),
        }
    }

    fn source_add(&mut self, snapshot: &SourceSnapshot<'_>, flow: Arc<Flow>) {
        if !self.predicate.matches(&flow) {
            return;
        }
        let index = self.insertion_index(snapshot, &flow);
        self.ordered.insert(index, Arc::clone(&flow));
        trace!(id = %flow.id, index, "flow entered view");
        self.emit(&ViewEvent::Added { flow, index });
    }

    fn source_update(&mut self, snapshot: &SourceSnapshot<'_>, flow: Arc<Flow>) {
        // updates skew toward recent flows, so search from the back
        let found = self.ordered.iter().rposition(|f| f.id == flow.id);
        let passes = self.predicate.matches(&flow);
        match found {
            // not projected before but passing now: plain insert
            None if passes => self.source_add(snapshot, flow),
            None => {}
            Some(index) if !passes => self.remove_at(index),
            Some(index) => {
                let old_key = self.key_of(snapshot, &self.ordered[index]);
                let new_key = self.key_of(snapshot, &flow);
                if old_key == new_key {
                    self.ordered[index] = Arc::clone(&flow);
                    self.emit(&ViewEvent::Updated { flow, index });
                } else {
                    // sort position changed: reposition as remove + add
                    self.remove_at(index);
                    self.source_add(snapshot, flow);
                }
            }
        }
    }

    fn source_remove(&mut self, id: &str) {
        if let Some(index) = self.ordered.iter().rposition(|f| f.id == id) {
            self.remove_at(index);
        }
    }

    fn remove_at(&mut self, index: usize) {
        let flow = self.ordered.remove(index);
        trace!(id = %flow.id, index, "flow left view");
        self.emit(&ViewEvent::Removed {
            id: flow.id.clone(),
            index,
        });
    }

    fn emit(&mut self, event: &ViewEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
    }
}

/// A sorted, filtered projection of a [`FlowStore`], kept up to date
/// incrementally.
///
/// The projection invariant holds after every store event: `ordered` is
/// exactly the store's flows that pass the predicate, sorted by the sort
/// key, with ties in store order. Dropping the view detaches it; so does
/// calling [`close`](FlowView::close) explicitly.
pub struct FlowView {
    store: Rc<RefCell<FlowStore>>,
    inner: Rc<RefCell<ViewInner>>,
    subscription: Option<SubscriptionId>,
}

impl FlowView {
    /// Creates a view attached to `store` with the given predicate and
    /// sort key, and builds its initial projection.
    pub fn new(store: &Rc<RefCell<FlowStore>>, predicate: Predicate, sort: SortKey) -> Self {
        let inner = Rc::new(RefCell::new(ViewInner {
            predicate,
            sort,
            ordered: Vec::new(),
            listeners: Vec::new(),
            next_subscription: 0,
            closed: false,
        }));
        {
            let source = store.borrow();
            inner.borrow_mut().rebuild(&source.snapshot());
        }
        let weak: Weak<RefCell<ViewInner>> = Rc::downgrade(&inner);
        let subscription = store.borrow_mut().subscribe(Box::new(move |snapshot, event| {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().handle_event(&snapshot, event);
            }
        }));
        FlowView {
            store: Rc::clone(store),
            inner,
            subscription: Some(subscription),
        }
    }

    /// A view that shows every flow in store order.
    pub fn with_defaults(store: &Rc<RefCell<FlowStore>>) -> Self {
        FlowView::new(store, Predicate::everything(), SortKey::StoreOrder)
    }

    /// A snapshot of the current projection, valid until the next store
    /// mutation or recalculation.
    pub fn ordered(&self) -> Vec<Arc<Flow>> {
        self.inner.borrow().ordered.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().ordered.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Arc<Flow>> {
        self.inner.borrow().ordered.get(index).cloned()
    }

    /// The currently active predicate.
    pub fn predicate(&self) -> Predicate {
        self.inner.borrow().predicate.clone()
    }

    /// The currently active sort key.
    pub fn sort_key(&self) -> SortKey {
        self.inner.borrow().sort.clone()
    }

    /// The position at which `flow` would be inserted to keep the
    /// projection sorted; ties go after existing equal-keyed flows.
    pub fn index_for(&self, flow: &Flow) -> usize {
        let source = self.store.borrow();
        self.inner.borrow().insertion_index(&source.snapshot(), flow)
    }

    /// Replaces the predicate and/or sort key (`None` keeps the current
    /// one) and rebuilds the projection from the store, emitting a single
    /// [`ViewEvent::Recalculated`]. Ignored after [`close`](Self::close).
    pub fn recalculate(&self, predicate: Option<Predicate>, sort: Option<SortKey>) {
        let source = self.store.borrow();
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return;
        }
        if let Some(predicate) = predicate {
            inner.predicate = predicate;
        }
        if let Some(sort) = sort {
            inner.sort = sort;
        }
        inner.rebuild(&source.snapshot());
    }

    pub fn subscribe(&self, listener: ViewListener) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_subscription;
        inner.next_subscription += 1;
        inner.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner
            .borrow_mut()
            .listeners
            .retain(|(listener_id, _)| *listener_id != id);
    }

    /// Detaches from the store. Terminal: subsequent store events are not
    /// delivered and the frozen projection stays readable.
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.store.borrow_mut().unsubscribe(subscription);
            let mut inner = self.inner.borrow_mut();
            inner.closed = true;
            inner.listeners.clear();
            debug!("view detached from store");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.subscription.is_none()
    }
}

impl Drop for FlowView {
    fn drop(&mut self) {
        self.close();
    }
}
