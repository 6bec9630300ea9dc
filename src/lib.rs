//! flowlens — the filter query engine and live flow view behind a
//! proxy-traffic inspection UI.
//!
//! Query text is parsed ([`filter::parse`]) into a [`Predicate`], which a
//! [`FlowView`] evaluates against a [`FlowStore`] to maintain a sorted,
//! filtered projection that follows the store's add/update/remove/reset
//! events.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use flowlens::{filter, FlowStore, FlowView, SortKey};
//!
//! let store = Rc::new(RefCell::new(FlowStore::new()));
//! let predicate = filter::parse("~m GET ~d example\\.com").unwrap();
//! let view = FlowView::new(&store, predicate, SortKey::StoreOrder);
//! assert!(view.is_empty());
//! ```

pub mod filter;
pub mod flow;
pub mod store;
pub mod view;

pub use filter::{FilterAst, FilterError, ParseError, PatternError, Predicate, compile, parse};
pub use flow::{Flow, Header, Request, Response};
pub use store::{FlowStore, SourceSnapshot, StoreEvent, SubscriptionId};
pub use view::{FlowView, SortKey, SortValue, ViewEvent};
