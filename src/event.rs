//! Events, the handlers node descriptions carry, and the app-scoped bus for child-to-parent events.

use crate::{
	component::{Context, Instance, InstanceId},
	error::{Error, Result},
	host::Unit,
};
use core::{
	any::Any,
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use serde_json::Value;
use std::{cell::RefCell, rc::Rc};
use tracing::{instrument, trace, warn};

/// What a [`Host`](`crate::host::Host`) binds: invoked with each matching event.
pub type Listener = Rc<dyn Fn(&Event) -> anyhow::Result<()>>;

type BoundFn = dyn Fn(&Context, &Event) -> anyhow::Result<()>;

pub struct Event {
	pub name: String,
	pub target: Option<Unit>,
	pub detail: Value,
	native: Option<Rc<dyn Any>>,
}
impl Event {
	#[must_use]
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			target: None,
			detail: Value::Null,
			native: None,
		}
	}

	#[must_use]
	pub fn with_target(mut self, target: Unit) -> Self {
		self.target = Some(target);
		self
	}

	#[must_use]
	pub fn with_detail(mut self, detail: Value) -> Self {
		self.detail = detail;
		self
	}

	/// Attaches the host's own event object, e.g. a [`web_sys::Event`].
	#[must_use]
	pub fn with_native(mut self, native: Rc<dyn Any>) -> Self {
		self.native = Some(native);
		self
	}

	/// Retrieves the host's native event object, if there is one of type `T`.
	#[must_use]
	pub fn native<T: 'static>(&self) -> Option<&T> {
		self.native.as_deref()?.downcast_ref()
	}
}
impl Debug for Event {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Event")
			.field("name", &self.name)
			.field("target", &self.target)
			.field("detail", &self.detail)
			.field("native", &self.native.is_some())
			.finish()
	}
}

/// An event handler as carried by node descriptions.
///
/// Handlers are compared by identity of the shared closure: cloning a [`Handler`] keeps it "the same" for patching,
/// while re-creating it from a closure does not.
///
/// A render function that builds its handlers inline therefore has every listener rebound on each re-render,
/// including each patch from the parent. Create the handler once (for example next to the [`Component`](`crate::Component`)
/// definition) and clone it into the render output to keep patches free of listener churn.
#[derive(Clone)]
pub struct Handler(HandlerKind);

#[derive(Clone)]
enum HandlerKind {
	Plain(Listener),
	Bound(Rc<BoundFn>),
}

impl Handler {
	pub fn new(f: impl Fn(&Event) -> anyhow::Result<()> + 'static) -> Self {
		Self(HandlerKind::Plain(Rc::new(f)))
	}

	/// A handler that runs with the [`Context`] of whichever component rendered it.
	pub fn bound(f: impl Fn(&Context, &Event) -> anyhow::Result<()> + 'static) -> Self {
		Self(HandlerKind::Bound(Rc::new(f)))
	}

	#[must_use]
	#[allow(clippy::vtable_address_comparisons)]
	pub fn same(&self, other: &Self) -> bool {
		match (&self.0, &other.0) {
			(HandlerKind::Plain(a), HandlerKind::Plain(b)) => Rc::ptr_eq(a, b),
			(HandlerKind::Bound(a), HandlerKind::Bound(b)) => Rc::ptr_eq(a, b),
			_ => false,
		}
	}

	/// Resolves this handler into something a host can bind, routing bound handlers through `owner`.
	pub(crate) fn route(&self, event: &str, owner: Option<&Rc<Instance>>) -> Result<Listener> {
		match &self.0 {
			HandlerKind::Plain(listener) => Ok(Rc::clone(listener)),
			HandlerKind::Bound(f) => {
				let owner = owner.ok_or_else(|| Error::NoOwner(event.to_owned()))?;
				let instance = Rc::downgrade(owner);
				let f = Rc::clone(f);
				Ok(Rc::new(move |event: &Event| match instance.upgrade() {
					Some(instance) => f(&Context::new(&instance), event),
					None => {
						warn!("Dropping {:?} event for a component instance that no longer exists.", event.name);
						Ok(())
					}
				}))
			}
		}
	}
}
impl Debug for Handler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match &self.0 {
			HandlerKind::Plain(listener) => write!(f, "Handler::Plain({:p})", Rc::as_ptr(listener)),
			HandlerKind::Bound(bound) => write!(f, "Handler::Bound({:p})", Rc::as_ptr(bound)),
		}
	}
}

/// Publish/subscribe channel scoped to one [`Dom`](`crate::Dom`).
///
/// Subscriptions are keyed by the emitting instance, so siblings never observe each other's events.
#[derive(Default)]
pub(crate) struct EventBus {
	subscriptions: RefCell<HashMap<InstanceId, HashMap<String, Listener>>>,
}
impl EventBus {
	pub(crate) fn subscribe(&self, emitter: InstanceId, event: &str, listener: Listener) {
		trace!(?emitter, event, "Subscribing.");
		self.subscriptions.borrow_mut().entry(emitter).or_default().insert(event.to_owned(), listener);
	}

	pub(crate) fn unsubscribe_all(&self, emitter: InstanceId) -> usize {
		let removed = self.subscriptions.borrow_mut().remove(&emitter).map_or(0, |events| events.len());
		trace!(?emitter, removed, "Unsubscribed.");
		removed
	}

	/// Returns whether there was a subscriber.
	#[instrument(skip(self, event), fields(event = %event.name))]
	pub(crate) fn publish(&self, emitter: InstanceId, event: &Event) -> anyhow::Result<bool> {
		let listener = self.subscriptions.borrow().get(&emitter).and_then(|events| events.get(&event.name)).cloned();
		match listener {
			Some(listener) => {
				listener(event)?;
				Ok(true)
			}
			None => {
				trace!("No subscriber. Ignoring.");
				Ok(false)
			}
		}
	}

	pub(crate) fn len(&self) -> usize {
		self.subscriptions.borrow().values().map(HashMap::len).sum()
	}
}
