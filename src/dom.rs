//! The engine handle.

use crate::{
	component::InstanceId,
	destroy::Detach,
	error::{Error, Result},
	event::EventBus,
	host::{Host, HostResult, Unit},
	node::Node,
	scheduler::{Checkpoint, Scheduler},
};
use core::{
	any::Any,
	fmt::{self, Debug, Formatter},
	future::Future,
};
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomOptions {
	/// How deep a tree (counting component boundaries) may get before the engines give up with [`Error::DepthLimit`].
	pub depth_limit: usize,
	pub checkpoint: Checkpoint,
}
impl Default for DomOptions {
	fn default() -> Self {
		Self {
			depth_limit: 1024,
			#[cfg(target_arch = "wasm32")]
			checkpoint: Checkpoint::Microtask,
			#[cfg(not(target_arch = "wasm32"))]
			checkpoint: Checkpoint::Manual,
		}
	}
}

/// Mounts, patches and destroys node trees in one live environment.
///
/// Cheap to clone. Clones share the host, the deferred task queue and the event bus.
#[derive(Clone)]
pub struct Dom(Rc<Inner>);

struct Inner {
	host: Rc<RefCell<dyn Host>>,
	scheduler: Scheduler,
	bus: EventBus,
	options: DomOptions,
	next_instance: Cell<u64>,
	app_context: RefCell<Option<Rc<dyn Any>>>,
}

impl Dom {
	#[must_use]
	pub fn new(host: Rc<RefCell<dyn Host>>) -> Self {
		Self::with_options(host, DomOptions::default())
	}

	#[must_use]
	pub fn with_options(host: Rc<RefCell<dyn Host>>, options: DomOptions) -> Self {
		Self(Rc::new(Inner {
			host,
			scheduler: Scheduler::new(options.checkpoint),
			bus: EventBus::default(),
			options,
			next_instance: Cell::new(0),
			app_context: RefCell::new(None),
		}))
	}

	#[must_use]
	pub fn host(&self) -> &Rc<RefCell<dyn Host>> {
		&self.0.host
	}

	#[must_use]
	pub fn scheduler(&self) -> &Scheduler {
		&self.0.scheduler
	}

	#[must_use]
	pub fn options(&self) -> DomOptions {
		self.0.options
	}

	/// The number of live child-to-parent event subscriptions.
	#[must_use]
	pub fn subscription_count(&self) -> usize {
		self.0.bus.len()
	}

	#[must_use]
	pub fn app_context(&self) -> Option<Rc<dyn Any>> {
		self.0.app_context.borrow().clone()
	}

	pub(crate) fn set_app_context(&self, context: Option<Rc<dyn Any>>) {
		*self.0.app_context.borrow_mut() = context;
	}

	pub(crate) fn bus(&self) -> &EventBus {
		&self.0.bus
	}

	pub(crate) fn next_instance_id(&self) -> InstanceId {
		let id = self.0.next_instance.get();
		self.0.next_instance.set(id + 1);
		InstanceId::from_raw(id)
	}

	/// Runs `f` against the host. The borrow ends before this returns.
	pub(crate) fn with_host<R>(&self, f: impl FnOnce(&mut dyn Host) -> HostResult<R>) -> Result<R> {
		let mut host = self.0.host.try_borrow_mut().map_err(|_| Error::HostBusy)?;
		Ok(f(&mut *host)?)
	}

	/// Runs deferred tasks. Only needed with [`Checkpoint::Manual`].
	pub fn flush(&self) -> usize {
		self.0.scheduler.flush()
	}

	/// See [`Scheduler::next_tick`].
	pub fn next_tick(&self) -> impl Future<Output = ()> + 'static {
		self.0.scheduler.next_tick()
	}

	/// Materializes `node` into `container`, before the child currently at `index` or appended if [`None`].
	///
	/// # Errors
	///
	/// Lifecycle misuse, slot placeholders outside a render pass, depth overflow and host failures.
	/// A failed mount may leave partial output behind.
	#[instrument(skip(self, node), fields(node = node.variant_name()))]
	pub fn mount(&self, node: &mut Node, container: Unit, index: Option<usize>) -> Result<()> {
		let after = self.after_index(container, index)?;
		self.mount_node(node, container, index, &after, None, self.0.options.depth_limit)?;
		debug!("Mounted {} unit(s).", node.unit_count());
		Ok(())
	}

	/// Removes `node`'s live representation and clears its back-references.
	///
	/// # Errors
	///
	/// [`Error::NotLive`] if `node` (or any descendant) isn't mounted.
	#[instrument(skip(self, node), fields(node = node.variant_name()))]
	pub fn destroy(&self, node: &mut Node) -> Result<()> {
		self.destroy_node(node, Detach::Yes)?;
		debug!("Destroyed.");
		Ok(())
	}

	/// Updates `old`'s live representation in `container` to match `new`, which is returned live.
	///
	/// `old` keeps its place even while it has no live units.
	///
	/// # Errors
	///
	/// [`Error::NotLive`] if `old` isn't mounted, and the errors of [`Dom::mount`].
	#[instrument(skip(self, old, new), fields(old = old.variant_name(), new = new.variant_name()))]
	pub fn patch(&self, old: Node, mut new: Node, container: Unit) -> Result<Node> {
		if !old.is_live() {
			return Err(Error::NotLive);
		}
		let (at, after) = self.placement_of(&old, container)?;
		self.patch_in_place(old, &mut new, container, at, &after, None, self.0.options.depth_limit)?;
		debug!("Patched. The result has {} unit(s).", new.unit_count());
		Ok(new)
	}
}

impl Debug for Dom {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dom")
			.field("options", &self.0.options)
			.field("scheduler", &self.0.scheduler)
			.field("subscriptions", &self.0.bus.len())
			.finish_non_exhaustive()
	}
}

/// Text content and attribute values only appear in logs with the `dangerous-logging` feature.
pub(crate) fn redact(value: &str) -> &str {
	if cfg!(feature = "dangerous-logging") {
		value
	} else {
		"[redacted]"
	}
}
