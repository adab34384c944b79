//! Stateful components.
//!
//! A [`Component`] is a shared definition. Each mount of a [`ComponentNode`](`crate::node::ComponentNode`) referencing it
//! creates an [`Instance`] that owns its props, its local state and the subtree its render function last produced.
//!
//! State and prop updates re-render and patch eagerly. There is no batching.

use crate::{
	destroy::Detach,
	dom::Dom,
	error::{Error, Result},
	event::{Event, Handler},
	host::Unit,
	node::{fragment, Node},
	place::After,
	scheduler::{TaskFuture, TaskOutput},
};
use core::{
	any::Any,
	fmt::{self, Debug, Formatter},
	future::Future,
	mem,
};
use hashbrown::HashSet;
use serde_json::{Map, Value};
use std::{
	cell::RefCell,
	collections::BTreeMap,
	rc::{Rc, Weak},
};
use tracing::{error, instrument, trace, trace_span, warn};

type StateFn = dyn Fn(&Props) -> Value;
type RenderFn = dyn Fn(&Context) -> Node;
type Hook = dyn Fn(&Context) -> TaskOutput;

/// A component definition. Clones share identity, which is what node equality compares.
#[derive(Clone)]
pub struct Component(Rc<Definition>);

struct Definition {
	name: String,
	state: Box<StateFn>,
	render: Box<RenderFn>,
	on_mounted: Option<Box<Hook>>,
	on_unmounted: Option<Box<Hook>>,
	emits: HashSet<String>,
}

impl Component {
	#[must_use]
	pub fn builder(name: impl Into<String>) -> ComponentBuilder {
		ComponentBuilder {
			name: name.into(),
			state: None,
			render: None,
			on_mounted: None,
			on_unmounted: None,
			emits: HashSet::new(),
		}
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.0.name
	}

	#[must_use]
	pub fn same(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	#[must_use]
	pub fn emits(&self, event: &str) -> bool {
		self.0.emits.contains(event)
	}
}
impl Debug for Component {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Component").field(&self.0.name).finish()
	}
}

#[must_use]
pub struct ComponentBuilder {
	name: String,
	state: Option<Box<StateFn>>,
	render: Option<Box<RenderFn>>,
	on_mounted: Option<Box<Hook>>,
	on_unmounted: Option<Box<Hook>>,
	emits: HashSet<String>,
}
impl ComponentBuilder {
	/// Computes the initial local state from the first props. Must produce a JSON object.
	pub fn state(mut self, state: impl Fn(&Props) -> Value + 'static) -> Self {
		self.state = Some(Box::new(state));
		self
	}

	pub fn render(mut self, render: impl Fn(&Context) -> Node + 'static) -> Self {
		self.render = Some(Box::new(render));
		self
	}

	/// Runs as a deferred task after the instance is mounted.
	pub fn on_mounted(mut self, hook: impl Fn(&Context) -> TaskOutput + 'static) -> Self {
		self.on_mounted = Some(Box::new(hook));
		self
	}

	pub fn on_mounted_async<F: Future<Output = anyhow::Result<()>> + 'static>(self, hook: impl Fn(Context) -> F + 'static) -> Self {
		self.on_mounted(move |context| Ok(Some(Box::pin(hook(context.clone())) as TaskFuture)))
	}

	/// Runs as a deferred task after the instance is unmounted.
	pub fn on_unmounted(mut self, hook: impl Fn(&Context) -> TaskOutput + 'static) -> Self {
		self.on_unmounted = Some(Box::new(hook));
		self
	}

	pub fn on_unmounted_async<F: Future<Output = anyhow::Result<()>> + 'static>(self, hook: impl Fn(Context) -> F + 'static) -> Self {
		self.on_unmounted(move |context| Ok(Some(Box::pin(hook(context.clone())) as TaskFuture)))
	}

	/// Declares event names this component may [`emit`](`Context::emit`).
	pub fn emits<S: Into<String>>(mut self, events: impl IntoIterator<Item = S>) -> Self {
		self.emits.extend(events.into_iter().map(Into::into));
		self
	}

	/// A component without a render function renders nothing.
	#[must_use]
	pub fn build(self) -> Component {
		Component(Rc::new(Definition {
			name: self.name,
			state: self.state.unwrap_or_else(|| Box::new(|_| Value::Object(Map::new()))),
			render: self.render.unwrap_or_else(|| Box::new(|_| fragment(Vec::<Node>::new()))),
			on_mounted: self.on_mounted,
			on_unmounted: self.on_unmounted,
			emits: self.emits,
		}))
	}
}

/// What a parent passes to a component: data, and handlers for the events the component emits.
#[derive(Debug, Default, Clone)]
pub struct Props {
	pub data: Map<String, Value>,
	pub on: BTreeMap<String, Handler>,
}
impl Props {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.data.insert(name.into(), value.into());
		self
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.data.get(name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);
impl InstanceId {
	pub(crate) const fn from_raw(raw: u64) -> Self {
		Self(raw)
	}
}

/// A live component, created when a component node is first mounted.
pub struct Instance {
	component: Component,
	dom: Dom,
	id: InstanceId,
	parent: Option<Weak<Instance>>,
	depth_limit: usize,
	state: RefCell<InstanceState>,
}

struct InstanceState {
	props: Props,
	data: Map<String, Value>,
	children: Vec<Node>,
	/// [`None`] while unmounted or while a re-render has it checked out.
	subtree: Option<Node>,
	container: Option<Unit>,
	mounted: bool,
	/// Torn down by a failed re-render, but still referenced by its parent's node.
	failed: bool,
	/// What precedes this instance's units in its container.
	after: After,
	/// Container index of the last placement. Only used if `after` can't be resolved anymore.
	anchor: usize,
	cleanups: Vec<Box<dyn FnOnce()>>,
}

impl Instance {
	pub(crate) fn new(component: &Component, props: Props, children: Vec<Node>, dom: &Dom, parent: Option<&Rc<Instance>>, depth_limit: usize) -> Result<Rc<Self>> {
		let data = match (component.0.state)(&props) {
			Value::Object(data) => data,
			other => {
				error!("Initial state of `{}` is not an object: {}", component.name(), other);
				return Err(Error::StateNotObject);
			}
		};
		let id = dom.next_instance_id();
		trace!(?id, component = component.name(), "Creating instance.");
		Ok(Rc::new(Self {
			component: component.clone(),
			dom: dom.clone(),
			id,
			parent: parent.map(Rc::downgrade),
			depth_limit,
			state: RefCell::new(InstanceState {
				props,
				data,
				children,
				subtree: None,
				container: None,
				mounted: false,
				failed: false,
				after: After::Start,
				anchor: 0,
				cleanups: Vec::new(),
			}),
		}))
	}

	#[must_use]
	pub fn id(&self) -> InstanceId {
		self.id
	}

	#[must_use]
	pub fn component(&self) -> &Component {
		&self.component
	}

	#[must_use]
	pub fn is_mounted(&self) -> bool {
		self.state.borrow().mounted
	}

	#[must_use]
	pub fn props(&self) -> Props {
		self.state.borrow().props.clone()
	}

	#[must_use]
	pub fn state(&self) -> Map<String, Value> {
		self.state.borrow().data.clone()
	}

	/// The externally supplied children, as last passed by the parent.
	#[must_use]
	pub fn children(&self) -> Vec<Node> {
		self.state.borrow().children.clone()
	}

	/// The live units of the current subtree, in order.
	#[must_use]
	pub fn units(&self) -> Vec<Unit> {
		self.state.borrow().subtree.as_ref().map(Node::units).unwrap_or_default()
	}

	#[must_use]
	pub fn first_unit(&self) -> Option<Unit> {
		self.state.borrow().subtree.as_ref().and_then(Node::first_unit)
	}

	pub(crate) fn last_unit(&self) -> Option<Unit> {
		self.units().last().copied()
	}

	pub(crate) fn after(&self) -> After {
		self.state.borrow().after.clone()
	}

	pub(crate) fn has_failed(&self) -> bool {
		self.state.borrow().failed
	}

	/// Renders and mounts into `container` at `index` (appending if [`None`]), then schedules `on_mounted`.
	///
	/// # Errors
	///
	/// [`Error::AlreadyMounted`] if this instance is mounted already.
	pub fn mount(self: &Rc<Self>, container: Unit, index: Option<usize>) -> Result<()> {
		let after = self.dom.after_index(container, index)?;
		self.mount_after(container, index, after)
	}

	#[instrument(skip(self, after), fields(component = self.component.name(), id = ?self.id))]
	pub(crate) fn mount_after(self: &Rc<Self>, container: Unit, index: Option<usize>, after: After) -> Result<()> {
		if self.state.borrow().mounted {
			return Err(Error::AlreadyMounted(self.component.name().to_owned()));
		}

		self.subscribe()?;
		let mut subtree = self.render();
		self.state.borrow_mut().after = after.clone();
		self.dom.mount_node(&mut subtree, container, index, &After::Enclosing(Rc::downgrade(self)), Some(self), self.depth_limit)?;

		let anchor = match subtree.first_unit() {
			Some(unit) => self.dom.index_in(container, unit)?,
			None => self.dom.index_after(&after, container)?,
		};
		{
			let mut state = self.state.borrow_mut();
			if let Some(anchor) = anchor.or(index) {
				state.anchor = anchor;
			}
			state.subtree = Some(subtree);
			state.container = Some(container);
			state.mounted = true;
			state.failed = false;
		}

		if self.component.0.on_mounted.is_some() {
			let instance = Rc::clone(self);
			self.dom.scheduler().schedule(format!("{}: on_mounted", self.component.name()), move || match &instance.component.0.on_mounted {
				Some(hook) => hook(&Context::new(&instance)),
				None => Ok(None),
			});
		}
		Ok(())
	}

	/// Destroys the subtree, runs cleanups, drops event subscriptions and schedules `on_unmounted`.
	///
	/// # Errors
	///
	/// [`Error::NotMounted`] if this instance isn't mounted.
	pub fn unmount(self: &Rc<Self>) -> Result<()> {
		self.unmount_with(Detach::Yes)
	}

	#[instrument(skip(self), fields(component = self.component.name(), id = ?self.id))]
	pub(crate) fn unmount_with(self: &Rc<Self>, detach: Detach) -> Result<()> {
		let (subtree, cleanups) = {
			let mut state = self.state.borrow_mut();
			if state.failed {
				trace!("Already torn down by a failed re-render.");
				state.failed = false;
				return Ok(());
			}
			if !state.mounted {
				return Err(Error::NotMounted(self.component.name().to_owned()));
			}
			if state.subtree.is_none() {
				return Err(Error::Reentrant(self.component.name().to_owned()));
			}
			state.mounted = false;
			state.container = None;
			(state.subtree.take(), mem::take(&mut state.cleanups))
		};

		if let Some(mut subtree) = subtree {
			self.dom.destroy_node(&mut subtree, detach)?;
		}
		self.finish_unmount(cleanups);
		Ok(())
	}

	/// Runs cleanups, drops event subscriptions and schedules `on_unmounted`.
	fn finish_unmount(self: &Rc<Self>, cleanups: Vec<Box<dyn FnOnce()>>) {
		for cleanup in cleanups {
			cleanup();
		}
		self.dom.bus().unsubscribe_all(self.id);

		if self.component.0.on_unmounted.is_some() {
			let instance = Rc::clone(self);
			self.dom.scheduler().schedule(format!("{}: on_unmounted", self.component.name()), move || match &instance.component.0.on_unmounted {
				Some(hook) => hook(&Context::new(&instance)),
				None => Ok(None),
			});
		}
	}

	/// Shallowly merges `patch` into the local state, then re-renders.
	///
	/// # Errors
	///
	/// [`Error::StateNotObject`] unless `patch` is a JSON object, [`Error::NotMounted`],
	/// and anything the resulting patch raises.
	pub fn update_state(self: &Rc<Self>, patch: Value) -> Result<()> {
		let Value::Object(patch) = patch else {
			return Err(Error::StateNotObject);
		};
		{
			let mut state = self.state.borrow_mut();
			if !state.mounted {
				return Err(Error::NotMounted(self.component.name().to_owned()));
			}
			for (key, value) in patch {
				state.data.insert(key, value);
			}
		}
		self.rerender(None)
	}

	/// Replaces the props and external children wholesale, then re-renders in place.
	///
	/// # Errors
	///
	/// [`Error::NotMounted`], and anything the resulting patch raises.
	pub fn update_props(self: &Rc<Self>, props: Props, children: Vec<Node>) -> Result<()> {
		self.replace_props(props, children)?;
		self.rerender(None)
	}

	/// As [`Instance::update_props`], for a parent that just placed this instance at `at` behind `after`.
	pub(crate) fn update_props_at(self: &Rc<Self>, props: Props, children: Vec<Node>, at: usize, after: After) -> Result<()> {
		self.replace_props(props, children)?;
		self.state.borrow_mut().after = after;
		self.rerender(Some(at))
	}

	fn replace_props(&self, props: Props, children: Vec<Node>) -> Result<()> {
		{
			let mut state = self.state.borrow_mut();
			if !state.mounted {
				return Err(Error::NotMounted(self.component.name().to_owned()));
			}
			state.props = props;
			state.children = children;
		}
		self.dom.bus().unsubscribe_all(self.id);
		self.subscribe()
	}

	/// Routes the parent-supplied handlers for emitted events onto the bus.
	fn subscribe(&self) -> Result<()> {
		let on = self.state.borrow().props.on.clone();
		let parent = self.parent.as_ref().and_then(Weak::upgrade);
		for (event, handler) in &on {
			if !self.component.emits(event) {
				warn!("`{}` was given a handler for `{}`, which it doesn't declare.", self.component.name(), event);
			}
			let listener = handler.route(event, parent.as_ref())?;
			self.dom.bus().subscribe(self.id, event, listener);
		}
		Ok(())
	}

	/// Calls the render function without any borrows held and resolves slots in its output.
	fn render(self: &Rc<Self>) -> Node {
		let span = trace_span!("Rendering", component = self.component.name());
		let _enter = span.enter();

		let mut subtree = (self.component.0.render)(&Context::new(self));
		let children = self.children();
		resolve_slots(&mut subtree, &children);
		subtree
	}

	#[instrument(skip(self), fields(component = self.component.name(), id = ?self.id))]
	fn rerender(self: &Rc<Self>, at: Option<usize>) -> Result<()> {
		let (container, first, anchor) = {
			let state = self.state.borrow();
			let container = state.container.ok_or_else(|| Error::NotMounted(self.component.name().to_owned()))?;
			let subtree = state.subtree.as_ref().ok_or_else(|| Error::Reentrant(self.component.name().to_owned()))?;
			(container, subtree.first_unit(), state.anchor)
		};
		let at = match at {
			Some(at) => at,
			None => {
				let found = match first {
					Some(first) => self.dom.index_in(container, first)?,
					None => self.dom.index_after(&self.after(), container)?,
				};
				found.unwrap_or_else(|| {
					warn!("Can't locate `{}` in its container. Falling back to index {}.", self.component.name(), anchor);
					anchor
				})
			}
		};

		let old = self.state.borrow_mut().subtree.take().ok_or_else(|| Error::Reentrant(self.component.name().to_owned()))?;
		let stale = old.units();
		let mut new = self.render();
		let own = After::Enclosing(Rc::downgrade(self));
		match self.dom.patch_in_place(old, &mut new, container, at, &own, Some(self), self.depth_limit) {
			Ok(()) => {
				let mut state = self.state.borrow_mut();
				state.anchor = at;
				state.subtree = Some(new);
				Ok(())
			}
			Err(error) => {
				error!("Re-rendering `{}` failed. The instance is unmounted in place: {}", self.component.name(), error);
				self.tear_down_failed(container, &stale, &mut new);
				Err(error)
			}
		}
	}

	/// Removes what a failed re-render left in `container`: `new`'s live parts and whatever of `stale` is still attached.
	fn tear_down_failed(self: &Rc<Self>, container: Unit, stale: &[Unit], new: &mut Node) {
		self.dom.discard(new);
		let detached = self.dom.with_host(|host| {
			for &unit in stale {
				if matches!(host.index_of(container, unit), Ok(Some(_))) {
					host.detach(unit)?;
					host.release(unit);
				}
			}
			Ok(())
		});
		if let Err(error) = detached {
			error!("Failed to remove stale units of `{}`: {}", self.component.name(), error);
		}

		let cleanups = {
			let mut state = self.state.borrow_mut();
			state.mounted = false;
			state.failed = true;
			state.container = None;
			mem::take(&mut state.cleanups)
		};
		self.finish_unmount(cleanups);
	}
}

impl Debug for Instance {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("Instance");
		debug.field("component", &self.component).field("id", &self.id);
		match self.state.try_borrow() {
			Ok(state) => debug.field("mounted", &state.mounted).field("state", &state.data),
			Err(_) => debug.field("state", &"<borrowed>"),
		};
		debug.finish_non_exhaustive()
	}
}

/// Replaces each slot placeholder with `external` (unless that is vacant) or its own resolved fallback.
///
/// Component nodes' children are resolved too, which forwards slot content into nested components.
/// Nested instances resolve their own slots when they render.
fn resolve_slots(node: &mut Node, external: &[Node]) {
	match node {
		Node::Slot(slot) => {
			let content = if is_vacant(external) {
				let mut fallback = mem::take(&mut slot.fallback);
				for child in &mut fallback {
					resolve_slots(child, external);
				}
				fallback
			} else {
				external.to_vec()
			};
			*node = fragment(content);
		}
		Node::Element(element) => element.children.iter_mut().for_each(|child| resolve_slots(child, external)),
		Node::Fragment(fragment) => fragment.children.iter_mut().for_each(|child| resolve_slots(child, external)),
		Node::Component(component) => component.children.iter_mut().for_each(|child| resolve_slots(child, external)),
		Node::Text(_) => (),
	}
}

/// Whether `nodes` flattens to nothing, as forwarded but empty slot content does.
fn is_vacant(nodes: &[Node]) -> bool {
	nodes.iter().all(|node| matches!(node, Node::Fragment(fragment) if is_vacant(&fragment.children)))
}

/// A component instance's view of itself, handed to render functions, bound handlers and hooks.
///
/// Holds the instance weakly. Once the instance is gone, accessors return empty values and updates fail.
#[derive(Clone)]
pub struct Context {
	instance: Weak<Instance>,
}

impl Context {
	pub(crate) fn new(instance: &Rc<Instance>) -> Self {
		Self {
			instance: Rc::downgrade(instance),
		}
	}

	/// # Errors
	///
	/// [`Error::NotMounted`] if the instance no longer exists.
	pub fn instance(&self) -> Result<Rc<Instance>> {
		self.instance.upgrade().ok_or_else(|| Error::NotMounted("<dropped>".to_owned()))
	}

	#[must_use]
	pub fn props(&self) -> Props {
		self.instance.upgrade().map(|instance| instance.props()).unwrap_or_default()
	}

	#[must_use]
	pub fn prop(&self, name: &str) -> Option<Value> {
		self.instance.upgrade()?.state.borrow().props.data.get(name).cloned()
	}

	#[must_use]
	pub fn state(&self) -> Map<String, Value> {
		self.instance.upgrade().map(|instance| instance.state()).unwrap_or_default()
	}

	/// One entry of the local state.
	#[must_use]
	pub fn get(&self, key: &str) -> Option<Value> {
		self.instance.upgrade()?.state.borrow().data.get(key).cloned()
	}

	#[must_use]
	pub fn children(&self) -> Vec<Node> {
		self.instance.upgrade().map(|instance| instance.children()).unwrap_or_default()
	}

	/// See [`Instance::update_state`].
	pub fn set_state(&self, patch: Value) -> Result<()> {
		self.instance()?.update_state(patch)
	}

	/// Invokes the parent's handler for `event`, if it supplied one.
	///
	/// # Errors
	///
	/// [`Error::UndeclaredEvent`] if the component doesn't declare `event`, and whatever the parent's handler returns.
	pub fn emit(&self, event: &str, detail: Value) -> anyhow::Result<()> {
		let instance = self.instance()?;
		if !instance.component.emits(event) {
			return Err(Error::UndeclaredEvent {
				component: instance.component.name().to_owned(),
				event: event.to_owned(),
			}
			.into());
		}
		let event = Event::new(event).with_detail(detail);
		instance.dom.bus().publish(instance.id, &event)?;
		Ok(())
	}

	/// The app-wide shared context, if one of type `T` was provided.
	#[must_use]
	pub fn app_context<T: Any>(&self) -> Option<Rc<T>> {
		self.instance.upgrade()?.dom.app_context()?.downcast().ok()
	}

	/// Registers teardown work (typically an external unsubscription) run when the instance unmounts.
	pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) {
		match self.instance.upgrade() {
			Some(instance) => instance.state.borrow_mut().cleanups.push(Box::new(cleanup)),
			None => {
				warn!("Instance is gone. Running cleanup immediately.");
				cleanup();
			}
		}
	}

	#[must_use]
	pub fn units(&self) -> Vec<Unit> {
		self.instance.upgrade().map(|instance| instance.units()).unwrap_or_default()
	}

	#[must_use]
	pub fn is_mounted(&self) -> bool {
		self.instance.upgrade().map_or(false, |instance| instance.is_mounted())
	}

	#[must_use]
	pub fn dom(&self) -> Option<Dom> {
		self.instance.upgrade().map(|instance| instance.dom.clone())
	}
}

impl Debug for Context {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self.instance.upgrade() {
			Some(instance) => f.debug_tuple("Context").field(&instance.component).field(&instance.id).finish(),
			None => f.write_str("Context(<dropped>)"),
		}
	}
}
