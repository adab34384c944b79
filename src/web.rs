//! A [`Host`] backed by the browser DOM.
//!
//! # Event listeners
//!
//! All bindings go through one common JavaScript closure. Each distinct [`Listener`] gets a bound copy of it
//! (via [***Function.prototype.bind()***](https://developer.mozilla.org/en-US/docs/Web/JavaScript/Reference/Global_Objects/Function/bind)),
//! reference-counted across the elements it is bound to and freed once the last of them unbinds it.
//!
//! Listeners that are still attached when the [`WebHost`] is dropped start throwing errors into JavaScript when invoked.

use crate::{
	event::{Event, Listener},
	host::{BindingToken, Host, HostError, HostResult, Unit},
	use_counts::{Unbalanced, UseCounts},
};
use core::fmt::{self, Debug, Formatter};
use hashbrown::HashMap;
use js_sys::{Function, Reflect};
use std::{cell::RefCell, rc::Rc};
use tracing::{error, instrument, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{CharacterData, HtmlElement};

/// Expando property each created DOM node carries its [`Unit`] in, so events can report their target.
const UNIT_PROPERTY: &str = "__ligule_unit";

type Registry = Rc<RefCell<HashMap<u32, Listener>>>;

pub struct WebHost {
	document: web_sys::Document,
	root: Unit,
	nodes: HashMap<Unit, web_sys::Node>,
	next_unit: u32,
	next_binding: u32,
	next_listener: u32,
	bindings: HashMap<BindingToken, Binding>,
	/// Keyed by listener address. The value is the registry id and the bound common handler.
	handler_handles: UseCounts<usize, (u32, Function)>,
	registry: Registry,
	common_handler: Closure<dyn Fn(JsValue, web_sys::Event)>,
}

struct Binding {
	event: String,
	listener: usize,
}

impl WebHost {
	/// Creates a host that uses `root` as its root container, creating nodes through `root`'s owner document.
	///
	/// # Errors
	///
	/// Iff `root` has no owner document.
	#[instrument]
	pub fn new(root: web_sys::Element) -> HostResult<Self> {
		let document = root.owner_document().ok_or_else(|| HostError::Native("no owner document found for the root element".to_owned()))?;

		let registry = Registry::default();
		let common_handler = {
			let registry = Rc::downgrade(&registry);
			Closure::wrap(Box::new(move |key: JsValue, event: web_sys::Event| {
				let span = trace_span!("common_handler", key = ?key, event = %event.type_());
				let _enter = span.enter();

				let Some(registry) = registry.upgrade() else {
					return warn!("Event fired after its host was dropped.");
				};
				#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
				let listener = key.as_f64().and_then(|key| registry.try_borrow().ok()?.get(&(key as u32)).cloned());
				let Some(listener) = listener else {
					return error!("Unknown listener {:?}.", key);
				};

				let mut converted = Event::new(event.type_());
				if let Some(unit) = event.current_target().and_then(|target| unit_of(&target)) {
					converted = converted.with_target(unit);
				}
				let converted = converted.with_native(Rc::new(event));

				let span = trace_span!("listener(…)");
				let _enter = span.enter();
				if let Err(error) = listener(&converted) {
					error!("Event listener failed: {:#}", error);
				}
			}) as Box<dyn Fn(JsValue, web_sys::Event)>)
		};

		let root_unit = Unit::from_raw(0);
		let root: web_sys::Node = root.into();
		tag(&root, root_unit)?;
		let mut nodes = HashMap::new();
		nodes.insert(root_unit, root);

		Ok(Self {
			document,
			root: root_unit,
			nodes,
			next_unit: 1,
			next_binding: 0,
			next_listener: 0,
			bindings: HashMap::new(),
			handler_handles: UseCounts::new(),
			registry,
			common_handler,
		})
	}

	#[must_use]
	pub fn root(&self) -> Unit {
		self.root
	}

	/// The DOM node behind `unit`.
	#[must_use]
	pub fn node(&self, unit: Unit) -> Option<&web_sys::Node> {
		self.nodes.get(&unit)
	}

	/// The number of distinct listeners currently bound to at least one element.
	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.handler_handles.len()
	}

	fn node_ref(&self, unit: Unit) -> HostResult<&web_sys::Node> {
		self.nodes.get(&unit).ok_or(HostError::UnknownUnit(unit))
	}

	fn element(&self, unit: Unit) -> HostResult<&web_sys::Element> {
		self.node_ref(unit)?.dyn_ref().ok_or(HostError::NotAnElement(unit))
	}

	fn register(&mut self, node: web_sys::Node) -> HostResult<Unit> {
		let unit = Unit::from_raw(self.next_unit);
		tag(&node, unit)?;
		self.next_unit += 1;
		self.nodes.insert(unit, node);
		Ok(unit)
	}

	fn collect_handlers(&mut self) {
		let mut registry = self.registry.borrow_mut();
		let freed = self.handler_handles.collect().map(|(id, _)| registry.remove(&id)).count();
		trace!("Freed {} event listener(s). {} remain.", freed, self.handler_handles.len());
	}
}

impl Host for WebHost {
	fn create_text(&mut self, text: &str) -> HostResult<Unit> {
		let node = self.document.create_text_node(text);
		self.register(node.into())
	}

	fn create_element(&mut self, tag: &str) -> HostResult<Unit> {
		let element = self.document.create_element(tag).map_err(native)?;
		self.register(element.into())
	}

	fn set_text(&mut self, unit: Unit, text: &str) -> HostResult<()> {
		self.node_ref(unit)?.dyn_ref::<CharacterData>().ok_or(HostError::NotText(unit))?.set_data(text);
		Ok(())
	}

	fn set_attribute(&mut self, unit: Unit, name: &str, value: &str) -> HostResult<()> {
		self.element(unit)?.set_attribute(name, value).map_err(native)
	}

	fn remove_attribute(&mut self, unit: Unit, name: &str) -> HostResult<()> {
		self.element(unit)?.remove_attribute(name).map_err(native)
	}

	fn add_class(&mut self, unit: Unit, class: &str) -> HostResult<()> {
		self.element(unit)?.class_list().add_1(class).map_err(native)
	}

	fn remove_class(&mut self, unit: Unit, class: &str) -> HostResult<()> {
		self.element(unit)?.class_list().remove_1(class).map_err(native)
	}

	fn set_style(&mut self, unit: Unit, property: &str, value: &str) -> HostResult<()> {
		let element: &HtmlElement = self.node_ref(unit)?.dyn_ref().ok_or(HostError::NotAnElement(unit))?;
		element.style().set_property(property, value).map_err(native)
	}

	fn remove_style(&mut self, unit: Unit, property: &str) -> HostResult<()> {
		let element: &HtmlElement = self.node_ref(unit)?.dyn_ref().ok_or(HostError::NotAnElement(unit))?;
		element.style().remove_property(property).map_err(native)?;
		Ok(())
	}

	#[instrument(skip(self, listener))]
	fn bind(&mut self, unit: Unit, event: &str, listener: Listener) -> HostResult<BindingToken> {
		let node = self.nodes.get(&unit).ok_or(HostError::UnknownUnit(unit))?;
		let key = Rc::as_ptr(&listener).cast::<()>() as usize;

		let registry = &self.registry;
		let next_listener = &mut self.next_listener;
		let common_handler = &self.common_handler;
		let (_, function) = self
			.handler_handles
			.acquire(key, || {
				let id = *next_listener;
				*next_listener += 1;
				registry.borrow_mut().insert(id, listener);
				(id, common_handler.as_ref().unchecked_ref::<Function>().bind1(&JsValue::UNDEFINED, &JsValue::from(id)))
			})
			.map_err(|Unbalanced| HostError::Native("too many (more than 65k) active bindings of the same listener".to_owned()))?;

		if let Err(error) = node.add_event_listener_with_callback(event, function) {
			error!("Failed to add event listener {:?}: {:?}", event, error);
			self.handler_handles.release(&key).ok();
			self.collect_handlers();
			return Err(native(error));
		}

		let token = BindingToken::from_raw(self.next_binding);
		self.next_binding += 1;
		self.bindings.insert(
			token,
			Binding {
				event: event.to_owned(),
				listener: key,
			},
		);
		Ok(token)
	}

	#[instrument(skip(self))]
	fn unbind(&mut self, unit: Unit, token: BindingToken) -> HostResult<()> {
		let binding = self.bindings.remove(&token).ok_or(HostError::UnknownBinding(token))?;
		let node = self.nodes.get(&unit).ok_or(HostError::UnknownUnit(unit))?;
		match self.handler_handles.release(&binding.listener) {
			Ok(Some((_, function))) => {
				if let Err(error) = node.remove_event_listener_with_callback(&binding.event, function) {
					error!("Failed to remove event listener {:?}: {:?}", binding.event, error);
				}
			}
			Ok(None) => return Err(HostError::UnknownBinding(token)),
			Err(Unbalanced) => return Err(HostError::Native("listener released more often than bound".to_owned())),
		}
		self.collect_handlers();
		Ok(())
	}

	#[allow(clippy::cast_possible_truncation)]
	fn child_count(&self, container: Unit) -> HostResult<usize> {
		Ok(self.node_ref(container)?.child_nodes().length() as usize)
	}

	fn index_of(&self, container: Unit, child: Unit) -> HostResult<Option<usize>> {
		let children = self.node_ref(container)?.child_nodes();
		let child = self.node_ref(child)?;
		Ok((0..children.length()).position(|i| children.get(i).map_or(false, |c| c.is_same_node(Some(child)))))
	}

	fn child_at(&self, container: Unit, index: usize) -> HostResult<Option<Unit>> {
		let Ok(index) = u32::try_from(index) else {
			return Ok(None);
		};
		Ok(self.node_ref(container)?.child_nodes().get(index).and_then(|child| unit_of(child.as_ref())))
	}

	fn insert_at(&mut self, container: Unit, unit: Unit, index: Option<usize>) -> HostResult<()> {
		let parent = self.node_ref(container)?;
		let node = self.node_ref(unit)?;
		let before = index.and_then(|index| u32::try_from(index).ok()).and_then(|index| parent.child_nodes().get(index));
		if before.as_ref().map_or(false, |before| before.is_same_node(Some(node))) {
			trace!("Inserting {:?} before itself. Nothing to do.", unit);
			return Ok(());
		}
		parent.insert_before(node, before.as_ref()).map_err(native)?;
		Ok(())
	}

	fn detach(&mut self, unit: Unit) -> HostResult<()> {
		let node = self.node_ref(unit)?;
		if let Some(parent) = node.parent_node() {
			parent.remove_child(node).map_err(native)?;
		}
		Ok(())
	}

	fn release(&mut self, unit: Unit) {
		if unit == self.root {
			return warn!("Refusing to release the root container.");
		}
		if self.nodes.remove(&unit).is_none() {
			warn!("Released unknown {:?}.", unit);
		}
	}
}

impl Debug for WebHost {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("WebHost")
			.field("root", &self.nodes.get(&self.root))
			.field("units", &self.nodes.len())
			.field("bindings", &self.bindings.len())
			.field("listeners", &self.handler_handles.len())
			.finish_non_exhaustive()
	}
}

#[allow(clippy::needless_pass_by_value)]
fn native(error: JsValue) -> HostError {
	HostError::Native(format!("{:?}", error))
}

fn tag(node: &web_sys::Node, unit: Unit) -> HostResult<()> {
	Reflect::set(node, &JsValue::from_str(UNIT_PROPERTY), &JsValue::from(unit.raw())).map_err(native)?;
	Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn unit_of(target: &JsValue) -> Option<Unit> {
	let raw = Reflect::get(target, &JsValue::from_str(UNIT_PROPERTY)).ok()?.as_f64()?;
	Some(Unit::from_raw(raw as u32))
}
