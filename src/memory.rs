//! An in-process live environment.
//!
//! [`MemoryHost`] keeps a plain tree of text units and elements. It is what headless callers and the native tests use,
//! and it can serialize its content to HTML for inspection.

use crate::{
	event::{Event, Listener},
	host::{BindingToken, Host, HostError, HostResult, Unit},
};
use core::fmt::Write as _;
use hashbrown::HashMap;
use std::{cell::RefCell, collections::BTreeMap};
use tracing::{instrument, trace, trace_span, warn};

pub struct MemoryHost {
	nodes: HashMap<Unit, MemoryNode>,
	root: Unit,
	next_unit: u32,
	next_binding: u32,
	mutations: usize,
}

struct MemoryNode {
	parent: Option<Unit>,
	kind: Kind,
}

enum Kind {
	Text(String),
	Element(MemoryElement),
}

#[derive(Default)]
struct MemoryElement {
	tag: String,
	attributes: BTreeMap<String, String>,
	classes: Vec<String>,
	styles: BTreeMap<String, String>,
	children: Vec<Unit>,
	listeners: Vec<(BindingToken, String, Listener)>,
}

impl Default for MemoryHost {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryHost {
	/// Creates a host with an empty `<root>` container.
	#[must_use]
	pub fn new() -> Self {
		let root = Unit::from_raw(0);
		let mut nodes = HashMap::new();
		nodes.insert(
			root,
			MemoryNode {
				parent: None,
				kind: Kind::Element(MemoryElement {
					tag: "root".to_owned(),
					..MemoryElement::default()
				}),
			},
		);
		Self {
			nodes,
			root,
			next_unit: 1,
			next_binding: 0,
			mutations: 0,
		}
	}

	#[must_use]
	pub fn root(&self) -> Unit {
		self.root
	}

	/// The number of mutating calls made so far.
	#[must_use]
	pub fn mutations(&self) -> usize {
		self.mutations
	}

	/// The number of currently bound listeners across all units.
	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.nodes
			.values()
			.map(|node| match &node.kind {
				Kind::Element(element) => element.listeners.len(),
				Kind::Text(_) => 0,
			})
			.sum()
	}

	/// Whether `unit` exists, i.e. was created and not yet released.
	#[must_use]
	pub fn contains(&self, unit: Unit) -> bool {
		self.nodes.contains_key(&unit)
	}

	#[must_use]
	pub fn parent(&self, unit: Unit) -> Option<Unit> {
		self.nodes.get(&unit)?.parent
	}

	#[must_use]
	pub fn children(&self, unit: Unit) -> &[Unit] {
		match self.nodes.get(&unit).map(|node| &node.kind) {
			Some(Kind::Element(element)) => element.children.as_slice(),
			_ => &[],
		}
	}

	#[must_use]
	pub fn text(&self, unit: Unit) -> Option<&str> {
		match &self.nodes.get(&unit)?.kind {
			Kind::Text(text) => Some(text),
			Kind::Element(_) => None,
		}
	}

	#[must_use]
	pub fn tag(&self, unit: Unit) -> Option<&str> {
		self.element_ref(unit).ok().map(|element| element.tag.as_str())
	}

	#[must_use]
	pub fn attribute(&self, unit: Unit, name: &str) -> Option<&str> {
		self.element_ref(unit).ok()?.attributes.get(name).map(String::as_str)
	}

	#[must_use]
	pub fn classes(&self, unit: Unit) -> Vec<&str> {
		self.element_ref(unit).map(|element| element.classes.iter().map(String::as_str).collect()).unwrap_or_default()
	}

	#[must_use]
	pub fn style(&self, unit: Unit, property: &str) -> Option<&str> {
		self.element_ref(unit).ok()?.styles.get(property).map(String::as_str)
	}

	/// Serializes `unit` and its descendants.
	///
	/// Attributes are sorted by name. Classes are listed in insertion order.
	#[must_use]
	pub fn to_html(&self, unit: Unit) -> String {
		let mut html = String::new();
		self.write_html(unit, &mut html);
		html
	}

	/// Serializes only the children of `container`.
	#[must_use]
	pub fn inner_html(&self, container: Unit) -> String {
		let mut html = String::new();
		for &child in self.children(container) {
			self.write_html(child, &mut html);
		}
		html
	}

	fn write_html(&self, unit: Unit, html: &mut String) {
		match self.nodes.get(&unit).map(|node| &node.kind) {
			None => warn!("Skipping unknown {:?} during serialization.", unit),
			Some(Kind::Text(text)) => escape_into(text, html),
			Some(Kind::Element(element)) => {
				let mut attributes: BTreeMap<&str, String> = element.attributes.iter().map(|(name, value)| (name.as_str(), value.clone())).collect();
				if !element.classes.is_empty() {
					attributes.insert("class", element.classes.join(" "));
				}
				if !element.styles.is_empty() {
					let style = element.styles.iter().map(|(property, value)| format!("{}: {};", property, value)).collect::<Vec<_>>().join(" ");
					attributes.insert("style", style);
				}

				html.push('<');
				html.push_str(&element.tag);
				for (name, value) in attributes {
					// Writing into a `String` can't fail.
					let _ = write!(html, " {}=\"", name);
					escape_into(&value, html);
					html.push('"');
				}
				html.push('>');
				for &child in &element.children {
					self.write_html(child, html);
				}
				let _ = write!(html, "</{}>", element.tag);
			}
		}
	}

	/// Invokes each listener bound to `unit` for `event`, in binding order, without holding the borrow.
	///
	/// Returns the number of listeners invoked. The first listener error aborts the dispatch.
	#[instrument(skip(host))]
	pub fn dispatch(host: &RefCell<Self>, unit: Unit, event: &str) -> anyhow::Result<usize> {
		Self::dispatch_event(host, unit, Event::new(event))
	}

	pub fn dispatch_event(host: &RefCell<Self>, unit: Unit, event: Event) -> anyhow::Result<usize> {
		let listeners: Vec<Listener> = {
			let host = host.borrow();
			let element = host.element_ref(unit)?;
			element.listeners.iter().filter(|(_, name, _)| *name == event.name).map(|(_, _, listener)| Listener::clone(listener)).collect()
		};

		let event = event.with_target(unit);
		for listener in &listeners {
			let span = trace_span!("Invoking listener", event = %event.name);
			let _enter = span.enter();
			listener(&event)?;
		}
		Ok(listeners.len())
	}

	fn node_mut(&mut self, unit: Unit) -> HostResult<&mut MemoryNode> {
		self.nodes.get_mut(&unit).ok_or(HostError::UnknownUnit(unit))
	}

	fn element_ref(&self, unit: Unit) -> HostResult<&MemoryElement> {
		match &self.nodes.get(&unit).ok_or(HostError::UnknownUnit(unit))?.kind {
			Kind::Element(element) => Ok(element),
			Kind::Text(_) => Err(HostError::NotAnElement(unit)),
		}
	}

	fn element_mut(&mut self, unit: Unit) -> HostResult<&mut MemoryElement> {
		match &mut self.node_mut(unit)?.kind {
			Kind::Element(element) => Ok(element),
			Kind::Text(_) => Err(HostError::NotAnElement(unit)),
		}
	}

	fn container_ref(&self, container: Unit) -> HostResult<&MemoryElement> {
		self.element_ref(container).map_err(|_| HostError::NotAContainer(container))
	}

	fn allocate(&mut self, kind: Kind) -> Unit {
		let unit = Unit::from_raw(self.next_unit);
		self.next_unit += 1;
		self.nodes.insert(unit, MemoryNode { parent: None, kind });
		self.mutations += 1;
		unit
	}
}

impl Host for MemoryHost {
	fn create_text(&mut self, text: &str) -> HostResult<Unit> {
		Ok(self.allocate(Kind::Text(text.to_owned())))
	}

	fn create_element(&mut self, tag: &str) -> HostResult<Unit> {
		Ok(self.allocate(Kind::Element(MemoryElement {
			tag: tag.to_owned(),
			..MemoryElement::default()
		})))
	}

	fn set_text(&mut self, unit: Unit, text: &str) -> HostResult<()> {
		match &mut self.node_mut(unit)?.kind {
			Kind::Text(data) => {
				text.clone_into(data);
				self.mutations += 1;
				Ok(())
			}
			Kind::Element(_) => Err(HostError::NotText(unit)),
		}
	}

	fn set_attribute(&mut self, unit: Unit, name: &str, value: &str) -> HostResult<()> {
		self.element_mut(unit)?.attributes.insert(name.to_owned(), value.to_owned());
		self.mutations += 1;
		Ok(())
	}

	fn remove_attribute(&mut self, unit: Unit, name: &str) -> HostResult<()> {
		self.element_mut(unit)?.attributes.remove(name);
		self.mutations += 1;
		Ok(())
	}

	fn add_class(&mut self, unit: Unit, class: &str) -> HostResult<()> {
		let element = self.element_mut(unit)?;
		if !element.classes.iter().any(|c| c == class) {
			element.classes.push(class.to_owned());
		}
		self.mutations += 1;
		Ok(())
	}

	fn remove_class(&mut self, unit: Unit, class: &str) -> HostResult<()> {
		self.element_mut(unit)?.classes.retain(|c| c != class);
		self.mutations += 1;
		Ok(())
	}

	fn set_style(&mut self, unit: Unit, property: &str, value: &str) -> HostResult<()> {
		self.element_mut(unit)?.styles.insert(property.to_owned(), value.to_owned());
		self.mutations += 1;
		Ok(())
	}

	fn remove_style(&mut self, unit: Unit, property: &str) -> HostResult<()> {
		self.element_mut(unit)?.styles.remove(property);
		self.mutations += 1;
		Ok(())
	}

	fn bind(&mut self, unit: Unit, event: &str, listener: Listener) -> HostResult<BindingToken> {
		let token = BindingToken::from_raw(self.next_binding);
		self.element_mut(unit)?.listeners.push((token, event.to_owned(), listener));
		self.next_binding += 1;
		self.mutations += 1;
		Ok(token)
	}

	fn unbind(&mut self, unit: Unit, token: BindingToken) -> HostResult<()> {
		let listeners = &mut self.element_mut(unit)?.listeners;
		let index = listeners.iter().position(|(t, _, _)| *t == token).ok_or(HostError::UnknownBinding(token))?;
		listeners.remove(index);
		self.mutations += 1;
		Ok(())
	}

	fn child_count(&self, container: Unit) -> HostResult<usize> {
		Ok(self.container_ref(container)?.children.len())
	}

	fn index_of(&self, container: Unit, child: Unit) -> HostResult<Option<usize>> {
		Ok(self.container_ref(container)?.children.iter().position(|&c| c == child))
	}

	fn child_at(&self, container: Unit, index: usize) -> HostResult<Option<Unit>> {
		Ok(self.container_ref(container)?.children.get(index).copied())
	}

	fn insert_at(&mut self, container: Unit, unit: Unit, index: Option<usize>) -> HostResult<()> {
		let children = &self.container_ref(container)?.children;
		let before = index.and_then(|index| children.get(index).copied());
		if before == Some(unit) {
			trace!("Inserting {:?} before itself. Nothing to do.", unit);
			return Ok(());
		}
		if !self.nodes.contains_key(&unit) {
			return Err(HostError::UnknownUnit(unit));
		}

		self.detach(unit)?;

		let children = &mut self.element_mut(container)?.children;
		let position = before.and_then(|before| children.iter().position(|&c| c == before)).unwrap_or(children.len());
		children.insert(position, unit);
		self.node_mut(unit)?.parent = Some(container);
		self.mutations += 1;
		Ok(())
	}

	fn detach(&mut self, unit: Unit) -> HostResult<()> {
		let parent = self.node_mut(unit)?.parent.take();
		if let Some(parent) = parent {
			if let Ok(parent) = self.element_mut(parent) {
				parent.children.retain(|&c| c != unit);
			}
			self.mutations += 1;
		}
		Ok(())
	}

	fn release(&mut self, unit: Unit) {
		if unit == self.root {
			return warn!("Refusing to release the root container.");
		}
		match self.nodes.remove(&unit) {
			Some(MemoryNode { parent: Some(parent), .. }) => {
				if let Some(MemoryNode { kind: Kind::Element(parent), .. }) = self.nodes.get_mut(&parent) {
					parent.children.retain(|&c| c != unit);
				}
			}
			Some(_) => (),
			None => warn!("Released unknown {:?}.", unit),
		}
	}
}

fn escape_into(text: &str, html: &mut String) {
	for c in text.chars() {
		match c {
			'&' => html.push_str("&amp;"),
			'<' => html.push_str("&lt;"),
			'>' => html.push_str("&gt;"),
			'"' => html.push_str("&quot;"),
			c => html.push(c),
		}
	}
}
