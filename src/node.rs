//! Virtual nodes: immutable-by-convention descriptions of the desired output.
//!
//! A node gains a live back-reference once mounted and loses it when destroyed.
//! Cloning a node clones only its description; the clone is never live.

use crate::{
	component::{Component, Instance, Props},
	event::Handler,
	host::{BindingToken, Unit},
	place::After,
};
use hashbrown::HashMap;
use serde_json::Value;
use std::{collections::BTreeMap, rc::Rc};

#[derive(Debug)]
pub enum Node {
	Text(Text),
	Element(Element),
	Fragment(Fragment),
	Component(ComponentNode),
	Slot(Slot),
}

#[derive(Debug)]
pub struct Text {
	pub value: String,
	pub(crate) live: Option<Unit>,
}

#[derive(Debug, Default, Clone)]
pub struct ElementProps {
	pub attributes: BTreeMap<String, String>,
	/// Treated as a set when patching. Insertion order is kept only for mounting.
	pub classes: Vec<String>,
	pub styles: BTreeMap<String, String>,
	pub on: BTreeMap<String, Handler>,
}

#[derive(Debug)]
pub struct Element {
	pub tag: String,
	pub key: Option<String>,
	pub props: ElementProps,
	pub children: Vec<Node>,
	pub(crate) live: Option<LiveElement>,
}

#[derive(Debug)]
pub(crate) struct LiveElement {
	pub(crate) unit: Unit,
	pub(crate) listeners: HashMap<String, BoundListener>,
}

#[derive(Debug)]
pub(crate) struct BoundListener {
	pub(crate) handler: Handler,
	pub(crate) token: BindingToken,
}

/// A list of nodes without a container of its own. Once mounted, it refers to the container it populated.
#[derive(Debug, Default)]
pub struct Fragment {
	pub children: Vec<Node>,
	pub(crate) live: Option<Unit>,
	/// What precedes the fragment when it is placed on its own, i.e. not dissolved into a parent's child list.
	pub(crate) after: After,
}

#[derive(Debug)]
pub struct ComponentNode {
	pub component: Component,
	pub key: Option<String>,
	pub props: Props,
	/// Externally supplied content for the component's slots.
	pub children: Vec<Node>,
	pub(crate) live: Option<Rc<Instance>>,
}

/// Placeholder substituted with a component's external children (or `fallback`) during its render pass.
#[derive(Debug, Default)]
pub struct Slot {
	pub fallback: Vec<Node>,
}

pub fn text(value: impl Into<String>) -> Node {
	Node::Text(Text {
		value: value.into(),
		live: None,
	})
}

pub fn h(tag: impl Into<String>) -> Element {
	Element {
		tag: tag.into(),
		key: None,
		props: ElementProps::default(),
		children: Vec::new(),
		live: None,
	}
}

pub fn fragment<N: Into<Node>>(children: impl IntoIterator<Item = N>) -> Node {
	Node::Fragment(Fragment {
		children: children.into_iter().map(Into::into).collect(),
		live: None,
		after: After::Start,
	})
}

pub fn slot<N: Into<Node>>(fallback: impl IntoIterator<Item = N>) -> Node {
	Node::Slot(Slot {
		fallback: fallback.into_iter().map(Into::into).collect(),
	})
}

pub fn component(component: &Component) -> ComponentNode {
	ComponentNode {
		component: component.clone(),
		key: None,
		props: Props::default(),
		children: Vec::new(),
		live: None,
	}
}

impl Element {
	#[must_use]
	pub fn key(mut self, key: impl Into<String>) -> Self {
		self.key = Some(key.into());
		self
	}

	/// `class` is routed into [`Element::class`].
	#[must_use]
	pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		let name = name.into();
		if name == "class" {
			return self.class(value);
		}
		self.props.attributes.insert(name, value.into());
		self
	}

	/// Adds each whitespace-separated class in `classes`.
	#[must_use]
	pub fn class(mut self, classes: impl Into<String>) -> Self {
		for class in classes.into().split_whitespace() {
			if !self.props.classes.iter().any(|c| c == class) {
				self.props.classes.push(class.to_owned());
			}
		}
		self
	}

	#[must_use]
	pub fn style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
		self.props.styles.insert(property.into(), value.into());
		self
	}

	#[must_use]
	pub fn on(mut self, event: impl Into<String>, handler: Handler) -> Self {
		self.props.on.insert(event.into(), handler);
		self
	}

	#[must_use]
	pub fn child(mut self, child: impl Into<Node>) -> Self {
		self.children.push(child.into());
		self
	}

	#[must_use]
	pub fn children<N: Into<Node>>(mut self, children: impl IntoIterator<Item = N>) -> Self {
		self.children.extend(children.into_iter().map(Into::into));
		self
	}

	/// The element's live unit, if it is mounted.
	#[must_use]
	pub fn unit(&self) -> Option<Unit> {
		self.live.as_ref().map(|live| live.unit)
	}
}

impl ComponentNode {
	#[must_use]
	pub fn key(mut self, key: impl Into<String>) -> Self {
		self.key = Some(key.into());
		self
	}

	#[must_use]
	pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.props.data.insert(name.into(), value.into());
		self
	}

	/// Subscribes `handler` to the component's emitted event `event`. Bound handlers run in the parent's context.
	#[must_use]
	pub fn on(mut self, event: impl Into<String>, handler: Handler) -> Self {
		self.props.on.insert(event.into(), handler);
		self
	}

	#[must_use]
	pub fn child(mut self, child: impl Into<Node>) -> Self {
		self.children.push(child.into());
		self
	}

	#[must_use]
	pub fn children<N: Into<Node>>(mut self, children: impl IntoIterator<Item = N>) -> Self {
		self.children.extend(children.into_iter().map(Into::into));
		self
	}

	/// The backing instance, if this node is mounted.
	#[must_use]
	pub fn instance(&self) -> Option<&Rc<Instance>> {
		self.live.as_ref()
	}
}

impl Node {
	/// Equal-match: decides whether `other` may reuse this node's live representation.
	///
	/// Never looks at attributes, props, text or children.
	#[must_use]
	pub fn equals(&self, other: &Self) -> bool {
		match (self, other) {
			(Node::Text(_), Node::Text(_)) | (Node::Fragment(_), Node::Fragment(_)) | (Node::Slot(_), Node::Slot(_)) => true,
			(Node::Element(a), Node::Element(b)) => a.tag == b.tag && a.key == b.key,
			(Node::Component(a), Node::Component(b)) => a.component.same(&b.component) && a.key == b.key,
			_ => false,
		}
	}

	#[must_use]
	pub fn is_live(&self) -> bool {
		match self {
			Node::Text(text) => text.live.is_some(),
			Node::Element(element) => element.live.is_some(),
			Node::Fragment(fragment) => fragment.live.is_some(),
			Node::Component(component) => component.live.is_some(),
			Node::Slot(_) => false,
		}
	}

	#[must_use]
	pub fn variant_name(&self) -> &'static str {
		match self {
			Node::Text(_) => "text",
			Node::Element(_) => "element",
			Node::Fragment(_) => "fragment",
			Node::Component(_) => "component",
			Node::Slot(_) => "slot",
		}
	}

	/// The node's own child list. Empty for text nodes.
	#[must_use]
	pub fn children(&self) -> &[Node] {
		match self {
			Node::Text(_) => &[],
			Node::Element(Element { children, .. }) | Node::Fragment(Fragment { children, .. }) | Node::Component(ComponentNode { children, .. }) => children.as_slice(),
			Node::Slot(slot) => slot.fallback.as_slice(),
		}
	}

	/// The node's children with fragments dissolved into their parent's list, recursively.
	#[must_use]
	pub fn flat_children(&self) -> Vec<&Node> {
		fn flatten<'a>(nodes: &'a [Node], out: &mut Vec<&'a Node>) {
			for node in nodes {
				match node {
					Node::Fragment(fragment) => flatten(&fragment.children, out),
					other => out.push(other),
				}
			}
		}

		let mut flat = Vec::new();
		flatten(self.children(), &mut flat);
		flat
	}

	/// The live units this node currently contributes to its container, in order.
	#[must_use]
	pub fn units(&self) -> Vec<Unit> {
		let mut units = Vec::new();
		self.push_units(&mut units);
		units
	}

	pub(crate) fn push_units(&self, out: &mut Vec<Unit>) {
		match self {
			Node::Text(text) => out.extend(text.live),
			Node::Element(element) => out.extend(element.unit()),
			Node::Fragment(fragment) => {
				for child in &fragment.children {
					child.push_units(out)
				}
			}
			Node::Component(component) => {
				if let Some(instance) = &component.live {
					out.extend(instance.units())
				}
			}
			Node::Slot(_) => (),
		}
	}

	#[must_use]
	pub fn first_unit(&self) -> Option<Unit> {
		match self {
			Node::Text(text) => text.live,
			Node::Element(element) => element.unit(),
			Node::Fragment(fragment) => fragment.children.iter().find_map(Node::first_unit),
			Node::Component(component) => component.live.as_ref().and_then(|instance| instance.first_unit()),
			Node::Slot(_) => None,
		}
	}

	#[must_use]
	pub fn unit_count(&self) -> usize {
		match self {
			Node::Text(text) => text.live.iter().count(),
			Node::Element(element) => element.live.iter().count(),
			Node::Fragment(fragment) => fragment.children.iter().map(Node::unit_count).sum(),
			Node::Component(component) => component.live.as_ref().map_or(0, |instance| instance.units().len()),
			Node::Slot(_) => 0,
		}
	}
}

/// Moves live nodes out of `nodes` with fragments dissolved.
pub(crate) fn flatten_owned(nodes: Vec<Node>, out: &mut Vec<Node>) {
	for node in nodes {
		match node {
			Node::Fragment(fragment) => flatten_owned(fragment.children, out),
			other => out.push(other),
		}
	}
}

/// Collects the leaves of `nodes` with fragments dissolved, marking each fragment as populating `container`.
pub(crate) fn flatten_mut<'a>(nodes: &'a mut [Node], container: Unit, out: &mut Vec<&'a mut Node>) {
	for node in nodes {
		match node {
			Node::Fragment(fragment) => {
				fragment.live = Some(container);
				flatten_mut(&mut fragment.children, container, out)
			}
			other => out.push(other),
		}
	}
}

impl Clone for Node {
	fn clone(&self) -> Self {
		match self {
			Node::Text(text) => Node::Text(Text {
				value: text.value.clone(),
				live: None,
			}),
			Node::Element(element) => Node::Element(element.clone()),
			Node::Fragment(fragment) => Node::Fragment(Fragment {
				children: fragment.children.clone(),
				live: None,
				after: After::Start,
			}),
			Node::Component(component) => Node::Component(component.clone()),
			Node::Slot(slot) => Node::Slot(Slot {
				fallback: slot.fallback.clone(),
			}),
		}
	}
}

impl Clone for Element {
	fn clone(&self) -> Self {
		Self {
			tag: self.tag.clone(),
			key: self.key.clone(),
			props: self.props.clone(),
			children: self.children.clone(),
			live: None,
		}
	}
}

impl Clone for ComponentNode {
	fn clone(&self) -> Self {
		Self {
			component: self.component.clone(),
			key: self.key.clone(),
			props: self.props.clone(),
			children: self.children.clone(),
			live: None,
		}
	}
}

impl From<Element> for Node {
	fn from(element: Element) -> Self {
		Node::Element(element)
	}
}

impl From<ComponentNode> for Node {
	fn from(component: ComponentNode) -> Self {
		Node::Component(component)
	}
}

impl From<&str> for Node {
	fn from(value: &str) -> Self {
		text(value)
	}
}

impl From<String> for Node {
	fn from(value: String) -> Self {
		text(value)
	}
}
