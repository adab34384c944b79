//! Placement of nodes that can be without live units.
//!
//! Fragments and components may render nothing and gain units later. Those units go right behind whatever precedes
//! the node, which is recorded as an [`After`] each time the node is placed and resolved against the host on demand.

use crate::{
	component::Instance,
	dom::Dom,
	error::Result,
	host::{HostError, Unit},
	node::Node,
};
use std::rc::{Rc, Weak};
use tracing::{trace, warn};

#[derive(Debug, Clone, Default)]
pub(crate) enum After {
	/// The node starts its container.
	#[default]
	Start,
	Unit(Unit),
	/// A sibling component's units, or whatever precedes that component while it has none.
	Instance(Weak<Instance>),
	/// Whatever precedes the enclosing component. Used for the start of a component's render output.
	Enclosing(Weak<Instance>),
}

impl After {
	/// What follows `node`, given that `node` follows `self`.
	pub(crate) fn past(self, node: &Node) -> Self {
		match node {
			Node::Text(text) => text.live.map_or(self, After::Unit),
			Node::Element(element) => element.unit().map_or(self, After::Unit),
			Node::Fragment(fragment) => fragment.children.iter().fold(self, After::past),
			Node::Component(component) => match &component.live {
				Some(instance) => After::Instance(Rc::downgrade(instance)),
				None => self,
			},
			Node::Slot(_) => self,
		}
	}
}

impl Dom {
	/// The container index right behind `after`.
	///
	/// [`None`] if `after` refers to something that is gone from `container`.
	pub(crate) fn index_after(&self, after: &After, container: Unit) -> Result<Option<usize>> {
		match after {
			After::Start => Ok(Some(0)),
			After::Unit(unit) => Ok(self.index_in(container, *unit)?.map(|index| index + 1)),
			After::Instance(instance) => {
				let Some(instance) = instance.upgrade() else {
					return Ok(None);
				};
				match instance.last_unit() {
					Some(last) => Ok(self.index_in(container, last)?.map(|index| index + 1)),
					None => self.index_after(&instance.after(), container),
				}
			}
			After::Enclosing(instance) => match instance.upgrade() {
				Some(instance) => self.start_of(&instance, container),
				None => Ok(None),
			},
		}
	}

	/// Where `instance`'s units start, or would start if it had any.
	pub(crate) fn start_of(&self, instance: &Instance, container: Unit) -> Result<Option<usize>> {
		match instance.first_unit() {
			Some(first) => self.index_in(container, first),
			None => self.index_after(&instance.after(), container),
		}
	}

	/// Released units count as absent.
	pub(crate) fn index_in(&self, container: Unit, unit: Unit) -> Result<Option<usize>> {
		self.with_host(|host| match host.index_of(container, unit) {
			Err(HostError::UnknownUnit(_)) => Ok(None),
			other => other,
		})
	}

	/// What currently precedes position `index` in `container`, for nodes placed from outside any tree.
	pub(crate) fn after_index(&self, container: Unit, index: Option<usize>) -> Result<After> {
		self.with_host(|host| {
			let count = host.child_count(container)?;
			let index = index.map_or(count, |index| index.min(count));
			Ok(match index.checked_sub(1) {
				Some(previous) => host.child_at(container, previous)?.map_or(After::Start, After::Unit),
				None => After::Start,
			})
		})
	}

	/// Where the top-level `node` starts in `container`, and what precedes it.
	pub(crate) fn placement_of(&self, node: &Node, container: Unit) -> Result<(usize, After)> {
		let recorded = match node {
			Node::Fragment(fragment) => Some(fragment.after.clone()),
			Node::Component(component) => component.live.as_ref().map(|instance| instance.after()),
			_ => None,
		};
		let index = match (node.first_unit(), &recorded) {
			(Some(first), _) => self.index_in(container, first)?,
			(None, Some(after)) => self.index_after(after, container)?,
			(None, None) => None,
		};
		let at = match index {
			Some(at) => at,
			None => {
				warn!("Can't locate the {} in {:?}. Appending instead.", node.variant_name(), container);
				self.with_host(|host| host.child_count(container))?
			}
		};
		trace!(at, "Located.");

		let after = match recorded {
			Some(after) => after,
			None => self.after_index(container, Some(at))?,
		};
		Ok((at, after))
	}
}
