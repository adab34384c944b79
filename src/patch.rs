use crate::{
	component::Instance,
	destroy::Detach,
	dom::{redact, Dom},
	error::{Error, Result},
	host::{Host, HostResult, Unit},
	node::{flatten_mut, flatten_owned, BoundListener, ElementProps, LiveElement, Node},
	place::After,
	sequence::{diff_sequence, Op},
};
use core::mem;
use hashbrown::HashSet;
use std::rc::Rc;
use tracing::{error, instrument, trace, trace_span};

impl Dom {
	/// Patches the live `old` into `new`, which starts at container index `at` behind `after`.
	#[instrument(skip(self, old, new, after, owner), fields(old = old.variant_name(), new = new.variant_name()))]
	pub(crate) fn patch_in_place(&self, old: Node, new: &mut Node, container: Unit, at: usize, after: &After, owner: Option<&Rc<Instance>>, depth_limit: usize) -> Result<()> {
		if depth_limit == 0 {
			error!("Depth limit reached");
			return Err(Error::DepthLimit(self.options().depth_limit));
		}
		if matches!(new, Node::Slot(_)) {
			error!("Tried to patch into a slot placeholder.");
			return Err(Error::UnexpectedSlot);
		}

		// An instance that failed to re-render keeps its node but can't be patched.
		let failed = matches!(&old, Node::Component(node) if node.live.as_ref().map_or(false, |instance| instance.has_failed()));
		if failed || !old.equals(new) {
			let span = trace_span!("Replacing", at, failed);
			let _enter = span.enter();

			let mut old = old;
			self.destroy_node(&mut old, Detach::Yes)?;
			return self.mount_node(new, container, Some(at), after, owner, depth_limit);
		}

		match (old, new) {
			(Node::Text(old), Node::Text(new)) => {
				let unit = old.live.ok_or(Error::NotLive)?;
				let span = trace_span!("Patching text", ?unit, old = redact(&old.value), new = redact(&new.value));
				let _enter = span.enter();

				if old.value == new.value {
					trace!("Unchanged.");
				} else {
					self.with_host(|host| host.set_text(unit, &new.value))?;
				}
				new.live = Some(unit);
			}

			(Node::Element(old), Node::Element(new)) => {
				let mut live = old.live.ok_or(Error::NotLive)?;
				let unit = live.unit;
				let span = trace_span!("Patching element", tag = %new.tag, key = ?new.key, ?unit);
				let _enter = span.enter();

				self.with_host(|host| patch_props(host, unit, &old.props, &new.props))?;
				self.patch_listeners(&mut live, &new.props, owner)?;
				new.live = Some(live);
				self.patch_children(old.children, &mut new.children, unit, 0, &After::Start, owner, depth_limit - 1)?;
			}

			(Node::Fragment(old), Node::Fragment(new)) => {
				let span = trace_span!("Patching fragment", at, old = old.children.len(), new = new.children.len());
				let _enter = span.enter();

				old.live.ok_or(Error::NotLive)?;
				new.live = Some(container);
				new.after = after.clone();
				self.patch_children(old.children, &mut new.children, container, at, after, owner, depth_limit - 1)?;
			}

			(Node::Component(old), Node::Component(new)) => {
				let instance = old.live.ok_or(Error::NotLive)?;
				let span = trace_span!("Patching component", component = new.component.name(), key = ?new.key, at);
				let _enter = span.enter();

				instance.update_props_at(new.props.clone(), new.children.clone(), at, after.clone())?;
				new.live = Some(instance);
			}

			// Equal nodes share a variant, so only slots end up here.
			_ => {
				error!("Tried to patch a slot placeholder.");
				return Err(Error::UnexpectedSlot);
			}
		}
		Ok(())
	}

	/// Keeps bindings whose handler is unchanged. Everything else is unbound and bound anew.
	fn patch_listeners(&self, live: &mut LiveElement, new: &ElementProps, owner: Option<&Rc<Instance>>) -> Result<()> {
		let unit = live.unit;
		let mut previous = mem::take(&mut live.listeners);
		for (event, handler) in &new.on {
			match previous.remove(event) {
				Some(bound) if bound.handler.same(handler) => {
					live.listeners.insert(event.clone(), bound);
				}
				stale => {
					if let Some(stale) = stale {
						self.with_host(|host| host.unbind(unit, stale.token))?;
					}
					let listener = handler.route(event, owner)?;
					let token = self.with_host(|host| host.bind(unit, event, listener))?;
					live.listeners.insert(
						event.clone(),
						BoundListener {
							handler: handler.clone(),
							token,
						},
					);
				}
			}
		}

		if !previous.is_empty() {
			trace!("Unbinding {} removed listener(s).", previous.len());
			self.with_host(|host| {
				for (_, stale) in previous {
					host.unbind(unit, stale.token)?;
				}
				Ok(())
			})?;
		}
		Ok(())
	}

	/// Diffs the flattened child lists and applies the result to `container`, starting at index `base` behind `after`.
	///
	/// Positions are tracked with a cursor of live units placed so far, so fragments and multi-unit components
	/// among the children land at their real container indices.
	#[instrument(skip(self, old, new, after, owner))]
	fn patch_children(&self, old: Vec<Node>, new: &mut [Node], container: Unit, base: usize, after: &After, owner: Option<&Rc<Instance>>, depth_limit: usize) -> Result<()> {
		let mut old_flat = Vec::with_capacity(old.len());
		flatten_owned(old, &mut old_flat);
		let mut new_flat = Vec::with_capacity(new.len());
		flatten_mut(new, container, &mut new_flat);

		let ops = diff_sequence(&old_flat, &new_flat, |a: &Node, b: &&mut Node| a.equals(b));
		let mut old_flat: Vec<Option<Node>> = old_flat.into_iter().map(Some).collect();

		let mut cursor = base;
		let mut previous = after.clone();
		for op in ops {
			match op {
				Op::Remove { original, .. } => {
					let mut old = old_flat[original].take().ok_or(Error::NotLive)?;
					self.destroy_node(&mut old, Detach::Yes)?;
				}

				Op::Add { index } => {
					let new = &mut *new_flat[index];
					self.mount_node(new, container, Some(cursor), &previous, owner, depth_limit)?;
					cursor += new.unit_count();
					previous = previous.past(new);
				}

				Op::Move { original, index, .. } => {
					let old = old_flat[original].take().ok_or(Error::NotLive)?;
					let units = old.units();
					let span = trace_span!("Moving", units = units.len(), to = cursor);
					let _enter = span.enter();

					self.with_host(|host| {
						for (offset, &unit) in units.iter().enumerate() {
							host.insert_at(container, unit, Some(cursor + offset))?;
						}
						Ok(())
					})?;

					let new = &mut *new_flat[index];
					self.patch_in_place(old, new, container, cursor, &previous, owner, depth_limit)?;
					cursor += new.unit_count();
					previous = previous.past(new);
				}

				Op::Noop { original, index } => {
					let old = old_flat[original].take().ok_or(Error::NotLive)?;
					let new = &mut *new_flat[index];
					self.patch_in_place(old, new, container, cursor, &previous, owner, depth_limit)?;
					cursor += new.unit_count();
					previous = previous.past(new);
				}
			}
		}
		Ok(())
	}
}

/// Attributes and styles are diffed per key, classes as sets.
fn patch_props(host: &mut dyn Host, unit: Unit, old: &ElementProps, new: &ElementProps) -> HostResult<()> {
	for name in old.attributes.keys() {
		if !new.attributes.contains_key(name) {
			host.remove_attribute(unit, name)?;
		}
	}
	for (name, value) in &new.attributes {
		if old.attributes.get(name) != Some(value) {
			let span = trace_span!("Setting attribute", name = %name, value = redact(value));
			let _enter = span.enter();
			host.set_attribute(unit, name, value)?;
		}
	}

	let old_classes: HashSet<&str> = old.classes.iter().map(String::as_str).collect();
	let new_classes: HashSet<&str> = new.classes.iter().map(String::as_str).collect();
	for class in old_classes.difference(&new_classes) {
		host.remove_class(unit, class)?;
	}
	for class in &new.classes {
		if !old_classes.contains(class.as_str()) {
			host.add_class(unit, class)?;
		}
	}

	for property in old.styles.keys() {
		if !new.styles.contains_key(property) {
			host.remove_style(unit, property)?;
		}
	}
	for (property, value) in &new.styles {
		if old.styles.get(property) != Some(value) {
			host.set_style(unit, property, value)?;
		}
	}
	Ok(())
}
