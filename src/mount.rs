use crate::{
	component::Instance,
	dom::{redact, Dom},
	error::{Error, Result},
	host::{Host, HostResult, Unit},
	node::{BoundListener, ElementProps, LiveElement, Node},
	place::After,
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{error, instrument, trace_span};

impl Dom {
	/// `after` is what precedes `node` in `container`.
	///
	/// `depth_limit` counts down. Each element, fragment and component boundary uses one level.
	#[instrument(skip(self, node, after, owner), fields(node = node.variant_name()))]
	pub(crate) fn mount_node(&self, node: &mut Node, container: Unit, index: Option<usize>, after: &After, owner: Option<&Rc<Instance>>, depth_limit: usize) -> Result<()> {
		if depth_limit == 0 {
			error!("Depth limit reached");
			return Err(Error::DepthLimit(self.options().depth_limit));
		}

		match node {
			Node::Text(text) => {
				let span = trace_span!("Mounting text", value = redact(&text.value));
				let _enter = span.enter();

				let unit = self.with_host(|host| {
					let unit = host.create_text(&text.value)?;
					host.insert_at(container, unit, index)?;
					Ok(unit)
				})?;
				text.live = Some(unit);
			}

			Node::Element(element) => {
				let span = trace_span!("Mounting element", tag = %element.tag, key = ?element.key);
				let _enter = span.enter();

				let unit = self.with_host(|host| {
					let unit = host.create_element(&element.tag)?;
					apply_props(host, unit, &element.props)?;
					Ok(unit)
				})?;

				let mut listeners = HashMap::with_capacity(element.props.on.len());
				for (event, handler) in &element.props.on {
					let listener = handler.route(event, owner)?;
					let token = self.with_host(|host| host.bind(unit, event, listener))?;
					listeners.insert(
						event.clone(),
						BoundListener {
							handler: handler.clone(),
							token,
						},
					);
				}
				element.live = Some(LiveElement { unit, listeners });

				let mut previous = After::Start;
				for child in &mut element.children {
					self.mount_node(child, unit, None, &previous, owner, depth_limit - 1)?;
					previous = previous.past(child);
				}
				self.with_host(|host| host.insert_at(container, unit, index))?;
			}

			Node::Fragment(fragment) => {
				let span = trace_span!("Mounting fragment", len = fragment.children.len());
				let _enter = span.enter();

				fragment.live = Some(container);
				fragment.after = after.clone();
				let mut cursor = index;
				let mut previous = after.clone();
				for child in &mut fragment.children {
					self.mount_node(child, container, cursor, &previous, owner, depth_limit - 1)?;
					cursor = cursor.map(|cursor| cursor + child.unit_count());
					previous = previous.past(child);
				}
			}

			Node::Component(node) => {
				let span = trace_span!("Mounting component", component = node.component.name(), key = ?node.key);
				let _enter = span.enter();

				let instance = Instance::new(&node.component, node.props.clone(), node.children.clone(), self, owner, depth_limit - 1)?;
				instance.mount_after(container, index, after.clone())?;
				node.live = Some(instance);
			}

			Node::Slot(_) => {
				error!("Tried to mount a slot placeholder. Slots are only valid inside a component's render output.");
				return Err(Error::UnexpectedSlot);
			}
		}
		Ok(())
	}
}

fn apply_props(host: &mut dyn Host, unit: Unit, props: &ElementProps) -> HostResult<()> {
	for (name, value) in &props.attributes {
		let span = trace_span!("Setting attribute", name = %name, value = redact(value));
		let _enter = span.enter();
		host.set_attribute(unit, name, value)?;
	}
	for class in &props.classes {
		host.add_class(unit, class)?;
	}
	for (property, value) in &props.styles {
		host.set_style(unit, property, value)?;
	}
	Ok(())
}
