use crate::{
	dom::Dom,
	error::{Error, Result},
	node::Node,
};
use tracing::{error, instrument, trace, trace_span};

/// Whether a destroyed node's own units must be removed from their container.
///
/// Units below a detached element leave the live tree with it, so they are destroyed with [`Detach::No`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Detach {
	Yes,
	No,
}

impl Dom {
	#[instrument(skip(self, node), fields(node = node.variant_name()))]
	pub(crate) fn destroy_node(&self, node: &mut Node, detach: Detach) -> Result<()> {
		match node {
			Node::Text(text) => {
				let unit = text.live.take().ok_or(Error::NotLive)?;
				let span = trace_span!("Destroying text", ?unit);
				let _enter = span.enter();

				self.with_host(|host| {
					if detach == Detach::Yes {
						host.detach(unit)?;
					}
					host.release(unit);
					Ok(())
				})?;
			}

			Node::Element(element) => {
				let live = element.live.take().ok_or(Error::NotLive)?;
				let span = trace_span!("Destroying element", tag = %element.tag, unit = ?live.unit);
				let _enter = span.enter();

				if detach == Detach::Yes {
					self.with_host(|host| host.detach(live.unit))?;
				}
				for child in &mut element.children {
					self.destroy_node(child, Detach::No)?;
				}
				let unbound = live.listeners.len();
				self.with_host(|host| {
					for (_, listener) in live.listeners {
						host.unbind(live.unit, listener.token)?;
					}
					host.release(live.unit);
					Ok(())
				})?;
				trace!("Unbound {} listener(s).", unbound);
			}

			Node::Fragment(fragment) => {
				let span = trace_span!("Destroying fragment", len = fragment.children.len());
				let _enter = span.enter();

				// The container belongs to an ancestor and stays.
				fragment.live.take().ok_or(Error::NotLive)?;
				for child in &mut fragment.children {
					self.destroy_node(child, detach)?;
				}
			}

			Node::Component(node) => {
				let instance = node.live.take().ok_or(Error::NotLive)?;
				let span = trace_span!("Destroying component", component = node.component.name(), id = ?instance.id());
				let _enter = span.enter();

				instance.unmount_with(detach)?;
			}

			Node::Slot(_) => {
				error!("Tried to destroy a slot placeholder.");
				return Err(Error::UnexpectedSlot);
			}
		}
		Ok(())
	}

	/// Destroys whatever parts of `node` are live and skips the rest. Failures are logged, not returned.
	///
	/// For trees a failed patch left half-built.
	pub(crate) fn discard(&self, node: &mut Node) {
		let result = match node {
			Node::Text(text) => match text.live.take() {
				Some(unit) => self.with_host(|host| {
					host.detach(unit)?;
					host.release(unit);
					Ok(())
				}),
				None => Ok(()),
			},

			Node::Element(element) => match element.live.take() {
				Some(live) => {
					for child in &mut element.children {
						self.discard(child);
					}
					self.with_host(|host| {
						for (_, listener) in live.listeners {
							host.unbind(live.unit, listener.token)?;
						}
						host.detach(live.unit)?;
						host.release(live.unit);
						Ok(())
					})
				}
				None => Ok(()),
			},

			Node::Fragment(fragment) => {
				fragment.live = None;
				for child in &mut fragment.children {
					self.discard(child);
				}
				Ok(())
			}

			Node::Component(component) => match component.live.take() {
				Some(instance) if instance.is_mounted() || instance.has_failed() => instance.unmount_with(Detach::Yes),
				_ => Ok(()),
			},

			Node::Slot(_) => Ok(()),
		};
		if let Err(error) = result {
			error!("Failed to discard a {}: {}", node.variant_name(), error);
		}
	}
}
