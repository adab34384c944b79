use crate::{
	dom::Dom,
	error::{Error, Result},
	host::Unit,
	node::Node,
};
use core::any::Any;
use std::rc::Rc;
use tracing::{info, instrument};

/// One root tree in one container, with an app-wide shared context for its components.
#[derive(Debug)]
pub struct App {
	dom: Dom,
	root: Option<Root>,
}

#[derive(Debug)]
struct Root {
	node: Node,
	container: Unit,
}

impl App {
	#[must_use]
	pub fn new(dom: Dom) -> Self {
		Self { dom, root: None }
	}

	/// Makes `context` available to every component through [`Context::app_context`](`crate::component::Context::app_context`).
	#[must_use]
	pub fn with_context<T: Any>(self, context: Rc<T>) -> Self {
		self.dom.set_app_context(Some(context));
		self
	}

	#[must_use]
	pub fn dom(&self) -> &Dom {
		&self.dom
	}

	#[must_use]
	pub fn root(&self) -> Option<&Node> {
		self.root.as_ref().map(|root| &root.node)
	}

	#[must_use]
	pub fn is_mounted(&self) -> bool {
		self.root.is_some()
	}

	/// # Errors
	///
	/// [`Error::AppAlreadyMounted`], or any mount error.
	#[instrument(skip(self, node))]
	pub fn mount(&mut self, node: impl Into<Node>, container: Unit) -> Result<()> {
		if self.root.is_some() {
			return Err(Error::AppAlreadyMounted);
		}
		let mut node = node.into();
		self.dom.mount(&mut node, container, None)?;
		self.root = Some(Root { node, container });
		info!("App mounted.");
		Ok(())
	}

	/// Patches the root tree into `node`.
	///
	/// # Errors
	///
	/// [`Error::AppNotMounted`], or any patch error. After a failed patch, the app is no longer mounted.
	pub fn update(&mut self, node: impl Into<Node>) -> Result<()> {
		let Root { node: old, container } = self.root.take().ok_or(Error::AppNotMounted)?;
		let node = self.dom.patch(old, node.into(), container)?;
		self.root = Some(Root { node, container });
		Ok(())
	}

	/// # Errors
	///
	/// [`Error::AppNotMounted`], or any destroy error.
	#[instrument(skip(self))]
	pub fn unmount(&mut self) -> Result<()> {
		let Root { mut node, .. } = self.root.take().ok_or(Error::AppNotMounted)?;
		self.dom.destroy(&mut node)?;
		info!("App unmounted.");
		Ok(())
	}
}
