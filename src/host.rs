//! The live environment the engines write into.
//!
//! A [`Host`] owns the actual materialized output (browser DOM nodes, an in-memory tree, …) and hands out
//! opaque [`Unit`] handles for it. The engines only ever talk to it through this trait.

use crate::event::Listener;
use core::fmt::{self, Debug, Formatter};
use thiserror::Error;

/// Handle to one live unit (a text node or element) owned by a [`Host`].
///
/// Handles are never reused by the hosts in this crate, so a stale handle can't alias a newer unit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Unit(u32);
impl Unit {
	#[must_use]
	pub const fn from_raw(raw: u32) -> Self {
		Self(raw)
	}

	#[must_use]
	pub const fn raw(self) -> u32 {
		self.0
	}
}
impl Debug for Unit {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "Unit#{}", self.0)
	}
}

/// Opaque token returned by [`Host::bind`]. Unbinding requires the same token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingToken(u32);
impl BindingToken {
	#[must_use]
	pub const fn from_raw(raw: u32) -> Self {
		Self(raw)
	}

	#[must_use]
	pub const fn raw(self) -> u32 {
		self.0
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
	#[error("unknown live unit {0:?}")]
	UnknownUnit(Unit),
	#[error("live unit {0:?} can't have children")]
	NotAContainer(Unit),
	#[error("live unit {0:?} is not an element")]
	NotAnElement(Unit),
	#[error("live unit {0:?} is not a text unit")]
	NotText(Unit),
	#[error("unknown binding {0:?}")]
	UnknownBinding(BindingToken),
	/// A failed call into the native environment, with its debug-formatted error value.
	#[error("native call failed: {0}")]
	Native(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// The live environment capability set.
///
/// Positions are child indices within a container unit.
pub trait Host {
	fn create_text(&mut self, text: &str) -> HostResult<Unit>;
	fn create_element(&mut self, tag: &str) -> HostResult<Unit>;
	fn set_text(&mut self, unit: Unit, text: &str) -> HostResult<()>;

	fn set_attribute(&mut self, unit: Unit, name: &str, value: &str) -> HostResult<()>;
	/// Clears the attribute entirely. This is distinct from setting it to `""`.
	fn remove_attribute(&mut self, unit: Unit, name: &str) -> HostResult<()>;

	fn add_class(&mut self, unit: Unit, class: &str) -> HostResult<()>;
	fn remove_class(&mut self, unit: Unit, class: &str) -> HostResult<()>;

	fn set_style(&mut self, unit: Unit, property: &str, value: &str) -> HostResult<()>;
	fn remove_style(&mut self, unit: Unit, property: &str) -> HostResult<()>;

	fn bind(&mut self, unit: Unit, event: &str, listener: Listener) -> HostResult<BindingToken>;
	fn unbind(&mut self, unit: Unit, token: BindingToken) -> HostResult<()>;

	fn child_count(&self, container: Unit) -> HostResult<usize>;
	fn index_of(&self, container: Unit, child: Unit) -> HostResult<Option<usize>>;
	fn child_at(&self, container: Unit, index: usize) -> HostResult<Option<Unit>>;

	/// Inserts (or moves) `unit` into `container` before the child currently at `index`.
	///
	/// Appends if `index` is [`None`] or at or beyond the child count.
	/// If that child is `unit` itself, nothing happens.
	fn insert_at(&mut self, container: Unit, unit: Unit, index: Option<usize>) -> HostResult<()>;
	/// Detaches `unit` from its parent, if it has one.
	fn detach(&mut self, unit: Unit) -> HostResult<()>;
	/// Signals that the engines hold no further references to `unit`.
	fn release(&mut self, unit: Unit);
}
