use crate::host::HostError;
use thiserror::Error;

/// Errors raised synchronously by the mount, patch and destroy paths and the component lifecycle.
///
/// These indicate programming errors in host code or malformed trees and are never swallowed by the engines.
#[derive(Debug, Error)]
pub enum Error {
	#[error("component `{0}` is already mounted")]
	AlreadyMounted(String),
	#[error("component `{0}` is not mounted")]
	NotMounted(String),
	#[error("the application is already mounted")]
	AppAlreadyMounted,
	#[error("the application is not mounted")]
	AppNotMounted,
	/// A slot placeholder outside of a component render pass reached an engine.
	#[error("unresolved slot placeholder")]
	UnexpectedSlot,
	#[error("node has no live back-reference")]
	NotLive,
	#[error("depth limit ({0}) reached")]
	DepthLimit(usize),
	#[error("component-bound handler for `{0}` has no owning component")]
	NoOwner(String),
	#[error("component `{component}` does not declare the event `{event}`")]
	UndeclaredEvent { component: String, event: String },
	#[error("state updates must be JSON objects")]
	StateNotObject,
	#[error("component `{0}` was asked to re-render while it is being patched")]
	Reentrant(String),
	/// The live environment was already borrowed, e.g. by a native event fired synchronously during a host call.
	#[error("the live environment is busy")]
	HostBusy,
	#[error(transparent)]
	Host(#[from] HostError),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
