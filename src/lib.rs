//! A minimal virtual DOM with keyed reconciliation and stateful components.
//!
//! Describe the desired output as a [`Node`] tree, [`mount`](`Dom::mount`) it into a [`Host`] (the browser DOM via
//! [`WebHost`], or the in-process [`MemoryHost`]) and later [`patch`](`Dom::patch`) it against a newer description.
//! Only the differences reach the host.
//!
//! [`Component`]s carry local state and re-render when it changes.
//! Their lifecycle hooks run on a deferred [`Scheduler`], never inline with a mount or destroy.

#![doc(html_root_url = "https://docs.rs/ligule/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod app;
pub mod component;
mod destroy;
pub mod dom;
pub mod error;
pub mod event;
pub mod host;
pub mod memory;
mod mount;
pub mod node;
mod patch;
mod place;
pub mod scheduler;
pub mod sequence;
mod use_counts;
pub mod web;

pub use app::App;
pub use component::{Component, ComponentBuilder, Context, Instance, InstanceId, Props};
pub use dom::{Dom, DomOptions};
pub use error::{Error, Result};
pub use event::{Event, Handler, Listener};
pub use host::{BindingToken, Host, HostError, HostResult, Unit};
pub use memory::MemoryHost;
pub use node::{component, fragment, h, slot, text, Node};
pub use scheduler::{Checkpoint, Scheduler};
pub use web::WebHost;
