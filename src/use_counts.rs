//! Values shared between several bindings, counted by use.

use core::hash::Hash;
use hashbrown::HashMap;
use num_traits::{CheckedAdd, CheckedSub, One, Zero};

/// Shared values keyed by identity, each with the number of bindings currently using it.
///
/// An entry whose last use is released stays until the next [`UseCounts::collect`],
/// so a listener that is unbound and bound again within one host call keeps its native function.
pub(crate) struct UseCounts<K, V, C = u16> {
	entries: HashMap<K, Entry<C, V>>,
}

struct Entry<C, V> {
	uses: C,
	value: V,
}

/// More uses than the counter can hold, or a release without a matching use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Unbalanced;

impl<K: Hash + Eq, V, C: CheckedAdd + CheckedSub + One + Zero> UseCounts<K, V, C> {
	pub(crate) fn new() -> Self {
		Self { entries: HashMap::new() }
	}

	/// Counts one more use of `key`, creating its value first if there is none.
	pub(crate) fn acquire(&mut self, key: K, create: impl FnOnce() -> V) -> Result<&V, Unbalanced> {
		let entry = self.entries.entry(key).or_insert_with(|| Entry { uses: C::zero(), value: create() });
		entry.uses = entry.uses.checked_add(&C::one()).ok_or(Unbalanced)?;
		Ok(&entry.value)
	}

	/// Counts one use less. Returns the value if `key` is known.
	pub(crate) fn release(&mut self, key: &K) -> Result<Option<&V>, Unbalanced> {
		let Some(entry) = self.entries.get_mut(key) else {
			return Ok(None);
		};
		entry.uses = entry.uses.checked_sub(&C::one()).ok_or(Unbalanced)?;
		Ok(Some(&entry.value))
	}

	/// Removes the values nothing uses anymore.
	pub(crate) fn collect(&mut self) -> impl Iterator<Item = V> + '_ {
		self.entries.extract_if(|_, entry| entry.uses.is_zero()).map(|(_, entry)| entry.value)
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}
}
