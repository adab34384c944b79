//! Index-anchored sequence diffing.
//!
//! [`diff_sequence`] scans the new sequence left to right while mutating a working copy of the old one,
//! checking (in this order) for a removal, an in-place match, an addition and, as a last resort, a move.
//! Among several equal candidates the earliest remaining one is matched.

/// One step transforming the old sequence into the new one.
///
/// `original` is always an index into the old sequence.
/// `index` and `from` are positions in the working copy at the time the operation is applied,
/// so applying the operations in order to the old sequence produces the new sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
	/// The item is retained at `index`. Its content may still need patching.
	Noop { original: usize, index: usize },
	/// The item is gone. It is removed from the working copy at `index`.
	Remove { original: usize, index: usize },
	/// The new sequence's item at `index` is introduced.
	Add { index: usize },
	/// The item is retained but relocated from `from` to `index`.
	Move { original: usize, from: usize, index: usize },
}

/// Computes the operations that transform `old` into `new`.
pub fn diff_sequence<A, B>(old: &[A], new: &[B], equals: impl Fn(&A, &B) -> bool) -> Vec<Op> {
	// Original index per working slot, [`None`] for added items.
	let mut working: Vec<Option<usize>> = (0..old.len()).map(Some).collect();
	let mut ops = Vec::with_capacity(old.len().max(new.len()));

	let mut i = 0;
	while i < new.len() {
		if let Some(&Some(original)) = working.get(i) {
			if !new[i..].iter().any(|b| equals(&old[original], b)) {
				ops.push(Op::Remove { original, index: i });
				working.remove(i);
				continue;
			}
		}

		if let Some(&Some(original)) = working.get(i) {
			if equals(&old[original], &new[i]) {
				ops.push(Op::Noop { original, index: i });
				i += 1;
				continue;
			}
		}

		let candidate = working
			.iter()
			.enumerate()
			.skip(i)
			.find_map(|(from, &slot)| slot.filter(|&original| equals(&old[original], &new[i])).map(|original| (from, original)));
		match candidate {
			None => {
				ops.push(Op::Add { index: i });
				working.insert(i, None);
			}
			Some((from, original)) => {
				ops.push(Op::Move { original, from, index: i });
				let slot = working.remove(from);
				working.insert(i, slot);
			}
		}
		i += 1;
	}

	while working.len() > new.len() {
		let index = new.len();
		if let Some(original) = working.remove(index) {
			ops.push(Op::Remove { original, index });
		}
	}

	ops
}
