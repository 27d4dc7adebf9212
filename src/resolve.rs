//! Block Resolver (C2): given a version descriptor, compute which physical
//! block represents every logical index by walking the full block history.

use crate::error::Error;
use crate::model::{Block, ObjectVersion};

/// Resolves the full block list for `ov`, i.e. the array
/// `latest[0..ov.number_of_blocks)` where `latest[i]` is the block row with
/// the largest `version <= ov.version` at `block_index == i`.
///
/// Ties are impossible: `(object_name, block_index, version)` is unique.
pub fn resolve(ov: &ObjectVersion, all: &[Block]) -> Result<Vec<Block>, Error> {
	let n = ov.number_of_blocks as usize;
	let mut latest: Vec<Option<Block>> = vec![None; n];

	for block in all {
		let is_relevant = block.version <= ov.version && (block.block_index as usize) < n;
		if !is_relevant {
			continue;
		}

		let slot = &mut latest[block.block_index as usize];
		let is_newer = match slot {
			None => true,
			Some(current) => current.version < block.version,
		};
		if is_newer {
			*slot = Some(block.clone());
		}
	}

	latest
		.into_iter()
		.enumerate()
		.map(|(i, b)| {
			b.ok_or_else(|| {
				Error::Corrupted(format!(
					"missing block {} for object `{}` at version {}",
					i, ov.name, ov.version
				))
			})
		})
		.collect()
}

/// Resolves the single winning block at `index`, considering only rows with
/// `version <= max_version`. Used by the Change Detector (C4) to find what
/// the latest stored content at an index currently is.
pub fn resolve_at(all: &[Block], index: i64, max_version: i64) -> Option<Block> {
	all.iter()
		.filter(|b| b.block_index == index && b.version <= max_version)
		.max_by_key(|b| b.version)
		.cloned()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn block(index: i64, version: i64) -> Block {
		Block {
			checksum: format!("sum-{}-{}", index, version),
			location: format!("/blocks/x-{}-{}.dibk", version, index).into(),
			block_index: index,
			version,
			object_name: "x".into(),
		}
	}

	#[test]
	fn picks_latest_version_not_latest_in_list_order() {
		let ov = ObjectVersion {
			name: "x".into(),
			version: 2,
			block_size: 1,
			number_of_blocks: 2,
		};
		let all = vec![block(0, 2), block(0, 1), block(1, 1)];
		let resolved = resolve(&ov, &all).unwrap();
		assert_eq!(resolved[0].version, 2);
		assert_eq!(resolved[1].version, 1);
	}

	#[test]
	fn ignores_rows_past_the_requested_version() {
		let ov = ObjectVersion {
			name: "x".into(),
			version: 1,
			block_size: 1,
			number_of_blocks: 1,
		};
		let all = vec![block(0, 1), block(0, 2)];
		let resolved = resolve(&ov, &all).unwrap();
		assert_eq!(resolved[0].version, 1);
	}

	#[test]
	fn missing_index_is_corrupted() {
		let ov = ObjectVersion {
			name: "x".into(),
			version: 1,
			block_size: 1,
			number_of_blocks: 2,
		};
		let all = vec![block(0, 1)];
		assert!(matches!(resolve(&ov, &all), Err(Error::Corrupted(_))));
	}

	#[test]
	fn resolve_at_respects_max_version() {
		let all = vec![block(3, 1), block(3, 2), block(3, 3)];
		let winner = resolve_at(&all, 3, 2).unwrap();
		assert_eq!(winner.version, 2);
		assert!(resolve_at(&all, 5, 2).is_none());
	}
}
