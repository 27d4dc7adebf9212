//! Change Detector (C4): decide whether a freshly-hashed block must be
//! written, or whether it's identical to what's already stored at that
//! index in the latest prior version.

use crate::error::Error;
use crate::resolve::resolve_at;
use crate::store::Store;

/// Dedup decisions are per-`(object, index)`, not global content-addressed:
/// two different indices with identical content are stored twice. This
/// keeps resolution O(N) per version and avoids cross-object refcounting.
pub fn should_write(store: &Store, name: &str, index: i64, candidate_checksum: &str) -> Result<bool, Error> {
	if store.count_versions(name)? == 0 {
		return Ok(true);
	}

	let latest = store
		.latest_version(name)?
		.ok_or_else(|| Error::Corrupted(format!("object `{}` has versions but no latest", name)))?;

	if index >= latest.number_of_blocks {
		return Ok(true);
	}

	let at_index = store.list_blocks_at(name, index)?;
	let current = resolve_at(&at_index, index, latest.version).ok_or_else(|| {
		Error::Corrupted(format!(
			"object `{}` is missing a block row at index {} (version <= {})",
			name, index, latest.version
		))
	})?;

	Ok(current.checksum != candidate_checksum)
}
