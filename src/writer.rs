//! Block Writer (C3): serialize one block buffer to a uniquely-named file,
//! refusing to ever overwrite an existing one.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::iofacade::{self, ALIGNMENT};
use crate::model::ObjectVersion;

/// Writes `buffer` as the block at `index` of `ov`. The path
/// `<storage>/<name>-<version>-<index>.dibk` is a load-bearing contract: it
/// carries the `(name, version, index)` triple redundantly with the
/// metadata store.
pub fn write_buffer(
	storage_location: &Path,
	ov: &ObjectVersion,
	index: i64,
	buffer: &[u8],
	direct_io: bool,
) -> Result<PathBuf, Error> {
	let path = block_path(storage_location, &ov.name, ov.version, index);

	// The trailing short block is exempt: its length is whatever remains of
	// the source file, which has no reason to be alignment-sized.
	let is_trailing = index == ov.number_of_blocks - 1;
	if direct_io && !is_trailing && buffer.len() % ALIGNMENT != 0 {
		return Err(Error::Misaligned {
			len: buffer.len(),
			align: ALIGNMENT,
		});
	}

	let mut file = iofacade::create_new_for_write(&path, direct_io)?;
	file.write_all(buffer)?;
	file.sync_all()?;

	Ok(path)
}

pub fn block_path(storage_location: &Path, name: &str, version: i64, index: i64) -> PathBuf {
	storage_location.join(format!("{}-{}-{}.dibk", name, version, index))
}
