//! Save Coordinator (C6) and Retrieve Coordinator (C7): the two top-level
//! operations that drive the rest of the engine.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::Configuration;
use crate::error::Error;
use crate::iofacade;
use crate::model::{Block, ObjectVersion};
use crate::pipeline;
use crate::resolve;
use crate::store::Store;

/// Saves `input_path` as a new version of object `name`, writing only the
/// blocks that changed since the latest prior version.
pub async fn save(
	store: Arc<Store>,
	config: &Configuration,
	name: &str,
	input_path: &Path,
	mb_per_block: i64,
) -> Result<ObjectVersion, Error> {
	if mb_per_block <= 0 {
		return Err(Error::message("block size must be positive"));
	}
	let block_size = mb_per_block
		.checked_mul(1024 * 1024)
		.ok_or_else(|| Error::message("block size overflow"))?;

	let previous = store.latest_version(name)?;
	let version = match &previous {
		Some(prev) => {
			if prev.block_size != block_size {
				return Err(Error::BlockSizeMismatch {
					name: name.to_string(),
					expected: prev.block_size,
					given: block_size,
				});
			}
			prev.version + 1
		}
		None => 1,
	};

	let source = iofacade::open_for_read(input_path, config.is_direct_io_enabled)?;
	let file_len = source.metadata()?.len();
	let number_of_blocks = ceil_div(file_len, block_size as u64) as i64;

	let ov = ObjectVersion {
		name: name.to_string(),
		version,
		block_size,
		number_of_blocks,
	};

	info!(
		object = name,
		version,
		number_of_blocks,
		size = file_len,
		"saving object"
	);

	let results = pipeline::run(
		source,
		ov.clone(),
		Arc::clone(&store),
		config.storage_location.clone(),
		config.is_direct_io_enabled,
	)
	.await?;

	store.insert_version(&ov)?;

	let mut tx = store.begin()?;
	for r in &results {
		if r.is_new {
			let location = r
				.path
				.clone()
				.ok_or_else(|| Error::message("new block result is missing its path"))?;
			tx.insert_block(&Block {
				checksum: r.checksum.clone(),
				location,
				block_index: r.block_number,
				version: ov.version,
				object_name: ov.name.clone(),
			})?;
		}
	}
	tx.commit()?;

	let written = results.iter().filter(|r| r.is_new).count();
	info!(
		object = name,
		version,
		written,
		reused = results.len() - written,
		"save complete"
	);

	Ok(ov)
}

/// Reconstructs object `name` at `version` (or its latest version if `None`)
/// into `output_path`.
pub async fn retrieve(
	store: Arc<Store>,
	config: &Configuration,
	name: &str,
	version: Option<i64>,
	output_path: &Path,
) -> Result<ObjectVersion, Error> {
	let direct_io = config.is_direct_io_enabled;
	let name = name.to_string();
	let output_path = output_path.to_path_buf();

	tokio::task::spawn_blocking(move || retrieve_sync(&store, direct_io, &name, version, &output_path))
		.await?
}

fn retrieve_sync(
	store: &Store,
	direct_io: bool,
	name: &str,
	version: Option<i64>,
	output_path: &Path,
) -> Result<ObjectVersion, Error> {
	let ov = match version {
		Some(v) => store
			.get_version(name, v)?
			.ok_or_else(|| Error::NotFound(format!("object `{}` version {} not found", name, v)))?,
		None => store
			.latest_version(name)?
			.ok_or_else(|| Error::NotFound(format!("object `{}` not found", name)))?,
	};

	info!(object = name, version = ov.version, "retrieving object");

	let all = store.list_blocks(name)?;
	let blocks = resolve::resolve(&ov, &all)?;

	let mut dest = iofacade::create_for_write(output_path, direct_io)?;
	write_blocks(&mut dest, &ov, &blocks, direct_io)?;

	info!(object = name, version = ov.version, "retrieve complete");
	Ok(ov)
}

#[cfg(unix)]
fn write_blocks(
	dest: &mut std::fs::File,
	ov: &ObjectVersion,
	blocks: &[Block],
	direct_io: bool,
) -> Result<(), Error> {
	use std::os::unix::fs::FileExt;

	for (index, block) in blocks.iter().enumerate() {
		let src = iofacade::open_for_read(&block.location, direct_io)?;
		let len = src.metadata()?.len() as usize;
		let mut buf = iofacade::Buffer::new(len, direct_io);
		read_all_at(&src, &mut buf, 0)?;
		let offset = ov.block_size as u64 * index as u64;
		dest.write_all_at(&buf, offset)?;
	}
	dest.sync_all()?;
	Ok(())
}

#[cfg(unix)]
fn read_all_at(file: &std::fs::File, buf: &mut [u8], offset: u64) -> Result<(), Error> {
	use std::os::unix::fs::FileExt;

	let mut total = 0usize;
	while total < buf.len() {
		let n = file.read_at(&mut buf[total..], offset + total as u64)?;
		if n == 0 {
			return Err(Error::Io(std::io::Error::new(
				std::io::ErrorKind::UnexpectedEof,
				"short read while reconstructing block",
			)));
		}
		total += n;
	}
	Ok(())
}

#[cfg(not(unix))]
fn write_blocks(
	dest: &mut std::fs::File,
	ov: &ObjectVersion,
	blocks: &[Block],
	direct_io: bool,
) -> Result<(), Error> {
	use std::io::{Read, Seek, SeekFrom, Write};

	for (index, block) in blocks.iter().enumerate() {
		let mut src = iofacade::open_for_read(&block.location, direct_io)?;
		let mut buf = Vec::new();
		src.read_to_end(&mut buf)?;
		let offset = ov.block_size as u64 * index as u64;
		dest.seek(SeekFrom::Start(offset))?;
		dest.write_all(&buf)?;
	}
	dest.sync_all()?;
	Ok(())
}

fn ceil_div(total: u64, chunk: u64) -> u64 {
	if total == 0 {
		0
	} else {
		(total + chunk - 1) / chunk
	}
}
