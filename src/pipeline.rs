//! Pipeline Scheduler (C5): turns one open source file into a sequence of
//! per-block results without ever holding more than two block-sized
//! buffers resident.
//!
//! Two cooperating OS threads (Reader, Writer) hand buffers to each other
//! over single-slot (rendezvous) channels: a buffer is owned by exactly one
//! side at any moment, and no I/O runs while holding more than one buffer.
//! A third, purely async, task (the Collector) drains results as they
//! complete.

use std::fs::File;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::trace;

use crate::detector::should_write;
use crate::error::Error;
use crate::iofacade::Buffer;
use crate::model::ObjectVersion;
use crate::store::Store;
use crate::writer::write_buffer;

/// The outcome of processing one logical block index.
#[derive(Debug, Clone)]
pub struct BlockResult {
	pub block_number: i64,
	pub is_new: bool,
	pub path: Option<PathBuf>,
	pub checksum: String,
}

/// Runs the read -> hash -> detect -> write pipeline over `source`,
/// producing one [`BlockResult`] per logical block, ordered by index.
pub async fn run(
	source: File,
	ov: ObjectVersion,
	store: Arc<Store>,
	storage_location: PathBuf,
	direct_io: bool,
) -> Result<Vec<BlockResult>, Error> {
	let n = ov.number_of_blocks;
	if n == 0 {
		return Ok(Vec::new());
	}

	let (filler_tx, filler_rx) = mpsc::sync_channel::<Buffer>(0);
	let (writer_tx, writer_rx) = mpsc::sync_channel::<(i64, Buffer)>(0);
	let (finished_tx, mut finished_rx) = tokio::sync::mpsc::channel::<BlockResult>(1);

	// Prime the Reader with both buffers (only one if there's a single block).
	let block_size = ov.block_size as usize;
	filler_tx
		.send(Buffer::new(block_size, direct_io))
		.map_err(|_| Error::message("reader task failed to start"))?;
	if n > 1 {
		filler_tx
			.send(Buffer::new(block_size, direct_io))
			.map_err(|_| Error::message("reader task failed to start"))?;
	}

	let reader_ov = ov.clone();
	let reader_handle = tokio::task::spawn_blocking(move || {
		reader_loop(source, reader_ov, direct_io, filler_rx, writer_tx)
	});

	let writer_ov = ov.clone();
	let writer_handle = tokio::task::spawn_blocking(move || {
		writer_loop(
			writer_ov,
			store,
			storage_location,
			direct_io,
			writer_rx,
			filler_tx,
			finished_tx,
		)
	});

	let mut results = Vec::with_capacity(n as usize);
	while results.len() < n as usize {
		match finished_rx.recv().await {
			Some(r) => results.push(r),
			None => break,
		}
	}

	// Whichever side actually failed surfaces its error here; a side that
	// merely noticed its peer disappeared returns Ok and stays silent.
	writer_handle.await??;
	reader_handle.await??;

	if results.len() != n as usize {
		return Err(Error::message(
			"pipeline ended before producing a result for every block",
		));
	}

	results.sort_by_key(|r| r.block_number);
	Ok(results)
}

fn reader_loop(
	source: File,
	ov: ObjectVersion,
	direct_io: bool,
	filler_rx: mpsc::Receiver<Buffer>,
	writer_tx: mpsc::SyncSender<(i64, Buffer)>,
) -> Result<(), Error> {
	let n = ov.number_of_blocks;
	let block_size = ov.block_size as u64;

	for index in 0..n {
		let free = match filler_rx.recv() {
			Ok(b) => b,
			Err(_) => return Ok(()), // writer side is gone; its error (if any) will surface there
		};

		let is_last = index == n - 1;
		let offset = block_size * index as u64;

		let buffer = if is_last {
			drop(free); // last block is a short read: a fresh, correctly-sized buffer, not a reuse in place
			let file_len = source.metadata()?.len();
			let remaining = file_len.saturating_sub(offset) as usize;
			let mut buf = Buffer::new(remaining, direct_io);
			read_at_exact(&source, &mut buf, offset)?;
			buf
		} else {
			let mut buf = free;
			read_at_exact(&source, &mut buf, offset)?;
			buf
		};

		trace!(block = index, is_last, "read block");

		if writer_tx.send((index, buffer)).is_err() {
			return Ok(());
		}
	}

	Ok(())
}

#[allow(clippy::too_many_arguments)]
fn writer_loop(
	ov: ObjectVersion,
	store: Arc<Store>,
	storage_location: PathBuf,
	direct_io: bool,
	writer_rx: mpsc::Receiver<(i64, Buffer)>,
	filler_tx: mpsc::SyncSender<Buffer>,
	finished_tx: tokio::sync::mpsc::Sender<BlockResult>,
) -> Result<(), Error> {
	let n = ov.number_of_blocks;

	loop {
		let (index, buffer) = match writer_rx.recv() {
			Ok(v) => v,
			Err(_) => return Ok(()), // reader side is gone; its error (if any) will surface there
		};

		let checksum = hash_hex(&buffer);
		let is_new = should_write(&store, &ov.name, index, &checksum)?;

		let path = if is_new {
			Some(write_buffer(&storage_location, &ov, index, &buffer, direct_io)?)
		} else {
			None
		};

		trace!(block = index, is_new, "processed block");

		let result = BlockResult {
			block_number: index,
			is_new,
			path,
			checksum,
		};
		if finished_tx.blocking_send(result).is_err() {
			return Ok(());
		}

		if index < n - 1 {
			let _ = filler_tx.send(buffer);
		} else {
			return Ok(());
		}
	}
}

fn hash_hex(buf: &[u8]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(buf);
	hex::encode(hasher.finalize())
}

#[cfg(unix)]
fn read_at_exact(file: &File, buf: &mut [u8], offset: u64) -> Result<(), Error> {
	use std::os::unix::fs::FileExt;

	let mut total = 0usize;
	while total < buf.len() {
		let n = file.read_at(&mut buf[total..], offset + total as u64)?;
		if n == 0 {
			return Err(Error::Io(std::io::Error::new(
				std::io::ErrorKind::UnexpectedEof,
				"short read while filling block buffer",
			)));
		}
		total += n;
	}
	Ok(())
}

#[cfg(not(unix))]
fn read_at_exact(file: &File, buf: &mut [u8], offset: u64) -> Result<(), Error> {
	use std::io::{Read, Seek, SeekFrom};

	let mut file = file.try_clone()?;
	file.seek(SeekFrom::Start(offset))?;
	file.read_exact(buf)?;
	Ok(())
}
