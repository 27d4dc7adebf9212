//! Metadata Store Adapter (C1): a thin wrapper over a transactional SQLite
//! database exposing exactly the operations the rest of the engine needs.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::Error;
use crate::model::{Block, ObjectVersion};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS object_versions (
    name             TEXT    NOT NULL,
    version          INTEGER NOT NULL,
    block_size       INTEGER NOT NULL,
    number_of_blocks INTEGER NOT NULL,
    PRIMARY KEY (name, version)
);

CREATE TABLE IF NOT EXISTS blocks (
    object_name  TEXT    NOT NULL,
    block_index  INTEGER NOT NULL,
    version      INTEGER NOT NULL,
    checksum     TEXT    NOT NULL,
    location     TEXT    NOT NULL,
    PRIMARY KEY (object_name, block_index, version)
);
";

pub struct Store {
	conn: Mutex<Connection>,
}

impl Store {
	/// Opens (creating if needed) the metadata store at `db_path`, runs the
	/// schema bootstrap, and sets WAL journaling with relaxed synchronous
	/// mode.
	pub fn open(db_path: &Path) -> Result<Self, Error> {
		debug!("opening metadata store at {}", db_path.display());
		let conn = Connection::open(db_path)?;
		conn.pragma_update(None, "journal_mode", "WAL")?;
		conn.pragma_update(None, "synchronous", "NORMAL")?;
		conn.execute_batch(SCHEMA)?;
		Ok(Self {
			conn: Mutex::new(conn),
		})
	}

	pub fn get_version(&self, name: &str, version: i64) -> Result<Option<ObjectVersion>, Error> {
		let conn = self.conn.lock().unwrap();
		conn.query_row(
			"SELECT name, version, block_size, number_of_blocks
             FROM object_versions WHERE name = ?1 AND version = ?2",
			params![name, version],
			row_to_object_version,
		)
		.optional()
		.map_err(Error::from)
	}

	pub fn latest_version(&self, name: &str) -> Result<Option<ObjectVersion>, Error> {
		let conn = self.conn.lock().unwrap();
		conn.query_row(
			"SELECT name, version, block_size, number_of_blocks
             FROM object_versions WHERE name = ?1 ORDER BY version DESC LIMIT 1",
			params![name],
			row_to_object_version,
		)
		.optional()
		.map_err(Error::from)
	}

	pub fn count_versions(&self, name: &str) -> Result<i64, Error> {
		let conn = self.conn.lock().unwrap();
		let count: i64 = conn.query_row(
			"SELECT COUNT(*) FROM object_versions WHERE name = ?1",
			params![name],
			|row| row.get(0),
		)?;
		Ok(count)
	}

	pub fn list_blocks(&self, name: &str) -> Result<Vec<Block>, Error> {
		let conn = self.conn.lock().unwrap();
		let mut stmt = conn.prepare(
			"SELECT checksum, location, block_index, version, object_name
             FROM blocks WHERE object_name = ?1",
		)?;
		let rows = stmt
			.query_map(params![name], row_to_block)?
			.collect::<Result<Vec<_>, _>>()?;
		Ok(rows)
	}

	pub fn list_blocks_at(&self, name: &str, index: i64) -> Result<Vec<Block>, Error> {
		let conn = self.conn.lock().unwrap();
		let mut stmt = conn.prepare(
			"SELECT checksum, location, block_index, version, object_name
             FROM blocks WHERE object_name = ?1 AND block_index = ?2",
		)?;
		let rows = stmt
			.query_map(params![name, index], row_to_block)?
			.collect::<Result<Vec<_>, _>>()?;
		Ok(rows)
	}

	/// Inserts an `ObjectVersion` row. Non-transactional: called before the
	/// block-row transaction, see the Save Coordinator (C6).
	pub fn insert_version(&self, ov: &ObjectVersion) -> Result<(), Error> {
		let conn = self.conn.lock().unwrap();
		conn.execute(
			"INSERT INTO object_versions (name, version, block_size, number_of_blocks)
             VALUES (?1, ?2, ?3, ?4)",
			params![ov.name, ov.version, ov.block_size, ov.number_of_blocks],
		)?;
		Ok(())
	}

	pub fn begin(&self) -> Result<Tx<'_>, Error> {
		let guard = self.conn.lock().unwrap();
		guard.execute_batch("BEGIN")?;
		Ok(Tx {
			conn: guard,
			finished: false,
		})
	}
}

fn row_to_object_version(row: &rusqlite::Row) -> rusqlite::Result<ObjectVersion> {
	Ok(ObjectVersion {
		name: row.get(0)?,
		version: row.get(1)?,
		block_size: row.get(2)?,
		number_of_blocks: row.get(3)?,
	})
}

fn row_to_block(row: &rusqlite::Row) -> rusqlite::Result<Block> {
	let location: String = row.get(1)?;
	Ok(Block {
		checksum: row.get(0)?,
		location: PathBuf::from(location),
		block_index: row.get(2)?,
		version: row.get(3)?,
		object_name: row.get(4)?,
	})
}

/// An open transaction on the metadata store. Held for the lifetime of one
/// `Save`'s block-row insertions; rolled back automatically if dropped
/// without an explicit `commit`.
pub struct Tx<'a> {
	conn: std::sync::MutexGuard<'a, Connection>,
	finished: bool,
}

impl<'a> Tx<'a> {
	pub fn insert_block(&mut self, b: &Block) -> Result<(), Error> {
		self.conn.execute(
			"INSERT INTO blocks (object_name, block_index, version, checksum, location)
             VALUES (?1, ?2, ?3, ?4, ?5)",
			params![
				b.object_name,
				b.block_index,
				b.version,
				b.checksum,
				b.location.to_string_lossy(),
			],
		)?;
		Ok(())
	}

	pub fn commit(mut self) -> Result<(), Error> {
		self.conn.execute_batch("COMMIT")?;
		self.finished = true;
		Ok(())
	}

	pub fn rollback(mut self) -> Result<(), Error> {
		self.conn.execute_batch("ROLLBACK")?;
		self.finished = true;
		Ok(())
	}
}

impl<'a> Drop for Tx<'a> {
	fn drop(&mut self) {
		if !self.finished {
			let _ = self.conn.execute_batch("ROLLBACK");
		}
	}
}
