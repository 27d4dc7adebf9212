use std::path::PathBuf;

/// A committed version of a binary object. Immutable once saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectVersion {
	pub name: String,
	pub version: i64,
	pub block_size: i64,
	pub number_of_blocks: i64,
}

/// One physical block file on disk, and the metadata row pointing at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
	/// Hex-encoded SHA-256 of the block's bytes.
	pub checksum: String,
	pub location: PathBuf,
	pub block_index: i64,
	/// The version at which this block first appeared.
	pub version: i64,
	pub object_name: String,
}
