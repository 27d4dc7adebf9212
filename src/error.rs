use std::path::PathBuf;

/// Every recoverable error the engine can return. Bubbles up through this
/// type all the way to the `Save` or `Retrieve` call site; nothing is
/// swallowed along the way.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	NotFound(String),

	#[error("block size {given} does not match existing block size {expected} for object `{name}`")]
	BlockSizeMismatch {
		name: String,
		expected: i64,
		given: i64,
	},

	#[error("block file already exists: {0}")]
	Conflict(PathBuf),

	#[error("buffer of {len} bytes is not aligned to the device block size of {align} bytes")]
	Misaligned { len: usize, align: usize },

	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),

	#[error("metadata store error: {0}")]
	Store(#[from] rusqlite::Error),

	#[error("corrupted: {0}")]
	Corrupted(String),

	#[error("{0}")]
	Message(String),
}

impl Error {
	pub fn message(msg: impl Into<String>) -> Self {
		Error::Message(msg.into())
	}
}

/// Turns an `Option` into a `Result` with a plain-text error when there's no
/// richer error variant to carry.
pub trait OrMessage<T> {
	fn ok_or_message(self, msg: impl Into<String>) -> Result<T, Error>;
}

impl<T> OrMessage<T> for Option<T> {
	fn ok_or_message(self, msg: impl Into<String>) -> Result<T, Error> {
		self.ok_or_else(|| Error::message(msg))
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(e: tokio::task::JoinError) -> Self {
		Error::Message(format!("pipeline task panicked: {}", e))
	}
}
