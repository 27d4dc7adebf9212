use std::path::PathBuf;

/// The paths and variables needed to run the engine.
///
/// Configuration loading from an on-disk file is out of scope for the
/// engine itself; this struct is what a caller builds from whatever
/// surface it wants (CLI flags here, a config file elsewhere).
#[derive(Debug, Clone)]
pub struct Configuration {
	pub db_path: PathBuf,
	pub storage_location: PathBuf,
	pub is_direct_io_enabled: bool,
}
