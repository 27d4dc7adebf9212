//! File Open Facade (C8): open files in standard buffered mode, or in
//! direct (unbuffered) mode where both the buffer address and the I/O
//! length must be aligned to the device block size.

use std::alloc::{alloc, dealloc, Layout};
use std::fs::File;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::slice;

use crate::error::Error;

/// Conservative sector size used for direct-I/O alignment. This mirrors the
/// default block size of the `ncw/directio` package the original source
/// used for the same purpose.
pub const ALIGNMENT: usize = 512;

#[cfg(unix)]
mod unix {
	use super::*;
	use std::ffi::CString;
	use std::os::unix::ffi::OsStrExt;
	use std::os::unix::io::FromRawFd;

	fn raw_open(path: &Path, flags: libc::c_int) -> Result<File, Error> {
		let c_path = CString::new(path.as_os_str().as_bytes())
			.map_err(|e| Error::message(format!("invalid path {}: {}", path.display(), e)))?;
		let fd = unsafe { libc::open(c_path.as_ptr(), flags, 0o666) };
		if fd < 0 {
			let err = std::io::Error::last_os_error();
			if err.kind() == std::io::ErrorKind::AlreadyExists {
				return Err(Error::Conflict(path.to_path_buf()));
			}
			return Err(Error::Io(err));
		}
		Ok(unsafe { File::from_raw_fd(fd) })
	}

	pub fn open_for_read(path: &Path, direct: bool) -> Result<File, Error> {
		let mut flags = libc::O_RDONLY;
		if direct {
			flags |= libc::O_DIRECT;
		}
		raw_open(path, flags)
	}

	pub fn create_for_write(path: &Path, direct: bool, exclusive: bool) -> Result<File, Error> {
		let mut flags = libc::O_CREAT | libc::O_WRONLY;
		flags |= if exclusive { libc::O_EXCL } else { libc::O_TRUNC };
		if direct {
			flags |= libc::O_DIRECT;
		}
		raw_open(path, flags)
	}
}

#[cfg(not(unix))]
mod unix {
	use super::*;

	pub fn open_for_read(_path: &Path, direct: bool) -> Result<File, Error> {
		if direct {
			return Err(Error::message("direct I/O is only supported on unix"));
		}
		unreachable!("fallback handled by caller")
	}

	pub fn create_for_write(_path: &Path, direct: bool, _exclusive: bool) -> Result<File, Error> {
		if direct {
			return Err(Error::message("direct I/O is only supported on unix"));
		}
		unreachable!("fallback handled by caller")
	}
}

/// Opens `path` for reading, using direct I/O when `direct` is set.
pub fn open_for_read(path: &Path, direct: bool) -> Result<File, Error> {
	if direct {
		unix::open_for_read(path, true)
	} else {
		File::open(path).map_err(Error::from)
	}
}

/// Creates `path` for writing (truncating if it exists), using direct I/O
/// when `direct` is set.
pub fn create_for_write(path: &Path, direct: bool) -> Result<File, Error> {
	if direct {
		unix::create_for_write(path, true, false)
	} else {
		File::create(path).map_err(Error::from)
	}
}

/// Creates `path` for writing, failing with [`Error::Conflict`] if it
/// already exists. Used by the Block Writer (C3), which must never
/// overwrite an existing block file.
pub fn create_new_for_write(path: &Path, direct: bool) -> Result<File, Error> {
	if direct {
		unix::create_for_write(path, true, true)
	} else {
		match std::fs::OpenOptions::new()
			.write(true)
			.create_new(true)
			.open(path)
		{
			Ok(f) => Ok(f),
			Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
				Err(Error::Conflict(path.to_path_buf()))
			}
			Err(e) => Err(Error::from(e)),
		}
	}
}

/// A buffer allocated aligned to [`ALIGNMENT`], required for direct I/O.
pub struct AlignedBuffer {
	ptr: *mut u8,
	len: usize,
	layout: Layout,
}

// SAFETY: the buffer is uniquely owned and never aliased; it is only ever
// handed between the Reader and Writer tasks, never shared.
unsafe impl Send for AlignedBuffer {}

impl AlignedBuffer {
	pub fn new(len: usize) -> Self {
		let layout = Layout::from_size_align(len.max(1), ALIGNMENT)
			.expect("block size too large to align");
		let ptr = unsafe { alloc(layout) };
		if ptr.is_null() {
			std::alloc::handle_alloc_error(layout);
		}
		unsafe { std::ptr::write_bytes(ptr, 0, len) };
		Self { ptr, len, layout }
	}
}

impl Deref for AlignedBuffer {
	type Target = [u8];
	fn deref(&self) -> &[u8] {
		unsafe { slice::from_raw_parts(self.ptr, self.len) }
	}
}

impl DerefMut for AlignedBuffer {
	fn deref_mut(&mut self) -> &mut [u8] {
		unsafe { slice::from_raw_parts_mut(self.ptr, self.len) }
	}
}

impl Drop for AlignedBuffer {
	fn drop(&mut self) {
		unsafe { dealloc(self.ptr, self.layout) };
	}
}

/// A block buffer: a plain heap allocation in standard mode, an aligned one
/// in direct-I/O mode. The pipeline only ever deals in this type so it
/// doesn't need to know which mode it's running in.
pub enum Buffer {
	Plain(Vec<u8>),
	Aligned(AlignedBuffer),
}

impl Buffer {
	pub fn new(len: usize, direct_io: bool) -> Self {
		if direct_io {
			Buffer::Aligned(AlignedBuffer::new(len))
		} else {
			Buffer::Plain(vec![0u8; len])
		}
	}
}

impl Deref for Buffer {
	type Target = [u8];
	fn deref(&self) -> &[u8] {
		match self {
			Buffer::Plain(v) => v,
			Buffer::Aligned(a) => a,
		}
	}
}

impl DerefMut for Buffer {
	fn deref_mut(&mut self) -> &mut [u8] {
		match self {
			Buffer::Plain(v) => v,
			Buffer::Aligned(a) => a,
		}
	}
}
