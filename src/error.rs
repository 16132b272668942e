//! Error taxonomy for FMFS, surfaced at the FUSE boundary as errno values.

use thiserror::Error;

/// The kinds of failure an FMFS operation can report.
#[derive(Debug, Error)]
pub enum FmfsError {
	/// A path component, or an item referenced by block index, does not
	/// exist. Surfaces as `ENOENT`.
	#[error("not found")]
	NotFound,
	/// A path or operation contradicts an item's type (e.g. a directory
	/// component that is actually a file, or an unknown TYPE byte).
	/// Surfaces as `EINVAL`.
	#[error("invalid")]
	Invalid,
	/// `rmdir` was called on a directory that still has children.
	/// Surfaces as `ENOTEMPTY`.
	#[error("directory not empty")]
	NotEmpty,
	/// `find_free_block` found no free block. Surfaces as `ENOSPC`.
	#[error("no space left on device")]
	NoSpace,
	/// A block index was out of range, or the backing file could not be
	/// read/written.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

pub type FmfsResult<T> = Result<T, FmfsError>;

impl FmfsError {
	/// Maps this error to the `errno` value `fuser` expects in
	/// `ReplyError::error`.
	pub fn errno(&self) -> libc::c_int {
		match self {
			FmfsError::NotFound => libc::ENOENT,
			FmfsError::Invalid => libc::EINVAL,
			FmfsError::NotEmpty => libc::ENOTEMPTY,
			FmfsError::NoSpace => libc::ENOSPC,
			FmfsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn errno_mapping() {
		assert_eq!(FmfsError::NotFound.errno(), libc::ENOENT);
		assert_eq!(FmfsError::Invalid.errno(), libc::EINVAL);
		assert_eq!(FmfsError::NotEmpty.errno(), libc::ENOTEMPTY);
		assert_eq!(FmfsError::NoSpace.errno(), libc::ENOSPC);
	}
}
