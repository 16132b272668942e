//! The 39-byte metadata header that prefixes the first block of every item.
//!
//! Offsets and widths are bit-exact per the on-disk format; this codec must
//! not pad or align the header any differently than specified.

use crate::disk::{bytes_to_int, bytes_to_str, int_to_bytes, str_to_bytes};

/// Size in bytes of the packed metadata header.
pub const HEADER_LEN: usize = 39;

/// TYPE value for a directory.
pub const TYPE_DIR: u8 = 0;
/// TYPE value for a regular file.
pub const TYPE_FILE: u8 = 1;

/// An item's metadata header, decoded into native fields.
///
/// `name` holds the ASCII name with trailing null padding stripped; a zero
/// value in any numeric field, or an empty `name`, is treated as "unset" by
/// [`Metadata::merge_from`] (see `spec.md` §9: this mirrors the original
/// implementation's `a or b` fallback and means a caller cannot legitimately
/// set `size` or `nlinks` to a true zero through `merge_from` — callers that
/// need a true zero must construct and pack a full header directly instead).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
	pub name: String,
	pub size: u16,
	pub nlinks: u8,
	pub mode: u16,
	pub uid: u16,
	pub gid: u16,
	pub ctime: u32,
	pub mtime: u32,
	pub atime: u32,
	pub location: u8,
	pub type_: u8,
}

impl Metadata {
	/// Packs this metadata into its 39-byte on-disk form.
	pub fn pack(&self) -> [u8; HEADER_LEN] {
		let mut out = [0u8; HEADER_LEN];
		let mut w = |start: usize, bytes: Vec<u8>| {
			out[start..start + bytes.len()].copy_from_slice(&bytes);
		};
		w(0, str_to_bytes(&self.name, 16));
		w(16, int_to_bytes(self.size as u64, 2));
		w(18, int_to_bytes(self.nlinks as u64, 1));
		w(19, int_to_bytes(self.mode as u64, 2));
		w(21, int_to_bytes(self.uid as u64, 2));
		w(23, int_to_bytes(self.gid as u64, 2));
		w(25, int_to_bytes(self.ctime as u64, 4));
		w(29, int_to_bytes(self.mtime as u64, 4));
		w(33, int_to_bytes(self.atime as u64, 4));
		w(37, int_to_bytes(self.location as u64, 1));
		w(38, int_to_bytes(self.type_ as u64, 1));
		out
	}

	/// Unpacks a 39-byte (or longer, extra bytes ignored) header.
	pub fn unpack(bytes: &[u8]) -> Self {
		let name = bytes_to_str(&bytes[0..16])
			.trim_end_matches('\0')
			.to_owned();
		Metadata {
			name,
			size: bytes_to_int(&bytes[16..18]) as u16,
			nlinks: bytes_to_int(&bytes[18..19]) as u8,
			mode: bytes_to_int(&bytes[19..21]) as u16,
			uid: bytes_to_int(&bytes[21..23]) as u16,
			gid: bytes_to_int(&bytes[23..25]) as u16,
			ctime: bytes_to_int(&bytes[25..29]) as u32,
			mtime: bytes_to_int(&bytes[29..33]) as u32,
			atime: bytes_to_int(&bytes[33..37]) as u32,
			location: bytes_to_int(&bytes[37..38]) as u8,
			type_: bytes_to_int(&bytes[38..39]) as u8,
		}
	}

	/// Fills every zero-valued (or empty-name) field of `self` from
	/// `current`, matching `update_metadata`'s `new or existing` fallback.
	pub fn merge_from(&mut self, current: &Metadata) {
		if self.name.is_empty() {
			self.name = current.name.clone();
		}
		if self.size == 0 {
			self.size = current.size;
		}
		if self.nlinks == 0 {
			self.nlinks = current.nlinks;
		}
		if self.mode == 0 {
			self.mode = current.mode;
		}
		if self.uid == 0 {
			self.uid = current.uid;
		}
		if self.gid == 0 {
			self.gid = current.gid;
		}
		if self.ctime == 0 {
			self.ctime = current.ctime;
		}
		if self.mtime == 0 {
			self.mtime = current.mtime;
		}
		if self.atime == 0 {
			self.atime = current.atime;
		}
		if self.location == 0 {
			self.location = current.location;
		}
		if self.type_ == 0 {
			self.type_ = current.type_;
		}
	}

	pub fn is_dir(&self) -> bool {
		self.type_ == TYPE_DIR
	}

	pub fn is_file(&self) -> bool {
		self.type_ == TYPE_FILE
	}

	/// Updates ATIME/CTIME/MTIME to `now` (seconds since the Unix epoch).
	pub fn touch_all(&mut self, now: u32) {
		self.atime = now;
		self.ctime = now;
		self.mtime = now;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> Metadata {
		Metadata {
			name: "hello".to_owned(),
			size: 128,
			nlinks: 2,
			mode: 0o100644,
			uid: 1000,
			gid: 1000,
			ctime: 111,
			mtime: 222,
			atime: 333,
			location: 5,
			type_: TYPE_FILE,
		}
	}

	#[test]
	fn pack_unpack_roundtrip() {
		let m = sample();
		let packed = m.pack();
		assert_eq!(packed.len(), HEADER_LEN);
		assert_eq!(Metadata::unpack(&packed), m);
	}

	#[test]
	fn pack_is_bit_exact() {
		let m = sample();
		let packed = m.pack();
		assert_eq!(&packed[0..5], b"hello");
		assert_eq!(&packed[5..16], [0u8; 11]);
		assert_eq!(&packed[16..18], &[0, 128]);
		assert_eq!(packed[18], 2);
		assert_eq!(packed[37], 5);
		assert_eq!(packed[38], TYPE_FILE);
	}

	#[test]
	fn merge_fills_zero_fields_only() {
		let current = sample();
		let mut patch = Metadata {
			nlinks: 9,
			..Metadata::default()
		};
		patch.merge_from(&current);
		assert_eq!(patch.nlinks, 9);
		assert_eq!(patch.name, current.name);
		assert_eq!(patch.size, current.size);
		assert_eq!(patch.location, current.location);
	}
}
