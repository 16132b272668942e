//! Low-level access to the backing file: whole-block reads/writes and the
//! big-endian integer / null-padded ASCII codecs used throughout the
//! on-disk format.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{FmfsError, FmfsResult};

/// Total number of blocks addressable by the file allocation table.
pub const NUM_BLOCKS: u8 = 16;
/// Size in bytes of a single block.
pub const BLOCK_SIZE: usize = 64;

/// Opens the backing file for reading and writing. The file must already
/// exist and be exactly `NUM_BLOCKS * BLOCK_SIZE` bytes (i.e. `format` must
/// have run first).
pub fn open(path: &Path) -> FmfsResult<File> {
	Ok(OpenOptions::new().read(true).write(true).open(path)?)
}

/// Zero-fills `path` to exactly `NUM_BLOCKS * BLOCK_SIZE` bytes, truncating
/// or creating it as needed. This erases any existing contents.
pub fn low_level_format(path: &Path) -> FmfsResult<()> {
	let mut disk = OpenOptions::new()
		.write(true)
		.create(true)
		.truncate(true)
		.open(path)?;
	let zeros = [0u8; BLOCK_SIZE];
	for _ in 0..NUM_BLOCKS {
		disk.write_all(&zeros)?;
	}
	disk.flush()?;
	Ok(())
}

/// Reads block `block_num` from `disk`.
pub fn read_block(disk: &mut File, block_num: u8) -> FmfsResult<[u8; BLOCK_SIZE]> {
	if block_num >= NUM_BLOCKS {
		return Err(FmfsError::Io(std::io::Error::new(
			std::io::ErrorKind::InvalidInput,
			"block number out of range",
		)));
	}
	let mut buf = [0u8; BLOCK_SIZE];
	disk.seek(SeekFrom::Start(block_num as u64 * BLOCK_SIZE as u64))?;
	disk.read_exact(&mut buf)?;
	Ok(buf)
}

/// Writes `data` (exactly `BLOCK_SIZE` bytes) to block `block_num`.
pub fn write_block(disk: &mut File, block_num: u8, data: &[u8; BLOCK_SIZE]) -> FmfsResult<()> {
	if block_num >= NUM_BLOCKS {
		return Err(FmfsError::Io(std::io::Error::new(
			std::io::ErrorKind::InvalidInput,
			"block number out of range",
		)));
	}
	disk.seek(SeekFrom::Start(block_num as u64 * BLOCK_SIZE as u64))?;
	disk.write_all(data)?;
	Ok(())
}

/// Encodes `value` as a big-endian unsigned integer in `n` bytes,
/// truncating modulo `256^n`.
pub fn int_to_bytes(value: u64, n: usize) -> Vec<u8> {
	let mut out = vec![0u8; n];
	let mut v = value;
	for i in (0..n).rev() {
		out[i] = (v % 256) as u8;
		v /= 256;
	}
	out
}

/// Decodes a big-endian unsigned integer from `bytes`.
pub fn bytes_to_int(bytes: &[u8]) -> u64 {
	bytes.iter().fold(0u64, |acc, &b| acc * 256 + b as u64)
}

/// Right-pads `value` with `\0` to exactly `n` bytes. `value` must be ASCII
/// and no longer than `n` bytes.
pub fn str_to_bytes(value: &str, n: usize) -> Vec<u8> {
	let mut out = vec![0u8; n];
	let bytes = value.as_bytes();
	let len = bytes.len().min(n);
	out[..len].copy_from_slice(&bytes[..len]);
	out
}

/// Decodes `bytes` as ASCII without trimming null padding; the caller is
/// responsible for trimming trailing `\0` bytes where that matters.
pub fn bytes_to_str(bytes: &[u8]) -> String {
	bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn int_roundtrip() {
		for &(value, n) in &[(0u64, 1), (255, 1), (256, 2), (65535, 2), (0x01020304, 4)] {
			let bytes = int_to_bytes(value, n);
			assert_eq!(bytes.len(), n);
			assert_eq!(bytes_to_int(&bytes), value);
		}
	}

	#[test]
	fn int_truncates_modulo() {
		assert_eq!(int_to_bytes(256, 1), vec![0]);
		assert_eq!(int_to_bytes(257, 1), vec![1]);
	}

	#[test]
	fn str_roundtrip_pads_with_nul() {
		let bytes = str_to_bytes("a", 4);
		assert_eq!(bytes, vec![b'a', 0, 0, 0]);
		assert_eq!(bytes_to_str(&bytes), "a\0\0\0");
	}

	#[test]
	fn format_then_read_blocks() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("disk.img");
		low_level_format(&path).unwrap();
		let meta = std::fs::metadata(&path).unwrap();
		assert_eq!(meta.len(), (NUM_BLOCKS as u64) * (BLOCK_SIZE as u64));

		let mut disk = open(&path).unwrap();
		let block = read_block(&mut disk, 0).unwrap();
		assert_eq!(block, [0u8; BLOCK_SIZE]);

		let mut payload = [0u8; BLOCK_SIZE];
		payload[0] = 42;
		write_block(&mut disk, 2, &payload).unwrap();
		assert_eq!(read_block(&mut disk, 2).unwrap(), payload);
	}

	#[test]
	fn out_of_range_block_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("disk.img");
		low_level_format(&path).unwrap();
		let mut disk = open(&path).unwrap();
		assert!(read_block(&mut disk, NUM_BLOCKS).is_err());
		assert!(write_block(&mut disk, NUM_BLOCKS, &[0u8; BLOCK_SIZE]).is_err());
	}
}
