//! The file allocation table: block 0 of the backing file, a FAT-style
//! singly-linked map from each block to its successor (or a sentinel).
//!
//! Every operation here re-reads block 0 fresh and, if it changes the
//! table, writes it straight back — there is no in-memory cache, so a
//! crash between calls leaves the table in a consistent on-disk state.

use std::fs::File;

use crate::disk::{self, BLOCK_SIZE, NUM_BLOCKS};
use crate::error::{FmfsError, FmfsResult};

/// Last block of a chain.
pub const END_OF_FILE: u8 = 0xF0;
/// Unallocated, available block.
pub const FREE_SPACE: u8 = 0xFF;
/// Reserved; never allocated.
pub const RESERVED_SPACE: u8 = 0xFE;
/// Marker for block 0's own FAT slot.
pub const FILE_TABLE_SPACE: u8 = 0x30;

/// Reads the in-use portion of the table (one byte per block) out of block
/// 0. The remaining bytes of block 0 are padding and are not represented
/// here.
fn get_filetable(disk: &mut File) -> FmfsResult<[u8; NUM_BLOCKS as usize]> {
	let block = disk::read_block(disk, 0)?;
	let mut table = [0u8; NUM_BLOCKS as usize];
	table.copy_from_slice(&block[..NUM_BLOCKS as usize]);
	Ok(table)
}

/// Writes `table` back to block 0, zero-padding the rest of the block.
fn write_filetable(disk: &mut File, table: &[u8; NUM_BLOCKS as usize]) -> FmfsResult<()> {
	let mut block = [0u8; BLOCK_SIZE];
	block[..NUM_BLOCKS as usize].copy_from_slice(table);
	disk::write_block(disk, 0, &block)
}

/// Walks the chain starting at `start`, concatenating every block's raw
/// bytes (metadata header included) until `END_OF_FILE` is reached.
pub fn read_full_file(disk: &mut File, start: u8) -> FmfsResult<Vec<u8>> {
	let table = get_filetable(disk)?;
	let mut out = Vec::new();
	let mut current = start;
	loop {
		out.extend_from_slice(&disk::read_block(disk, current)?);
		let next = table[current as usize];
		if next == END_OF_FILE {
			break;
		}
		current = next;
	}
	Ok(out)
}

/// Walks the chain starting at `start`, returning the ordered block
/// indices making it up.
pub fn get_file_blocks(disk: &mut File, start: u8) -> FmfsResult<Vec<u8>> {
	let table = get_filetable(disk)?;
	let mut blocks = Vec::new();
	let mut current = start;
	loop {
		blocks.push(current);
		let next = table[current as usize];
		if next == END_OF_FILE {
			break;
		}
		current = next;
	}
	Ok(blocks)
}

/// Frees every block in the chain starting at `start`: zeroes its contents
/// and marks its table slot `FREE_SPACE`.
pub fn purge_full_file(disk: &mut File, start: u8) -> FmfsResult<()> {
	let mut table = get_filetable(disk)?;
	let mut current = start;
	let mut next = table[current as usize];
	loop {
		table[current as usize] = FREE_SPACE;
		disk::write_block(disk, current, &[0u8; BLOCK_SIZE])?;
		current = next;
		if current == END_OF_FILE {
			break;
		}
		next = table[current as usize];
	}
	write_filetable(disk, &table)
}

/// Returns the first free block not in `exclude`, or `NoSpace`.
pub fn find_free_block(disk: &mut File, exclude: &[u8]) -> FmfsResult<u8> {
	let table = get_filetable(disk)?;
	for i in 0..NUM_BLOCKS {
		if table[i as usize] == FREE_SPACE && !exclude.contains(&i) {
			return Ok(i);
		}
	}
	Err(FmfsError::NoSpace)
}

/// Chunks `data` into `BLOCK_SIZE` pieces (the final piece zero-padded) and
/// writes each piece to a block: the first `overwrite.len()` pieces reuse
/// `overwrite`'s blocks in order (in-place reuse of an existing chain), any
/// remaining pieces are written to newly allocated blocks. Returns the
/// ordered list of blocks actually written; never contains duplicates.
pub fn write_bytes_to_block(
	disk: &mut File,
	data: &[u8],
	overwrite: &[u8],
) -> FmfsResult<Vec<u8>> {
	let num_chunks = (data.len() + BLOCK_SIZE - 1) / BLOCK_SIZE;
	let mut written = Vec::with_capacity(num_chunks);
	for k in 0..num_chunks {
		let start = k * BLOCK_SIZE;
		let end = (start + BLOCK_SIZE).min(data.len());
		let mut buf = [0u8; BLOCK_SIZE];
		buf[..end - start].copy_from_slice(&data[start..end]);

		let block = if k < overwrite.len() {
			overwrite[k]
		} else {
			find_free_block(disk, &written)?
		};
		disk::write_block(disk, block, &buf)?;
		written.push(block);
	}
	Ok(written)
}

/// Splices `locations` into the table so that each block points to its
/// successor and the last points to `END_OF_FILE`.
pub fn write_to_table(disk: &mut File, locations: &[u8]) -> FmfsResult<()> {
	if locations.is_empty() {
		return Ok(());
	}
	let mut table = get_filetable(disk)?;
	for (i, &loc) in locations.iter().enumerate() {
		table[loc as usize] = match locations.get(i + 1) {
			Some(&next) => next,
			None => END_OF_FILE,
		};
	}
	write_filetable(disk, &table)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::Path;

	fn fresh_disk(path: &Path) -> File {
		disk::low_level_format(path).unwrap();
		let mut disk = disk::open(path).unwrap();
		let mut table = [FREE_SPACE; NUM_BLOCKS as usize];
		table[0] = END_OF_FILE;
		table[1] = END_OF_FILE;
		write_filetable(&mut disk, &table).unwrap();
		disk
	}

	#[test]
	fn find_free_skips_excluded_and_used() {
		let dir = tempfile::tempdir().unwrap();
		let mut disk = fresh_disk(&dir.path().join("d.img"));
		assert_eq!(find_free_block(&mut disk, &[]).unwrap(), 2);
		assert_eq!(find_free_block(&mut disk, &[2]).unwrap(), 3);
	}

	#[test]
	fn write_then_read_single_block_chain() {
		let dir = tempfile::tempdir().unwrap();
		let mut disk = fresh_disk(&dir.path().join("d.img"));
		let data = vec![7u8; 10];
		let locations = write_bytes_to_block(&mut disk, &data, &[]).unwrap();
		assert_eq!(locations.len(), 1);
		write_to_table(&mut disk, &locations).unwrap();

		let blocks = get_file_blocks(&mut disk, locations[0]).unwrap();
		assert_eq!(blocks, locations);

		let full = read_full_file(&mut disk, locations[0]).unwrap();
		assert_eq!(&full[0..10], data.as_slice());
		assert_eq!(&full[10..BLOCK_SIZE], &[0u8; BLOCK_SIZE - 10][..]);
	}

	#[test]
	fn write_spans_multiple_blocks() {
		let dir = tempfile::tempdir().unwrap();
		let mut disk = fresh_disk(&dir.path().join("d.img"));
		let data = vec![1u8; BLOCK_SIZE + 5];
		let locations = write_bytes_to_block(&mut disk, &data, &[]).unwrap();
		assert_eq!(locations.len(), 2);
		assert_ne!(locations[0], locations[1]);
		write_to_table(&mut disk, &locations).unwrap();

		let blocks = get_file_blocks(&mut disk, locations[0]).unwrap();
		assert_eq!(blocks, locations);
	}

	#[test]
	fn purge_frees_every_block_in_chain() {
		let dir = tempfile::tempdir().unwrap();
		let mut disk = fresh_disk(&dir.path().join("d.img"));
		let data = vec![3u8; BLOCK_SIZE + 1];
		let locations = write_bytes_to_block(&mut disk, &data, &[]).unwrap();
		write_to_table(&mut disk, &locations).unwrap();

		purge_full_file(&mut disk, locations[0]).unwrap();
		for &loc in &locations {
			assert_eq!(disk::read_block(&mut disk, loc).unwrap(), [0u8; BLOCK_SIZE]);
		}
		// every purged block is reported free again
		let table = get_filetable(&mut disk).unwrap();
		for &loc in &locations {
			assert_eq!(table[loc as usize], FREE_SPACE);
		}
	}

	#[test]
	fn no_space_when_table_exhausted() {
		let dir = tempfile::tempdir().unwrap();
		let mut disk = fresh_disk(&dir.path().join("d.img"));
		let mut table = [RESERVED_SPACE; NUM_BLOCKS as usize];
		table[0] = END_OF_FILE;
		table[1] = END_OF_FILE;
		write_filetable(&mut disk, &table).unwrap();
		assert!(matches!(
			find_free_block(&mut disk, &[]),
			Err(FmfsError::NoSpace)
		));
	}
}
