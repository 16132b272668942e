//! The common behaviour shared by every on-disk object (file or directory).
//!
//! The dependency graph here is strictly layered: codecs → FAT → this
//! module → `Directory`/`File` → `Filesystem`, rather than the circular
//! `Directory` ↔ `Filesystem` ↔ item-base reference a more naive port
//! would reach for. `Item` carries only a block index and knows how to
//! resolve itself to a typed view on demand.

use std::fs::File as Disk;

use crate::disk::{self, BLOCK_SIZE};
use crate::error::{FmfsError, FmfsResult};
use crate::fat;
use crate::metadata::{Metadata, HEADER_LEN};

/// A typed view of an on-disk item: either a file or a directory, each
/// holding the block index of the first block of its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item {
	File(u8),
	Dir(u8),
}

impl Item {
	/// The first block of this item's chain.
	pub fn block(&self) -> u8 {
		match self {
			Item::File(b) | Item::Dir(b) => *b,
		}
	}

	/// Resolves `block` to a typed `Item` by reading its metadata TYPE
	/// field. Fails with `Invalid` on an unknown TYPE byte.
	pub fn from_block(disk: &mut Disk, block: u8) -> FmfsResult<Item> {
		let metadata = Metadata::unpack(&disk::read_block(disk, block)?);
		if metadata.is_dir() {
			Ok(Item::Dir(block))
		} else if metadata.is_file() {
			Ok(Item::File(block))
		} else {
			Err(FmfsError::Invalid)
		}
	}

	/// The item's metadata header.
	pub fn get_metadata(&self, disk: &mut Disk) -> FmfsResult<Metadata> {
		let block = disk::read_block(disk, self.block())?;
		Ok(Metadata::unpack(&block[..HEADER_LEN]))
	}

	/// The item's full content: every block in its chain, concatenated,
	/// with the metadata header of the first block stripped off. Raw
	/// bytes, never null-trimmed here — null-trimming is a
	/// directory-payload concern only, not a file-content one.
	pub fn get_contents(&self, disk: &mut Disk) -> FmfsResult<Vec<u8>> {
		let full = fat::read_full_file(disk, self.block())?;
		Ok(full[HEADER_LEN..].to_vec())
	}

	/// Metadata plus content, in one pass.
	pub fn get_data(&self, disk: &mut Disk) -> FmfsResult<(Metadata, Vec<u8>)> {
		Ok((self.get_metadata(disk)?, self.get_contents(disk)?))
	}

	/// Rewrites this item's full on-disk representation (header + payload)
	/// as `new_data`, growing or shrinking its chain as needed.
	///
	/// When `metadata_only_change` is false, the written header's SIZE
	/// field is overwritten in place to the *allocated* chain length in
	/// bytes (`locations.len() * BLOCK_SIZE`) rather than whatever SIZE
	/// `new_data` already encoded — this is the chain-length notion of
	/// size `spec.md` §9 calls out as distinct from logical payload size;
	/// callers that need the logical size (e.g. `edit_file`) overwrite it
	/// again afterwards via `update_metadata`/a direct patch.
	pub fn save(&self, disk: &mut Disk, new_data: &[u8], metadata_only_change: bool) -> FmfsResult<()> {
		let chain = fat::get_file_blocks(disk, self.block())?;
		let locations = fat::write_bytes_to_block(disk, new_data, &chain)?;

		if !metadata_only_change {
			let size = (locations.len() * BLOCK_SIZE) as u16;
			let first = locations[0];
			let mut block = disk::read_block(disk, first)?;
			let mut md = Metadata::unpack(&block[..HEADER_LEN]);
			md.size = size;
			block[..HEADER_LEN].copy_from_slice(&md.pack());
			disk::write_block(disk, first, &block)?;
		}

		fat::write_to_table(disk, &locations)
	}

	/// Merges `patch` over the current metadata (zero/empty fields in
	/// `patch` fall back to the current value) and writes the combined
	/// header back, leaving the payload untouched.
	pub fn update_metadata(&self, disk: &mut Disk, mut patch: Metadata) -> FmfsResult<()> {
		let (current, content) = self.get_data(disk)?;
		patch.merge_from(&current);

		let mut new_data = patch.pack().to_vec();
		new_data.extend_from_slice(&content);
		self.save(disk, &new_data, true)
	}

	/// Returns the block index if this item is a directory, `Invalid`
	/// otherwise.
	pub fn upcast_dir(&self) -> FmfsResult<u8> {
		match self {
			Item::Dir(b) => Ok(*b),
			Item::File(_) => Err(FmfsError::Invalid),
		}
	}
}
