//! Directories: items whose payload is a packed sequence of one-byte child
//! block indices, terminated by the first `0x00` byte.

use std::fs::File as Disk;

use crate::disk;
use crate::error::{FmfsError, FmfsResult};
use crate::fat;
use crate::item::Item;
use crate::metadata::Metadata;

/// A directory, identified by the block index of the first block of its
/// chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directory(pub u8);

impl Directory {
	pub fn item(&self) -> Item {
		Item::Dir(self.0)
	}

	pub fn block(&self) -> u8 {
		self.0
	}

	/// The child block indices stored in this directory's payload, up to
	/// but not including the first `0x00` byte (the null-trimming stride
	/// is one byte, matching the child-index encoding, never a larger
	/// field width).
	fn trimmed_children(&self, disk: &mut Disk) -> FmfsResult<Vec<u8>> {
		let raw = self.item().get_contents(disk)?;
		Ok(raw.into_iter().take_while(|&b| b != 0).collect())
	}

	/// Lists this directory's children as `(name, block, type)` triples, in
	/// insertion order. When `strip_null` is false the name is re-padded to
	/// 16 bytes with trailing nulls, matching the raw on-disk NAME field;
	/// when true (the common case) it is the bare name.
	pub fn get_files(&self, disk: &mut Disk, strip_null: bool) -> FmfsResult<Vec<(String, u8, u8)>> {
		let children = self.trimmed_children(disk)?;
		let mut out = Vec::with_capacity(children.len());
		for block in children {
			let md = Metadata::unpack(&disk::read_block(disk, block)?);
			if !md.is_dir() && !md.is_file() {
				return Err(FmfsError::Invalid);
			}
			let name = if strip_null {
				md.name
			} else {
				disk::bytes_to_str(&disk::str_to_bytes(&md.name, 16))
			};
			out.push((name, block, md.type_));
		}
		Ok(out)
	}

	/// The block index of the child named `name`, or `NotFound`.
	pub fn block_index_from_name(&self, disk: &mut Disk, name: &str) -> FmfsResult<u8> {
		self.get_files(disk, true)?
			.into_iter()
			.find(|(n, _, _)| n == name)
			.map(|(_, block, _)| block)
			.ok_or(FmfsError::NotFound)
	}

	/// The block index of an existing child named `name`, if any.
	pub fn ensure_uniqueness(&self, disk: &mut Disk, name: &str) -> FmfsResult<Option<u8>> {
		Ok(self
			.get_files(disk, true)?
			.into_iter()
			.find(|(n, _, _)| n == name)
			.map(|(_, block, _)| block))
	}

	/// Adds a new child: allocates a block for it, writes its metadata and
	/// `initial_data`, links it into this directory's payload, and returns
	/// a handle to it. If a child with the same `name` already exists, its
	/// entry is dropped from the payload and its entire chain destroyed
	/// (destructive overwrite semantics).
	pub fn add_file(
		&self,
		disk: &mut Disk,
		name: &str,
		initial_data: &[u8],
		mut metadata: Metadata,
	) -> FmfsResult<Item> {
		let first_loc = fat::find_free_block(disk, &[])?;
		let existing = self.ensure_uniqueness(disk, name)?;

		metadata.location = first_loc;
		let mut to_write = metadata.pack().to_vec();
		to_write.extend_from_slice(initial_data);

		let blocks_to_write = fat::write_bytes_to_block(disk, &to_write, &[first_loc])?;
		fat::write_to_table(disk, &blocks_to_write)?;

		let mut children = self.trimmed_children(disk)?;
		if let Some(existing) = existing {
			children.retain(|&b| b != existing);
			fat::purge_full_file(disk, existing)?;
		}
		let header = self.item().get_metadata(disk)?;
		let mut new_dir_data = header.pack().to_vec();
		new_dir_data.extend_from_slice(&children);
		new_dir_data.push(blocks_to_write[0]);
		self.item().save(disk, &new_dir_data, false)?;

		Item::from_block(disk, blocks_to_write[0])
	}

	/// Removes `loc` from this directory's payload (the first matching
	/// entry — under the no-hard-links invariant a block index appears at
	/// most once) and destroys its chain.
	pub fn remove_file(&self, disk: &mut Disk, loc: u8) -> FmfsResult<()> {
		self.unlink_entry(disk, loc)?;
		fat::purge_full_file(disk, loc)
	}

	/// Removes `loc` from this directory's payload without destroying its
	/// chain; the child continues to exist until re-linked elsewhere.
	pub fn unlink_file(&self, disk: &mut Disk, loc: u8) -> FmfsResult<()> {
		self.unlink_entry(disk, loc)
	}

	fn unlink_entry(&self, disk: &mut Disk, loc: u8) -> FmfsResult<()> {
		let mut children = self.trimmed_children(disk)?;
		let pos = children
			.iter()
			.position(|&b| b == loc)
			.ok_or(FmfsError::NotFound)?;
		debug_assert!(
			!children[pos + 1..].contains(&loc),
			"block {loc} linked more than once in directory {}",
			self.0
		);
		children.remove(pos);

		let header = self.item().get_metadata(disk)?;
		let mut new_dir_data = header.pack().to_vec();
		new_dir_data.extend_from_slice(&children);
		self.item().save(disk, &new_dir_data, false)
	}

	/// Appends `loc` to this directory's payload and renames the linked
	/// item to `new_name`.
	pub fn link_file(&self, disk: &mut Disk, loc: u8, new_name: &str) -> FmfsResult<()> {
		let children = self.trimmed_children(disk)?;
		let header = self.item().get_metadata(disk)?;
		let mut new_dir_data = header.pack().to_vec();
		new_dir_data.extend_from_slice(&children);
		new_dir_data.push(loc);
		self.item().save(disk, &new_dir_data, false)?;

		let item = Item::from_block(disk, loc)?;
		item.update_metadata(
			disk,
			Metadata {
				name: new_name.to_owned(),
				..Metadata::default()
			},
		)
	}

	/// True iff this directory has no children.
	pub fn deleteable(&self, disk: &mut Disk) -> FmfsResult<bool> {
		Ok(self.trimmed_children(disk)?.is_empty())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fat::{END_OF_FILE, FREE_SPACE};
	use crate::metadata::TYPE_DIR;
	use std::path::Path;

	fn fresh_root(path: &Path) -> Disk {
		disk::low_level_format(path).unwrap();
		let mut disk = disk::open(path).unwrap();
		let mut table_block = [0u8; crate::disk::BLOCK_SIZE];
		table_block[0] = END_OF_FILE;
		table_block[1] = END_OF_FILE;
		for i in 2..16u8 {
			table_block[i as usize] = FREE_SPACE;
		}
		disk::write_block(&mut disk, 0, &table_block).unwrap();

		let md = Metadata {
			name: "FMFS".to_owned(),
			type_: TYPE_DIR,
			location: 1,
			nlinks: 2,
			size: 64,
			..Metadata::default()
		};
		let mut block = [0u8; crate::disk::BLOCK_SIZE];
		block[..crate::metadata::HEADER_LEN].copy_from_slice(&md.pack());
		disk::write_block(&mut disk, 1, &block).unwrap();
		disk
	}

	#[test]
	fn add_file_links_child_and_resolves_by_name() {
		let dir = tempfile::tempdir().unwrap();
		let mut disk = fresh_root(&dir.path().join("d.img"));
		let root = Directory(1);

		let item = root
			.add_file(
				&mut disk,
				"a",
				b"",
				Metadata {
					name: "a".to_owned(),
					type_: 1,
					nlinks: 1,
					..Metadata::default()
				},
			)
			.unwrap();

		let files = root.get_files(&mut disk, true).unwrap();
		assert_eq!(files, vec![("a".to_owned(), item.block(), 1)]);
		assert_eq!(root.block_index_from_name(&mut disk, "a").unwrap(), item.block());
	}

	#[test]
	fn add_file_with_duplicate_name_purges_previous() {
		let dir = tempfile::tempdir().unwrap();
		let mut disk = fresh_root(&dir.path().join("d.img"));
		let root = Directory(1);

		let first = root
			.add_file(&mut disk, "a", b"one", Metadata { name: "a".into(), type_: 1, nlinks: 1, ..Default::default() })
			.unwrap();
		let second = root
			.add_file(&mut disk, "a", b"two", Metadata { name: "a".into(), type_: 1, nlinks: 1, ..Default::default() })
			.unwrap();

		// still exactly one entry named "a"
		let files = root.get_files(&mut disk, true).unwrap();
		assert_eq!(files.len(), 1);
		assert_eq!(files[0].1, second.block());
		assert_ne!(first.block(), second.block());
	}

	#[test]
	fn remove_file_purges_and_unlinks() {
		let dir = tempfile::tempdir().unwrap();
		let mut disk = fresh_root(&dir.path().join("d.img"));
		let root = Directory(1);
		let item = root
			.add_file(&mut disk, "a", b"", Metadata { name: "a".into(), type_: 1, nlinks: 1, ..Default::default() })
			.unwrap();

		root.remove_file(&mut disk, item.block()).unwrap();
		assert!(root.deleteable(&mut disk).unwrap());
		assert!(matches!(
			root.block_index_from_name(&mut disk, "a"),
			Err(FmfsError::NotFound)
		));
	}

	#[test]
	fn unlink_then_link_preserves_chain() {
		let dir = tempfile::tempdir().unwrap();
		let mut disk = fresh_root(&dir.path().join("d.img"));
		let root = Directory(1);
		let item = root
			.add_file(&mut disk, "a", b"payload", Metadata { name: "a".into(), type_: 1, nlinks: 1, ..Default::default() })
			.unwrap();

		root.unlink_file(&mut disk, item.block()).unwrap();
		assert!(root.deleteable(&mut disk).unwrap());

		root.link_file(&mut disk, item.block(), "b").unwrap();
		let files = root.get_files(&mut disk, true).unwrap();
		assert_eq!(files, vec![("b".to_owned(), item.block(), 1)]);

		let content = item.get_contents(&mut disk).unwrap();
		assert_eq!(&content[0..7], b"payload");
	}
}
