//! The top-level service: path resolution, high-level item lifecycle
//! operations, and the format bootstrap.

use std::fs::File as Disk;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::directory::Directory;
use crate::disk::{self, BLOCK_SIZE, NUM_BLOCKS};
use crate::error::{FmfsError, FmfsResult};
use crate::fat;
use crate::metadata::{Metadata, HEADER_LEN, TYPE_DIR, TYPE_FILE};
use crate::item::Item;

/// The block index of the root directory, present from format time.
pub const ROOT_BLOCK: u8 = 1;

fn now_secs() -> u32 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("system clock is before the Unix epoch")
		.as_secs() as u32
}

/// Splits a slash-separated virtual path into `(parent, basename)`, the
/// way `os.path.dirname`/`os.path.basename` do in the original. `"/"` maps
/// to itself with an empty basename.
fn split_path(path: &str) -> (String, String) {
	let trimmed = path.trim_end_matches('/');
	if trimmed.is_empty() {
		return ("/".to_owned(), String::new());
	}
	match trimmed.rfind('/') {
		Some(0) => ("/".to_owned(), trimmed[1..].to_owned()),
		Some(idx) => (trimmed[..idx].to_owned(), trimmed[idx + 1..].to_owned()),
		None => ("/".to_owned(), trimmed.to_owned()),
	}
}

/// Bootstraps a fresh backing file: zero-fills it, writes the initial FAT
/// (block 0) and the root directory (block 1).
pub fn format(path: &Path) -> FmfsResult<()> {
	disk::low_level_format(path)?;
	let mut handle = disk::open(path)?;

	let mut table_block = [0u8; BLOCK_SIZE];
	table_block[0] = fat::END_OF_FILE;
	table_block[1] = fat::END_OF_FILE;
	for i in 2..NUM_BLOCKS {
		table_block[i as usize] = fat::FREE_SPACE;
	}
	disk::write_block(&mut handle, 0, &table_block)?;

	let now = now_secs();
	let root_md = Metadata {
		name: "FMFS".to_owned(),
		mode: libc::S_IFDIR as u16 | 0o755,
		atime: now,
		ctime: now,
		mtime: now,
		nlinks: 2,
		uid: unsafe { libc::getuid() } as u16,
		gid: unsafe { libc::getgid() } as u16,
		type_: TYPE_DIR,
		location: ROOT_BLOCK,
		size: BLOCK_SIZE as u16,
	};
	let mut root_block = [0u8; BLOCK_SIZE];
	root_block[..HEADER_LEN].copy_from_slice(&root_md.pack());
	disk::write_block(&mut handle, ROOT_BLOCK, &root_block)?;

	log::info!(
		"formatted {} ({} blocks x {} bytes)",
		path.display(),
		NUM_BLOCKS,
		BLOCK_SIZE
	);
	Ok(())
}

/// The filesystem service bound to one already-formatted backing file.
pub struct Filesystem {
	disk: Disk,
}

impl Filesystem {
	/// Opens an already-formatted backing file at `path`.
	pub fn open(path: &Path) -> FmfsResult<Self> {
		Ok(Filesystem {
			disk: disk::open(path)?,
		})
	}

	/// Direct access to the backing file handle, for callers (the FUSE
	/// adapter) that need to drive `Item`/`Directory` operations that
	/// aren't otherwise exposed here.
	pub fn disk_mut(&mut self) -> &mut Disk {
		&mut self.disk
	}

	pub fn root(&self) -> Directory {
		Directory(ROOT_BLOCK)
	}

	/// Walks `path` from the root directory to a terminal block index.
	/// Returns `Ok(None)` when a component simply isn't found; returns
	/// `Err` for type contradictions (`Invalid`) or a walk ending on a
	/// non-terminal component (`NotFound`).
	pub fn path_resolver(&mut self, path: &str) -> FmfsResult<Option<u8>> {
		if path == "/" {
			return Ok(Some(ROOT_BLOCK));
		}

		let chunks: Vec<&str> = path.trim_start_matches('/').split('/').collect();
		let last_chunk = *chunks.last().expect("split always yields at least one element");

		let mut current_dir = self.root();
		let mut final_location = None;
		let mut is_at_end = false;

		for chunk in &chunks {
			let possible_file = *chunk == last_chunk;
			let files = current_dir.get_files(&mut self.disk, true)?;
			let hit = files.into_iter().find(|(name, _, _)| name == chunk);

			let Some((_, file_location, filetype)) = hit else {
				return Ok(None);
			};
			if filetype == TYPE_FILE && !possible_file {
				log::error!("`{chunk}` is a file but the path expects a directory");
				return Err(FmfsError::Invalid);
			}
			final_location = Some(file_location);
			if possible_file {
				is_at_end = true;
			} else {
				current_dir = Directory(file_location);
			}
		}

		if !is_at_end {
			return Err(FmfsError::NotFound);
		}
		Ok(final_location)
	}

	/// Resolves `path` to a typed `Item`.
	pub fn smart_resolver(&mut self, path: &str) -> FmfsResult<Item> {
		let block = self.path_resolver(path)?.ok_or(FmfsError::NotFound)?;
		Item::from_block(&mut self.disk, block)
	}

	/// Metadata of the item at `block`, without resolving its type.
	pub fn block_metadata(&mut self, block: u8) -> FmfsResult<Metadata> {
		Ok(Metadata::unpack(&disk::read_block(&mut self.disk, block)?))
	}

	/// Resolves `block` as a directory, failing with `NotFound` if it is a
	/// file (matching the original's `dir_from_block`, which treats a type
	/// mismatch here as the child simply not existing as a directory).
	pub fn dir_from_block(&mut self, block: u8) -> FmfsResult<Directory> {
		let metadata = self.block_metadata(block)?;
		if metadata.is_file() {
			return Err(FmfsError::NotFound);
		}
		Ok(Directory(block))
	}

	/// Creates a child named `filename` inside the directory at
	/// `parent_block`, without any path resolution. This is the primitive
	/// the FUSE adapter drives directly (a FUSE `parent` is already a
	/// directory inode, i.e. a block index), and that the path-based
	/// `create_file`/`create_dir` resolve a path down to before calling.
	pub fn create_in(
		&mut self,
		parent_block: u8,
		filename: &str,
		mode: u16,
		f_type: u8,
	) -> FmfsResult<Item> {
		let parent_dir = self.dir_from_block(parent_block)?;

		let (child_links, base_mode, size) = if f_type == TYPE_DIR {
			let current_links = parent_dir.item().get_metadata(&mut self.disk)?.nlinks;
			parent_dir.item().update_metadata(
				&mut self.disk,
				Metadata {
					nlinks: current_links + 1,
					..Metadata::default()
				},
			)?;
			(2u8, libc::S_IFDIR as u16, BLOCK_SIZE as u16)
		} else {
			(1u8, libc::S_IFREG as u16, 0u16)
		};

		let now = now_secs();
		let metadata = Metadata {
			name: filename.to_owned(),
			mode: base_mode | mode,
			atime: now,
			mtime: now,
			ctime: now,
			size,
			nlinks: child_links,
			type_: f_type,
			uid: unsafe { libc::getuid() } as u16,
			gid: unsafe { libc::getgid() } as u16,
			location: 0,
		};

		parent_dir.add_file(&mut self.disk, filename, &[], metadata)
	}

	fn internal_item_maker(&mut self, path: &str, mode: u16, f_type: u8) -> FmfsResult<Item> {
		let (dirname, filename) = split_path(path);
		let parent_block = self.path_resolver(&dirname)?.ok_or(FmfsError::NotFound)?;
		self.create_in(parent_block, &filename, mode, f_type)
	}

	/// Creates a regular file at `path` with the given permission `mode`.
	pub fn create_file(&mut self, path: &str, mode: u16) -> FmfsResult<Item> {
		self.internal_item_maker(path, mode, TYPE_FILE)
	}

	/// Creates a directory at `path` with the given permission `mode`.
	pub fn create_dir(&mut self, path: &str, mode: u16) -> FmfsResult<Item> {
		self.internal_item_maker(path, mode, TYPE_DIR)
	}

	/// Overwrites `data` at `offset` into the item whose chain starts at
	/// `first_block`, truncating anything past `offset + data.len()`.
	/// Returns the number of bytes written.
	pub fn edit_file(&mut self, first_block: u8, data: &[u8], offset: usize) -> FmfsResult<usize> {
		let item = Item::from_block(&mut self.disk, first_block)?;
		let (mut metadata, old_content) = item.get_data(&mut self.disk)?;

		if metadata.location == 0 {
			log::error!("cannot edit an item with no LOCATION in its metadata");
			return Err(FmfsError::NotFound);
		}

		let keep_len = offset.min(old_content.len());
		let kept_prefix = &old_content[..keep_len];
		let new_len = kept_prefix.len() + data.len();

		metadata.touch_all(now_secs());
		metadata.size = new_len as u16;

		let mut to_write = metadata.pack().to_vec();
		to_write.extend_from_slice(kept_prefix);
		to_write.extend_from_slice(data);

		let chain = fat::get_file_blocks(&mut self.disk, metadata.location)?;
		let locations = fat::write_bytes_to_block(&mut self.disk, &to_write, &chain)?;
		fat::write_to_table(&mut self.disk, &locations)?;

		Ok(data.len())
	}

	/// Moves the child named `old_name` of `old_parent_block` to be named
	/// `new_name` under `new_parent_block`, without path resolution.
	pub fn rename_in(
		&mut self,
		old_parent_block: u8,
		old_name: &str,
		new_parent_block: u8,
		new_name: &str,
	) -> FmfsResult<()> {
		let old_parent = self.dir_from_block(old_parent_block)?;
		let new_parent = self.dir_from_block(new_parent_block)?;
		let loc = old_parent.block_index_from_name(&mut self.disk, old_name)?;

		old_parent.unlink_file(&mut self.disk, loc)?;
		new_parent.link_file(&mut self.disk, loc, new_name)
	}

	/// Moves the item at `old` to `new`, across directories if needed,
	/// preserving its block/chain and updating only its NAME.
	pub fn rename(&mut self, old: &str, new: &str) -> FmfsResult<()> {
		let (old_dir, old_name) = split_path(old);
		let (new_dir, new_name) = split_path(new);
		let old_parent_block = self.path_resolver(&old_dir)?.ok_or(FmfsError::NotFound)?;
		let new_parent_block = self.path_resolver(&new_dir)?.ok_or(FmfsError::NotFound)?;
		self.rename_in(old_parent_block, &old_name, new_parent_block, &new_name)
	}

	/// Unlinks (and destroys) the child named `name` of `parent_block`,
	/// without path resolution.
	pub fn unlink_in(&mut self, parent_block: u8, name: &str) -> FmfsResult<()> {
		let parent = self.dir_from_block(parent_block)?;
		let loc = parent.block_index_from_name(&mut self.disk, name)?;
		parent.remove_file(&mut self.disk, loc)
	}

	/// Unlinks (and destroys) the file at `path`.
	pub fn unlink(&mut self, path: &str) -> FmfsResult<()> {
		let (dir_path, name) = split_path(path);
		let dir_block = self.path_resolver(&dir_path)?.ok_or(FmfsError::NotFound)?;
		self.unlink_in(dir_block, &name)
	}

	/// Removes the empty directory named `name` inside `parent_block`,
	/// without path resolution. Fails with `NotEmpty` if it still has
	/// children.
	pub fn rmdir_in(&mut self, parent_block: u8, name: &str) -> FmfsResult<()> {
		let parent = self.dir_from_block(parent_block)?;
		let loc = parent.block_index_from_name(&mut self.disk, name)?;
		let target = self.dir_from_block(loc)?;
		if !target.deleteable(&mut self.disk)? {
			return Err(FmfsError::NotEmpty);
		}

		parent.remove_file(&mut self.disk, loc)?;

		let current_links = parent.item().get_metadata(&mut self.disk)?.nlinks;
		// `nlinks` can't legitimately hit 0 here: a directory starts at 2
		// and only ever gains links from child directories, so the
		// decrement below never collides with `update_metadata`'s
		// zero-means-unset merge.
		parent.item().update_metadata(
			&mut self.disk,
			Metadata {
				nlinks: current_links.saturating_sub(1),
				..Metadata::default()
			},
		)
	}

	/// Removes the empty directory at `path`. Fails with `NotEmpty` if it
	/// still has children.
	pub fn rmdir(&mut self, path: &str) -> FmfsResult<()> {
		let (parent_path, name) = split_path(path);
		let parent_block = self.path_resolver(&parent_path)?.ok_or(FmfsError::NotFound)?;
		self.rmdir_in(parent_block, &name)
	}

	/// Overwrites ATIME/MTIME on the item at `path`, leaving other fields
	/// untouched.
	pub fn utimens(&mut self, path: &str, atime: u32, mtime: u32) -> FmfsResult<()> {
		let block = self.path_resolver(path)?.ok_or(FmfsError::NotFound)?;
		self.patch_metadata(block, Metadata { atime, mtime, ..Metadata::default() })
	}

	/// Merges `patch` over the current metadata of the item at `block`
	/// (see [`Metadata::merge_from`] for the merge semantics) and returns
	/// the item's metadata as it stands afterwards.
	pub fn patch_metadata(&mut self, block: u8, patch: Metadata) -> FmfsResult<()> {
		Item::from_block(&mut self.disk, block)?.update_metadata(&mut self.disk, patch)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn formatted(path: &Path) -> Filesystem {
		format(path).unwrap();
		Filesystem::open(path).unwrap()
	}

	#[test]
	fn split_path_examples() {
		assert_eq!(split_path("/"), ("/".to_owned(), String::new()));
		assert_eq!(split_path("/a"), ("/".to_owned(), "a".to_owned()));
		assert_eq!(split_path("/d/x2"), ("/d".to_owned(), "x2".to_owned()));
	}

	#[test]
	fn format_produces_expected_bytes() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("d.img");
		format(&path).unwrap();
		let mut disk = disk::open(&path).unwrap();

		let table = disk::read_block(&mut disk, 0).unwrap();
		assert_eq!(table[0], fat::END_OF_FILE);
		assert_eq!(table[1], fat::END_OF_FILE);
		assert!(table[2..16].iter().all(|&b| b == fat::FREE_SPACE));

		let root = disk::read_block(&mut disk, 1).unwrap();
		assert_eq!(&root[0..4], b"FMFS");
		assert_eq!(&root[4..16], [0u8; 12]);
		assert_eq!(root[38], TYPE_DIR);
		assert_eq!(root[37], ROOT_BLOCK);
	}

	#[test]
	fn create_file_appears_in_readdir_and_getattr() {
		let dir = tempfile::tempdir().unwrap();
		let mut fs = formatted(&dir.path().join("d.img"));

		fs.create_file("/a", 0o644).unwrap();
		let files = fs.root().get_files(fs.disk_mut(), true).unwrap();
		assert_eq!(files, vec![("a".to_owned(), 2, TYPE_FILE)]);

		let md = fs.block_metadata(2).unwrap();
		assert_eq!(md.mode & (libc::S_IFREG as u16), libc::S_IFREG as u16);
		assert_eq!(md.name, "a");

		let table = disk::read_block(fs.disk_mut(), 0).unwrap();
		assert_eq!(table[1], fat::END_OF_FILE);
		assert_eq!(table[2], fat::END_OF_FILE);
	}

	#[test]
	fn write_across_a_block_boundary() {
		let dir = tempfile::tempdir().unwrap();
		let mut fs = formatted(&dir.path().join("d.img"));
		fs.create_file("/b", 0o644).unwrap();
		let block = fs.path_resolver("/b").unwrap().unwrap();

		let first = vec![1u8; 50];
		fs.edit_file(block, &first, 0).unwrap();
		let second = vec![2u8; 30];
		fs.edit_file(block, &second, 50).unwrap();

		let item = Item::from_block(fs.disk_mut(), block).unwrap();
		let chain = fat::get_file_blocks(fs.disk_mut(), block).unwrap();
		assert_eq!(chain.len(), 2);

		let content = item.get_contents(fs.disk_mut()).unwrap();
		let mut expected = vec![1u8; 50];
		expected.extend(vec![2u8; 30]);
		assert_eq!(&content[0..80], expected.as_slice());
	}

	#[test]
	fn rename_across_directories_preserves_content() {
		let dir = tempfile::tempdir().unwrap();
		let mut fs = formatted(&dir.path().join("d.img"));
		fs.create_dir("/d", 0o755).unwrap();
		fs.create_file("/x", 0o644).unwrap();
		let block = fs.path_resolver("/x").unwrap().unwrap();
		fs.edit_file(block, b"hello world", 0).unwrap();

		fs.rename("/x", "/d/x2").unwrap();

		assert!(matches!(fs.path_resolver("/x"), Ok(None)));
		let files = fs.dir_from_block(fs.path_resolver("/d").unwrap().unwrap())
			.unwrap()
			.get_files(fs.disk_mut(), true)
			.unwrap();
		assert_eq!(files, vec![("x2".to_owned(), block, TYPE_FILE)]);

		let item = Item::from_block(fs.disk_mut(), block).unwrap();
		let content = item.get_contents(fs.disk_mut()).unwrap();
		assert_eq!(&content[0..11], b"hello world");
	}

	#[test]
	fn rmdir_refuses_nonempty_then_succeeds_when_empty() {
		let dir = tempfile::tempdir().unwrap();
		let mut fs = formatted(&dir.path().join("d.img"));
		fs.create_dir("/e", 0o755).unwrap();
		fs.create_file("/e/f", 0o644).unwrap();

		assert!(matches!(fs.rmdir("/e"), Err(FmfsError::NotEmpty)));

		fs.unlink("/e/f").unwrap();
		fs.rmdir("/e").unwrap();

		assert!(matches!(fs.path_resolver("/e"), Ok(None)));
		let root_md = fs.block_metadata(ROOT_BLOCK).unwrap();
		assert_eq!(root_md.nlinks, 2);
	}

	#[test]
	fn create_fails_with_no_space_then_recovers_after_unlink() {
		let dir = tempfile::tempdir().unwrap();
		let mut fs = formatted(&dir.path().join("d.img"));

		// blocks 2..16 are free (14 blocks); fill them all.
		for i in 0..14 {
			fs.create_file(&format!("/f{i}"), 0o644).unwrap();
		}
		assert!(matches!(
			fs.create_file("/overflow", 0o644),
			Err(FmfsError::NoSpace)
		));

		fs.unlink("/f0").unwrap();
		assert!(fs.create_file("/overflow", 0o644).is_ok());
	}
}
