//! The FUSE boundary: translates `fuser`'s inode-based callback API onto
//! the block-addressed operations in [`crate::filesystem`].
//!
//! A block index doubles as a FUSE inode number (root block
//! [`crate::filesystem::ROOT_BLOCK`] ↔ `fuser::FUSE_ROOT_ID`), so `lookup`
//! and friends work directly off `Directory`/`Item`, without needing a
//! separate inode table. The on-disk format carries no parent pointers,
//! so `readdir`'s `".."` entry is approximated as the directory itself
//! everywhere except the root (see `readdir` below).

use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
	FileAttr, FileType, Filesystem as FuseFilesystem, ReplyAttr, ReplyCreate, ReplyData,
	ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
	FUSE_ROOT_ID,
};

use crate::directory::Directory;
use crate::disk::BLOCK_SIZE;
use crate::filesystem::{Filesystem, ROOT_BLOCK};
use crate::item::Item;
use crate::metadata::{Metadata, TYPE_DIR, TYPE_FILE};

const TTL: Duration = Duration::from_secs(1);

fn block_to_ino(block: u8) -> u64 {
	if block == ROOT_BLOCK {
		FUSE_ROOT_ID
	} else {
		block as u64
	}
}

fn ino_to_block(ino: u64) -> u8 {
	if ino == FUSE_ROOT_ID {
		ROOT_BLOCK
	} else {
		ino as u8
	}
}

fn now_secs() -> u32 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("system clock is before the Unix epoch")
		.as_secs() as u32
}

fn system_time(secs: u32) -> SystemTime {
	UNIX_EPOCH + Duration::from_secs(secs as u64)
}

fn to_file_attr(ino: u64, md: &Metadata) -> FileAttr {
	let kind = if md.is_dir() {
		FileType::Directory
	} else {
		FileType::RegularFile
	};
	FileAttr {
		ino,
		size: md.size as u64,
		blocks: 1,
		atime: system_time(md.atime),
		mtime: system_time(md.mtime),
		ctime: system_time(md.ctime),
		crtime: system_time(md.ctime),
		kind,
		perm: (md.mode & 0o7777) as u16,
		nlink: md.nlinks as u32,
		uid: md.uid as u32,
		gid: md.gid as u32,
		rdev: 0,
		blksize: BLOCK_SIZE as u32,
		flags: 0,
	}
}

fn time_or_now_to_secs(t: TimeOrNow) -> u32 {
	match t {
		TimeOrNow::SpecificTime(st) => st
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_secs() as u32)
			.unwrap_or_else(|_| now_secs()),
		TimeOrNow::Now => now_secs(),
	}
}

fn os_str_to_name(name: &OsStr) -> Result<&str, i32> {
	name.to_str().ok_or(libc::EINVAL)
}

/// Adapts a [`Filesystem`] to `fuser`'s low-level callback trait.
pub struct FuseFs {
	fs: Filesystem,
	next_fh: u64,
}

impl FuseFs {
	pub fn new(fs: Filesystem) -> Self {
		FuseFs { fs, next_fh: 1 }
	}

	fn alloc_fh(&mut self) -> u64 {
		let fh = self.next_fh;
		self.next_fh = self.next_fh.wrapping_add(1).max(1);
		fh
	}

	fn attr_for(&mut self, block: u8) -> Result<FileAttr, i32> {
		let md = self.fs.block_metadata(block).map_err(|e| e.errno())?;
		Ok(to_file_attr(block_to_ino(block), &md))
	}
}

impl FuseFilesystem for FuseFs {
	fn init(
		&mut self,
		_req: &Request<'_>,
		_config: &mut fuser::KernelConfig,
	) -> Result<(), libc::c_int> {
		log::info!("fmfs mounted");
		Ok(())
	}

	fn destroy(&mut self) {
		log::info!("fmfs unmounted");
	}

	fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
		let name = match os_str_to_name(name) {
			Ok(n) => n,
			Err(errno) => return reply.error(errno),
		};
		let parent_block = ino_to_block(parent);
		let dir = Directory(parent_block);
		match dir.block_index_from_name(self.fs.disk_mut(), name) {
			Ok(block) => match self.attr_for(block) {
				Ok(attr) => reply.entry(&TTL, &attr, 0),
				Err(errno) => reply.error(errno),
			},
			Err(e) => reply.error(e.errno()),
		}
	}

	fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
		match self.attr_for(ino_to_block(ino)) {
			Ok(attr) => reply.attr(&TTL, &attr),
			Err(errno) => reply.error(errno),
		}
	}

	fn setattr(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		mode: Option<u32>,
		uid: Option<u32>,
		gid: Option<u32>,
		_size: Option<u64>,
		atime: Option<TimeOrNow>,
		mtime: Option<TimeOrNow>,
		_ctime: Option<SystemTime>,
		_fh: Option<u64>,
		_crtime: Option<SystemTime>,
		_chgtime: Option<SystemTime>,
		_bkuptime: Option<SystemTime>,
		_flags: Option<u32>,
		reply: ReplyAttr,
	) {
		let block = ino_to_block(ino);
		let patch = Metadata {
			mode: mode.map(|m| (m & 0o7777) as u16).unwrap_or(0),
			uid: uid.map(|u| u as u16).unwrap_or(0),
			gid: gid.map(|g| g as u16).unwrap_or(0),
			atime: atime.map(time_or_now_to_secs).unwrap_or(0),
			mtime: mtime.map(time_or_now_to_secs).unwrap_or(0),
			..Metadata::default()
		};
		if let Err(e) = self.fs.patch_metadata(block, patch) {
			return reply.error(e.errno());
		}
		match self.attr_for(block) {
			Ok(attr) => reply.attr(&TTL, &attr),
			Err(errno) => reply.error(errno),
		}
	}

	fn readdir(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		mut reply: ReplyDirectory,
	) {
		let block = ino_to_block(ino);
		let dir = Directory(block);
		let children = match dir.get_files(self.fs.disk_mut(), true) {
			Ok(files) => files,
			Err(e) => return reply.error(e.errno()),
		};

		// No parent pointer is stored on disk; approximate ".." as the
		// directory itself for any non-root directory.
		let mut entries = vec![
			(ino, FileType::Directory, ".".to_owned()),
			(ino, FileType::Directory, "..".to_owned()),
		];
		for (name, child_block, ftype) in children {
			let kind = if ftype == TYPE_DIR {
				FileType::Directory
			} else {
				FileType::RegularFile
			};
			entries.push((block_to_ino(child_block), kind, name));
		}

		for (i, (child_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
			if reply.add(child_ino, (i + 1) as i64, kind, name) {
				break;
			}
		}
		reply.ok();
	}

	fn create(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		mode: u32,
		_umask: u32,
		_flags: i32,
		reply: ReplyCreate,
	) {
		let name = match os_str_to_name(name) {
			Ok(n) => n,
			Err(errno) => return reply.error(errno),
		};
		let mode16 = (mode & 0o7777) as u16;
		match self.fs.create_in(ino_to_block(parent), name, mode16, TYPE_FILE) {
			Ok(item) => match self.attr_for(item.block()) {
				Ok(attr) => {
					let fh = self.alloc_fh();
					reply.created(&TTL, &attr, 0, fh, 0);
				}
				Err(errno) => reply.error(errno),
			},
			Err(e) => reply.error(e.errno()),
		}
	}

	fn mkdir(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		mode: u32,
		_umask: u32,
		reply: ReplyEntry,
	) {
		let name = match os_str_to_name(name) {
			Ok(n) => n,
			Err(errno) => return reply.error(errno),
		};
		let mode16 = (mode & 0o7777) as u16;
		match self.fs.create_in(ino_to_block(parent), name, mode16, TYPE_DIR) {
			Ok(item) => match self.attr_for(item.block()) {
				Ok(attr) => reply.entry(&TTL, &attr, 0),
				Err(errno) => reply.error(errno),
			},
			Err(e) => reply.error(e.errno()),
		}
	}

	fn open(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
		reply.opened(self.alloc_fh(), 0);
	}

	fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
		reply.opened(self.alloc_fh(), 0);
	}

	fn read(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		size: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyData,
	) {
		let block = ino_to_block(ino);
		let item = match Item::from_block(self.fs.disk_mut(), block) {
			Ok(item) => item,
			Err(e) => return reply.error(e.errno()),
		};
		let (metadata, content) = match item.get_data(self.fs.disk_mut()) {
			Ok(data) => data,
			Err(e) => return reply.error(e.errno()),
		};
		let len = (metadata.size as usize).min(content.len());
		let start = (offset as usize).min(len);
		let end = (start + size as usize).min(len);
		reply.data(&content[start..end]);
	}

	fn write(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		data: &[u8],
		_write_flags: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyWrite,
	) {
		let block = ino_to_block(ino);
		match self.fs.edit_file(block, data, offset as usize) {
			Ok(written) => reply.written(written as u32),
			Err(e) => reply.error(e.errno()),
		}
	}

	fn rename(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		newparent: u64,
		newname: &OsStr,
		_flags: u32,
		reply: ReplyEmpty,
	) {
		let name = match os_str_to_name(name) {
			Ok(n) => n,
			Err(errno) => return reply.error(errno),
		};
		let newname = match os_str_to_name(newname) {
			Ok(n) => n,
			Err(errno) => return reply.error(errno),
		};
		match self.fs.rename_in(ino_to_block(parent), name, ino_to_block(newparent), newname) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(e.errno()),
		}
	}

	fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		let name = match os_str_to_name(name) {
			Ok(n) => n,
			Err(errno) => return reply.error(errno),
		};
		match self.fs.unlink_in(ino_to_block(parent), name) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(e.errno()),
		}
	}

	fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		let name = match os_str_to_name(name) {
			Ok(n) => n,
			Err(errno) => return reply.error(errno),
		};
		match self.fs.rmdir_in(ino_to_block(parent), name) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(e.errno()),
		}
	}

	fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
		// Synthetic constant geometry, independent of the real 16x64 backing
		// file: block size 512, 4096 blocks, 2048 available.
		reply.statfs(4096, 2048, 2048, 0, 0, 512, 255, 512);
	}

	fn getxattr(
		&mut self,
		_req: &Request<'_>,
		_ino: u64,
		_name: &OsStr,
		_size: u32,
		reply: fuser::ReplyXattr,
	) {
		reply.data(&[]);
	}
}
