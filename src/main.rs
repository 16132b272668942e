//! Command-line entry point: `fmfs format <path>` bootstraps a backing
//! file; `fmfs mount <path> <mountpoint>` serves it over FUSE.

use std::path::Path;
use std::process::exit;

use fmfs::filesystem::Filesystem;
use fmfs::fuse_adapter::FuseFs;

fn usage() -> ! {
	eprintln!("usage:");
	eprintln!("  fmfs format <path>");
	eprintln!("  fmfs mount <path> <mountpoint>");
	exit(1);
}

fn main() {
	env_logger::init();

	let args: Vec<String> = std::env::args().collect();
	match args.get(1).map(String::as_str) {
		Some("format") => {
			let Some(path) = args.get(2) else { usage() };
			if let Err(e) = fmfs::filesystem::format(Path::new(path)) {
				eprintln!("fmfs: format failed: {e}");
				exit(1);
			}
		}
		Some("mount") => {
			let (Some(path), Some(mountpoint)) = (args.get(2), args.get(3)) else {
				usage()
			};
			let fs = match Filesystem::open(Path::new(path)) {
				Ok(fs) => fs,
				Err(e) => {
					eprintln!("fmfs: could not open {path}: {e}");
					exit(1);
				}
			};

			let options = vec![
				fuser::MountOption::FSName("fmfs".to_owned()),
				fuser::MountOption::AutoUnmount,
			];
			log::info!("mounting {path} at {mountpoint}");
			if let Err(e) = fuser::mount2(FuseFs::new(fs), mountpoint, &options) {
				eprintln!("fmfs: mount failed: {e}");
				exit(1);
			}
		}
		_ => usage(),
	}
}
