//! FMFS: a tiny hierarchical filesystem stored in a single fixed-size
//! backing file, exposed through FUSE.
//!
//! The module layering is strictly bottom-up: codecs (`disk`) sit under the
//! allocation table (`fat`), which sits under the item abstraction
//! (`item`) — whose `Item::File`/`Item::Dir` variants already carry the
//! file/directory specialisation, so there is no separate `File` type —
//! which sits under `directory` and the orchestration layer (`filesystem`),
//! which the FUSE boundary (`fuse_adapter`) wraps.

pub mod directory;
pub mod disk;
pub mod error;
pub mod fat;
pub mod filesystem;
pub mod fuse_adapter;
pub mod item;
pub mod metadata;

pub use error::{FmfsError, FmfsResult};
pub use filesystem::Filesystem;
