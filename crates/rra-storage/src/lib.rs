//! rra-storage — the storage adapter contract of spec.md §6, plus two
//! worked reference adapters.
//!
//! Persistent storage is an external collaborator (spec.md §1): this
//! crate specifies `StorageAdapter` and ships a trivial in-memory adapter
//! plus the two plist-based adapters spec.md §6 describes in bit-exact
//! detail, so their testable properties (§8: round-trip, injective
//! canonical encoding) have something concrete to run against. A SQLite
//! adapter remains out of scope.

mod adapter;
mod canonical;
mod memory;
mod plist;
mod plist_directory;
mod plist_file;

pub use adapter::{AdapterRowIter, StorageAdapter};
pub use canonical::{canonical_digest_hex, canonical_encode};
pub use memory::MemoryAdapter;
pub use plist::{decode_row, encode_row};
pub use plist_directory::RowPlistDirectoryAdapter;
pub use plist_file::PlistFileAdapter;
