//! File system collaborators: the async trait, an in-memory backend for
//! hermetic runs, and the OS backend for the CLI.

pub mod in_memory;
pub mod os;
pub mod types;

pub use in_memory::InMemoryFs;
pub use os::OsFs;
pub use types::{normalize_path, FileSystem, FsError, FsStat};
