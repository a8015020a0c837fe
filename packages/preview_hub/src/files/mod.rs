pub mod store;
pub mod types;

pub use store::{evict, list_directory, mkdir, prepare_dir, read, remove, write};
pub use types::{DirEntry, EntryKind, RelPath};
