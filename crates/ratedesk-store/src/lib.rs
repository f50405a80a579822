//! Storage layer: the durable key-value port, the saved-tier mirror, and the
//! write-through draft store.

mod error;
pub use error::StoreError;

pub mod drafts;
pub mod kv;
pub mod mirror;

pub use drafts::DraftStore;
pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use mirror::SavedMirror;
