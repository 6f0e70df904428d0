//! SessionStore - durable keyed record storage
//!
//! A small persistence layer that keeps a map of `id -> record` in a single
//! JSON file. Writes are atomic (temp file + fsync + rename under an advisory
//! lock), so a crash mid-persist never leaves a truncated file behind. Each
//! write re-reads the file under that lock first, so several handles (or
//! processes) over the same file keep each other's records.
//!
//! Loading is forgiving: a missing file is an empty store, an unparsable file
//! is logged and treated as empty, and an individual record that no longer
//! deserializes is dropped on its own while its siblings survive.

mod error;
mod store;

pub use error::StoreError;
pub use store::{JsonStore, LoadStatus};
