//! Sessions: durable records and the manager that creates and resumes them

mod manager;
mod store;

pub use manager::SessionManager;
pub use store::{FileSessionStore, MemorySessionStore, SessionRecord, SessionStore};
