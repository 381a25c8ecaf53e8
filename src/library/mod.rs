//! In-memory mirror of the server library

pub mod models;
pub mod store;

pub use models::*;
pub use store::{LibraryContent, LibraryStore};
