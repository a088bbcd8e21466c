//! Store backends living in this crate.
//!
//! The Postgres backend is in `boxoffice-postgres`.

mod memory;

pub use memory::MemoryStore;
