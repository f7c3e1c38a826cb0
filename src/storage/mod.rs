//! Storage layer for noteguard
//!
//! Provides JSON file storage with atomic writes and the note store the backup
//! pipelines read from and restore into.

pub mod file_io;
pub mod notes;

pub use file_io::{read_json, write_bytes_atomic, write_json_atomic};
pub use notes::{JsonNoteStore, NoteStore};
