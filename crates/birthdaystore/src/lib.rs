//! # birthdaystore
//!
//! Embedded store mapping case-normalized names to birthdays.
//!
//! ## Design
//! - Single table: `name -> date`, upsert and point lookup
//! - Append-only record log, replayed into an in-memory index on open
//! - One writer at a time, unlimited readers

#![warn(missing_docs)]

mod error;
mod parser;
mod storage;
mod types;

pub use error::{Error, Result};
pub use storage::{BirthdayStore, MAX_NAME_LEN};
pub use types::{Birthday, Name};
