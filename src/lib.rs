#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation
)]

pub mod batch;
pub mod cli;
pub mod commit;
pub mod conflict;
pub mod consolidate;
pub mod content;
pub mod error;
pub mod path;
pub mod progress;
pub mod retry;
pub mod store;

mod format;
mod logger;
mod stats;
mod task;

#[cfg(test)]
mod testing;
