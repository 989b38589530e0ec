//! Surfaces through which a user reaches the counselor core.
//!
//! Only the CLI adapter ships in this crate; a web frontend consumes the
//! same [`crate::service::CounselService`] contract from its own process.

pub mod cli;
