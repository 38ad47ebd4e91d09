//! Round domain model
//!
//! A round owns one user turn: its frozen configuration snapshot, the state
//! machine that walks it from submission to completion, the changelog
//! against the prior round's configuration, and the client session flags.

pub mod changelog;
pub mod entities;
pub mod session;
