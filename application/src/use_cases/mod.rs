//! Application use cases

pub mod attach_stream;
pub mod run_moderator;
pub mod run_presearch;
pub mod run_round;
pub mod stream_participants;
pub mod submit_round;

#[cfg(test)]
pub(crate) mod support;
