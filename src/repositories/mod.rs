//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM operations
//! for database entities.

pub mod poll;
pub mod poll_vote;

pub use poll::PollRepository;
pub use poll_vote::PollVoteRepository;
