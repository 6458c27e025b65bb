#![warn(missing_docs)]

//! catalogd replication: sequenced edit journal, follower apply loop, lag tracking

pub mod error;
pub mod follower;
pub mod journal;
pub mod tracker;

pub use error::ReplError;
pub use follower::{Follower, ReplicationCursor};
pub use journal::{EditJournal, JournalEntry, Subscription};
pub use tracker::{FollowerState, ReplicationTracker};
