//! Core types, ranking algorithms and trait definitions for Versus.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! storage backend implements [`store::RankingStore`] and
//! [`transaction::VoteUnitOfWork`]; the [`engine::Engine`] ties pair
//! selection, vote recording and progress reporting together on top of them.

pub mod engine;
pub mod error;
pub mod item;
pub mod limiter;
pub mod notify;
pub mod pairing;
pub mod progress;
pub mod ranking;
pub mod rating;
pub mod record;
pub mod settings;
pub mod store;
pub mod transaction;
pub mod voter;

pub use error::{Error, ErrorKind, Result};
