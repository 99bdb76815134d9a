//! `remit-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod amount;
pub mod error;
pub mod id;
pub mod value_object;

pub use amount::Amount;
pub use error::DomainError;
pub use id::{AccountId, EntryId};
pub use value_object::ValueObject;
