//! Record model shared by repositories and host types.
//!
//! # Responsibility
//! - Define the `Record` contract host types implement.
//! - Describe table columns declaratively through `AttributeMap`.
//!
//! # Invariants
//! - Every bound row is keyed by an integer `id` owned by storage.

pub mod attributes;
pub mod record;
