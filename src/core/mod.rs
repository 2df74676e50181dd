//! Core modules for Covenant's contract model and blueprint resolver.
//!
//! Leaf utilities first (`cardinality`, `object_set`, `template`,
//! `variants`, `matcher_cache`, `children_tree`), then the contract engine
//! and the blueprint resolver built on top of it.

pub mod blueprint;
pub mod cardinality;
pub mod children_tree;
pub mod contract;
pub mod error;
pub mod hash;
pub mod matcher_cache;
pub mod object_set;
pub mod template;
pub mod variants;
pub mod version;
