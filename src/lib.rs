//! Covenant: a typed contract model and combinatorial blueprint resolver.
//!
//! **Covenant resolves valid combinations of typed, versioned contract
//! documents into composite configurations.**
//!
//! A *contract* is a content-hashed, typed node (a device type, a CPU
//! architecture, an operating system, ...) that may own child contracts and
//! may declare requirements over other contracts. A *blueprint* declares a
//! cardinality layout over contract types and searches a candidate universe
//! for composite *contexts* that satisfy every declared requirement.
//!
//! # Core principles
//!
//! - **Content-addressed**: a contract's identity is a structural hash of its
//!   raw document; equality is hash equality.
//! - **Owned trees, not pointer graphs**: children are stored in a hash-keyed
//!   arena with type/slug secondary indices; requirements reference
//!   candidates by criteria, never by pointer.
//! - **Deterministic**: every operation is pure and synchronous given its
//!   inputs; there is no I/O, no background work, and no shared mutable
//!   state across contract instances.
//! - **Bounded search**: blueprint resolution exposes lazy enumeration so
//!   callers can stop consuming instead of cancelling.
//!
//! # Subsystems
//!
//! - `cardinality`: selector occupancy bounds (`1`, `"2+"`, `"*"`, `[1, 3]`)
//! - `object_set`: insertion-ordered, hash-keyed dedup collections
//! - `template`: `{{path}}` interpolation over a contract's own document
//! - `variants`: raw-document variant expansion
//! - `contract`: identity, children indexing, requirement matching
//! - `blueprint`: layout parsing and combinatorial context resolution
//!
//! # Example
//!
//! ```
//! use covenant::core::blueprint::{Blueprint, SequenceOptions};
//! use covenant::core::contract::Contract;
//! use serde_json::json;
//!
//! let mut universe = Contract::new(json!({ "type": "meta.universe" })).unwrap();
//! universe
//!     .add_children(vec![
//!         Contract::new(json!({
//!             "type": "hw.device-type",
//!             "slug": "raspberry-pi",
//!             "requires": [{ "type": "arch.sw", "slug": "armv7hf" }]
//!         }))
//!         .unwrap(),
//!         Contract::new(json!({ "type": "arch.sw", "slug": "armv7hf" })).unwrap(),
//!     ])
//!     .unwrap();
//!
//! let blueprint = Blueprint::new(
//!     json!({ "hw.device-type": 1, "arch.sw": 1 }),
//!     json!({ "type": "meta.context" }),
//! )
//! .unwrap();
//!
//! let contexts = blueprint
//!     .sequence(&universe, SequenceOptions::default())
//!     .unwrap();
//! assert_eq!(contexts.len(), 1);
//! ```

pub mod core;

pub use crate::core::blueprint::{Blueprint, ReproduceIter, SequenceOptions, StructuralFilter};
pub use crate::core::cardinality::Cardinality;
pub use crate::core::contract::Contract;
pub use crate::core::error::CovenantError;
pub use crate::core::object_set::ObjectSet;
