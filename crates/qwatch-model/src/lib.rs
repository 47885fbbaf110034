//! Domain types shared by the qwatch crates.
//!
//! Everything here is plain data: identifiers, lifecycle states and the wire shapes used by the API layer.
//! Nothing in this crate knows about threads, engines or sessions.

mod domain;
pub use domain::*;

mod error;
pub use error::ModelError;
