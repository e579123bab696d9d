//! # eduauth-cli: Operator Commands
//!
//! - [`fingerprint`]: print the identity fingerprint for an identity number.
//! - [`seed`]: create the bootstrap administrator in the configured database.

pub mod fingerprint;
pub mod seed;
