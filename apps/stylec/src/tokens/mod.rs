// Token Store: canonical, versioned registry of named design values.
// Snapshots are immutable; every downstream artifact records the version it came from.

pub mod model;
pub mod resolve;
pub mod snapshot;
mod source;

use crate::errors::StyleError;
use snapshot::TokenSnapshot;

/// Loads a token source into its first snapshot.
pub fn load(source: &str) -> Result<TokenSnapshot, StyleError> {
    TokenSnapshot::load(source)
}
