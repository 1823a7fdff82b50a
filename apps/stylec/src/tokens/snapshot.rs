//! Immutable, versioned token snapshots.
//!
//! A snapshot is created by loading a token source and is never mutated afterwards.
//! Changing the source produces a new snapshot via `supersede`, which bumps the
//! sequence number and records the version it replaces.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::StyleError;
use crate::tokens::model::{Derivation, Token};
use crate::tokens::resolve::{resolve_chain, Link};
use crate::tokens::source::{parse_source, RawEntry, RawKind};

/// Role of the token that governs font-relative values without an explicit `font`.
pub const BASE_FONT_SIZE_ROLE: &str = "base-font-size";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotVersion {
    pub sequence: u32,
    /// First 16 hex characters of the SHA-256 over the canonical token listing.
    pub digest: String,
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}-{}", self.sequence, self.digest)
    }
}

#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    version: SnapshotVersion,
    previous: Option<SnapshotVersion>,
    tokens: Vec<Token>,
    index: HashMap<String, usize>,
}

impl TokenSnapshot {
    /// Loads the first snapshot from a token source.
    ///
    /// Fails with `TokenParse` on malformed source, duplicate ids or unresolved
    /// references, and with `CyclicToken` when a derivation chain loops.
    pub fn load(source: &str) -> Result<Self, StyleError> {
        let entries = parse_source(source)?;
        Self::from_entries(entries, 1, None)
    }

    /// Loads a new snapshot that replaces `self`. `self` is left untouched.
    #[allow(dead_code)]
    pub fn supersede(&self, source: &str) -> Result<Self, StyleError> {
        let entries = parse_source(source)?;
        Self::from_entries(
            entries,
            self.version.sequence + 1,
            Some(self.version.clone()),
        )
    }

    fn from_entries(
        entries: Vec<RawEntry>,
        sequence: u32,
        previous: Option<SnapshotVersion>,
    ) -> Result<Self, StyleError> {
        let mut index: HashMap<String, usize> = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.id.clone(), i).is_some() {
                return Err(StyleError::token_parse(Some(&entry.id), "duplicate token id"));
            }
        }

        for entry in &entries {
            if let RawKind::Computed { from, .. } = &entry.kind {
                if !index.contains_key(from) {
                    return Err(StyleError::token_parse(
                        Some(&entry.id),
                        format!("derived_from references unknown token '{from}'"),
                    ));
                }
            }
            if let Some(font) = &entry.font {
                if !index.contains_key(font) {
                    return Err(StyleError::token_parse(
                        Some(&entry.id),
                        format!("font references unknown token '{font}'"),
                    ));
                }
            }
        }

        let lookup = |id: &str| {
            index.get(id).map(|&i| {
                let e = &entries[i];
                match &e.kind {
                    RawKind::Literal { value, unit } => Link::Literal {
                        value,
                        unit: *unit,
                        font: e.font.as_deref(),
                    },
                    RawKind::Computed { from, formula } => Link::Computed {
                        from,
                        formula,
                        font: e.font.as_deref(),
                    },
                }
            })
        };

        // Resolving every entry doubles as the cycle check: it runs before any
        // snapshot exists, so no compilation can see a cyclic token.
        let mut tokens = Vec::with_capacity(entries.len());
        for entry in &entries {
            let resolved = resolve_chain(&entry.id, &lookup)?;
            let derivation = match &entry.kind {
                RawKind::Literal { .. } => Derivation::Literal,
                RawKind::Computed { from, formula } => Derivation::Computed {
                    from: from.clone(),
                    formula: formula.clone(),
                },
            };
            tokens.push(Token {
                id: entry.id.clone(),
                role: entry.role.clone(),
                value: resolved.value,
                unit: resolved.unit,
                derivation,
                font: entry.font.clone(),
            });
        }

        let version = SnapshotVersion {
            sequence,
            digest: digest_tokens(&tokens),
        };
        debug!(version = %version, tokens = tokens.len(), "Token snapshot loaded");

        Ok(TokenSnapshot {
            version,
            previous,
            tokens,
            index,
        })
    }

    pub fn version(&self) -> &SnapshotVersion {
        &self.version
    }

    #[allow(dead_code)]
    pub fn previous(&self) -> Option<&SnapshotVersion> {
        self.previous.as_ref()
    }

    pub fn get(&self, id: &str) -> Option<&Token> {
        self.index.get(id).map(|&i| &self.tokens[i])
    }

    /// Tokens in source order.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// First token (in source order) carrying `role`.
    pub fn by_role(&self, role: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.role == role)
    }
}

/// Canonical listing: one line per token, fields tab-separated, source order.
fn digest_tokens(tokens: &[Token]) -> String {
    let mut hasher = Sha256::new();
    for t in tokens {
        let derivation = match &t.derivation {
            Derivation::Literal => "literal".to_string(),
            Derivation::Computed { from, formula } => format!("{from}:{formula}"),
        };
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            t.id,
            t.role,
            t.unit,
            t.value,
            derivation,
            t.font.as_deref().unwrap_or("-")
        );
        hasher.update(line.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}
