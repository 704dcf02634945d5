// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metadata Value Object
//!
//! This module provides the descriptor that groups buffered records. Every
//! record batch delivered to the buffer is keyed by a `Metadata` value, and
//! the buffer keeps at most one actively accumulating (staged) chunk per
//! distinct metadata.
//!
//! ## Overview
//!
//! A metadata is the triple `(timekey, tag, variables)`, each field
//! independently optional:
//!
//! - **timekey**: the start of the time window the records belong to,
//!   as seconds since the Unix epoch
//! - **tag**: the routing tag of the event stream
//! - **variables**: user-defined grouping variables
//!
//! Two metadatas are equal iff all three fields are equal. Because metadatas
//! are used as map keys for the stage, the queue bookkeeping, and the
//! metadata registry, equality, hashing, and ordering are all derived from
//! the triple and stay stable for the life of any reference.
//!
//! ## Ordering
//!
//! `Metadata` is totally ordered so that a multi-metadata write can lock its
//! target chunks in the same order from every thread.
//!
//! ## Usage Examples
//!
//! ```
//! use staged_buffer_domain::Metadata;
//! use std::collections::BTreeMap;
//!
//! let plain = Metadata::empty();
//! assert!(plain.is_empty());
//!
//! let mut vars = BTreeMap::new();
//! vars.insert("host".to_string(), "web-1".to_string());
//! let keyed = Metadata::new(Some(1_700_000_000), Some("app.access".to_string()), Some(vars));
//!
//! assert_ne!(plain, keyed);
//! assert_eq!(keyed.tag(), Some("app.access"));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Descriptor grouping buffered records by time window, tag, and variables.
///
/// This is a Value Object in Domain-Driven Design terms: it has no identity
/// of its own, is immutable after construction, and is compared field by
/// field. The buffer's metadata registry interns equal values so that equal
/// descriptors share one canonical instance, but nothing in this type relies
/// on that — structural equality and hashing are always correct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Metadata {
    timekey: Option<i64>,
    tag: Option<String>,
    variables: Option<BTreeMap<String, String>>,
}

impl Metadata {
    /// Creates a metadata from its three optional fields.
    pub fn new(timekey: Option<i64>, tag: Option<String>, variables: Option<BTreeMap<String, String>>) -> Self {
        Metadata {
            timekey,
            tag,
            variables,
        }
    }

    /// Creates the empty metadata (no timekey, no tag, no variables).
    ///
    /// Buffers configured without chunk keys place all records under this
    /// single descriptor.
    pub fn empty() -> Self {
        Metadata {
            timekey: None,
            tag: None,
            variables: None,
        }
    }

    /// Gets the time window start in seconds since the Unix epoch
    pub fn timekey(&self) -> Option<i64> {
        self.timekey
    }

    /// Gets the routing tag
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Gets the user-defined grouping variables
    pub fn variables(&self) -> Option<&BTreeMap<String, String>> {
        self.variables.as_ref()
    }

    /// Returns true when all three fields are unset
    pub fn is_empty(&self) -> bool {
        self.timekey.is_none() && self.tag.is_none() && self.variables.is_none()
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "metadata(")?;
        match self.timekey {
            Some(t) => write!(f, "timekey={}", t)?,
            None => write!(f, "timekey=nil")?,
        }
        match &self.tag {
            Some(tag) => write!(f, ", tag={}", tag)?,
            None => write!(f, ", tag=nil")?,
        }
        match &self.variables {
            Some(vars) => {
                write!(f, ", variables={{")?;
                for (i, (k, v)) in vars.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, "}})")
            }
            None => write!(f, ", variables=nil)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn hash_of(m: &Metadata) -> u64 {
        let mut hasher = DefaultHasher::new();
        m.hash(&mut hasher);
        hasher.finish()
    }

    /// Tests equality over the full triple.
    ///
    /// Validates that:
    /// - Metadatas are equal iff timekey, tag, and variables all match
    /// - A difference in any single field breaks equality
    #[test]
    fn test_metadata_equality_is_field_wise() {
        let a = Metadata::new(Some(60), Some("t1".into()), Some(vars(&[("k", "v")])));
        let b = Metadata::new(Some(60), Some("t1".into()), Some(vars(&[("k", "v")])));
        assert_eq!(a, b);

        assert_ne!(a, Metadata::new(Some(120), Some("t1".into()), Some(vars(&[("k", "v")]))));
        assert_ne!(a, Metadata::new(Some(60), Some("t2".into()), Some(vars(&[("k", "v")]))));
        assert_ne!(a, Metadata::new(Some(60), Some("t1".into()), Some(vars(&[("k", "w")]))));
        assert_ne!(a, Metadata::new(Some(60), Some("t1".into()), None));
    }

    /// Tests that equal metadatas hash identically (map-key safety).
    #[test]
    fn test_metadata_hash_follows_equality() {
        let a = Metadata::new(None, Some("tag".into()), None);
        let b = Metadata::new(None, Some("tag".into()), None);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    /// Tests the total order used for stable lock acquisition.
    ///
    /// Validates that:
    /// - Ordering is deterministic and antisymmetric for distinct values
    /// - Sorting a list of metadatas is stable across runs
    #[test]
    fn test_metadata_ordering_is_total() {
        let none = Metadata::empty();
        let early = Metadata::new(Some(1), None, None);
        let late = Metadata::new(Some(2), None, None);
        let tagged = Metadata::new(Some(2), Some("z".into()), None);

        let mut list = vec![tagged.clone(), late.clone(), none.clone(), early.clone()];
        list.sort();
        assert_eq!(list, vec![none, early, late, tagged]);
    }

    /// Tests the empty constructor and emptiness query.
    #[test]
    fn test_metadata_empty() {
        let m = Metadata::empty();
        assert!(m.is_empty());
        assert_eq!(m.timekey(), None);
        assert_eq!(m.tag(), None);
        assert!(m.variables().is_none());

        assert!(!Metadata::new(None, Some("x".into()), None).is_empty());
    }

    /// Tests Display renders all three fields.
    #[test]
    fn test_metadata_display() {
        let m = Metadata::new(Some(60), Some("app".into()), Some(vars(&[("region", "eu")])));
        assert_eq!(m.to_string(), "metadata(timekey=60, tag=app, variables={region=eu})");
        assert_eq!(Metadata::empty().to_string(), "metadata(timekey=nil, tag=nil, variables=nil)");
    }
}
