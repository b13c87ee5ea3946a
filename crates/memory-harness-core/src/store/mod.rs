//! Persistence abstraction for facts.
//!
//! Facts are stored in scope partitions: one global partition, one per org,
//! and one per project (which also holds session facts). The
//! [`FactRepository`] trait loads and overwrites whole partitions, enabling
//! pluggable backends (JSON files, in-memory).
//!
//! Implementations must be `Send + Sync`.

pub mod memory;

use std::fmt;

use anyhow::Result;

use crate::models::{Fact, FactScope, ScopeIdentity};

/// A persistence unit holding the facts of one scope tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Partition {
    Global,
    /// Keyed by org id.
    Org(String),
    /// Keyed by project id. Holds project and session facts.
    Project(String),
}

impl Partition {
    /// Partitions available for an identity, in load order.
    ///
    /// The org partition exists only for a known org and the project
    /// partition only for a non-empty project id.
    pub fn for_identity(identity: &ScopeIdentity) -> Vec<Partition> {
        let mut partitions = vec![Partition::Global];
        if identity.has_org() {
            partitions.push(Partition::Org(identity.org_id.clone()));
        }
        if identity.has_project() {
            partitions.push(Partition::Project(identity.project_id.clone()));
        }
        partitions
    }

    /// The partition a fact of `scope` persists into, if it exists.
    pub fn for_scope(scope: FactScope, identity: &ScopeIdentity) -> Option<Partition> {
        match scope {
            FactScope::Global => Some(Partition::Global),
            FactScope::Org if identity.has_org() => Some(Partition::Org(identity.org_id.clone())),
            FactScope::Project | FactScope::Session if identity.has_project() => {
                Some(Partition::Project(identity.project_id.clone()))
            }
            _ => None,
        }
    }

    /// Whether a fact of `scope` belongs in this partition.
    pub fn holds(&self, scope: FactScope) -> bool {
        matches!(
            (self, scope),
            (Partition::Global, FactScope::Global)
                | (Partition::Org(_), FactScope::Org)
                | (Partition::Project(_), FactScope::Project | FactScope::Session)
        )
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Global => write!(f, "global"),
            Partition::Org(id) => write!(f, "org:{}", id),
            Partition::Project(id) => write!(f, "project:{}", id),
        }
    }
}

/// Abstract storage backend for fact partitions.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`load_partition`](FactRepository::load_partition) | Read every fact of a partition |
/// | [`save_partition`](FactRepository::save_partition) | Overwrite a partition with the given facts |
pub trait FactRepository: Send + Sync {
    /// Read all facts of a partition. A partition never written is empty.
    fn load_partition(&self, partition: &Partition) -> Result<Vec<Fact>>;

    /// Replace the stored contents of a partition.
    fn save_partition(&self, partition: &Partition, facts: &[&Fact]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_for_full_identity() {
        let id = ScopeIdentity::new("acme", "0123456789abcdef");
        assert_eq!(
            Partition::for_identity(&id),
            vec![
                Partition::Global,
                Partition::Org("acme".to_string()),
                Partition::Project("0123456789abcdef".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_org_has_no_partition() {
        let id = ScopeIdentity::new("unknown", "");
        assert_eq!(Partition::for_identity(&id), vec![Partition::Global]);
        assert_eq!(Partition::for_scope(FactScope::Org, &id), None);
        assert_eq!(Partition::for_scope(FactScope::Session, &id), None);
        assert_eq!(Partition::for_scope(FactScope::Global, &id), Some(Partition::Global));
    }

    #[test]
    fn test_session_shares_project_partition() {
        let id = ScopeIdentity::new("acme", "p1");
        let p = Partition::for_scope(FactScope::Session, &id).unwrap();
        assert_eq!(p, Partition::Project("p1".to_string()));
        assert!(p.holds(FactScope::Project));
        assert!(p.holds(FactScope::Session));
        assert!(!p.holds(FactScope::Org));
    }
}
