//! Role-based permission resolution.
//!
//! Roles imply other roles (`admin` implies `member` implies `guest`,
//! for example); each role also grants a direct set of permissions. A
//! caller's effective permissions are the union of every permission
//! granted by every role reachable from the caller's roles, following
//! implication edges transitively. Cycles in the implication graph are
//! rejected at registration time rather than risking an infinite walk
//! at check time (spec §4.4).

use crate::{Error, Result};
use std::collections::{HashMap, HashSet};

/// A role's direct permission grants and the other roles it implies.
#[derive(Debug, Clone, Default)]
struct RoleDef {
    permissions: HashSet<String>,
    implies: HashSet<String>,
}

/// The platform's role→permission mapping. Build once at startup via
/// [`RbacRegistry::add_role`], then query per-request with
/// [`RbacRegistry::effective_permissions`] or [`RbacRegistry::check`].
#[derive(Debug, Default)]
pub struct RbacRegistry {
    roles: HashMap<String, RoleDef>,
}

impl RbacRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `role` with its direct `permissions` and the roles it
    /// `implies`. Returns an error if this addition would create a
    /// cycle in the implication graph.
    pub fn add_role(
        &mut self,
        role: impl Into<String>,
        permissions: impl IntoIterator<Item = impl Into<String>>,
        implies: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<()> {
        let role = role.into();
        let def = RoleDef {
            permissions: permissions.into_iter().map(Into::into).collect(),
            implies: implies.into_iter().map(Into::into).collect(),
        };

        let previous = self.roles.insert(role.clone(), def);
        if let Some(cycle_role) = self.find_cycle() {
            // Roll back so a rejected registration never corrupts state.
            match previous {
                Some(prev) => {
                    self.roles.insert(role, prev);
                }
                None => {
                    self.roles.remove(&role);
                }
            }
            return Err(Error::config(format!(
                "role implication cycle detected at '{cycle_role}'"
            )));
        }

        Ok(())
    }

    fn find_cycle(&self) -> Option<String> {
        let mut visiting = HashSet::new();
        let mut done = HashSet::new();

        for role in self.roles.keys() {
            if self.visit(role, &mut visiting, &mut done).is_some() {
                return Some(role.clone());
            }
        }
        None
    }

    fn visit<'a>(
        &'a self,
        role: &'a str,
        visiting: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Option<&'a str> {
        if done.contains(role) {
            return None;
        }
        if visiting.contains(role) {
            return Some(role);
        }

        visiting.insert(role);
        if let Some(def) = self.roles.get(role) {
            for implied in &def.implies {
                if let Some(c) = self.visit(implied, visiting, done) {
                    return Some(c);
                }
            }
        }
        visiting.remove(role);
        done.insert(role);
        None
    }

    /// Union of permissions granted by `roles` and everything they
    /// transitively imply. Unknown role names are silently ignored — a
    /// caller holding a role that was never registered simply gains
    /// nothing from it.
    pub fn effective_permissions(&self, roles: &HashSet<String>) -> HashSet<String> {
        let mut seen_roles = HashSet::new();
        let mut permissions = HashSet::new();
        let mut stack: Vec<String> = roles.iter().cloned().collect();

        while let Some(role) = stack.pop() {
            if !seen_roles.insert(role.clone()) {
                continue;
            }
            if let Some(def) = self.roles.get(&role) {
                permissions.extend(def.permissions.iter().cloned());
                stack.extend(def.implies.iter().cloned());
            }
        }

        permissions
    }

    /// True iff `permission` is in the closure of `roles`' grants.
    pub fn check(&self, roles: &HashSet<String>, permission: &str) -> bool {
        self.effective_permissions(roles).contains(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_direct_permission_grant() {
        let mut rbac = RbacRegistry::new();
        rbac.add_role("guest", ["read"], Vec::<String>::new()).unwrap();

        assert!(rbac.check(&roles(&["guest"]), "read"));
        assert!(!rbac.check(&roles(&["guest"]), "write"));
    }

    #[test]
    fn test_implied_role_permission_monotonicity() {
        let mut rbac = RbacRegistry::new();
        rbac.add_role("guest", ["read"], Vec::<String>::new()).unwrap();
        rbac.add_role("member", ["write"], ["guest"]).unwrap();
        rbac.add_role("admin", ["delete"], ["member"]).unwrap();

        // admin implies member implies guest: admin must have every
        // permission guest has.
        assert!(rbac.check(&roles(&["admin"]), "read"));
        assert!(rbac.check(&roles(&["admin"]), "write"));
        assert!(rbac.check(&roles(&["admin"]), "delete"));
        assert!(!rbac.check(&roles(&["guest"]), "delete"));
    }

    #[test]
    fn test_cycle_detection_rejected() {
        let mut rbac = RbacRegistry::new();
        rbac.add_role("a", Vec::<String>::new(), ["b"]).unwrap();
        let err = rbac.add_role("b", Vec::<String>::new(), ["a"]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_role_grants_nothing() {
        let rbac = RbacRegistry::new();
        assert!(!rbac.check(&roles(&["nonexistent"]), "read"));
    }

    #[test]
    fn test_diamond_implication_no_duplicate_traversal_issue() {
        let mut rbac = RbacRegistry::new();
        rbac.add_role("base", ["x"], Vec::<String>::new()).unwrap();
        rbac.add_role("left", Vec::<String>::new(), ["base"]).unwrap();
        rbac.add_role("right", Vec::<String>::new(), ["base"]).unwrap();
        rbac.add_role("top", Vec::<String>::new(), ["left", "right"]).unwrap();

        assert!(rbac.check(&roles(&["top"]), "x"));
    }
}
