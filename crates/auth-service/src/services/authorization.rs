//! Role and permission checks against token claims.
//!
//! A token may carry an explicit `permissions` list. When it does not, the
//! role's default permissions from [`default_permissions`] apply.

use crate::models::{Role, TokenClaims};

/// Grants every permission.
pub const WILDCARD_PERMISSION: &str = "*";

const ADMIN_PERMISSIONS: &[&str] = &[WILDCARD_PERMISSION];

const COORDINATOR_PERMISSIONS: &[&str] = &[
    "clients:read",
    "clients:write",
    "visits:read",
    "visits:write",
    "visits:assign",
    "care_plans:read",
    "care_plans:write",
    "caregivers:read",
    "reports:read",
];

const CAREGIVER_PERMISSIONS: &[&str] = &[
    "clients:read",
    "visits:read",
    "visits:check_in",
    "visits:check_out",
    "visits:notes:write",
    "care_plans:read",
];

const FAMILY_PERMISSIONS: &[&str] = &["clients:read", "visits:read", "care_plans:read"];

/// Permissions a role holds when the token does not list its own.
pub fn default_permissions(role: Role) -> &'static [&'static str] {
    match role {
        Role::Admin => ADMIN_PERMISSIONS,
        Role::Coordinator => COORDINATOR_PERMISSIONS,
        Role::Caregiver => CAREGIVER_PERMISSIONS,
        Role::Family => FAMILY_PERMISSIONS,
    }
}

pub fn has_role(claims: &TokenClaims, allowed: &[Role]) -> bool {
    allowed.contains(&claims.role)
}

/// Whether the caller holds every permission in `required`.
///
/// An empty `required` list is never satisfied. Admins and holders of `*`
/// satisfy any non-empty list.
pub fn has_permission(claims: &TokenClaims, required: &[&str]) -> bool {
    if required.is_empty() {
        return false;
    }
    if claims.role == Role::Admin {
        return true;
    }

    let granted = effective_permissions(claims);
    if granted.iter().any(|p| p == WILDCARD_PERMISSION) {
        return true;
    }

    required
        .iter()
        .all(|needed| granted.iter().any(|p| p == needed))
}

/// Explicit token permissions if present, otherwise the role defaults.
pub fn effective_permissions(claims: &TokenClaims) -> Vec<String> {
    match &claims.permissions {
        Some(explicit) => explicit.clone(),
        None => default_permissions(claims.role)
            .iter()
            .map(|p| (*p).to_string())
            .collect(),
    }
}
