//! Permissions and visibility filters.
//!
//! Narrowing a field set happens in two passes: the field's own permission
//! for the capability is checked against the current [`UserContext`], then
//! the caller's [`VisibilityFilter`] for the display context is applied.

use crate::field::Field;
use dewdrop_core::UserContext;
use std::fmt;
use std::sync::Arc;

/// Who may use a capability of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    Everyone,
    Nobody,
    /// Users holding at least one of these roles
    Roles(Vec<String>),
}

impl Permission {
    /// Restrict to users holding any of `roles`.
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Permission::Roles(roles.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, user: &UserContext) -> bool {
        match self {
            Permission::Everyone => true,
            Permission::Nobody => false,
            Permission::Roles(roles) => roles.iter().any(|r| user.has_role(r)),
        }
    }
}

/// Predicate over a field in the current display context.
pub type FieldPredicate = Arc<dyn Fn(&Field, &UserContext) -> bool + Send + Sync>;

/// Narrows a field set for one rendering context (listing, edit form, export).
#[derive(Clone, Default)]
pub enum VisibilityFilter {
    /// Every permitted field
    #[default]
    All,
    /// Only the named fields
    Named(Vec<String>),
    /// Every permitted field except the named ones
    Excluding(Vec<String>),
    /// Fields accepted by a predicate
    Predicate(FieldPredicate),
}

impl VisibilityFilter {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VisibilityFilter::Named(names.into_iter().map(Into::into).collect())
    }

    pub fn excluding<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VisibilityFilter::Excluding(names.into_iter().map(Into::into).collect())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Field, &UserContext) -> bool + Send + Sync + 'static,
    {
        VisibilityFilter::Predicate(Arc::new(f))
    }

    pub fn allows(&self, field: &Field, user: &UserContext) -> bool {
        match self {
            VisibilityFilter::All => true,
            VisibilityFilter::Named(names) => names.iter().any(|n| n == field.name()),
            VisibilityFilter::Excluding(names) => !names.iter().any(|n| n == field.name()),
            VisibilityFilter::Predicate(f) => f(field, user),
        }
    }
}

impl fmt::Debug for VisibilityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisibilityFilter::All => write!(f, "All"),
            VisibilityFilter::Named(names) => f.debug_tuple("Named").field(names).finish(),
            VisibilityFilter::Excluding(names) => f.debug_tuple("Excluding").field(names).finish(),
            VisibilityFilter::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}
