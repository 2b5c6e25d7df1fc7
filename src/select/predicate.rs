//! Selection predicates
//!
//! A predicate is either an accept-set ("only these values") or a reject-set
//! ("anything but these values"). An empty reject-set matches everything, an
//! empty accept-set matches nothing.

use std::collections::HashSet;
use std::hash::Hash;

use crate::error::{PunishmentError, PunishmentResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind<U: Eq + Hash> {
    Accept(HashSet<U>),
    Reject(HashSet<U>),
}

/// A reusable, side-effect free filter over a value domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPredicate<U: Eq + Hash> {
    kind: Kind<U>,
}

impl<U: Eq + Hash + Clone> SelectionPredicate<U> {
    /// Matches every value
    #[must_use]
    pub fn match_all() -> Self {
        Self {
            kind: Kind::Reject(HashSet::new()),
        }
    }

    /// Matches exactly one value
    #[must_use]
    pub fn matching_only(value: U) -> Self {
        Self {
            kind: Kind::Accept(HashSet::from([value])),
        }
    }

    /// Equality predicate for a value that may be absent
    ///
    /// # Errors
    /// Returns an `InvalidArgument` error if the value is `None`
    pub fn try_matching_only(value: Option<U>) -> PunishmentResult<Self> {
        value
            .map(Self::matching_only)
            .ok_or_else(|| PunishmentError::invalid("equality predicate requires a value"))
    }

    /// Matches any of the given values
    #[must_use]
    pub fn matching_any_of(values: impl IntoIterator<Item = U>) -> Self {
        Self {
            kind: Kind::Accept(values.into_iter().collect()),
        }
    }

    /// Matches everything except the given values
    #[must_use]
    pub fn matching_none_of(values: impl IntoIterator<Item = U>) -> Self {
        Self {
            kind: Kind::Reject(values.into_iter().collect()),
        }
    }

    /// Values that satisfy the predicate; empty if it is defined by rejection
    #[must_use]
    pub fn accepted_values(&self) -> HashSet<U> {
        match &self.kind {
            Kind::Accept(values) => values.clone(),
            Kind::Reject(_) => HashSet::new(),
        }
    }

    /// Values that must not match; empty if it is defined by acceptance
    #[must_use]
    pub fn rejected_values(&self) -> HashSet<U> {
        match &self.kind {
            Kind::Accept(_) => HashSet::new(),
            Kind::Reject(values) => values.clone(),
        }
    }

    /// Whether this predicate accepts nothing but a finite set of values
    #[must_use]
    pub fn is_acceptance(&self) -> bool {
        matches!(self.kind, Kind::Accept(_))
    }

    /// Whether this predicate matches every value
    #[must_use]
    pub fn is_match_all(&self) -> bool {
        matches!(&self.kind, Kind::Reject(values) if values.is_empty())
    }

    /// Whether `value` satisfies this predicate
    #[must_use]
    pub fn matches(&self, value: &U) -> bool {
        match &self.kind {
            Kind::Accept(values) => values.contains(value),
            Kind::Reject(values) => !values.contains(value),
        }
    }

    /// Predicate matching what both `self` and `other` match
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let kind = match (&self.kind, &other.kind) {
            (Kind::Accept(left), Kind::Accept(right)) => {
                Kind::Accept(left.intersection(right).cloned().collect())
            }
            (Kind::Accept(accepted), Kind::Reject(rejected))
            | (Kind::Reject(rejected), Kind::Accept(accepted)) => {
                Kind::Accept(accepted.difference(rejected).cloned().collect())
            }
            (Kind::Reject(left), Kind::Reject(right)) => {
                Kind::Reject(left.union(right).cloned().collect())
            }
        };
        Self { kind }
    }
}

impl<U: Eq + Hash + Clone> Default for SelectionPredicate<U> {
    fn default() -> Self {
        Self::match_all()
    }
}

impl<U: Eq + Hash + Clone> From<Option<U>> for SelectionPredicate<U> {
    /// `None` matches everything, `Some(value)` matches only that value
    fn from(value: Option<U>) -> Self {
        value.map_or_else(Self::match_all, Self::matching_only)
    }
}
