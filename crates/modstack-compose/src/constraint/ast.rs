//! Structured dependency constraints.

use std::cmp::Ordering;
use std::fmt;

use modstack_common::types::Profile;

use crate::version::Version;

/// Relation between the declaring module and its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// The target must be active.
    Requires,
    /// The target must not be active.
    Conflicts,
    /// The declaring module starts before the target.
    Before,
    /// The declaring module starts after the target.
    After,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requires => "REQUIRES",
            Self::Conflicts => "CONFLICTS",
            Self::Before => "BEFORE",
            Self::After => "AFTER",
        };
        f.write_str(s)
    }
}

/// Comparison operator of a version bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Comparison {
    /// Returns whether `found.cmp(bound)` satisfies the operator.
    #[must_use]
    pub const fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => matches!(ordering, Ordering::Equal),
            Self::Lt => matches!(ordering, Ordering::Less),
            Self::Le => !matches!(ordering, Ordering::Greater),
            Self::Gt => matches!(ordering, Ordering::Greater),
            Self::Ge => !matches!(ordering, Ordering::Less),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// A version bound such as `>= 2.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionBound {
    /// Comparison operator.
    pub op: Comparison,
    /// Version compared against.
    pub version: Version,
}

impl VersionBound {
    /// Returns whether `found` satisfies the bound.
    #[must_use]
    pub fn is_satisfied_by(&self, found: &Version) -> bool {
        self.op.accepts(found.cmp(&self.version))
    }
}

impl fmt::Display for VersionBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.version)
    }
}

/// One fully-qualified constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    /// Module declaring the constraint.
    pub source: String,
    /// Target module.
    pub target: String,
    /// Relation kind.
    pub kind: RelationKind,
    /// Optional version bound on the target.
    pub bound: Option<VersionBound>,
    /// Optional service or volume of the target.
    pub item: Option<String>,
    /// Profiles the constraint applies to; empty means every profile.
    pub profiles: Vec<Profile>,
}

impl Constraint {
    /// Returns whether the constraint is in scope for `profile`.
    #[must_use]
    pub fn applies_to(&self, profile: Profile) -> bool {
        self.profiles.is_empty() || self.profiles.contains(&profile)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.target)?;
        if let Some(bound) = &self.bound {
            write!(f, " {bound}")?;
        }
        if let Some(item) = &self.item {
            write!(f, " {item}")?;
        }
        Ok(())
    }
}

/// A parsed dependency line: one constraint, or an OR group of REQUIRES
/// constraints of which at least one must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// The line as written in the descriptor.
    pub line: String,
    primary: Constraint,
    alternatives: Vec<Constraint>,
}

impl Dependency {
    /// Builds a dependency from its first branch and any further OR
    /// branches.
    #[must_use]
    pub fn new(line: impl Into<String>, primary: Constraint, alternatives: Vec<Constraint>) -> Self {
        Self {
            line: line.into(),
            primary,
            alternatives,
        }
    }

    /// The first branch; the only one outside OR groups.
    #[must_use]
    pub const fn primary(&self) -> &Constraint {
        &self.primary
    }

    /// Every branch, in declaration order.
    pub fn branches(&self) -> impl Iterator<Item = &Constraint> {
        std::iter::once(&self.primary).chain(&self.alternatives)
    }

    /// Relation kind shared by every branch.
    #[must_use]
    pub const fn kind(&self) -> RelationKind {
        self.primary.kind
    }

    /// Returns whether this is an OR group.
    #[must_use]
    pub fn is_alternative(&self) -> bool {
        !self.alternatives.is_empty()
    }

    /// Returns whether the dependency is in scope for `profile`.
    #[must_use]
    pub fn applies_to(&self, profile: Profile) -> bool {
        self.branches().all(|c| c.applies_to(profile))
    }

    /// Target module names, in branch order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.branches().map(|c| c.target.as_str())
    }
}
