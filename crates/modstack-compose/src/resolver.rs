//! Dependency resolution over the active module set.
//!
//! Expands REQUIRES transitively, validates conflicts, version bounds and
//! targeted requirements, then orders modules and services from the
//! BEFORE/AFTER and REQUIRES edges in scope for the profile.

use std::collections::{BTreeMap, BTreeSet};

use modstack_common::error::{ModstackError, Result};
use modstack_common::types::Profile;

use crate::constraint::ast::{Constraint, Dependency, RelationKind};
use crate::graph::DependencyGraph;
use crate::registry::{ModuleDescriptor, Registry};

/// Ordered outcome of a resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Active modules; drives hook order.
    pub modules: Vec<String>,
    /// Services of the active modules running in the profile; drives
    /// startup order.
    pub services: Vec<String>,
}

impl Resolution {
    /// Returns whether `module` is part of the resolution.
    #[must_use]
    pub fn contains(&self, module: &str) -> bool {
        self.modules.iter().any(|m| m == module)
    }
}

/// Resolves module sets against a registry for one profile.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    registry: &'a Registry,
    profile: Profile,
    available: Option<&'a BTreeSet<String>>,
    preferred: Option<&'a BTreeSet<String>>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over every module of `registry`.
    #[must_use]
    pub const fn new(registry: &'a Registry, profile: Profile) -> Self {
        Self {
            registry,
            profile,
            available: None,
            preferred: None,
        }
    }

    /// Limits REQUIRES expansion to `available` modules (e.g. installed ones).
    #[must_use]
    pub const fn restricted_to(mut self, available: &'a BTreeSet<String>) -> Self {
        self.available = Some(available);
        self
    }

    /// Settles an OR group on the branch found in `preferred` (e.g. the
    /// installed modules) when exactly one of them is a candidate.
    #[must_use]
    pub const fn preferring(mut self, preferred: &'a BTreeSet<String>) -> Self {
        self.preferred = Some(preferred);
        self
    }

    /// Resolves `requested` and everything it requires.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::NotFound`] for an unknown requested module,
    /// or the first resolution error: [`ModstackError::UnsatisfiedDependency`],
    /// [`ModstackError::AmbiguousAlternative`],
    /// [`ModstackError::ConflictingModules`],
    /// [`ModstackError::VersionMismatch`] or
    /// [`ModstackError::DependencyCycle`].
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S]) -> Result<Resolution> {
        let active = self.closure(requested)?;
        self.validate(&active)?;
        let modules = self.order_modules(&active)?;
        let services = self.order_services(&active)?;
        tracing::debug!(?modules, ?services, profile = %self.profile, "resolved");
        Ok(Resolution { modules, services })
    }

    /// Expands `requested` with its REQUIRES closure.
    ///
    /// # Errors
    ///
    /// See [`Resolver::resolve`].
    pub fn closure<S: AsRef<str>>(&self, requested: &[S]) -> Result<BTreeSet<String>> {
        let mut active = BTreeSet::new();
        for name in requested {
            let _ = self.registry.require(name.as_ref())?;
            let _ = active.insert(name.as_ref().to_string());
        }

        loop {
            self.expand_single(&mut active)?;
            if !self.expand_alternative(&mut active)? {
                return Ok(active);
            }
        }
    }

    fn is_available(&self, name: &str) -> bool {
        self.registry.contains(name) && self.available.is_none_or(|set| set.contains(name))
    }

    fn in_scope<'m>(&self, module: &'m ModuleDescriptor) -> impl Iterator<Item = &'m Dependency> {
        let profile = self.profile;
        module
            .dependencies
            .iter()
            .filter(move |d| d.applies_to(profile))
    }

    /// Adds single-branch REQUIRES targets until nothing changes.
    fn expand_single(&self, active: &mut BTreeSet<String>) -> Result<()> {
        let mut pending: Vec<String> = active.iter().cloned().collect();
        while let Some(name) = pending.pop() {
            let module = self.registry.require(&name)?;
            for dep in self.in_scope(module) {
                if dep.kind() != RelationKind::Requires || dep.is_alternative() {
                    continue;
                }
                let target = &dep.primary().target;
                if active.contains(target) {
                    continue;
                }
                if !self.is_available(target) {
                    return Err(ModstackError::UnsatisfiedDependency {
                        module: name.clone(),
                        missing: target.clone(),
                    });
                }
                tracing::debug!(module = %name, %target, "pulling in required module");
                let _ = active.insert(target.clone());
                pending.push(target.clone());
            }
        }
        Ok(())
    }

    /// Settles the first open OR group. Returns whether a module was added.
    fn expand_alternative(&self, active: &mut BTreeSet<String>) -> Result<bool> {
        let names: Vec<String> = active.iter().cloned().collect();
        for name in &names {
            let module = self.registry.require(name)?;
            for dep in self.in_scope(module) {
                if !dep.is_alternative() || dep.targets().any(|t| active.contains(t)) {
                    continue;
                }
                let mut candidates: Vec<String> = dep
                    .targets()
                    .filter(|t| self.is_available(t))
                    .map(str::to_string)
                    .collect();
                if let Some(preferred) = self.preferred {
                    let chosen: Vec<String> = candidates
                        .iter()
                        .filter(|c| preferred.contains(*c))
                        .cloned()
                        .collect();
                    if !chosen.is_empty() {
                        candidates = chosen;
                    }
                }
                return match candidates.as_slice() {
                    [] => Err(ModstackError::UnsatisfiedDependency {
                        module: name.clone(),
                        missing: dep.targets().collect::<Vec<_>>().join(" OR "),
                    }),
                    [only] => {
                        tracing::debug!(module = %name, target = %only, "settling OR requirement");
                        let only = only.clone();
                        let _ = active.insert(only);
                        Ok(true)
                    }
                    _ => Err(ModstackError::AmbiguousAlternative {
                        module: name.clone(),
                        candidates,
                    }),
                };
            }
        }
        Ok(false)
    }

    fn validate(&self, active: &BTreeSet<String>) -> Result<()> {
        for name in active {
            let module = self.registry.require(name)?;
            for dep in self.in_scope(module) {
                match dep.kind() {
                    RelationKind::Requires => self.check_requirement(dep, active)?,
                    RelationKind::Conflicts => self.check_conflict(dep.primary(), active)?,
                    RelationKind::Before | RelationKind::After => {
                        let target = &dep.primary().target;
                        if !self.registry.contains(target) {
                            return Err(ModstackError::UnsatisfiedDependency {
                                module: name.clone(),
                                missing: target.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Passes when any active branch holds; otherwise reports why the first
    /// active branch does not.
    fn check_requirement(&self, dep: &Dependency, active: &BTreeSet<String>) -> Result<()> {
        let mut first_error = None;
        for branch in dep.branches().filter(|b| active.contains(&b.target)) {
            match self.check_branch(branch) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let _ = first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error.unwrap_or_else(|| ModstackError::UnsatisfiedDependency {
            module: dep.primary().source.clone(),
            missing: dep.targets().collect::<Vec<_>>().join(" OR "),
        }))
    }

    fn check_branch(&self, branch: &Constraint) -> Result<()> {
        let target = self.registry.get(&branch.target).ok_or_else(|| {
            ModstackError::UnsatisfiedDependency {
                module: branch.source.clone(),
                missing: branch.target.clone(),
            }
        })?;
        if let Some(bound) = branch.bound.filter(|b| !b.is_satisfied_by(&target.version)) {
            return Err(ModstackError::VersionMismatch {
                module: branch.source.clone(),
                target: target.name.clone(),
                required: bound.to_string(),
                found: target.version.to_string(),
            });
        }
        if let Some(item) = branch.item.as_deref().filter(|i| !self.provides(target, i)) {
            return Err(ModstackError::UnsatisfiedDependency {
                module: branch.source.clone(),
                missing: format!("{}/{item}", target.name),
            });
        }
        Ok(())
    }

    fn check_conflict(&self, branch: &Constraint, active: &BTreeSet<String>) -> Result<()> {
        if !active.contains(&branch.target) {
            return Ok(());
        }
        let Some(target) = self.registry.get(&branch.target) else {
            return Ok(());
        };
        let version_hit = branch
            .bound
            .is_none_or(|bound| bound.is_satisfied_by(&target.version));
        let item_hit = branch
            .item
            .as_ref()
            .is_none_or(|item| self.provides(target, item));
        if version_hit && item_hit {
            return Err(ModstackError::ConflictingModules {
                module: branch.source.clone(),
                other: branch.target.clone(),
            });
        }
        Ok(())
    }

    /// Active service in the profile, or any declared volume.
    fn provides(&self, module: &ModuleDescriptor, item: &str) -> bool {
        module
            .service(item)
            .is_some_and(|s| s.runs_in(self.profile))
            || module.volume(item).is_some()
    }

    fn order_modules(&self, active: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut graph = DependencyGraph::new();
        let nodes: BTreeMap<&str, _> = active
            .iter()
            .map(|name| (name.as_str(), graph.add_node(name.as_str(), name.as_str())))
            .collect();

        for (first, then) in self.module_edges(active)? {
            graph.add_ordering(nodes[first.module.as_str()], nodes[then.module.as_str()]);
        }
        graph.resolve_order()
    }

    fn order_services(&self, active: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut graph = DependencyGraph::new();
        let mut by_module: BTreeMap<&str, Vec<_>> = BTreeMap::new();
        let mut by_service = BTreeMap::new();
        for name in active {
            let module = self.registry.require(name)?;
            for service in module.services_in(self.profile) {
                let idx = graph.add_node(service.name.as_str(), name.as_str());
                by_module.entry(name.as_str()).or_default().push(idx);
                let _ = by_service.insert(service.name.as_str(), idx);
            }
        }

        for (first, then) in self.module_edges(active)? {
            let targets = |module: &str, item: Option<&str>| match item {
                Some(item) => by_service.get(item).copied().into_iter().collect::<Vec<_>>(),
                None => by_module.get(module).cloned().unwrap_or_default(),
            };
            let before = targets(&first.module, first.item.as_deref());
            let after = targets(&then.module, then.item.as_deref());
            for &a in &before {
                for &b in &after {
                    graph.add_ordering(a, b);
                }
            }
        }
        graph.resolve_order()
    }

    /// Ordering edges between active modules: `(first, then)`.
    fn module_edges(&self, active: &BTreeSet<String>) -> Result<Vec<(EdgeEnd, EdgeEnd)>> {
        let mut edges = Vec::new();
        for name in active {
            let module = self.registry.require(name)?;
            for dep in self.in_scope(module) {
                for branch in dep.branches().filter(|b| active.contains(&b.target)) {
                    let source = EdgeEnd::module(name);
                    let target = EdgeEnd {
                        module: branch.target.clone(),
                        item: branch.item.clone(),
                    };
                    match branch.kind {
                        RelationKind::Before => edges.push((source, target)),
                        RelationKind::After | RelationKind::Requires => {
                            edges.push((target, source));
                        }
                        RelationKind::Conflicts => {}
                    }
                }
            }
        }
        Ok(edges)
    }
}

/// One side of an ordering edge: a whole module or one of its items.
#[derive(Debug, Clone)]
struct EdgeEnd {
    module: String,
    item: Option<String>,
}

impl EdgeEnd {
    fn module(name: &str) -> Self {
        Self {
            module: name.to_string(),
            item: None,
        }
    }
}
