//! Descriptor fixtures shared by unit tests across the crate.

use std::collections::BTreeSet;

use capsmith_types::descriptor::{Descriptor, DescriptorKind, Operation};

use crate::registry::Registry;

/// Builder for test descriptors with sensible defaults.
pub(crate) struct Fixture(Descriptor);

impl Fixture {
    pub(crate) fn new(id: &str) -> Self {
        Self(Descriptor {
            id: id.to_owned(),
            kind: DescriptorKind::Skill,
            name: id.to_owned(),
            description: format!("Test descriptor {id}"),
            version: semver::Version::new(1, 0, 0),
            tags: BTreeSet::new(),
            depends_on: Vec::new(),
            allowed_operations: BTreeSet::new(),
            estimated_cost: 1.0,
            conflict_class: None,
            conflicts_with: BTreeSet::new(),
            source: None,
            body: String::new(),
        })
    }

    pub(crate) fn deps(mut self, deps: &[&str]) -> Self {
        self.0.depends_on = deps.iter().map(|d| (*d).to_owned()).collect();
        self
    }

    pub(crate) fn tags(mut self, tags: &[&str]) -> Self {
        self.0.tags = tags.iter().map(|t| (*t).to_owned()).collect();
        self
    }

    pub(crate) fn description(mut self, text: &str) -> Self {
        self.0.description = text.to_owned();
        self
    }

    pub(crate) fn cost(mut self, cost: f64) -> Self {
        self.0.estimated_cost = cost;
        self
    }

    pub(crate) fn version(mut self, version: &str) -> Self {
        self.0.version = version.parse().expect("fixture version must be valid semver");
        self
    }

    pub(crate) fn kind(mut self, kind: DescriptorKind) -> Self {
        self.0.kind = kind;
        self
    }

    pub(crate) fn conflict_class(mut self, class: &str) -> Self {
        self.0.conflict_class = Some(class.to_owned());
        self
    }

    pub(crate) fn conflicts_with(mut self, ids: &[&str]) -> Self {
        self.0.conflicts_with = ids.iter().map(|i| (*i).to_owned()).collect();
        self
    }

    pub(crate) fn operations(mut self, ops: &[Operation]) -> Self {
        self.0.allowed_operations = ops.iter().copied().collect();
        self
    }

    pub(crate) fn build(self) -> Descriptor {
        self.0
    }
}

pub(crate) fn descriptor(id: &str, deps: &[&str]) -> Descriptor {
    Fixture::new(id).deps(deps).build()
}

pub(crate) fn registry(items: Vec<Descriptor>) -> Registry {
    Registry::from_descriptors(items).expect("fixture registry must be valid")
}

/// The four-descriptor registry used by the resolution scenarios:
/// `b` depends on `a`; `c` and `d` are alternative git tools, `d` newer.
pub(crate) fn scenario_registry() -> Registry {
    registry(vec![
        Fixture::new("a").cost(1.0).build(),
        Fixture::new("b").cost(2.0).deps(&["a"]).build(),
        Fixture::new("c")
            .cost(1.0)
            .tags(&["git"])
            .conflict_class("git")
            .version("1.0.0")
            .build(),
        Fixture::new("d")
            .cost(1.0)
            .tags(&["git"])
            .conflict_class("git")
            .version("2.0.0")
            .build(),
    ])
}
