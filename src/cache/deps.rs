//! Dependency extraction contract.
//!
//! An extractor inspects a freshly computed value and names every subject whose
//! change must expire it: the value's own identity plus every item it embeds.
//! Extractors are supplied per value shape by the caller and must be pure.

use std::collections::BTreeSet;

use super::keys::SubjectKey;

/// Subjects a cached value depends on, in deterministic order.
pub type Dependencies = BTreeSet<SubjectKey>;

/// Derives the dependency set of a value.
pub trait DependencyExtractor<T: ?Sized> {
    fn dependencies(&self, value: &T) -> Dependencies;
}

impl<T, F> DependencyExtractor<T> for F
where
    T: ?Sized,
    F: Fn(&T) -> Dependencies,
{
    fn dependencies(&self, value: &T) -> Dependencies {
        self(value)
    }
}

/// Extractor for values that depend on nothing; they expire by time only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDependencies;

impl<T: ?Sized> DependencyExtractor<T> for NoDependencies {
    fn dependencies(&self, _value: &T) -> Dependencies {
        Dependencies::new()
    }
}

/// Build a dependency set of one category from a list of names.
pub fn subjects_in<'a, I>(category: &str, names: I) -> Dependencies
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .map(|name| SubjectKey::new(category, name))
        .collect()
}
