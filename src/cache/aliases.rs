//! Alias resolution.
//!
//! One logical item can be cached under several binding categories (for example
//! a loosely-typed and a strongly-typed fetch of the same item). A notification
//! names the canonical category only; `expand` returns every binding subject.
//!
//! Every binding category an extractor emits must be reachable from some
//! canonical category here, otherwise invalidations for it are silently lost.

use std::collections::{BTreeSet, HashMap};

use super::keys::SubjectKey;

/// Canonical category for content items.
pub const ITEM_CATEGORY: &str = "item";
/// Binding category for strongly-typed item fetches.
pub const TYPED_ITEM_CATEGORY: &str = "typed_item";
/// Category for content types. Bound under a single representation.
pub const TYPE_CATEGORY: &str = "type";

/// Maps a canonical category to the binding categories it stands for.
#[derive(Debug, Clone)]
pub struct AliasResolver {
    rules: HashMap<String, Vec<String>>,
}

impl AliasResolver {
    /// Resolver with no rules: every subject expands to itself.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Add or replace the rule for `canonical`.
    ///
    /// The canonical category is always part of its own expansion.
    pub fn with_rule<I, S>(mut self, canonical: &str, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut categories: Vec<String> = aliases.into_iter().map(Into::into).collect();
        if !categories.iter().any(|category| category == canonical) {
            categories.push(canonical.to_string());
        }
        categories.sort();
        categories.dedup();
        self.rules.insert(canonical.to_string(), categories);
        self
    }

    /// Every subject under which `subject` may be bound.
    pub fn expand(&self, subject: &SubjectKey) -> BTreeSet<SubjectKey> {
        match self.rules.get(subject.category()) {
            Some(categories) => categories
                .iter()
                .map(|category| subject.with_category(category.as_str()))
                .collect(),
            None => BTreeSet::from([subject.clone()]),
        }
    }

    /// True if a notification for `canonical` reaches entries bound under `binding`.
    pub fn reaches(&self, canonical: &str, binding: &str) -> bool {
        match self.rules.get(canonical) {
            Some(categories) => categories.iter().any(|category| category == binding),
            None => canonical == binding,
        }
    }
}

impl Default for AliasResolver {
    fn default() -> Self {
        Self::empty().with_rule(ITEM_CATEGORY, [ITEM_CATEGORY, TYPED_ITEM_CATEGORY])
    }
}
