//! Cache key definitions.
//!
//! Defines `SubjectKey` for invalidation subjects and `CacheKey` for cache entries.

use std::fmt;

/// Delimiter placed between tokens of a joined cache key.
pub const KEY_DELIMITER: char = '|';
const ESCAPE: char = '\\';

/// Identifies what an external change notification is about.
///
/// Equality, hashing and ordering are structural: category first, then name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectKey {
    category: String,
    name: String,
}

impl SubjectKey {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same name, different binding category.
    pub fn with_category(&self, category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.name)
    }
}

/// Lookup key for one cache entry.
///
/// Built from an ordered token sequence (operation name, primary identifier,
/// serialized query parameters). Tokens are escaped before joining, so two keys
/// are equal iff their token sequences are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    joined: String,
    arity: usize,
}

impl CacheKey {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut joined = String::new();
        let mut arity = 0;
        for (index, token) in tokens.into_iter().enumerate() {
            arity += 1;
            if index > 0 {
                joined.push(KEY_DELIMITER);
            }
            for ch in token.as_ref().chars() {
                if ch == KEY_DELIMITER || ch == ESCAPE {
                    joined.push(ESCAPE);
                }
                joined.push(ch);
            }
        }
        Self { joined, arity }
    }

    /// The joined lookup form.
    pub fn as_str(&self) -> &str {
        &self.joined
    }

    /// Recover the token sequence the key was built from.
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens = Vec::with_capacity(self.arity);
        if self.arity == 0 {
            return tokens;
        }

        let mut current = String::new();
        let mut escaped = false;

        for ch in self.joined.chars() {
            if escaped {
                current.push(ch);
                escaped = false;
            } else if ch == ESCAPE {
                escaped = true;
            } else if ch == KEY_DELIMITER {
                tokens.push(std::mem::take(&mut current));
            } else {
                current.push(ch);
            }
        }
        tokens.push(current);
        tokens
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn subject_key_equality() {
        let key1 = SubjectKey::new("item", "on_roasts");
        let key2 = SubjectKey::new("item", "on_roasts");
        assert_eq!(key1, key2);

        assert_ne!(key1, SubjectKey::new("typed_item", "on_roasts"));
        assert_ne!(key1, SubjectKey::new("item", "coffee_beverages"));
    }

    #[test]
    fn subject_keys_order_by_category_then_name() {
        let ordered: Vec<_> = [
            SubjectKey::new("type", "article"),
            SubjectKey::new("item", "b"),
            SubjectKey::new("item", "a"),
        ]
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|key| key.to_string())
        .collect();

        assert_eq!(ordered, vec!["item:a", "item:b", "type:article"]);
    }

    #[test]
    fn token_order_is_significant() {
        let key1 = CacheKey::new(["item", "on_roasts"]);
        let key2 = CacheKey::new(["on_roasts", "item"]);
        assert_ne!(key1, key2);
        assert_eq!(key1.as_str(), "item|on_roasts");
    }

    #[test]
    fn delimiter_inside_token_does_not_collide() {
        let split = CacheKey::new(["a", "b"]);
        let embedded = CacheKey::new(["a|b"]);
        assert_ne!(split, embedded);
        assert_eq!(embedded.tokens(), vec!["a|b".to_string()]);
    }

    #[test]
    fn tokens_survive_escaping() {
        let tokens = vec!["items", "elements.title[contains]=a\\b", "", "x|y"];
        let key = CacheKey::new(&tokens);
        assert_eq!(key.tokens(), tokens);
    }

    #[test]
    fn empty_sequence_differs_from_single_empty_token() {
        let empty = CacheKey::new(Vec::<String>::new());
        let blank = CacheKey::new([""]);
        assert_ne!(empty, blank);
        assert!(empty.tokens().is_empty());
        assert_eq!(blank.tokens(), vec![String::new()]);
    }
}
