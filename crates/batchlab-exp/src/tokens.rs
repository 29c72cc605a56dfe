//! Reserved-token substitution, done once per experiment before mutations
//! reach the document tree.

use batchlab_core::ReplicateRule;
use batchlab_doc::{Mutation, Scalar};

/// Placeholder replaced by the configured controller name.
pub const CONTROLLER_TOKEN: &str = "__CONTROLLER__";

/// Ordered token to replacement pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMap {
    pairs: Vec<(String, String)>,
}

impl TokenMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a replacement. Empty tokens are ignored.
    pub fn with(mut self, token: impl Into<String>, value: impl Into<String>) -> Self {
        let token = token.into();
        if !token.is_empty() {
            self.pairs.push((token, value.into()));
        }
        self
    }

    /// Replaces every token occurrence in `text`.
    pub fn apply(&self, text: &str) -> String {
        self.pairs
            .iter()
            .fold(text.to_string(), |acc, (token, value)| acc.replace(token, value))
    }

    /// Substitutes tokens in the paths, names and string values of `mutation`.
    pub fn substitute(&self, mutation: &Mutation) -> Mutation {
        if self.pairs.is_empty() {
            return mutation.clone();
        }
        mutation.map_text(&|text: &str| self.apply(text))
    }
}

/// Expands a replication rule into one add-element per agent index.
pub fn replicate(rule: &ReplicateRule, token: &str, count: usize) -> Vec<Mutation> {
    (0..count)
        .map(|agent| {
            let tokens = TokenMap::new().with(token, agent.to_string());
            Mutation::AddElement {
                parent: tokens.apply(&rule.parent),
                tag: tokens.apply(&rule.tag),
                attrs: rule
                    .attrs
                    .iter()
                    .map(|(name, value)| (tokens.apply(name), Scalar::Str(tokens.apply(value))))
                    .collect(),
            }
        })
        .collect()
}
