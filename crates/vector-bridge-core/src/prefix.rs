//! Query/passage prefixing for prefix-sensitive model families.
//!
//! Some embedding families (E5 and its multilingual variants) were trained
//! with literal `"query: "` / `"passage: "` prefixes and produce
//! incomparable vectors without them. Whether to prefix is a property of
//! the model, so it travels as a [`PrefixPolicy`] rather than living inside
//! any one provider.

pub const QUERY_PREFIX: &str = "query: ";
pub const PASSAGE_PREFIX: &str = "passage: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrefixPolicy {
    pub prefix_sensitive: bool,
}

impl PrefixPolicy {
    pub fn new(prefix_sensitive: bool) -> Self {
        Self { prefix_sensitive }
    }

    /// Derive the policy from a model identifier (`intfloat/multilingual-e5-large` → sensitive).
    pub fn for_model(model: &str) -> Self {
        Self::new(is_prefix_sensitive(model))
    }

    pub fn query(&self, text: &str) -> String {
        if self.prefix_sensitive {
            format!("{QUERY_PREFIX}{text}")
        } else {
            text.to_string()
        }
    }

    pub fn passage(&self, text: &str) -> String {
        if self.prefix_sensitive {
            format!("{PASSAGE_PREFIX}{text}")
        } else {
            text.to_string()
        }
    }

    pub fn passages(&self, texts: &[String]) -> Vec<String> {
        texts.iter().map(|t| self.passage(t)).collect()
    }
}

/// E5-family models are the prefix-sensitive ones.
pub fn is_prefix_sensitive(model: &str) -> bool {
    model.to_ascii_lowercase().contains("e5")
}
