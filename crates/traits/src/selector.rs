//! FilterSelector trait for choosing the alternative a filtered tag renders.
//!
//! The host application decides which alternative applies (typically from the
//! current locale or a feature flag); the engine only asks.

use std::collections::HashMap;
use std::fmt::Debug;

/// Chooses one alternative for a filtered tag.
pub trait FilterSelector: Send + Sync + Debug {
    /// Returns the name of the alternative to render, or `None` when none applies.
    ///
    /// # Arguments
    ///
    /// * `filter_key` - The key written in the tag, e.g. `lang` in `{{f:lang:greeting/}}`
    /// * `alternatives` - The alternatives registered for the tag, in document order
    fn select(&self, filter_key: &str, alternatives: &[String]) -> Option<String>;
}

/// A selector backed by an ordered preference list per filter key.
///
/// The first preference that is among the available alternatives wins, so a
/// locale chain such as `["fr_CA", "fr"]` falls back naturally.
#[derive(Debug, Clone, Default)]
pub struct PreferenceSelector {
    preferences: HashMap<String, Vec<String>>,
}

impl PreferenceSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the preference chain for a filter key, replacing any previous one.
    pub fn with_preferences<I, S>(mut self, filter_key: impl Into<String>, chain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferences
            .insert(filter_key.into(), chain.into_iter().map(Into::into).collect());
        self
    }

    /// Sets a single preferred alternative for a filter key.
    pub fn with(self, filter_key: impl Into<String>, alternative: impl Into<String>) -> Self {
        self.with_preferences(filter_key, [alternative.into()])
    }
}

impl FilterSelector for PreferenceSelector {
    fn select(&self, filter_key: &str, alternatives: &[String]) -> Option<String> {
        self.preferences
            .get(filter_key)?
            .iter()
            .find(|preferred| alternatives.contains(preferred))
            .cloned()
    }
}
