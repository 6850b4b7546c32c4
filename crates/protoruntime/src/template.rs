//! `{{name}}` placeholder handling shared by the resolver and DynamicText.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("placeholder pattern is valid"));

/// Marker left in place of a name that could not be resolved.
pub fn missing_marker(name: &str) -> String {
    format!("{{{{missing: {}}}}}", name)
}

/// Substitutes every placeholder with `lookup(name)`, leaving the missing
/// marker where the lookup yields nothing.
pub fn render<F>(text: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            let name = caps[1].trim();
            lookup(name).unwrap_or_else(|| {
                tracing::debug!(variable = name, "Unresolved template variable");
                missing_marker(name)
            })
        })
        .into_owned()
}
