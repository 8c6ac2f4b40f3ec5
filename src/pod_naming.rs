//! Pod name rewriting.
//!
//! Unique responsibility: turn names of source-pod resources into the names
//! their clones carry in the target pod.
//!
//! `FlashArray` names pod-scoped objects as `<pod>::<object>`, so the target
//! name is obtained by replacing the source pod name with the target pod name.
//! The replacement is a plain substring replace of every occurrence; a short
//! source pod name that also appears inside the object part is rewritten too.

use std::fmt;

/// A resource name before and after the pod rename.
///
/// Resolution stages return ordered `Vec<NamePair>` so the source and target
/// names of one resource can never drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamePair {
    /// Name of the resource in the source pod.
    pub source: String,
    /// Name the cloned resource carries in the target pod.
    pub target: String,
}

impl NamePair {
    /// Build a pair by deriving the target name from `source`.
    #[must_use]
    pub fn derive(source: impl Into<String>, source_pod: &str, target_pod: &str) -> Self {
        let source = source.into();
        let target = derive_target_name(&source, source_pod, target_pod);
        Self { source, target }
    }
}

impl fmt::Display for NamePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// Rewrite `name` for the target pod.
///
/// Equivalent to `name.replace(source_pod, target_pod)`. An empty
/// `source_pod` leaves the name untouched.
#[must_use]
pub fn derive_target_name(name: &str, source_pod: &str, target_pod: &str) -> String {
    if source_pod.is_empty() {
        return name.to_string();
    }
    name.replace(source_pod, target_pod)
}

/// Strip template braces from a user supplied export suffix.
///
/// Returns `None` when nothing is left, which callers treat as "no suffix".
#[must_use]
pub fn sanitize_export_suffix(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '{' | '}')).collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Name of the export that clones `source_export_name`.
#[inline]
#[must_use]
pub fn target_export_name(source_export_name: &str, suffix: &str) -> String {
    format!("{source_export_name}{suffix}")
}

/// Source names of a pair list, in order.
#[must_use]
pub fn source_names(pairs: &[NamePair]) -> Vec<String> {
    pairs.iter().map(|p| p.source.clone()).collect()
}

/// Target names of a pair list, in order.
#[must_use]
pub fn target_names(pairs: &[NamePair]) -> Vec<String> {
    pairs.iter().map(|p| p.target.clone()).collect()
}
