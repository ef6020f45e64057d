//! Tool namespacing
//!
//! サーバー識別子からツール名のプレフィックスを生成し、逆変換でルーティングする

/// Separator between a server prefix and the server-local tool name
pub const SEPARATOR: &str = "__";

/// Derive the namespace prefix for a server identifier
///
/// Every character outside `[A-Za-z0-9_-]` becomes `_`, runs of `_` collapse
/// to one, and leading/trailing `_` are trimmed. The result never contains
/// [`SEPARATOR`] and never ends with `_`, so the first `__` in a namespaced
/// name always marks the end of its prefix.
pub fn sanitize_prefix(identifier: &str) -> String {
    let mut prefix = String::with_capacity(identifier.len());

    for c in identifier.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' };
        if c == '_' && prefix.ends_with('_') {
            continue;
        }
        prefix.push(c);
    }

    prefix.trim_matches('_').to_string()
}

/// Name exposed to the LLM for `original_name` on the server `identifier`
pub fn namespace(identifier: &str, original_name: &str) -> String {
    Namespace::for_identifier(identifier).qualify(original_name)
}

/// Whether `candidate` carries the prefix of `identifier`
pub fn is_namespaced_by(identifier: &str, candidate: &str) -> bool {
    Namespace::for_identifier(identifier).owns(candidate)
}

/// Server-local tool name of `namespaced_name`, if it belongs to `identifier`
pub fn strip<'a>(identifier: &str, namespaced_name: &'a str) -> Option<&'a str> {
    Namespace::for_identifier(identifier).strip(namespaced_name)
}

/// Namespace of a single server, with its prefix computed once
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    prefix: String,
    marker: String,
}

impl Namespace {
    /// Build the namespace for a server identifier
    pub fn for_identifier(identifier: &str) -> Self {
        let prefix = sanitize_prefix(identifier);
        let marker = format!("{}{}", prefix, SEPARATOR);
        Self { prefix, marker }
    }

    /// Sanitized prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `<prefix>__<original_name>`
    pub fn qualify(&self, original_name: &str) -> String {
        format!("{}{}", self.marker, original_name)
    }

    /// Whether `candidate` starts with `<prefix>__`
    pub fn owns(&self, candidate: &str) -> bool {
        candidate.starts_with(&self.marker)
    }

    /// Remove the prefix, returning the server-local tool name
    pub fn strip<'a>(&self, candidate: &'a str) -> Option<&'a str> {
        candidate.strip_prefix(self.marker.as_str())
    }
}
