// Capability registry: tools and prompts by exact name, resources by URI template

use crate::error::{CapabilityError, RegistryError};
use crate::types::{Arguments, Capability, CapabilityKind};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

/// A capability resolved for one invocation, together with any values bound
/// from the URI template
#[derive(Debug, Clone)]
pub struct Resolved {
    pub capability: Arc<Capability>,
    pub bound: Arguments,
}

/// Registry of declared capabilities.
///
/// Keys are unique across all kinds. Registering under an existing key of the
/// same kind replaces the previous entry under a single write lock, so a
/// concurrent lookup sees either the old or the new capability.
pub struct CapabilityRegistry {
    entries: RwLock<HashMap<String, Arc<Capability>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a capability, returning the entry it replaced (if any)
    pub fn register(&self, capability: Capability) -> Result<Option<Arc<Capability>>, RegistryError> {
        let key = capability.key().to_string();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = entries.get(&key) {
            if existing.kind != capability.kind {
                return Err(RegistryError::DuplicateKindMismatch {
                    key,
                    existing: existing.kind,
                    requested: capability.kind,
                });
            }
        }

        if let Some(template) = &capability.uri_template {
            let overlapping = entries
                .values()
                .filter(|c| c.key() != key)
                .filter_map(|c| c.uri_template.as_ref())
                .find(|other| template.overlaps(other));
            if let Some(other) = overlapping {
                return Err(RegistryError::AmbiguousTemplate {
                    template: key,
                    existing: other.as_str().to_string(),
                });
            }
        }

        tracing::debug!("Registered {} '{}'", capability.kind, key);
        Ok(entries.insert(key, Arc::new(capability)))
    }

    /// Resolve a tool or prompt by name, or a resource by concrete URI
    pub fn lookup(&self, kind: CapabilityKind, key: &str) -> Result<Resolved, CapabilityError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        if kind != CapabilityKind::Resource {
            return entries
                .get(key)
                .filter(|c| c.kind == kind)
                .map(|c| Resolved {
                    capability: c.clone(),
                    bound: Arguments::new(),
                })
                .ok_or_else(|| CapabilityError::not_found(kind, key));
        }

        entries
            .values()
            .filter(|c| c.kind == CapabilityKind::Resource)
            .find_map(|c| {
                let template = c.uri_template.as_ref()?;
                template.match_uri(key).map(|bound| Resolved {
                    capability: c.clone(),
                    bound,
                })
            })
            .ok_or_else(|| CapabilityError::not_found(kind, key))
    }

    /// All capabilities of a kind, ordered by key
    pub fn list(&self, kind: CapabilityKind) -> Vec<Arc<Capability>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut capabilities: Vec<_> = entries.values().filter(|c| c.kind == kind).cloned().collect();
        capabilities.sort_by(|a, b| a.key().cmp(b.key()));
        capabilities
    }

    pub fn contains(&self, kind: CapabilityKind, key: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).is_some_and(|c| c.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// URI template with `{name}` placeholders.
///
/// A placeholder captures a non-empty run of characters without `/`; literal
/// segments must match exactly.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    source: String,
    segments: Vec<Segment>,
    placeholders: Vec<String>,
    pattern: Regex,
}

impl UriTemplate {
    pub fn parse(source: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidTemplate {
            template: source.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) if c.is_ascii_alphanumeric() || c == '_' => name.push(c),
                            Some(_) => return Err(invalid("placeholder names may only contain letters, digits and '_'")),
                            None => return Err(invalid("unclosed '{'")),
                        }
                    }
                    if name.is_empty() {
                        return Err(invalid("empty placeholder"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    } else if matches!(segments.last(), Some(Segment::Placeholder(_))) {
                        return Err(invalid("adjacent placeholders are ambiguous"));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' => return Err(invalid("unmatched '}'")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        if segments.is_empty() {
            return Err(invalid("template is empty"));
        }

        let mut placeholders: Vec<String> = Vec::new();
        let mut pattern = String::from("^");
        for segment in &segments {
            match segment {
                Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
                Segment::Placeholder(name) => {
                    if placeholders.contains(name) {
                        return Err(invalid(&format!("duplicate placeholder '{}'", name)));
                    }
                    placeholders.push(name.clone());
                    pattern.push_str("([^/]+)");
                }
            }
        }
        pattern.push('$');

        let pattern = Regex::new(&pattern).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            source: source.to_string(),
            segments,
            placeholders,
            pattern,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Match a concrete URI, returning placeholder name -> captured value
    pub fn match_uri(&self, uri: &str) -> Option<Arguments> {
        let captures = self.pattern.captures(uri)?;
        let mut bound = Arguments::new();
        for (i, name) in self.placeholders.iter().enumerate() {
            let value = captures.get(i + 1)?.as_str();
            bound.insert(name.clone(), serde_json::Value::String(value.to_string()));
        }
        Some(bound)
    }

    /// Whether some URI matches both templates.
    ///
    /// Walks both templates in lockstep over every pair of positions, so a
    /// placeholder in one may absorb literal text of the other.
    pub fn overlaps(&self, other: &UriTemplate) -> bool {
        let left = self.symbols();
        let right = other.symbols();

        let mut seen = HashSet::new();
        let mut pending = vec![(0, 0)];
        while let Some((i, j)) = pending.pop() {
            if !seen.insert((i, j)) {
                continue;
            }
            if i == left.len() && j == right.len() {
                return true;
            }
            // A run may match nothing
            if left.get(i) == Some(&Symbol::Run) {
                pending.push((i + 1, j));
            }
            if right.get(j) == Some(&Symbol::Run) {
                pending.push((i, j + 1));
            }
            if let (Some(a), Some(b)) = (left.get(i), right.get(j)) {
                if a.shares_char(b) {
                    pending.push((a.advance(i), b.advance(j)));
                }
            }
        }
        false
    }

    /// Character-level form: a placeholder is one non-`/` char and then a run
    fn symbols(&self) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => symbols.extend(text.chars().map(Symbol::Char)),
                Segment::Placeholder(_) => symbols.extend([Symbol::One, Symbol::Run]),
            }
        }
        symbols
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symbol {
    Char(char),
    /// Exactly one char other than `/`
    One,
    /// Zero or more chars other than `/`
    Run,
}

impl Symbol {
    fn shares_char(&self, other: &Symbol) -> bool {
        match (self, other) {
            (Symbol::Char(a), Symbol::Char(b)) => a == b,
            (Symbol::Char(c), _) | (_, Symbol::Char(c)) => *c != '/',
            _ => true,
        }
    }

    /// Position after consuming one char; a run stays put
    fn advance(&self, position: usize) -> usize {
        match self {
            Symbol::Run => position,
            _ => position + 1,
        }
    }
}
