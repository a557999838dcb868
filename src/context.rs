use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use url::Url;

use serde_json::Value;

/// The version of the JSON-LD syntax a context chain is rooted in. Fixed
/// when the root active context is created; every derived generation
/// carries it forward unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    JsonLd1_0,
    JsonLd1_1,
}

/// Base direction of strings, as set by `@direction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ltr,
    Rtl,
}

impl Direction {
    pub fn from_tag(tag: &str) -> Option<Direction> {
        match tag {
            "ltr" => Some(Direction::Ltr),
            "rtl" => Some(Direction::Rtl),
            _ => None,
        }
    }
}

/// A scoped (`@context` inside a term definition) context, stored raw.
/// It is not applied until the term is used; the base URL and remote
/// context chain captured here are what a later application resolves
/// against.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedContext {
    pub context: Value,
    pub base_url: Option<Url>,
    pub remote_contexts: Vec<String>,
}

/// The resolved meaning of a single term within one active context
/// generation. Immutable once installed; a redefinition in a later local
/// context produces a fresh value in the successor generation.
#[derive(Debug, Clone, PartialEq)]
pub struct TermDefinition {
    /// `None` is the explicit "no mapping" sentinel produced by
    /// `"term": {"@id": null}`; such a term expands to nothing.
    pub iri_mapping: Option<String>,
    pub protected: bool,
    pub prefix: bool,
    pub reverse: bool,
    /// Shared, not deep-cloned: the payload is immutable source data.
    pub scoped_context: Option<Arc<ScopedContext>>,
    pub container_mapping: Option<Vec<String>>,
    pub type_mapping: Option<String>,
    /// Outer `None`: no `@language` entry. Inner `None`: `"@language": null`.
    pub language_mapping: Option<Option<String>>,
    pub direction_mapping: Option<Option<Direction>>,
    pub index_mapping: Option<String>,
    pub nest_value: Option<String>,
}

impl TermDefinition {
    pub(crate) fn new(protected: bool) -> TermDefinition {
        TermDefinition {
            iri_mapping: None,
            protected,
            prefix: false,
            reverse: false,
            scoped_context: None,
            container_mapping: None,
            type_mapping: None,
            language_mapping: None,
            direction_mapping: None,
            index_mapping: None,
            nest_value: None,
        }
    }

    pub fn has_container(&self, keyword: &str) -> bool {
        self.container_mapping
            .as_ref()
            .map(|c| c.iter().any(|k| k == keyword))
            .unwrap_or(false)
    }

    /// Equality modulo the `protected` flag itself; this is the comparison
    /// the protected-term redefinition guard uses.
    pub(crate) fn matches_ignoring_protected(&self, other: &TermDefinition) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.protected = false;
        b.protected = false;
        a == b
    }
}

/// Reverse index from IRI to the terms mapped to it, candidates ordered
/// shortest-first then lexicographically. Computed lazily per generation
/// and dropped whenever a successor generation is derived.
#[derive(Debug, Default)]
pub struct InverseContext {
    by_iri: BTreeMap<String, Vec<String>>,
}

impl InverseContext {
    fn build(context: &ActiveContext) -> InverseContext {
        let mut by_iri: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (term, definition) in &context.term_definitions {
            if let Some(ref iri) = definition.iri_mapping {
                by_iri.entry(iri.clone()).or_default().push(term.clone());
            }
        }

        for terms in by_iri.values_mut() {
            terms.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        }

        InverseContext { by_iri }
    }

    pub fn terms_for(&self, iri: &str) -> &[String] {
        self.by_iri.get(iri).map(|t| t as &[String]).unwrap_or(&[])
    }
}

/// The set of term mappings and defaults in effect at a point in document
/// processing. Never mutated after being returned to a caller; context
/// processing clones it and installs changes into the clone.
#[derive(Debug)]
pub struct ActiveContext {
    pub term_definitions: BTreeMap<String, TermDefinition>,
    pub base_iri: Option<Url>,
    /// The base URL the context chain was rooted at; a `null` local
    /// context resets `base_iri` back to this.
    pub original_base_url: Option<Url>,
    /// Absolute IRI or blank node identifier.
    pub vocabulary_mapping: Option<String>,
    pub default_language: Option<String>,
    pub default_direction: Option<Direction>,
    /// The generation that was current before a non-propagating context
    /// was applied; consulted only to roll state back when leaving the
    /// node that introduced that context.
    pub previous_context: Option<Arc<ActiveContext>>,
    pub processing_mode: ProcessingMode,
    inverse_context: OnceLock<Arc<InverseContext>>,
}

impl ActiveContext {
    pub fn new(processing_mode: ProcessingMode) -> ActiveContext {
        ActiveContext::with_base(None, None, processing_mode)
    }

    pub fn with_base(
        base_iri: Option<Url>,
        original_base_url: Option<Url>,
        processing_mode: ProcessingMode,
    ) -> ActiveContext {
        ActiveContext {
            term_definitions: BTreeMap::new(),
            base_iri,
            original_base_url,
            vocabulary_mapping: None,
            default_language: None,
            default_direction: None,
            previous_context: None,
            processing_mode,
            inverse_context: OnceLock::new(),
        }
    }

    pub(crate) fn with_previous(
        base_iri: Option<Url>,
        original_base_url: Option<Url>,
        previous_context: Option<Arc<ActiveContext>>,
        processing_mode: ProcessingMode,
    ) -> ActiveContext {
        let mut context = ActiveContext::with_base(base_iri, original_base_url, processing_mode);
        context.previous_context = previous_context;
        context
    }

    pub fn term(&self, name: &str) -> Option<&TermDefinition> {
        self.term_definitions.get(name)
    }

    pub fn contains_protected_term(&self) -> bool {
        self.term_definitions.values().any(|term| term.protected)
    }

    pub fn in_mode(&self, mode: ProcessingMode) -> bool {
        self.processing_mode == mode
    }

    /// Lazily computed reverse index; cached for this generation only.
    pub fn inverse(&self) -> Arc<InverseContext> {
        self.inverse_context
            .get_or_init(|| Arc::new(InverseContext::build(self)))
            .clone()
    }
}

// Deriving a new generation must not carry the inverse cache forward, so
// Clone resets the slot instead of copying it.
impl Clone for ActiveContext {
    fn clone(&self) -> Self {
        ActiveContext {
            term_definitions: self.term_definitions.clone(),
            base_iri: self.base_iri.clone(),
            original_base_url: self.original_base_url.clone(),
            vocabulary_mapping: self.vocabulary_mapping.clone(),
            default_language: self.default_language.clone(),
            default_direction: self.default_direction,
            previous_context: self.previous_context.clone(),
            processing_mode: self.processing_mode,
            inverse_context: OnceLock::new(),
        }
    }
}

// Semantic equality; the inverse cache is derived state and not compared.
impl PartialEq for ActiveContext {
    fn eq(&self, other: &Self) -> bool {
        self.term_definitions == other.term_definitions
            && self.base_iri == other.base_iri
            && self.original_base_url == other.original_base_url
            && self.vocabulary_mapping == other.vocabulary_mapping
            && self.default_language == other.default_language
            && self.default_direction == other.default_direction
            && self.previous_context == other.previous_context
            && self.processing_mode == other.processing_mode
    }
}
