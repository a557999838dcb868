//! The Create Term Definition algorithm: builds and validates a single
//! term definition inside an active context being extended. Mutually
//! recursive with context processing, since a term definition may carry a
//! scoped context that has to be validated by a full processing pass.

use log::warn;
use serde_json::Map as JsonMap;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use url::Url;

use crate::context::{ActiveContext, Direction, ProcessingMode, ScopedContext, TermDefinition};
use crate::expansion::{is_absolute_iri, is_blank_node, split_compact_iri, GEN_DELIMS};
use crate::keywords::{is_keyword, is_well_formed_language_tag, looks_like_keyword};
use crate::processing::{self, ContextError};
use crate::RemoteContextLoader;

/// Per-context-definition tracking of term creation, shared across all
/// keys of one definition so that dependency cycles are caught.
pub enum DefineStatus {
    Defining,
    Defined,
    /// Scanned but intentionally not given a definition (keyword-like
    /// terms); later lookups must neither retry nor report a cycle.
    Invalid,
}

#[derive(Debug)]
pub enum TermDefinitionError<T: RemoteContextLoader> {
    CyclicIriMapping,
    KeywordRedefinition,
    InvalidTermDefinition,
    InvalidIriMapping,
    InvalidReverseProperty,
    InvalidKeywordAlias,
    InvalidContainerMapping,
    InvalidLanguageMapping,
    InvalidBaseDirection,
    InvalidTypeMapping,
    InvalidProtectedValue,
    InvalidNestValue,
    InvalidPrefixValue,
    ProtectedTermRedefinition,
    InvalidScopedContext(Box<ContextError<T>>),
}

impl<T: RemoteContextLoader> fmt::Display for TermDefinitionError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TermDefinitionError::CyclicIriMapping => write!(f, "cyclic IRI mapping"),
            TermDefinitionError::KeywordRedefinition => write!(f, "keyword redefinition"),
            TermDefinitionError::InvalidTermDefinition => write!(f, "invalid term definition"),
            TermDefinitionError::InvalidIriMapping => write!(f, "invalid IRI mapping"),
            TermDefinitionError::InvalidReverseProperty => write!(f, "invalid reverse property"),
            TermDefinitionError::InvalidKeywordAlias => write!(f, "invalid keyword alias"),
            TermDefinitionError::InvalidContainerMapping => write!(f, "invalid container mapping"),
            TermDefinitionError::InvalidLanguageMapping => write!(f, "invalid language mapping"),
            TermDefinitionError::InvalidBaseDirection => write!(f, "invalid base direction"),
            TermDefinitionError::InvalidTypeMapping => write!(f, "invalid type mapping"),
            TermDefinitionError::InvalidProtectedValue => write!(f, "invalid @protected value"),
            TermDefinitionError::InvalidNestValue => write!(f, "invalid @nest value"),
            TermDefinitionError::InvalidPrefixValue => write!(f, "invalid @prefix value"),
            TermDefinitionError::ProtectedTermRedefinition => {
                write!(f, "protected term redefinition")
            }
            TermDefinitionError::InvalidScopedContext(err) => {
                write!(f, "invalid scoped context: {}", err)
            }
        }
    }
}

impl<T: RemoteContextLoader + 'static> Error for TermDefinitionError<T> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TermDefinitionError::InvalidScopedContext(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Keys a (non-reverse) term definition object may carry.
const TERM_KEYS: [&str; 11] = [
    "@container",
    "@context",
    "@direction",
    "@id",
    "@index",
    "@language",
    "@nest",
    "@prefix",
    "@protected",
    "@reverse",
    "@type",
];

fn contains_interior_colon(term: &str) -> bool {
    term.char_indices().any(|(at, c)| c == ':' && at > 0)
}

/// Builds the term definition for `term` from `definition` and installs it
/// into `active`, recursing into dependency terms and, for scoped
/// contexts, into context processing.
pub(crate) fn create_term<'a, T: RemoteContextLoader>(
    active: &'a mut ActiveContext,
    definition: &'a JsonMap<String, Value>,
    term: &'a str,
    defined: &'a mut HashMap<String, DefineStatus>,
    base_url: Option<&'a Url>,
    protected_default: bool,
    override_protected: bool,
    remote_contexts: &'a [String],
    validate_scoped: bool,
) -> Pin<Box<dyn Future<Output = Result<(), TermDefinitionError<T>>> + Send + 'a>> {
    Box::pin(async move {
        match defined.get(term) {
            Some(DefineStatus::Defining) => return Err(TermDefinitionError::CyclicIriMapping),
            Some(DefineStatus::Defined) | Some(DefineStatus::Invalid) => return Ok(()),
            None => {}
        }

        if term.is_empty() {
            return Err(TermDefinitionError::InvalidTermDefinition);
        }

        defined.insert(term.to_owned(), DefineStatus::Defining);

        let raw = definition.get(term).cloned().unwrap_or(Value::Null);

        // @type may be re-declared in 1.1, but only to request set
        // containers; every other keyword is off limits, and keyword-like
        // terms are dropped with a warning.
        if term == "@type" {
            if !active.in_mode(ProcessingMode::JsonLd1_1) {
                return Err(TermDefinitionError::KeywordRedefinition);
            }

            match &raw {
                Value::Object(map) if !map.is_empty() => {
                    for (key, value) in map {
                        match key.as_str() {
                            "@container" if value == &Value::String("@set".to_owned()) => {}
                            "@protected" => {}
                            _ => return Err(TermDefinitionError::KeywordRedefinition),
                        }
                    }
                }
                _ => return Err(TermDefinitionError::KeywordRedefinition),
            }
        } else if is_keyword(term) {
            return Err(TermDefinitionError::KeywordRedefinition);
        } else if looks_like_keyword(term) {
            warn!("ignoring definition of keyword-like term {:?}", term);
            defined.insert(term.to_owned(), DefineStatus::Invalid);
            return Ok(());
        }

        let previous = active.term_definitions.remove(term);

        let (map, simple_term) = match raw {
            Value::Null => {
                let mut map = JsonMap::new();
                map.insert("@id".to_owned(), Value::Null);
                (map, false)
            }
            Value::String(string) => {
                let mut map = JsonMap::new();
                map.insert("@id".to_owned(), Value::String(string));
                (map, true)
            }
            Value::Object(map) => (map, false),
            _ => return Err(TermDefinitionError::InvalidTermDefinition),
        };

        let mut term_definition = TermDefinition::new(protected_default);

        if let Some(protected) = map.get("@protected") {
            if active.in_mode(ProcessingMode::JsonLd1_0) {
                return Err(TermDefinitionError::InvalidTermDefinition);
            }

            match protected {
                Value::Bool(value) => term_definition.protected = *value,
                _ => return Err(TermDefinitionError::InvalidProtectedValue),
            }
        }

        if let Some(type_value) = map.get("@type") {
            let type_string = match type_value {
                Value::String(string) => string,
                _ => return Err(TermDefinitionError::InvalidTypeMapping),
            };

            let expanded = expand_iri_for_definition::<T>(
                active,
                type_string,
                false,
                true,
                definition,
                defined,
                base_url,
                protected_default,
                override_protected,
                remote_contexts,
                validate_scoped,
            )
            .await?
            .ok_or(TermDefinitionError::InvalidTypeMapping)?;

            match expanded.as_str() {
                "@id" | "@vocab" => {}
                "@json" | "@none" if active.in_mode(ProcessingMode::JsonLd1_1) => {}
                other if is_absolute_iri(other) => {}
                _ => return Err(TermDefinitionError::InvalidTypeMapping),
            }

            term_definition.type_mapping = Some(expanded);
        }

        if let Some(reverse) = map.get("@reverse") {
            if map.contains_key("@id") || map.contains_key("@nest") {
                return Err(TermDefinitionError::InvalidReverseProperty);
            }

            let reverse_string = match reverse {
                Value::String(string) => string,
                _ => return Err(TermDefinitionError::InvalidIriMapping),
            };

            if looks_like_keyword(reverse_string) {
                warn!(
                    "ignoring reverse term {:?} with keyword-like value {:?}",
                    term, reverse_string
                );
                defined.insert(term.to_owned(), DefineStatus::Invalid);
                return Ok(());
            }

            let expanded = expand_iri_for_definition::<T>(
                active,
                reverse_string,
                false,
                true,
                definition,
                defined,
                base_url,
                protected_default,
                override_protected,
                remote_contexts,
                validate_scoped,
            )
            .await?
            .filter(|iri| is_absolute_iri(iri) || is_blank_node(iri))
            .ok_or(TermDefinitionError::InvalidIriMapping)?;

            term_definition.iri_mapping = Some(expanded);

            if let Some(container) = map.get("@container") {
                match container {
                    Value::String(string) if string == "@set" || string == "@index" => {
                        term_definition.container_mapping = Some(vec![string.clone()]);
                    }
                    Value::Null => {}
                    _ => return Err(TermDefinitionError::InvalidReverseProperty),
                }
            }

            if map.keys().any(|key| {
                !matches!(key.as_str(), "@reverse" | "@container" | "@type" | "@protected")
            }) {
                return Err(TermDefinitionError::InvalidReverseProperty);
            }

            term_definition.reverse = true;

            return install(active, defined, term, previous, term_definition, override_protected);
        }

        // An `@id` spelling out the term itself carries no information and
        // is handled as if it were absent.
        let id_entry = map
            .get("@id")
            .filter(|id| !matches!(id, Value::String(string) if string == term));

        match id_entry {
            Some(Value::String(id)) => {
                if !is_keyword(id) && looks_like_keyword(id) {
                    warn!("ignoring term {:?} mapped to keyword-like {:?}", term, id);
                    defined.insert(term.to_owned(), DefineStatus::Invalid);
                    return Ok(());
                }

                let expanded = expand_iri_for_definition::<T>(
                    active,
                    id,
                    false,
                    true,
                    definition,
                    defined,
                    base_url,
                    protected_default,
                    override_protected,
                    remote_contexts,
                    validate_scoped,
                )
                .await?
                .filter(|iri| is_keyword(iri) || is_absolute_iri(iri) || is_blank_node(iri))
                .ok_or(TermDefinitionError::InvalidIriMapping)?;

                if expanded == "@context" {
                    return Err(TermDefinitionError::InvalidKeywordAlias);
                }

                term_definition.iri_mapping = Some(expanded);

                // A term that itself looks like a compact IRI or a relative
                // path must expand consistently with its declared mapping.
                if contains_interior_colon(term) || term.contains('/') {
                    defined.insert(term.to_owned(), DefineStatus::Defined);

                    let re_expanded = expand_iri_for_definition::<T>(
                        active,
                        term,
                        false,
                        true,
                        definition,
                        defined,
                        base_url,
                        protected_default,
                        override_protected,
                        remote_contexts,
                        validate_scoped,
                    )
                    .await?;

                    if re_expanded.as_deref() != term_definition.iri_mapping.as_deref() {
                        return Err(TermDefinitionError::InvalidIriMapping);
                    }
                } else if simple_term {
                    let eligible = term_definition
                        .iri_mapping
                        .as_ref()
                        .map(|iri| iri.ends_with(GEN_DELIMS) || is_blank_node(iri))
                        .unwrap_or(false);

                    if eligible {
                        term_definition.prefix = true;
                    }
                }
            }
            Some(Value::Null) => {
                // Explicit "no mapping": the term is defined, but expands
                // to nothing.
            }
            Some(_) => return Err(TermDefinitionError::InvalidIriMapping),
            None if contains_interior_colon(term) => {
                let (prefix, suffix) = split_compact_iri(term).unwrap();

                if definition.contains_key(prefix)
                    && !matches!(defined.get(prefix), Some(DefineStatus::Defined))
                {
                    create_term::<T>(
                        active,
                        definition,
                        prefix,
                        defined,
                        base_url,
                        protected_default,
                        override_protected,
                        remote_contexts,
                        validate_scoped,
                    )
                    .await?;
                }

                term_definition.iri_mapping =
                    match active.term(prefix).and_then(|t| t.iri_mapping.as_ref()) {
                        Some(prefix_iri) => Some(format!("{}{}", prefix_iri, suffix)),
                        None => Some(term.to_owned()),
                    };
            }
            None if term.contains('/') => {
                let expanded = expand_iri_for_definition::<T>(
                    active,
                    term,
                    false,
                    true,
                    definition,
                    defined,
                    base_url,
                    protected_default,
                    override_protected,
                    remote_contexts,
                    validate_scoped,
                )
                .await?
                .filter(|iri| is_absolute_iri(iri))
                .ok_or(TermDefinitionError::InvalidIriMapping)?;

                term_definition.iri_mapping = Some(expanded);
            }
            None if term == "@type" => {
                term_definition.iri_mapping = Some("@type".to_owned());
            }
            None => match active.vocabulary_mapping {
                Some(ref vocabulary) => {
                    term_definition.iri_mapping = Some(format!("{}{}", vocabulary, term));
                }
                None => return Err(TermDefinitionError::InvalidIriMapping),
            },
        }

        if let Some(container) = map.get("@container") {
            let mapping = container_mapping::<T>(active.processing_mode, container)?;

            if mapping.iter().any(|c| c == "@type") {
                match term_definition.type_mapping.as_deref() {
                    None => term_definition.type_mapping = Some("@id".to_owned()),
                    Some("@id") | Some("@vocab") => {}
                    Some(_) => return Err(TermDefinitionError::InvalidTypeMapping),
                }
            }

            term_definition.container_mapping = Some(mapping);
        }

        if let Some(index) = map.get("@index") {
            if active.in_mode(ProcessingMode::JsonLd1_0)
                || !term_definition.has_container("@index")
            {
                return Err(TermDefinitionError::InvalidTermDefinition);
            }

            let index_string = match index {
                Value::String(string) => string,
                _ => return Err(TermDefinitionError::InvalidTermDefinition),
            };

            expand_iri_for_definition::<T>(
                active,
                index_string,
                false,
                true,
                definition,
                defined,
                base_url,
                protected_default,
                override_protected,
                remote_contexts,
                validate_scoped,
            )
            .await?
            .filter(|iri| is_absolute_iri(iri))
            .ok_or(TermDefinitionError::InvalidTermDefinition)?;

            term_definition.index_mapping = Some(index_string.clone());
        }

        if let Some(scoped) = map.get("@context") {
            if active.in_mode(ProcessingMode::JsonLd1_0) {
                return Err(TermDefinitionError::InvalidTermDefinition);
            }

            // Surface definition errors eagerly, but keep the context
            // itself unapplied until the term is used.
            if validate_scoped {
                let mut chain = remote_contexts.to_vec();
                processing::process::<T>(active, scoped, base_url, &mut chain, true, true, false)
                    .await
                    .map_err(|err| TermDefinitionError::InvalidScopedContext(Box::new(err)))?;
            }

            term_definition.scoped_context = Some(Arc::new(ScopedContext {
                context: scoped.clone(),
                base_url: base_url.cloned(),
                remote_contexts: remote_contexts.to_vec(),
            }));
        }

        if !map.contains_key("@type") {
            if let Some(language) = map.get("@language") {
                match language {
                    Value::Null => term_definition.language_mapping = Some(None),
                    Value::String(string) => {
                        if !is_well_formed_language_tag(string) {
                            warn!("term {:?} has malformed language tag {:?}", term, string);
                        }
                        term_definition.language_mapping = Some(Some(string.to_lowercase()));
                    }
                    _ => return Err(TermDefinitionError::InvalidLanguageMapping),
                }
            }

            if let Some(direction) = map.get("@direction") {
                match direction {
                    Value::Null => term_definition.direction_mapping = Some(None),
                    Value::String(string) => match Direction::from_tag(string) {
                        Some(tag) => term_definition.direction_mapping = Some(Some(tag)),
                        None => return Err(TermDefinitionError::InvalidBaseDirection),
                    },
                    _ => return Err(TermDefinitionError::InvalidBaseDirection),
                }
            }
        }

        if let Some(nest) = map.get("@nest") {
            if active.in_mode(ProcessingMode::JsonLd1_0) {
                return Err(TermDefinitionError::InvalidTermDefinition);
            }

            match nest {
                Value::String(string) if string == "@nest" || !is_keyword(string) => {
                    term_definition.nest_value = Some(string.clone());
                }
                _ => return Err(TermDefinitionError::InvalidNestValue),
            }
        }

        if let Some(prefix) = map.get("@prefix") {
            if active.in_mode(ProcessingMode::JsonLd1_0)
                || term.contains(':')
                || term.contains('/')
            {
                return Err(TermDefinitionError::InvalidTermDefinition);
            }

            match prefix {
                Value::Bool(value) => term_definition.prefix = *value,
                _ => return Err(TermDefinitionError::InvalidPrefixValue),
            }

            let keyword_mapping = term_definition
                .iri_mapping
                .as_deref()
                .map(is_keyword)
                .unwrap_or(false);

            if term_definition.prefix && keyword_mapping {
                return Err(TermDefinitionError::InvalidTermDefinition);
            }
        }

        if map.keys().any(|key| !TERM_KEYS.contains(&key.as_str())) {
            return Err(TermDefinitionError::InvalidTermDefinition);
        }

        if active.in_mode(ProcessingMode::JsonLd1_0)
            && map.keys().any(|key| {
                !matches!(key.as_str(), "@container" | "@id" | "@language" | "@reverse" | "@type")
            })
        {
            return Err(TermDefinitionError::InvalidTermDefinition);
        }

        install(active, defined, term, previous, term_definition, override_protected)
    })
}

/// Final protected-redefinition guard plus installation into the active
/// context. An identical redefinition of a protected term keeps the
/// previous definition.
fn install<T: RemoteContextLoader>(
    active: &mut ActiveContext,
    defined: &mut HashMap<String, DefineStatus>,
    term: &str,
    previous: Option<TermDefinition>,
    mut term_definition: TermDefinition,
    override_protected: bool,
) -> Result<(), TermDefinitionError<T>> {
    if let Some(previous) = previous {
        if previous.protected && !override_protected {
            if !term_definition.matches_ignoring_protected(&previous) {
                return Err(TermDefinitionError::ProtectedTermRedefinition);
            }
            term_definition = previous;
        }
    }

    active
        .term_definitions
        .insert(term.to_owned(), term_definition);
    defined.insert(term.to_owned(), DefineStatus::Defined);

    Ok(())
}

fn container_mapping<T: RemoteContextLoader>(
    mode: ProcessingMode,
    value: &Value,
) -> Result<Vec<String>, TermDefinitionError<T>> {
    const ALLOWED: [&str; 7] = [
        "@graph",
        "@id",
        "@index",
        "@language",
        "@list",
        "@set",
        "@type",
    ];

    let entries: Vec<&str> = match value {
        Value::String(string) => vec![string as &str],
        Value::Array(items) if mode == ProcessingMode::JsonLd1_1 => {
            let mut entries = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(string) => entries.push(string as &str),
                    _ => return Err(TermDefinitionError::InvalidContainerMapping),
                }
            }
            entries
        }
        _ => return Err(TermDefinitionError::InvalidContainerMapping),
    };

    let set: BTreeSet<&str> = entries.iter().cloned().collect();

    if set.len() != entries.len() || set.iter().any(|entry| !ALLOWED.contains(entry)) {
        return Err(TermDefinitionError::InvalidContainerMapping);
    }

    if mode == ProcessingMode::JsonLd1_0 {
        match entries[0] {
            "@list" | "@set" | "@index" | "@language" => {}
            _ => return Err(TermDefinitionError::InvalidContainerMapping),
        }
    } else if set.contains("@list") {
        if set.len() != 1 {
            return Err(TermDefinitionError::InvalidContainerMapping);
        }
    } else if set.contains("@graph") {
        if set.contains("@id") && set.contains("@index") {
            return Err(TermDefinitionError::InvalidContainerMapping);
        }
        if !set
            .iter()
            .all(|entry| matches!(*entry, "@graph" | "@id" | "@index" | "@set"))
        {
            return Err(TermDefinitionError::InvalidContainerMapping);
        }
    } else if set.len() == 2 {
        if !set.contains("@set") {
            return Err(TermDefinitionError::InvalidContainerMapping);
        }
    } else if set.len() > 2 {
        return Err(TermDefinitionError::InvalidContainerMapping);
    }

    Ok(set.into_iter().map(str::to_owned).collect())
}

// Much like the steady-state expansion in `expansion`, but consults the
// context definition currently being processed, creating dependency terms
// on demand. The duplication is deliberate; this variant only makes sense
// mid-creation.
pub(crate) fn expand_iri_for_definition<'a, T: RemoteContextLoader>(
    active: &'a mut ActiveContext,
    value: &'a str,
    document_relative: bool,
    vocab: bool,
    definition: &'a JsonMap<String, Value>,
    defined: &'a mut HashMap<String, DefineStatus>,
    base_url: Option<&'a Url>,
    protected_default: bool,
    override_protected: bool,
    remote_contexts: &'a [String],
    validate_scoped: bool,
) -> Pin<Box<dyn Future<Output = Result<Option<String>, TermDefinitionError<T>>> + Send + 'a>> {
    Box::pin(async move {
        if is_keyword(value) {
            return Ok(Some(value.to_string()));
        }

        if looks_like_keyword(value) {
            warn!("ignoring keyword-like value {:?} during IRI expansion", value);
            return Ok(None);
        }

        if definition.contains_key(value)
            && !matches!(defined.get(value), Some(DefineStatus::Defined))
        {
            create_term::<T>(
                active,
                definition,
                value,
                defined,
                base_url,
                protected_default,
                override_protected,
                remote_contexts,
                validate_scoped,
            )
            .await?;
        }

        if vocab {
            if let Some(term) = active.term(value) {
                return Ok(term.iri_mapping.clone());
            }
        }

        if let Some((prefix, suffix)) = split_compact_iri(value) {
            if prefix == "_" || suffix.starts_with("//") {
                return Ok(Some(value.to_string()));
            }

            if definition.contains_key(prefix)
                && !matches!(defined.get(prefix), Some(DefineStatus::Defined))
            {
                create_term::<T>(
                    active,
                    definition,
                    prefix,
                    defined,
                    base_url,
                    protected_default,
                    override_protected,
                    remote_contexts,
                    validate_scoped,
                )
                .await?;
            }

            if let Some(term) = active.term(prefix) {
                let usable = term.prefix || active.in_mode(ProcessingMode::JsonLd1_0);
                if let (true, Some(iri)) = (usable, term.iri_mapping.as_ref()) {
                    return Ok(Some(format!("{}{}", iri, suffix)));
                }
            }

            if is_absolute_iri(value) {
                return Ok(Some(value.to_string()));
            }
        }

        if vocab {
            if let Some(ref vocabulary) = active.vocabulary_mapping {
                return Ok(Some(format!("{}{}", vocabulary, value)));
            }
        }

        if document_relative {
            if let Some(ref base) = active.base_iri {
                if let Ok(joined) = base.join(value) {
                    return Ok(Some(joined.to_string()));
                }
            }
        }

        Ok(Some(value.to_string()))
    })
}
