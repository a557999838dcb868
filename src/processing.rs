//! The Context Processing algorithm: folds an ordered list of local
//! contexts (inline definitions, remote references, null resets) into a
//! fresh active context generation.

use log::warn;
use serde_json::Map as JsonMap;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use url::Url;

use crate::context::{ActiveContext, Direction, ProcessingMode};
use crate::creation::{self, DefineStatus, TermDefinitionError};
use crate::expansion::{expand_iri, is_absolute_iri, is_blank_node};
use crate::keywords::{is_well_formed_language_tag, CONTEXT_KEYS};
use crate::RemoteContextLoader;

/// Upper bound on the remote context chain within one top-level
/// processing call. Cyclic or unbounded inclusion chains hit this bound
/// and fail with `ContextOverflow` instead of recursing forever.
pub const MAX_REMOTE_CONTEXTS: usize = 32;

#[derive(Debug)]
pub enum ContextError<T: RemoteContextLoader> {
    InvalidContextNullification,
    LoadingDocumentFailed,
    RemoteContextError(T::Error),
    InvalidRemoteContext,
    ContextOverflow,
    InvalidLocalContext,
    InvalidVersionValue,
    ProcessingModeConflict,
    InvalidContextEntry,
    InvalidImportValue,
    InvalidBaseIri,
    InvalidVocabMapping,
    InvalidDefaultLanguage,
    InvalidBaseDirection,
    InvalidPropagateValue,
    InvalidTerm(TermDefinitionError<T>),
}

impl<T: RemoteContextLoader> From<TermDefinitionError<T>> for ContextError<T> {
    fn from(err: TermDefinitionError<T>) -> Self {
        ContextError::InvalidTerm(err)
    }
}

impl<T: RemoteContextLoader> fmt::Display for ContextError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ContextError::InvalidContextNullification => write!(f, "invalid context nullification"),
            ContextError::LoadingDocumentFailed => write!(f, "loading document failed"),
            ContextError::RemoteContextError(err) => write!(f, "loading remote context failed: {}", err),
            ContextError::InvalidRemoteContext => write!(f, "invalid remote context"),
            ContextError::ContextOverflow => write!(f, "context overflow"),
            ContextError::InvalidLocalContext => write!(f, "invalid local context"),
            ContextError::InvalidVersionValue => write!(f, "invalid @version value"),
            ContextError::ProcessingModeConflict => write!(f, "processing mode conflict"),
            ContextError::InvalidContextEntry => write!(f, "invalid context entry"),
            ContextError::InvalidImportValue => write!(f, "invalid @import value"),
            ContextError::InvalidBaseIri => write!(f, "invalid base IRI"),
            ContextError::InvalidVocabMapping => write!(f, "invalid vocab mapping"),
            ContextError::InvalidDefaultLanguage => write!(f, "invalid default language"),
            ContextError::InvalidBaseDirection => write!(f, "invalid base direction"),
            ContextError::InvalidPropagateValue => write!(f, "invalid @propagate value"),
            ContextError::InvalidTerm(err) => write!(f, "invalid term: {}", err),
        }
    }
}

impl<T: RemoteContextLoader + 'static> Error for ContextError<T> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ContextError::RemoteContextError(err) => Some(err),
            ContextError::InvalidTerm(err) => Some(err),
            _ => None,
        }
    }
}

/// Optional knobs of a processing call; `Default` matches the plain
/// `process_context` entry point.
pub struct ProcessingOptions {
    /// The chain of remote context IRIs already being processed; shared
    /// and appended to across the whole recursive call tree for cycle
    /// detection.
    pub remote_contexts: Vec<String>,
    /// Allow redefinition of protected terms. Only meaningful for
    /// root-level callers.
    pub override_protected: bool,
    /// Whether the resulting context survives past the node that
    /// introduced it.
    pub propagate: bool,
    /// When false, an already-visited remote context is skipped instead
    /// of being re-fetched.
    pub validate_scoped_context: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        ProcessingOptions {
            remote_contexts: Vec::new(),
            override_protected: false,
            propagate: true,
            validate_scoped_context: true,
        }
    }
}

impl ActiveContext {
    /// Computes the successor active context obtained by applying
    /// `local_context` to `self`, with default options. `self` is never
    /// mutated; every failure leaves no partial result behind.
    pub async fn process_context<T: RemoteContextLoader>(
        &self,
        local_context: &Value,
        base_url: Option<&Url>,
    ) -> Result<ActiveContext, ContextError<T>> {
        self.process_context_with::<T>(local_context, base_url, ProcessingOptions::default())
            .await
    }

    pub async fn process_context_with<T: RemoteContextLoader>(
        &self,
        local_context: &Value,
        base_url: Option<&Url>,
        mut options: ProcessingOptions,
    ) -> Result<ActiveContext, ContextError<T>> {
        process::<T>(
            self,
            local_context,
            base_url,
            &mut options.remote_contexts,
            options.override_protected,
            options.propagate,
            options.validate_scoped_context,
        )
        .await
    }
}

/// Resolves a context reference against the current base URL. A relative
/// reference without any base cannot become an absolute IRI.
fn resolve_reference(base_url: Option<&Url>, reference: &str) -> Option<String> {
    match base_url {
        Some(base) => base.join(reference).ok().map(|url| url.to_string()),
        None => Url::parse(reference).ok().map(|url| url.to_string()),
    }
}

pub(crate) fn process<'a, T: RemoteContextLoader>(
    active: &'a ActiveContext,
    local_context: &'a Value,
    base_url: Option<&'a Url>,
    remote_contexts: &'a mut Vec<String>,
    override_protected: bool,
    mut propagate: bool,
    validate_scoped_context: bool,
) -> Pin<Box<dyn Future<Output = Result<ActiveContext, ContextError<T>>> + Send + 'a>> {
    Box::pin(async move {
        // 1. A fresh generation; Clone drops the inverse cache.
        let mut result = active.clone();

        // 2. A bare context definition may override propagation up front.
        //    Non-boolean values are dealt with during keyword validation.
        if let Value::Object(map) = local_context {
            if let Some(Value::Bool(value)) = map.get("@propagate") {
                propagate = *value;
            }
        }

        // 3.
        if !propagate && result.previous_context.is_none() {
            result.previous_context = Some(Arc::new(active.clone()));
        }

        // 4.
        let items: Vec<&Value> = match local_context {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        // 5.
        for item in items {
            match item {
                Value::Null => {
                    // 5.1. Protected terms survive everything except an
                    // explicit root-level override.
                    if !override_protected && active.contains_protected_term() {
                        return Err(ContextError::InvalidContextNullification);
                    }

                    let previous = if propagate {
                        None
                    } else {
                        result.previous_context.take()
                    };

                    result = ActiveContext::with_previous(
                        active.original_base_url.clone(),
                        active.original_base_url.clone(),
                        previous,
                        active.processing_mode,
                    );
                }

                Value::String(reference) => {
                    // 5.2.
                    let context_iri = resolve_reference(base_url, reference)
                        .ok_or(ContextError::LoadingDocumentFailed)?;

                    if !validate_scoped_context
                        && remote_contexts.iter().any(|visited| *visited == context_iri)
                    {
                        continue;
                    }

                    if remote_contexts.len() >= MAX_REMOTE_CONTEXTS {
                        return Err(ContextError::ContextOverflow);
                    }

                    remote_contexts.push(context_iri.clone());

                    let remote = T::load_context(context_iri)
                        .await
                        .map_err(ContextError::RemoteContextError)?;

                    let loaded = match remote.document {
                        Value::Object(mut document) => document
                            .remove("@context")
                            .ok_or(ContextError::InvalidRemoteContext)?,
                        _ => return Err(ContextError::InvalidRemoteContext),
                    };

                    let next = process::<T>(
                        &result,
                        &loaded,
                        Some(&remote.document_url),
                        remote_contexts,
                        false,
                        true,
                        validate_scoped_context,
                    )
                    .await?;
                    result = next;
                }

                Value::Object(map) => {
                    apply_definition::<T>(
                        active,
                        &mut result,
                        map,
                        base_url,
                        remote_contexts,
                        override_protected,
                        &mut propagate,
                        validate_scoped_context,
                    )
                    .await?;
                }

                // 5.3.
                _ => return Err(ContextError::InvalidLocalContext),
            }
        }

        // 6.
        Ok(result)
    })
}

/// One context definition object (5.4 through 5.13).
async fn apply_definition<'a, T: RemoteContextLoader>(
    active: &'a ActiveContext,
    result: &'a mut ActiveContext,
    map: &'a JsonMap<String, Value>,
    base_url: Option<&'a Url>,
    remote_contexts: &'a mut Vec<String>,
    override_protected: bool,
    propagate: &'a mut bool,
    validate_scoped_context: bool,
) -> Result<(), ContextError<T>> {
    // 5.5. @version
    if let Some(version) = map.get("@version") {
        let tag = match version {
            Value::String(string) => Some(string.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        };

        if tag.as_deref() != Some("1.1") {
            return Err(ContextError::InvalidVersionValue);
        }

        if active.in_mode(ProcessingMode::JsonLd1_0) {
            return Err(ContextError::ProcessingModeConflict);
        }
    }

    // 5.6. @import: the imported definition is merged underneath the
    // importing one, which keeps precedence for common entries.
    let map: Cow<JsonMap<String, Value>> = match map.get("@import") {
        None => Cow::Borrowed(map),
        Some(import) => {
            if active.in_mode(ProcessingMode::JsonLd1_0) {
                return Err(ContextError::InvalidContextEntry);
            }

            let import_reference = match import {
                Value::String(string) => string,
                _ => return Err(ContextError::InvalidImportValue),
            };

            let import_iri = resolve_reference(base_url, import_reference)
                .ok_or(ContextError::InvalidImportValue)?;

            let remote = T::load_context(import_iri)
                .await
                .map_err(ContextError::RemoteContextError)?;

            let mut imported = match remote.document {
                Value::Object(mut document) => match document.remove("@context") {
                    Some(Value::Object(context)) => context,
                    _ => return Err(ContextError::InvalidRemoteContext),
                },
                _ => return Err(ContextError::InvalidRemoteContext),
            };

            if imported.contains_key("@import") {
                return Err(ContextError::InvalidContextEntry);
            }

            for (key, value) in map {
                imported.insert(key.clone(), value.clone());
            }

            Cow::Owned(imported)
        }
    };

    // 5.7. @base: only honored in the outermost, non-remote context.
    if remote_contexts.is_empty() {
        match map.get("@base") {
            None => {}
            Some(Value::Null) => result.base_iri = None,
            Some(Value::String(value)) => match Url::parse(value) {
                Ok(url) => result.base_iri = Some(url),
                Err(url::ParseError::RelativeUrlWithoutBase) => match result.base_iri {
                    Some(ref base) => {
                        result.base_iri =
                            Some(base.join(value).map_err(|_| ContextError::InvalidBaseIri)?);
                    }
                    None => return Err(ContextError::InvalidBaseIri),
                },
                Err(_) => return Err(ContextError::InvalidBaseIri),
            },
            Some(_) => return Err(ContextError::InvalidBaseIri),
        }
    }

    // 5.8. @vocab
    match map.get("@vocab") {
        None => {}
        Some(Value::Null) => result.vocabulary_mapping = None,
        Some(Value::String(value)) => {
            let expanded = expand_iri(result, value, true, true)
                .filter(|iri| is_absolute_iri(iri) || is_blank_node(iri))
                .ok_or(ContextError::InvalidVocabMapping)?;
            result.vocabulary_mapping = Some(expanded);
        }
        Some(_) => return Err(ContextError::InvalidVocabMapping),
    }

    // 5.9. @language: stored verbatim; a malformed tag is only a warning.
    match map.get("@language") {
        None => {}
        Some(Value::Null) => result.default_language = None,
        Some(Value::String(value)) => {
            if !is_well_formed_language_tag(value) {
                warn!("@language tag {:?} is not well-formed", value);
            }
            result.default_language = Some(value.clone());
        }
        Some(_) => return Err(ContextError::InvalidDefaultLanguage),
    }

    // 5.10. @direction
    if let Some(direction) = map.get("@direction") {
        if active.in_mode(ProcessingMode::JsonLd1_0) {
            return Err(ContextError::InvalidContextEntry);
        }

        match direction {
            Value::Null => result.default_direction = None,
            Value::String(value) => match Direction::from_tag(value) {
                Some(tag) => result.default_direction = Some(tag),
                None => return Err(ContextError::InvalidBaseDirection),
            },
            _ => return Err(ContextError::InvalidBaseDirection),
        }
    }

    // 5.11. @propagate: validated here, and from here on the value also
    // governs the rest of the fold, so a non-propagating definition works
    // when wrapped in an array.
    if let Some(value) = map.get("@propagate") {
        if active.in_mode(ProcessingMode::JsonLd1_0) {
            return Err(ContextError::InvalidContextEntry);
        }

        match value {
            Value::Bool(value) => *propagate = *value,
            _ => return Err(ContextError::InvalidPropagateValue),
        }

        if !*propagate && result.previous_context.is_none() {
            result.previous_context = Some(Arc::new(active.clone()));
        }
    }

    // 5.12. / 5.13. Remaining keys are term definitions, sharing one
    // `defined` map so dependency cycles within the definition are caught.
    let protected_default = matches!(map.get("@protected"), Some(Value::Bool(true)));
    let mut defined: HashMap<String, DefineStatus> = HashMap::new();

    for key in map.keys() {
        if CONTEXT_KEYS.contains(&key.as_str()) {
            continue;
        }

        creation::create_term::<T>(
            result,
            &map,
            key,
            &mut defined,
            base_url,
            protected_default,
            override_protected,
            remote_contexts,
            validate_scoped_context,
        )
        .await?;
    }

    Ok(())
}
