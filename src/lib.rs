//! JSON-LD 1.1 context processing.
//!
//! This crate implements the Context Processing and Create Term Definition
//! algorithms over an [`ActiveContext`] value: term-to-IRI mappings, the
//! default vocabulary, base IRI, default language and direction, protected
//! terms, scoped contexts, and remote context references. Document
//! expansion and compaction are left to downstream crates; remote context
//! documents are supplied by the caller through [`RemoteContextLoader`].

use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use url::Url;

mod context;
mod creation;
mod expansion;
mod keywords;
mod processing;

pub use context::{
    ActiveContext, Direction, InverseContext, ProcessingMode, ScopedContext, TermDefinition,
};
pub use expansion::expand_iri;
pub use processing::{ProcessingOptions, MAX_REMOTE_CONTEXTS};

pub mod error {
    pub use crate::creation::TermDefinitionError;
    pub use crate::processing::ContextError;
}

/// A dereferenced remote context document: its content plus the URL the
/// dereference finally resolved to, which becomes the base URL for
/// anything inside the document.
#[derive(Debug, Clone)]
pub struct RemoteContext {
    pub document_url: Url,
    pub document: Value,
}

/// Implemented by consumers of the API, to provide remote contexts.
pub trait RemoteContextLoader: fmt::Debug {
    type Error: std::error::Error + Send + 'static;

    /// Dereferences a remote JSON-LD context document by IRI.
    fn load_context(
        iri: String,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteContext, Self::Error>> + Send>>;
}
