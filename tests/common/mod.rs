#![allow(dead_code)]

use jsonld_context::error::ContextError;
use jsonld_context::{
    ActiveContext, ProcessingMode, ProcessingOptions, RemoteContext, RemoteContextLoader,
};
use lazy_static::lazy_static;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use url::Url;

#[derive(Debug)]
pub struct LoadError(pub String);

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "no fixture for {}", self.0)
    }
}

impl std::error::Error for LoadError {}

lazy_static! {
    static ref FETCH_COUNTS: Mutex<HashMap<String, usize>> = Mutex::new(HashMap::new());
}

/// How many times a fixture IRI has been dereferenced, across the whole
/// test binary.
pub fn fetch_count(iri: &str) -> usize {
    *FETCH_COUNTS.lock().unwrap().get(iri).unwrap_or(&0)
}

/// Serves canned context documents, counting dereferences per IRI.
#[derive(Debug)]
pub struct FixtureLoader;

impl RemoteContextLoader for FixtureLoader {
    type Error = LoadError;

    fn load_context(
        iri: String,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteContext, LoadError>> + Send>> {
        Box::pin(async move {
            *FETCH_COUNTS
                .lock()
                .unwrap()
                .entry(iri.clone())
                .or_insert(0) += 1;

            let document = match iri.as_str() {
                "http://fixtures.example/contexts/people" => json!({
                    "@context": {
                        "name": "http://xmlns.com/foaf/0.1/name",
                        "homepage": {"@id": "http://xmlns.com/foaf/0.1/homepage", "@type": "@id"}
                    }
                }),
                "http://fixtures.example/contexts/once" => json!({
                    "@context": {"once": "http://fixtures.example/vocab/once"}
                }),
                "http://fixtures.example/contexts/loop-a" => json!({
                    "@context": "http://fixtures.example/contexts/loop-b"
                }),
                "http://fixtures.example/contexts/loop-b" => json!({
                    "@context": "http://fixtures.example/contexts/loop-a"
                }),
                "http://fixtures.example/contexts/import" => json!({
                    "@context": {
                        "@vocab": "http://imported.example/",
                        "size": "http://imported.example/size"
                    }
                }),
                "http://fixtures.example/contexts/import-nested" => json!({
                    "@context": {"@import": "http://fixtures.example/contexts/import"}
                }),
                "http://fixtures.example/contexts/import-array" => json!({
                    "@context": ["http://fixtures.example/contexts/people"]
                }),
                "http://fixtures.example/contexts/no-context" => json!({
                    "unrelated": true
                }),
                "http://fixtures.example/contexts/not-an-object" => json!([1, 2, 3]),
                _ => return Err(LoadError(iri)),
            };

            Ok(RemoteContext {
                document_url: Url::parse(&iri).unwrap(),
                document,
            })
        })
    }
}

pub fn ctx_1_1() -> ActiveContext {
    ActiveContext::new(ProcessingMode::JsonLd1_1)
}

pub fn ctx_1_0() -> ActiveContext {
    ActiveContext::new(ProcessingMode::JsonLd1_0)
}

pub type ProcessResult = Result<ActiveContext, ContextError<FixtureLoader>>;

pub fn process(active: &ActiveContext, local_context: &Value) -> ProcessResult {
    async_std::task::block_on(active.process_context::<FixtureLoader>(local_context, None))
}

pub fn process_at(active: &ActiveContext, local_context: &Value, base_url: &str) -> ProcessResult {
    let base = Url::parse(base_url).unwrap();
    async_std::task::block_on(active.process_context::<FixtureLoader>(local_context, Some(&base)))
}

pub fn process_with(
    active: &ActiveContext,
    local_context: &Value,
    options: ProcessingOptions,
) -> ProcessResult {
    async_std::task::block_on(active.process_context_with::<FixtureLoader>(
        local_context,
        None,
        options,
    ))
}
