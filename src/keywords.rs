use lazy_static::lazy_static;
use std::collections::HashSet;

lazy_static! {
    /// All keywords recognized by JSON-LD 1.1.
    pub static ref KEYWORDS: HashSet<&'static str> = vec![
        "@base",
        "@container",
        "@context",
        "@direction",
        "@graph",
        "@id",
        "@import",
        "@included",
        "@index",
        "@json",
        "@language",
        "@list",
        "@nest",
        "@none",
        "@prefix",
        "@propagate",
        "@protected",
        "@reverse",
        "@set",
        "@type",
        "@value",
        "@version",
        "@vocab",
    ]
    .into_iter()
    .collect();
}

/// Keys of a context definition that are handled inline by the context
/// processor rather than scanned as term definitions.
pub const CONTEXT_KEYS: [&str; 8] = [
    "@base",
    "@direction",
    "@import",
    "@language",
    "@propagate",
    "@protected",
    "@version",
    "@vocab",
];

pub fn is_keyword(value: &str) -> bool {
    KEYWORDS.contains(value)
}

/// True for strings that have the form of a keyword (`@` followed by one or
/// more ASCII letters) without being one. Such strings are ignored, with a
/// warning, wherever a term or IRI is expected.
pub fn looks_like_keyword(value: &str) -> bool {
    !is_keyword(value)
        && value.len() > 1
        && value.starts_with('@')
        && value[1..].bytes().all(|b| b.is_ascii_alphabetic())
}

/// Cheap BCP 47 shape check; the processor only warns on violations, it
/// never rejects a language tag.
pub fn is_well_formed_language_tag(tag: &str) -> bool {
    let mut parts = tag.split('-');

    match parts.next() {
        Some(first)
            if !first.is_empty()
                && first.len() <= 8
                && first.bytes().all(|b| b.is_ascii_alphabetic()) => {}
        _ => return false,
    }

    parts.all(|part| {
        !part.is_empty() && part.len() <= 8 && part.bytes().all(|b| b.is_ascii_alphanumeric())
    })
}
