//! The slice of IRI expansion that context processing depends on: the pure,
//! steady-state variant operating over a finished active context. The
//! creation-time variant, which may define dependency terms while
//! expanding, lives with the term definition creator.

use log::warn;
use url::Url;

use crate::context::{ActiveContext, ProcessingMode};
use crate::keywords::{is_keyword, looks_like_keyword};

/// Characters that may legally end a prefix IRI (the URI gen-delims); only
/// terms whose IRI ends in one of these are usable as compact IRI prefixes
/// in 1.1 mode.
pub(crate) const GEN_DELIMS: &[char] = &[':', '/', '?', '#', '[', ']', '@'];

pub(crate) fn is_absolute_iri(value: &str) -> bool {
    Url::parse(value).is_ok()
}

pub(crate) fn is_blank_node(value: &str) -> bool {
    value.starts_with("_:")
}

/// Splits a potential compact IRI into prefix and suffix at the first
/// colon. A leading colon does not form a compact IRI.
pub(crate) fn split_compact_iri(value: &str) -> Option<(&str, &str)> {
    match value.find(':') {
        Some(0) | None => None,
        Some(at) => Some((&value[..at], &value[at + 1..])),
    }
}

/// Expands `value` to an absolute IRI, keyword, or blank node identifier
/// against `active`. Returns `None` for keyword-like strings and for terms
/// explicitly mapped to nothing. Pure: never mutates the context.
pub fn expand_iri(
    active: &ActiveContext,
    value: &str,
    document_relative: bool,
    vocab: bool,
) -> Option<String> {
    if is_keyword(value) {
        return Some(value.to_string());
    }

    if looks_like_keyword(value) {
        warn!("ignoring keyword-like value {:?} during IRI expansion", value);
        return None;
    }

    if vocab {
        if let Some(term) = active.term(value) {
            // A null IRI mapping is the explicit "expands to nothing"
            // sentinel.
            return term.iri_mapping.clone();
        }
    }

    if let Some((prefix, suffix)) = split_compact_iri(value) {
        if prefix == "_" || suffix.starts_with("//") {
            return Some(value.to_string());
        }

        if let Some(term) = active.term(prefix) {
            let usable = term.prefix || active.in_mode(ProcessingMode::JsonLd1_0);
            if let (true, Some(iri)) = (usable, term.iri_mapping.as_ref()) {
                return Some(format!("{}{}", iri, suffix));
            }
        }

        if is_absolute_iri(value) {
            return Some(value.to_string());
        }
    }

    if vocab {
        if let Some(ref vocabulary) = active.vocabulary_mapping {
            return Some(format!("{}{}", vocabulary, value));
        }
    }

    if document_relative {
        if let Some(ref base) = active.base_iri {
            if let Ok(joined) = base.join(value) {
                return Some(joined.to_string());
            }
        }
    }

    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TermDefinition;

    fn context_with(vocab: Option<&str>, base: Option<&str>) -> ActiveContext {
        let mut active = ActiveContext::new(ProcessingMode::JsonLd1_1);
        active.vocabulary_mapping = vocab.map(str::to_string);
        active.base_iri = base.map(|b| Url::parse(b).unwrap());
        active
    }

    fn prefix_term(iri: &str) -> TermDefinition {
        let mut term = TermDefinition::new(false);
        term.iri_mapping = Some(iri.to_string());
        term.prefix = true;
        term
    }

    #[test]
    fn keywords_pass_through() {
        let active = context_with(None, None);
        assert_eq!(expand_iri(&active, "@type", false, true), Some("@type".into()));
        assert_eq!(expand_iri(&active, "@fake", false, true), None);
    }

    #[test]
    fn vocab_and_base_fallbacks() {
        let active = context_with(Some("http://vocab/"), Some("http://base/dir/"));
        assert_eq!(
            expand_iri(&active, "name", false, true),
            Some("http://vocab/name".into())
        );
        assert_eq!(
            expand_iri(&active, "name", true, false),
            Some("http://base/dir/name".into())
        );
    }

    #[test]
    fn compact_iris() {
        let mut active = context_with(None, None);
        active
            .term_definitions
            .insert("ex".into(), prefix_term("http://example.com/"));

        assert_eq!(
            expand_iri(&active, "ex:thing", false, true),
            Some("http://example.com/thing".into())
        );
        assert_eq!(expand_iri(&active, "_:b0", false, true), Some("_:b0".into()));
        assert_eq!(
            expand_iri(&active, "other:thing", false, true),
            Some("other:thing".into())
        );
    }

    #[test]
    fn non_prefix_terms_do_not_shorten() {
        let mut active = context_with(None, None);
        let mut term = prefix_term("http://example.com/");
        term.prefix = false;
        active.term_definitions.insert("ex".into(), term);

        // 1.1 mode requires the prefix flag before a term shortens IRIs.
        assert_eq!(
            expand_iri(&active, "ex:thing", false, true),
            Some("ex:thing".into())
        );
    }

    #[test]
    fn null_mapped_terms_expand_to_nothing() {
        let mut active = context_with(Some("http://vocab/"), None);
        active
            .term_definitions
            .insert("hidden".into(), TermDefinition::new(false));

        assert_eq!(expand_iri(&active, "hidden", false, true), None);
    }
}
