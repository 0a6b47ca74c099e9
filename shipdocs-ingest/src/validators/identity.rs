//! Identity validation against the entity the user selected
//!
//! IMO is identity-defining: a non-empty extracted IMO that differs from the expected
//! one rejects the document. Names are advisory: a mismatch only warns. Absent
//! fields make no assertion.

use tracing::{debug, info};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::types::{
    Classification, DocumentField, EntityKind, ExpectedEntity, MergedDocument, ValidationOutcome,
};

/// Vessel prefixes dropped before comparing ship names
const VESSEL_PREFIXES: &[&str] = &["m v ", "mv ", "m t ", "mt ", "m s ", "ms ", "ss "];

pub fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Case, whitespace, punctuation and diacritic insensitive form
pub fn normalize_name(value: &str) -> String {
    let folded: String = value
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_vessel_prefix(name: &str) -> &str {
    VESSEL_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name)
}

/// `inner` appears in `outer` as a run of whole words
fn contains_words(outer: &str, inner: &str) -> bool {
    let outer: Vec<&str> = outer.split(' ').collect();
    let inner: Vec<&str> = inner.split(' ').collect();
    inner.len() <= outer.len() && outer.windows(inner.len()).any(|run| run == inner.as_slice())
}

/// Normalised equality with whole-word containment in either direction
pub fn names_match(expected: &str, extracted: &str, kind: EntityKind) -> bool {
    let expected = normalize_name(expected);
    let extracted = normalize_name(extracted);
    let (expected, extracted) = match kind {
        EntityKind::Ship => (strip_vessel_prefix(&expected), strip_vessel_prefix(&extracted)),
        EntityKind::Crew => (expected.as_str(), extracted.as_str()),
    };
    if expected.is_empty() || extracted.is_empty() {
        return false;
    }
    expected == extracted
        || contains_words(expected, extracted)
        || contains_words(extracted, expected)
}

fn name_field(kind: EntityKind) -> DocumentField {
    match kind {
        EntityKind::Ship => DocumentField::ShipName,
        EntityKind::Crew => DocumentField::HolderName,
    }
}

/// Compare extracted identity with `expected`
pub fn validate(merged: &MergedDocument, expected: &ExpectedEntity) -> ValidationOutcome {
    let mut messages = Vec::new();

    let expected_imo = expected.imo.as_deref().map(digits_only).unwrap_or_default();
    let extracted_imo = merged
        .value(DocumentField::ImoNumber)
        .map(digits_only)
        .unwrap_or_default();

    let imo_match = if expected_imo.is_empty() || extracted_imo.is_empty() {
        None
    } else {
        let matched = expected_imo == extracted_imo;
        if !matched {
            messages.push(format!(
                "Document IMO {} does not match selected ship IMO {}",
                extracted_imo, expected_imo
            ));
        }
        Some(matched)
    };

    let mut name_similarity = None;
    let name_match = match merged.value(name_field(expected.kind)) {
        Some(extracted) if !expected.name.trim().is_empty() => {
            let matched = names_match(&expected.name, extracted, expected.kind);
            if !matched {
                let similarity = strsim::normalized_levenshtein(
                    &normalize_name(&expected.name),
                    &normalize_name(extracted),
                );
                name_similarity = Some(similarity);
                messages.push(format!(
                    "Document name '{}' differs from '{}' (similarity: {:.2})",
                    extracted, expected.name, similarity
                ));
            }
            Some(matched)
        }
        _ => None,
    };

    let classification = if imo_match == Some(false) {
        Classification::Reject
    } else if name_match == Some(false) {
        Classification::AcceptWithWarning
    } else {
        Classification::Accept
    };

    match classification {
        Classification::Accept => debug!(
            document_id = %merged.document_id,
            entity_id = %expected.id,
            "Identity accepted"
        ),
        _ => info!(
            document_id = %merged.document_id,
            entity_id = %expected.id,
            classification = classification.as_str(),
            "Identity check flagged document"
        ),
    }

    ValidationOutcome {
        imo_match,
        name_match,
        classification,
        name_similarity,
        messages,
    }
}
