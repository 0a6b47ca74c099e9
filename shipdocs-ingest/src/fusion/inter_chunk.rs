//! Inter-chunk fusion
//!
//! Elects one value per field across chunks, keyed only by chunk index:
//! - name fields: the lowest-indexed chunk with a value wins
//! - number fields: most frequent normalised value, ties to the lowest chunk index
//!
//! The elected value keeps the best confidence seen among the chunks that read it.
//! Disagreeing chunks are logged but do not lower that confidence.

use std::collections::BTreeMap;
use tracing::debug;

use super::intra_chunk::{normalize_value, ChunkFields};
use crate::types::{DocumentField, FieldKind, FusedField};

/// One group of chunk readings sharing a normalised value
struct ValueGroup<'a> {
    key: String,
    readings: Vec<(u32, &'a FusedField)>,
}

impl ValueGroup<'_> {
    fn first_index(&self) -> u32 {
        self.readings.first().map(|(i, _)| *i).unwrap_or(u32::MAX)
    }
}

/// Merge per-chunk fields into one field map
///
/// Input order is irrelevant; chunks are sorted by index first.
pub fn merge_chunks(chunks: &[ChunkFields]) -> BTreeMap<DocumentField, FusedField> {
    let mut ordered: Vec<&ChunkFields> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.chunk_index);

    DocumentField::ALL
        .into_iter()
        .map(|field| (field, elect(field, &ordered)))
        .collect()
}

fn elect(field: DocumentField, chunks: &[&ChunkFields]) -> FusedField {
    // Grouped in chunk order, so each group's readings and the group list are sorted
    let mut groups: Vec<ValueGroup<'_>> = Vec::new();
    for chunk in chunks {
        let Some(fused) = chunk.fields.get(&field) else {
            continue;
        };
        let Some(value) = fused.value.as_deref() else {
            continue;
        };
        let key = normalize_value(value);
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.readings.push((chunk.chunk_index, fused)),
            None => groups.push(ValueGroup {
                key,
                readings: vec![(chunk.chunk_index, fused)],
            }),
        }
    }

    if groups.is_empty() {
        return FusedField::empty(field);
    }

    let winner = match field.kind() {
        FieldKind::Name => &groups[0],
        FieldKind::Number => groups
            .iter()
            .max_by(|a, b| {
                a.readings
                    .len()
                    .cmp(&b.readings.len())
                    .then_with(|| b.first_index().cmp(&a.first_index()))
            })
            .unwrap_or(&groups[0]),
    };

    if groups.len() > 1 {
        debug!(
            field = field.as_str(),
            candidates = groups.len(),
            elected = %winner.key,
            "Chunks disagree on field value"
        );
    }

    // Best tier among contributors; ties keep the lowest chunk index
    let best = winner
        .readings
        .iter()
        .map(|(_, fused)| *fused)
        .fold(None::<&FusedField>, |best, candidate| match best {
            Some(b) if b.confidence >= candidate.confidence => Some(b),
            _ => Some(candidate),
        });

    let first_reading = winner.readings[0].1;
    FusedField {
        field,
        value: first_reading.value.clone(),
        confidence: best.map(|b| b.confidence).unwrap_or(first_reading.confidence),
        source: best.map(|b| b.source).unwrap_or(first_reading.source),
        contributing_chunks: winner.readings.iter().map(|(i, _)| *i).collect(),
    }
}
