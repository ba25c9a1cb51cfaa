//! Output row identity

use super::decoder::DecoderKey;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of one output row
///
/// Equality, ordering and hashing use only the decoder key, the sub-row
/// order and the sub-row id. The decoder name and sub-row description ride
/// along for the title.
#[derive(Clone)]
pub struct Row {
    decoder: DecoderKey,
    decoder_name: Arc<str>,
    sub_row: Option<SubRow>,
}

#[derive(Clone)]
struct SubRow {
    order: usize,
    id: Arc<str>,
    desc: Arc<str>,
}

impl Row {
    /// The single row of a decoder that declares no sub-rows
    pub fn new(decoder: DecoderKey, decoder_name: &str) -> Self {
        Self {
            decoder,
            decoder_name: Arc::from(decoder_name),
            sub_row: None,
        }
    }

    /// The `order`-th declared sub-row of a decoder
    pub fn with_sub_row(
        decoder: DecoderKey,
        decoder_name: &str,
        order: usize,
        id: &str,
        desc: &str,
    ) -> Self {
        Self {
            decoder,
            decoder_name: Arc::from(decoder_name),
            sub_row: Some(SubRow {
                order,
                id: Arc::from(id),
                desc: Arc::from(desc),
            }),
        }
    }

    pub fn decoder(&self) -> &DecoderKey {
        &self.decoder
    }

    /// Sub-row order index, None for a default row
    pub fn order(&self) -> Option<usize> {
        self.sub_row.as_ref().map(|r| r.order)
    }

    pub fn sub_row_id(&self) -> Option<&str> {
        self.sub_row.as_ref().map(|r| &*r.id)
    }

    /// Display title: "name" for a default row, "name: description" for a sub-row
    pub fn title(&self) -> String {
        match &self.sub_row {
            Some(r) if self.decoder_name.is_empty() => r.desc.to_string(),
            Some(r) => format!("{}: {}", self.decoder_name, r.desc),
            None => self.decoder_name.to_string(),
        }
    }

    fn key(&self) -> (&DecoderKey, Option<usize>, Option<&str>) {
        (&self.decoder, self.order(), self.sub_row_id())
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Row {}

impl PartialOrd for Row {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Row {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for Row {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.sub_row {
            Some(r) => write!(f, "Row({}#{}:{})", self.decoder, r.order, r.id),
            None => write!(f, "Row({})", self.decoder),
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.title())
    }
}
