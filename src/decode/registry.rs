//! Maps decoder output classes to rows and owns the row stores

use super::decoder::{Decoder, DecoderKey};
use super::row::Row;
use super::store::AnnotationStore;
use crate::runtime::errors::{DecodeError, DecodeResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Row stores of a decoder stack, plus per-row visibility flags
///
/// Stores are rebuilt whenever the decoder chain changes. The visibility
/// flags outlive rebuilds: a row keeps its flags as long as some rebuild
/// recreates it, and only rows seen for the first time get defaults.
#[derive(Default)]
pub struct RowRegistry {
    rows: BTreeMap<Row, Arc<AnnotationStore>>,
    class_rows: HashMap<(DecoderKey, u32), Row>,
    global_show: BTreeMap<Row, bool>,
    list_show: BTreeMap<Row, bool>,
}

impl RowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recreate all rows from the decoder chain, dropping every stored annotation
    pub fn rebuild(&mut self, decoders: &[Decoder]) {
        self.rows.clear();
        self.class_rows.clear();

        for dec in decoders {
            let sub_rows = dec.descriptor().annotation_rows();

            if sub_rows.is_empty() {
                self.add_row(Row::new(dec.key().clone(), dec.name()));
                continue;
            }

            for (order, sub) in sub_rows.iter().enumerate() {
                let row = Row::with_sub_row(dec.key().clone(), dec.name(), order, &sub.id, &sub.desc);
                self.add_row(row.clone());
                for &class in &sub.classes {
                    self.class_rows.insert((dec.key().clone(), class), row.clone());
                }
            }
        }

        debug!(
            "Row registry rebuilt: {} rows, {} mapped classes",
            self.rows.len(),
            self.class_rows.len()
        );
    }

    fn add_row(&mut self, row: Row) {
        if !self.global_show.contains_key(&row) {
            let title = row.title().to_lowercase();
            let listed = !(title.contains("bit") || title.contains("warning"));
            self.global_show.insert(row.clone(), true);
            self.list_show.insert(row.clone(), listed);
        }
        self.rows.insert(row, Arc::new(AnnotationStore::new()));
    }

    /// Row that annotations of `class` from `decoder` belong to.
    ///
    /// Classes not mapped to a sub-row fall back to the decoder's default row.
    pub fn resolve_row_for(&self, decoder: &DecoderKey, class: u32) -> DecodeResult<&Row> {
        if let Some(row) = self.class_rows.get(&(decoder.clone(), class)) {
            if let Some((row, _)) = self.rows.get_key_value(row) {
                return Ok(row);
            }
        }

        self.rows
            .get_key_value(&Row::new(decoder.clone(), ""))
            .map(|(row, _)| row)
            .ok_or_else(|| DecodeError::UnexpectedAnnotation {
                decoder: decoder.to_string(),
                format: class,
            })
    }

    /// Store for `decoder`/`class`, resolved as by [`resolve_row_for`](Self::resolve_row_for)
    pub fn store_for(&self, decoder: &DecoderKey, class: u32) -> DecodeResult<&Arc<AnnotationStore>> {
        let row = self.resolve_row_for(decoder, class)?;
        self.rows.get(row).ok_or_else(|| DecodeError::UnexpectedAnnotation {
            decoder: decoder.to_string(),
            format: class,
        })
    }

    pub fn store(&self, row: &Row) -> Option<&Arc<AnnotationStore>> {
        self.rows.get(row)
    }

    /// All rows with their stores, in row order
    pub fn iter(&self) -> impl Iterator<Item = (&Row, &Arc<AnnotationStore>)> {
        self.rows.iter()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.rows.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Clear every store, keeping rows and flags
    pub fn clear_stores(&self) {
        for store in self.rows.values() {
            store.clear();
        }
    }

    /// Rows shown in the list view, in row order
    pub fn listed(&self) -> impl Iterator<Item = (&Row, &Arc<AnnotationStore>)> {
        self.rows
            .iter()
            .filter(|(row, _)| self.list_show.get(*row).copied().unwrap_or(false))
    }

    pub fn global_show(&self, row: &Row) -> Option<bool> {
        self.global_show.get(row).copied()
    }

    pub fn list_show(&self, row: &Row) -> Option<bool> {
        self.list_show.get(row).copied()
    }

    pub fn global_show_map(&self) -> BTreeMap<Row, bool> {
        self.global_show.clone()
    }

    pub fn list_show_map(&self) -> BTreeMap<Row, bool> {
        self.list_show.clone()
    }

    /// Set the global-show flag; unknown rows are ignored
    pub fn set_global_show(&mut self, row: &Row, show: bool) {
        if let Some(flag) = self.global_show.get_mut(row) {
            *flag = show;
        }
    }

    /// Set the list-show flag; unknown rows are ignored
    pub fn set_list_show(&mut self, row: &Row, show: bool) {
        if let Some(flag) = self.list_show.get_mut(row) {
            *flag = show;
        }
    }
}
