use std::collections::BTreeSet;

use crate::domain::SpecimenRecord;

pub const ALL_CATEGORIES: &str = "all";
pub const SEARCH_DEBOUNCE_MS: u64 = 400;
const TAGS_PER_RECORD: usize = 5;

/// Records matching both `query` and `category`, in catalog order. An empty
/// query matches everything; `category` is `all` or a case-insensitive
/// fragment of the rock type.
pub fn filter<'a>(
    records: &'a [SpecimenRecord],
    query: &str,
    category: &str,
) -> Vec<&'a SpecimenRecord> {
    let query = query.to_lowercase();
    let category = (category != ALL_CATEGORIES).then(|| category.to_lowercase());
    records
        .iter()
        .filter(|record| {
            matches_query(record, &query) && matches_category(record, category.as_deref())
        })
        .collect()
}

fn matches_query(record: &SpecimenRecord, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    [
        record.name.as_str(),
        record.formation.as_str(),
        record.location.as_str(),
        record.rock_type.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(query))
        || record.minerals.join(" ").to_lowercase().contains(query)
}

fn matches_category(record: &SpecimenRecord, category: Option<&str>) -> bool {
    category.is_none_or(|category| record.rock_type.to_lowercase().contains(category))
}

pub fn rock_type_categories(records: &[SpecimenRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| {
            let primary = record.rock_type.split('-').next().unwrap_or_default().trim();
            (!primary.is_empty()).then(|| primary.to_string())
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn tag_suggestions(records: &[SpecimenRecord]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    records
        .iter()
        .flat_map(|record| record.tags.iter().take(TAGS_PER_RECORD))
        .filter(|tag| seen.insert(tag.to_string()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    quiet_ms: u64,
    pending: Option<(u64, T)>,
}

impl<T> Debouncer<T> {
    pub fn new(quiet_ms: u64) -> Self {
        Self {
            quiet_ms,
            pending: None,
        }
    }

    pub fn push(&mut self, at_ms: u64, value: T) {
        self.pending = Some((at_ms, value));
    }

    pub fn poll(&mut self, now_ms: u64) -> Option<T> {
        let ready = matches!(
            &self.pending,
            Some((at, _)) if now_ms.saturating_sub(*at) >= self.quiet_ms
        );
        if ready {
            self.pending.take().map(|(_, value)| value)
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(SEARCH_DEBOUNCE_MS)
    }
}
