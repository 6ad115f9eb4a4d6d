use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

mod records;

pub use records::{
    Classification, EntryKind, Installment, InstallmentDetail, Movement, MovementDetail,
    Person, PersonName, RecordSnapshot, ACTIVE_STATUS,
};

/// Entity kinds the engine can retrieve. The lower-case name doubles as the
/// prefix of every context source tag (`movements:42`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Movements,
    Installments,
    Classifications,
    Persons,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Movements => "movements",
            EntityKind::Installments => "installments",
            EntityKind::Classifications => "classifications",
            EntityKind::Persons => "persons",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured retrieval constraints extracted from one question.
///
/// Date bounds are kept exactly as parsed: an inverted or half-open range is
/// a legal value and every consumer has to cope with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub target: EntityKind,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub included_classifications: BTreeSet<String>,
    pub included_person_names: BTreeSet<String>,
}

/// Predicate pushed down to the record store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    /// Restrict movements to the active status.
    pub active_only: bool,
    pub limit: usize,
}

impl RecordQuery {
    pub fn from_filter(filter: &Filter, limit: usize) -> Self {
        Self {
            date_start: filter.date_start,
            date_end: filter.date_end,
            min_value: filter.min_value,
            max_value: filter.max_value,
            active_only: true,
            limit,
        }
    }

    /// Unfiltered query over the most recent active records.
    pub fn recent(limit: usize) -> Self {
        Self {
            active_only: true,
            limit,
            ..Self::default()
        }
    }

    pub fn accepts_date(&self, date: NaiveDate) -> bool {
        self.date_start.map_or(true, |start| date >= start)
            && self.date_end.map_or(true, |end| date <= end)
    }

    pub fn accepts_value(&self, value: f64) -> bool {
        self.min_value.map_or(true, |min| value >= min)
            && self.max_value.map_or(true, |max| value <= max)
    }
}

/// One record flattened to citable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextItem {
    pub text: String,
    pub source: String,
}

impl ContextItem {
    pub fn new(kind: EntityKind, id: u64, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: format!("{kind}:{id}"),
        }
    }

    /// Line form handed to the generator, e.g. `[movements:7] NF 123; ...`.
    pub fn line(&self) -> String {
        format!("[{}] {}", self.source, self.text)
    }
}

/// Transient ranking wrapper. Scores are only comparable within one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub item: ContextItem,
    pub score: f32,
}
