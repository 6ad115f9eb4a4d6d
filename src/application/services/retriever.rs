use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::RecordStore;
use crate::domain::{ContextItem, DomainError, EntityKind, Filter, RecordQuery};

/// Read paths over the record store: filtered retrieval, the generic scoring
/// corpus and the recent-records sample.
///
/// None of these surface storage errors. A failed read is logged and treated
/// as "no records" so the caller can move on to the next stage.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn RecordStore>,
}

impl Retriever {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Pushes date and value bounds down to the store, then narrows the
    /// fetched rows by classification and counterparty in memory.
    pub fn retrieve(&self, filter: &Filter, limit: usize) -> Vec<ContextItem> {
        match self.fetch_target(filter, limit) {
            Ok(items) => {
                info!(
                    target: "finrag::retrieval",
                    kind = %filter.target,
                    count = items.len(),
                    "structured retrieval finished"
                );
                items
            }
            Err(err) => {
                warn!(
                    target: "finrag::retrieval",
                    kind = %filter.target,
                    error = %err,
                    "structured retrieval failed; treating as no results"
                );
                Vec::new()
            }
        }
    }

    fn fetch_target(&self, filter: &Filter, limit: usize) -> Result<Vec<ContextItem>, DomainError> {
        let query = RecordQuery::from_filter(filter, limit);
        let classes = &filter.included_classifications;
        let people = &filter.included_person_names;

        let items = match filter.target {
            EntityKind::Movements => self
                .store
                .movements(&query)?
                .into_iter()
                .filter(|detail| {
                    shares_classification(&detail.classifications, classes)
                        && names_match(&detail.counterparty_names(), people)
                })
                .map(|detail| detail.to_context_item())
                .collect(),
            EntityKind::Installments => self
                .store
                .installments(&query)?
                .into_iter()
                .filter(|detail| {
                    shares_classification(&detail.classifications, classes)
                        && names_match(&detail.counterparty_names(), people)
                })
                .map(|detail| detail.to_context_item())
                .collect(),
            EntityKind::Persons => self
                .store
                .persons(limit)?
                .into_iter()
                .filter(|person| {
                    let mut names = vec![person.legal_name.as_str()];
                    names.extend(person.trade_name.as_deref());
                    names_match(&names, people)
                })
                .map(|person| person.to_context_item())
                .collect(),
            EntityKind::Classifications => self
                .store
                .classifications(limit)?
                .into_iter()
                .filter(|class| shares_classification(std::slice::from_ref(&class.description), classes))
                .map(|class| class.to_context_item())
                .collect(),
        };

        Ok(items)
    }

    /// Mixed corpus for scoring, in the fixed order persons, movements,
    /// installments, classifications. A kind that fails to load is skipped.
    pub fn build_generic_corpus(&self, limit_per_kind: usize, filter: &Filter) -> Vec<ContextItem> {
        let query = RecordQuery::from_filter(filter, limit_per_kind);
        let mut corpus = Vec::new();

        self.extend_corpus(&mut corpus, EntityKind::Persons, || {
            Ok(self
                .store
                .persons(limit_per_kind)?
                .iter()
                .map(|person| person.to_context_item())
                .collect())
        });
        self.extend_corpus(&mut corpus, EntityKind::Movements, || {
            Ok(self
                .store
                .movements(&query)?
                .iter()
                .map(|detail| detail.to_context_item())
                .collect())
        });
        self.extend_corpus(&mut corpus, EntityKind::Installments, || {
            Ok(self
                .store
                .installments(&query)?
                .iter()
                .map(|detail| detail.to_context_item())
                .collect())
        });
        self.extend_corpus(&mut corpus, EntityKind::Classifications, || {
            Ok(self
                .store
                .classifications(limit_per_kind)?
                .iter()
                .map(|class| class.to_context_item())
                .collect())
        });

        debug!(target: "finrag::retrieval", size = corpus.len(), "built generic corpus");
        corpus
    }

    fn extend_corpus<F>(&self, corpus: &mut Vec<ContextItem>, kind: EntityKind, load: F)
    where
        F: FnOnce() -> Result<Vec<ContextItem>, DomainError>,
    {
        match load() {
            Ok(items) => corpus.extend(items),
            Err(err) => warn!(
                target: "finrag::retrieval",
                %kind,
                error = %err,
                "skipping kind in generic corpus"
            ),
        }
    }

    /// The `n` most recent active movements, without any filtering.
    pub fn sample_recent(&self, n: usize) -> Vec<ContextItem> {
        match self.store.movements(&RecordQuery::recent(n)) {
            Ok(rows) => rows.iter().map(|detail| detail.to_context_item()).collect(),
            Err(err) => {
                warn!(
                    target: "finrag::retrieval",
                    error = %err,
                    "recent sample unavailable"
                );
                Vec::new()
            }
        }
    }
}

fn shares_classification(names: &[String], included: &BTreeSet<String>) -> bool {
    included.is_empty() || names.iter().any(|name| included.contains(name))
}

/// Case-insensitive substring match of any included name against the
/// record's names.
fn names_match(names: &[&str], included: &BTreeSet<String>) -> bool {
    if included.is_empty() {
        return true;
    }
    let haystack = names.join(" ").to_lowercase();
    included
        .iter()
        .any(|name| haystack.contains(&name.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::application::services::testing::{sample_store, FailingStore};

    fn sources(items: &[ContextItem]) -> Vec<&str> {
        items.iter().map(|i| i.source.as_str()).collect()
    }

    fn retriever() -> Retriever {
        Retriever::new(Arc::new(sample_store()))
    }

    fn names(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn movements_are_active_only_and_most_recent_first() {
        let items = retriever().retrieve(&Filter::default(), 20);
        assert_eq!(sources(&items), vec!["movements:12", "movements:11", "movements:10"]);
    }

    #[test]
    fn limit_caps_the_pushed_down_query() {
        let items = retriever().retrieve(&Filter::default(), 2);
        assert_eq!(sources(&items), vec!["movements:12", "movements:11"]);
    }

    #[test]
    fn value_bounds_are_inclusive() {
        let filter = Filter {
            min_value: Some(800.0),
            max_value: Some(1500.0),
            ..Filter::default()
        };
        let items = retriever().retrieve(&filter, 20);
        assert_eq!(sources(&items), vec!["movements:11", "movements:10"]);
    }

    #[test]
    fn classification_and_counterparty_refine_in_memory() {
        let retriever = retriever();

        let by_class = Filter {
            included_classifications: names(&["INSUMOS AGRÍCOLAS"]),
            ..Filter::default()
        };
        assert_eq!(sources(&retriever.retrieve(&by_class, 20)), vec!["movements:10"]);

        let by_person = Filter {
            included_person_names: names(&["AGROSUL"]),
            ..Filter::default()
        };
        assert_eq!(
            sources(&retriever.retrieve(&by_person, 20)),
            vec!["movements:11", "movements:10"]
        );
    }

    #[test]
    fn installments_follow_due_date_and_parent_counterparty() {
        let retriever = retriever();
        let in_march_april = Filter {
            target: EntityKind::Installments,
            date_start: NaiveDate::from_ymd_opt(2024, 3, 1),
            date_end: NaiveDate::from_ymd_opt(2024, 4, 30),
            ..Filter::default()
        };
        assert_eq!(
            sources(&retriever.retrieve(&in_march_april, 20)),
            vec!["installments:102", "installments:101"]
        );

        let for_coop = Filter {
            target: EntityKind::Installments,
            included_person_names: names(&["Coopvale"]),
            ..Filter::default()
        };
        assert_eq!(sources(&retriever.retrieve(&for_coop, 20)), vec!["installments:102"]);
    }

    #[test]
    fn persons_and_classifications_refine_on_their_own_names() {
        let retriever = retriever();
        let persons = Filter {
            target: EntityKind::Persons,
            included_person_names: names(&["Fazenda Boa Vista"]),
            included_classifications: names(&["VENDAS"]),
            ..Filter::default()
        };
        assert_eq!(sources(&retriever.retrieve(&persons, 20)), vec!["persons:2"]);

        let classes = Filter {
            target: EntityKind::Classifications,
            included_classifications: names(&["VENDAS"]),
            included_person_names: names(&["Fazenda Boa Vista"]),
            ..Filter::default()
        };
        assert_eq!(sources(&retriever.retrieve(&classes, 20)), vec!["classifications:3"]);
    }

    #[test]
    fn inverted_date_range_returns_nothing() {
        let filter = Filter {
            date_start: NaiveDate::from_ymd_opt(2024, 12, 31),
            date_end: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Filter::default()
        };
        assert!(retriever().retrieve(&filter, 20).is_empty());
    }

    #[test]
    fn storage_failures_become_empty_results() {
        let retriever = Retriever::new(Arc::new(FailingStore));
        assert!(retriever.retrieve(&Filter::default(), 20).is_empty());
        assert!(retriever.build_generic_corpus(5, &Filter::default()).is_empty());
        assert!(retriever.sample_recent(5).is_empty());
    }

    #[test]
    fn generic_corpus_has_fixed_kind_order() {
        let corpus = retriever().build_generic_corpus(1, &Filter::default());
        assert_eq!(
            sources(&corpus),
            vec!["persons:3", "movements:12", "installments:102", "classifications:3"]
        );
    }

    #[test]
    fn recent_sample_ignores_the_filter() {
        let items = retriever().sample_recent(2);
        assert_eq!(sources(&items), vec!["movements:12", "movements:11"]);
    }
}
