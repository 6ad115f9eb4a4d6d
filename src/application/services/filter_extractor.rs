//! Heuristic translation of a free-text question into a [`Filter`].
//!
//! Every step is independent: a step that finds no signal, or whose catalog
//! read fails, leaves its fields at the default and the rest still runs.

use std::sync::OnceLock;

use chrono::{Datelike, Days, Local, NaiveDate};
use regex::Regex;
use tracing::{debug, warn};

use crate::domain::{DomainError, EntityKind, Filter, PersonName};

/// Read-only view over the live catalog of names used for entity matching.
pub trait CatalogReader {
    fn classification_names(&self) -> Result<Vec<String>, DomainError>;

    fn person_names(&self) -> Result<Vec<PersonName>, DomainError>;
}

/// Fixed in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub classifications: Vec<String>,
    pub persons: Vec<PersonName>,
}

impl CatalogReader for CatalogSnapshot {
    fn classification_names(&self) -> Result<Vec<String>, DomainError> {
        Ok(self.classifications.clone())
    }

    fn person_names(&self) -> Result<Vec<PersonName>, DomainError> {
        Ok(self.persons.clone())
    }
}

const INSTALLMENT_KEYWORDS: &[&str] = &["parcela", "vencimento", "installment"];
const MOVEMENT_KEYWORDS: &[&str] = &[
    "nota", "movimento", "despesa", "receita", "gasto", "fatura", "invoice", "expense",
    "revenue", "movement",
];
const CLASSIFICATION_KEYWORDS: &[&str] = &["classifica", "categoria", "category"];
const PERSON_KEYWORDS: &[&str] = &[
    "fornecedor", "cliente", "pessoa", "empresa", "supplier", "customer", "counterpart",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelativePeriod {
    CurrentMonth,
    LastMonth,
    CurrentWeek,
    CurrentQuarter,
    LastQuarter,
    CurrentYear,
}

/// Checked in order; the first phrase found wins.
const RELATIVE_PHRASES: &[(RelativePeriod, &[&str])] = &[
    (
        RelativePeriod::CurrentMonth,
        &["mês atual", "mes atual", "current month"],
    ),
    (
        RelativePeriod::LastMonth,
        &["último mês", "ultimo mes", "ultimo mês", "last month"],
    ),
    (
        RelativePeriod::CurrentWeek,
        &["esta semana", "semana atual", "this week"],
    ),
    (
        RelativePeriod::CurrentQuarter,
        &["este trimestre", "trimestre atual", "current quarter"],
    ),
    (
        RelativePeriod::LastQuarter,
        &["último trimestre", "ultimo trimestre", "last quarter"],
    ),
    (
        RelativePeriod::CurrentYear,
        &["este ano", "ano atual", "this year"],
    ),
];

/// Extracts a filter using the local calendar date as "today".
pub fn extract_filter<C: CatalogReader + ?Sized>(question: &str, catalog: &C) -> Filter {
    extract_filter_at(question, catalog, Local::now().date_naive())
}

/// Extracts a filter relative to an explicit `today`.
pub fn extract_filter_at<C: CatalogReader + ?Sized>(
    question: &str,
    catalog: &C,
    today: NaiveDate,
) -> Filter {
    let lowered = question.to_lowercase();
    let mut filter = Filter {
        target: classify_target(&lowered),
        ..Filter::default()
    };

    if let Some((start, end)) = relative_range(&lowered, today) {
        filter.date_start = Some(start);
        filter.date_end = Some(end);
    }
    apply_explicit_dates(&lowered, &mut filter);

    filter.min_value = value_after(lower_bound_regex(), &lowered);
    filter.max_value = value_after(upper_bound_regex(), &lowered);

    match catalog.classification_names() {
        Ok(names) => {
            for name in names {
                if mentions(&lowered, &name) {
                    filter.included_classifications.insert(name);
                }
            }
        }
        Err(err) => warn!(
            target: "finrag::query",
            error = %err,
            "classification catalog unavailable; skipping classification matching"
        ),
    }

    match catalog.person_names() {
        Ok(people) => {
            for person in people {
                if mentions(&lowered, &person.legal_name) {
                    filter.included_person_names.insert(person.legal_name.clone());
                }
                if let Some(trade) = person.trade_name {
                    if mentions(&lowered, &trade) {
                        filter.included_person_names.insert(trade);
                    }
                }
            }
        }
        Err(err) => warn!(
            target: "finrag::query",
            error = %err,
            "person catalog unavailable; skipping counterparty matching"
        ),
    }

    debug!(target: "finrag::query", ?filter, "extracted filter");
    filter
}

fn classify_target(lowered: &str) -> EntityKind {
    let has_any = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

    if has_any(INSTALLMENT_KEYWORDS) {
        EntityKind::Installments
    } else if has_any(MOVEMENT_KEYWORDS) {
        EntityKind::Movements
    } else if has_any(CLASSIFICATION_KEYWORDS) {
        EntityKind::Classifications
    } else if has_any(PERSON_KEYWORDS) {
        EntityKind::Persons
    } else {
        EntityKind::Movements
    }
}

fn relative_range(lowered: &str, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let period = RELATIVE_PHRASES
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| lowered.contains(p)))
        .map(|(period, _)| *period)?;

    period_bounds(period, today)
}

fn period_bounds(period: RelativePeriod, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let month_start = today.with_day(1)?;
    let quarter_month = ((today.month() - 1) / 3) * 3 + 1;
    let quarter_start = NaiveDate::from_ymd_opt(today.year(), quarter_month, 1)?;

    match period {
        RelativePeriod::CurrentMonth => Some((month_start, today)),
        RelativePeriod::LastMonth => {
            let end = month_start.checked_sub_days(Days::new(1))?;
            Some((end.with_day(1)?, end))
        }
        RelativePeriod::CurrentWeek => {
            let offset = u64::from(today.weekday().num_days_from_monday());
            Some((today.checked_sub_days(Days::new(offset))?, today))
        }
        RelativePeriod::CurrentQuarter => Some((quarter_start, today)),
        RelativePeriod::LastQuarter => {
            let (year, month) = if quarter_month > 3 {
                (today.year(), quarter_month - 3)
            } else {
                (today.year() - 1, quarter_month + 9)
            };
            let start = NaiveDate::from_ymd_opt(year, month, 1)?;
            Some((start, quarter_start.checked_sub_days(Days::new(1))?))
        }
        RelativePeriod::CurrentYear => Some((NaiveDate::from_ymd_opt(today.year(), 1, 1)?, today)),
    }
}

fn apply_explicit_dates(lowered: &str, filter: &mut Filter) {
    let matches: Vec<&str> = explicit_date_regex()
        .find_iter(lowered)
        .map(|m| m.as_str())
        .collect();

    match matches.as_slice() {
        [] => {}
        [only] => {
            if let Some(date) = parse_day_month_year(only) {
                filter.date_start = Some(date);
            }
        }
        [first, second, ..] => {
            if let Some(date) = parse_day_month_year(first) {
                filter.date_start = Some(date);
            }
            if let Some(date) = parse_day_month_year(second) {
                filter.date_end = Some(date);
            }
        }
    }
}

/// Parses `dd/mm/yyyy` (or `-` separated); two-digit years land in 2000+.
fn parse_day_month_year(raw: &str) -> Option<NaiveDate> {
    let mut parts = raw.split(['/', '-']);
    let day: u32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let mut year: i32 = parts.next()?.parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// First number following one of the regex's cue phrases. Numbers that are
/// really the start of a date (`até 31/12`) are skipped.
fn value_after(regex: &Regex, lowered: &str) -> Option<f64> {
    regex
        .captures_iter(lowered)
        .filter_map(|caps| caps.get(2))
        .find(|number| !matches!(lowered[number.end()..].chars().next(), Some('/' | '-')))
        .and_then(|number| parse_brazilian_number(number.as_str()))
}

/// `1.234,56` -> `1234.56`: dots group thousands, the comma is decimal.
pub fn parse_brazilian_number(raw: &str) -> Option<f64> {
    raw.replace('.', "")
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn mentions(lowered_question: &str, name: &str) -> bool {
    let needle = name.trim().to_lowercase();
    !needle.is_empty() && lowered_question.contains(&needle)
}

fn explicit_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{1,2}[/-]\d{1,2}[/-]\d{2,4}").expect("valid date regex"))
}

fn lower_bound_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(acima de|maior que|above|greater than|more than)\s*(?:r\$\s*)?(\d+(?:[.,]\d+)*)")
            .expect("valid lower bound regex")
    })
}

fn upper_bound_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(menor que|abaixo de|até|less than|below|up to)\s*(?:r\$\s*)?(\d+(?:[.,]\d+)*)")
            .expect("valid upper bound regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // A Wednesday.
    fn today() -> NaiveDate {
        date(2024, 5, 15)
    }

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot {
            classifications: vec!["INSUMOS AGRÍCOLAS".into(), "VENDAS".into(), "  ".into()],
            persons: vec![
                PersonName {
                    legal_name: "Agro Sul Comércio Ltda".into(),
                    trade_name: Some("AgroSul".into()),
                },
                PersonName {
                    legal_name: "Cooperativa Vale Verde".into(),
                    trade_name: None,
                },
            ],
        }
    }

    struct BrokenCatalog;

    impl CatalogReader for BrokenCatalog {
        fn classification_names(&self) -> Result<Vec<String>, DomainError> {
            Err(DomainError::storage("connection refused"))
        }

        fn person_names(&self) -> Result<Vec<PersonName>, DomainError> {
            Err(DomainError::storage("connection refused"))
        }
    }

    #[test]
    fn question_without_cues_yields_default_filter() {
        let filter = extract_filter_at("o que aconteceu por aqui?", &catalog(), today());
        assert_eq!(filter, Filter::default());
        assert_eq!(filter.target, EntityKind::Movements);
    }

    #[test]
    fn installments_above_value_in_current_month() {
        let filter = extract_filter_at("parcelas acima de 1000 no mês atual", &catalog(), today());

        assert_eq!(filter.target, EntityKind::Installments);
        assert_eq!(filter.min_value, Some(1000.0));
        assert_eq!(filter.max_value, None);
        assert_eq!(filter.date_start, Some(date(2024, 5, 1)));
        assert_eq!(filter.date_end, Some(today()));
    }

    #[test]
    fn target_keywords_follow_priority_order() {
        let target = |q: &str| extract_filter_at(q, &CatalogSnapshot::default(), today()).target;

        assert_eq!(target("vencimento das despesas"), EntityKind::Installments);
        assert_eq!(target("despesas por categoria"), EntityKind::Movements);
        assert_eq!(target("quais categorias existem"), EntityKind::Classifications);
        assert_eq!(target("liste os fornecedores"), EntityKind::Persons);
    }

    #[test]
    fn relative_phrases_map_to_calendar_periods() {
        let range = |q: &str, t: NaiveDate| {
            let f = extract_filter_at(q, &CatalogSnapshot::default(), t);
            (f.date_start, f.date_end)
        };

        assert_eq!(
            range("gastos esta semana", today()),
            (Some(date(2024, 5, 13)), Some(today()))
        );
        assert_eq!(
            range("receita do trimestre atual", today()),
            (Some(date(2024, 4, 1)), Some(today()))
        );
        assert_eq!(
            range("receita do último trimestre", today()),
            (Some(date(2024, 1, 1)), Some(date(2024, 3, 31)))
        );
        assert_eq!(
            range("despesas este ano", today()),
            (Some(date(2024, 1, 1)), Some(today()))
        );
        assert_eq!(
            range("despesas do último mês", date(2024, 3, 10)),
            (Some(date(2024, 2, 1)), Some(date(2024, 2, 29)))
        );
    }

    #[test]
    fn previous_periods_roll_over_the_year() {
        let range = |q: &str, t: NaiveDate| {
            let f = extract_filter_at(q, &CatalogSnapshot::default(), t);
            (f.date_start, f.date_end)
        };

        assert_eq!(
            range("notas do ultimo mes", date(2024, 1, 20)),
            (Some(date(2023, 12, 1)), Some(date(2023, 12, 31)))
        );
        assert_eq!(
            range("notas do last quarter", date(2024, 2, 5)),
            (Some(date(2023, 10, 1)), Some(date(2023, 12, 31)))
        );
    }

    #[test]
    fn first_matching_relative_phrase_wins() {
        let filter = extract_filter_at(
            "compare este ano com o mês atual",
            &CatalogSnapshot::default(),
            today(),
        );
        assert_eq!(filter.date_start, Some(date(2024, 5, 1)));
    }

    #[test]
    fn two_explicit_dates_keep_their_textual_order() {
        let filter = extract_filter_at(
            "notas entre 31/12/2024 e 01-01-24 no mês atual",
            &CatalogSnapshot::default(),
            today(),
        );

        assert_eq!(filter.date_start, Some(date(2024, 12, 31)));
        assert_eq!(filter.date_end, Some(date(2024, 1, 1)));
    }

    #[test]
    fn single_explicit_date_only_sets_start() {
        let filter = extract_filter_at("notas desde 5/3/2024", &CatalogSnapshot::default(), today());
        assert_eq!(filter.date_start, Some(date(2024, 3, 5)));
        assert_eq!(filter.date_end, None);
    }

    #[test]
    fn malformed_explicit_dates_are_ignored() {
        let filter = extract_filter_at(
            "notas de 31/02/2024 até 15/03/2024",
            &CatalogSnapshot::default(),
            today(),
        );
        assert_eq!(filter.date_start, None);
        assert_eq!(filter.date_end, Some(date(2024, 3, 15)));
        assert_eq!(filter.max_value, None, "date after 'até' is not a value bound");
    }

    #[test]
    fn value_bounds_use_brazilian_number_format() {
        let filter = extract_filter_at(
            "despesas maior que R$ 1.500,75 e menor que 20.000",
            &CatalogSnapshot::default(),
            today(),
        );
        assert_eq!(filter.min_value, Some(1500.75));
        assert_eq!(filter.max_value, Some(20000.0));

        let filter = extract_filter_at("gastos up to 300", &CatalogSnapshot::default(), today());
        assert_eq!(filter.max_value, Some(300.0));
    }

    #[test]
    fn unparsable_numbers_yield_no_bound() {
        assert_eq!(parse_brazilian_number("1,2,3"), None);
        assert_eq!(parse_brazilian_number("1.234,5"), Some(1234.5));
        assert_eq!(parse_brazilian_number("1000"), Some(1000.0));
    }

    #[test]
    fn catalog_names_match_by_substring() {
        let filter = extract_filter_at(
            "Quanto paguei para a agrosul em insumos agrícolas? E vendas para a Cooperativa Vale Verde?",
            &catalog(),
            today(),
        );

        assert_eq!(
            filter.included_classifications.iter().collect::<Vec<_>>(),
            vec!["INSUMOS AGRÍCOLAS", "VENDAS"]
        );
        assert_eq!(
            filter.included_person_names.iter().collect::<Vec<_>>(),
            vec!["AgroSul", "Cooperativa Vale Verde"]
        );
    }

    #[test]
    fn catalog_failures_degrade_to_empty_sets() {
        let filter = extract_filter_at("despesas acima de 10 com agrosul", &BrokenCatalog, today());
        assert!(filter.included_classifications.is_empty());
        assert!(filter.included_person_names.is_empty());
        assert_eq!(filter.min_value, Some(10.0));
    }
}
