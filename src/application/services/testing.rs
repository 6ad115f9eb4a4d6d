//! Shared fakes and fixtures for service tests.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::NaiveDate;
use parking_lot::Mutex;

use super::{CatalogReader, CompletionEngine, RecordStore, Sleeper};
use crate::domain::{
    Classification, DomainError, EntryKind, Installment, InstallmentDetail, Movement,
    MovementDetail, Person, PersonName, RecordQuery, RecordSnapshot, ACTIVE_STATUS,
};
use crate::infrastructure::SledRecordStore;

/// Completion engine that replays scripted outcomes and records every call.
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<String, String>>>,
    exhausted: Result<String, String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedCompletion {
    pub fn new<'a>(script: impl IntoIterator<Item = Result<&'a str, &'a str>>) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|step| step.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            exhausted: Err("script exhausted".into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always_ok(text: &str) -> Self {
        Self {
            exhausted: Ok(text.to_string()),
            ..Self::new([])
        }
    }

    pub fn always_err(message: &str) -> Self {
        Self {
            exhausted: Err(message.to_string()),
            ..Self::new([])
        }
    }

    pub fn models(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(model, _)| model.clone()).collect()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, prompt)| prompt.clone()).collect()
    }
}

impl CompletionEngine for ScriptedCompletion {
    fn complete(&self, model: &str, prompt: &str) -> Result<String, DomainError> {
        self.calls.lock().push((model.to_string(), prompt.to_string()));
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.exhausted.clone());
        step.map_err(DomainError::generation)
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn durations(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}

/// Store whose every read fails.
pub struct FailingStore;

impl CatalogReader for FailingStore {
    fn classification_names(&self) -> Result<Vec<String>, DomainError> {
        Err(DomainError::storage("database offline"))
    }

    fn person_names(&self) -> Result<Vec<PersonName>, DomainError> {
        Err(DomainError::storage("database offline"))
    }
}

impl RecordStore for FailingStore {
    fn movements(&self, _query: &RecordQuery) -> Result<Vec<MovementDetail>, DomainError> {
        Err(DomainError::storage("database offline"))
    }

    fn installments(&self, _query: &RecordQuery) -> Result<Vec<InstallmentDetail>, DomainError> {
        Err(DomainError::storage("database offline"))
    }

    fn persons(&self, _limit: usize) -> Result<Vec<Person>, DomainError> {
        Err(DomainError::storage("database offline"))
    }

    fn classifications(&self, _limit: usize) -> Result<Vec<Classification>, DomainError> {
        Err(DomainError::storage("database offline"))
    }

    fn ping(&self) -> Result<(), DomainError> {
        Err(DomainError::storage("database offline"))
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid fixture date")
}

fn person(id: u64, kind: &str, legal: &str, trade: Option<&str>) -> Person {
    Person {
        id,
        kind: kind.into(),
        legal_name: legal.into(),
        trade_name: trade.map(str::to_string),
        document: format!("000{id}"),
        status: ACTIVE_STATUS.into(),
    }
}

#[allow(clippy::too_many_arguments)]
fn movement(
    id: u64,
    kind: EntryKind,
    invoice: &str,
    issued_on: NaiveDate,
    description: &str,
    total_value: f64,
    counterparty_id: u64,
    classification_id: u64,
) -> Movement {
    Movement {
        id,
        kind,
        invoice_number: Some(invoice.into()),
        issued_on,
        description: Some(description.into()),
        status: ACTIVE_STATUS.into(),
        total_value,
        counterparty_id,
        billed_id: 2,
        classification_ids: vec![classification_id],
    }
}

fn installment(id: u64, movement_id: u64, ident: &str, due_on: NaiveDate, amount: f64, paid: f64) -> Installment {
    Installment {
        id,
        movement_id: Some(movement_id),
        identification: ident.into(),
        due_on,
        amount,
        paid,
        balance: amount - paid,
        status: if paid >= amount { "PAGO" } else { "PENDENTE" }.into(),
    }
}

/// Three people, three classifications, four movements (one cancelled) and
/// three installments spread over early 2024.
pub fn fixture() -> RecordSnapshot {
    let mut cancelled = movement(13, EntryKind::Expense, "1003", date(2024, 3, 28), "sementes", 3200.0, 1, 1);
    cancelled.status = "CANCELADO".into();

    RecordSnapshot {
        persons: vec![
            person(1, "FORNECEDOR", "Agro Sul Comércio Ltda", Some("AgroSul")),
            person(2, "FATURADO", "Fazenda Boa Vista", None),
            person(3, "CLIENTE", "Cooperativa Vale Verde", Some("Coopvale")),
        ],
        classifications: vec![
            Classification {
                id: 1,
                kind: EntryKind::Expense,
                description: "INSUMOS AGRÍCOLAS".into(),
                status: ACTIVE_STATUS.into(),
            },
            Classification {
                id: 2,
                kind: EntryKind::Expense,
                description: "MANUTENÇÃO E OPERAÇÃO".into(),
                status: ACTIVE_STATUS.into(),
            },
            Classification {
                id: 3,
                kind: EntryKind::Revenue,
                description: "VENDAS".into(),
                status: ACTIVE_STATUS.into(),
            },
        ],
        movements: vec![
            movement(10, EntryKind::Expense, "1001", date(2024, 1, 15), "adubo", 1500.0, 1, 1),
            movement(11, EntryKind::Expense, "1002", date(2024, 2, 20), "peças trator", 800.0, 1, 2),
            movement(12, EntryKind::Revenue, "2001", date(2024, 3, 5), "venda de soja", 25000.0, 3, 3),
            cancelled,
        ],
        installments: vec![
            installment(100, 10, "1/2", date(2024, 2, 15), 750.0, 750.0),
            installment(101, 10, "2/2", date(2024, 3, 15), 750.0, 0.0),
            installment(102, 12, "1/1", date(2024, 4, 5), 25000.0, 0.0),
        ],
    }
}

/// Temporary sled store loaded with [`fixture`].
pub fn sample_store() -> SledRecordStore {
    let store = SledRecordStore::temporary().expect("temporary sled store");
    store
        .import_snapshot(&fixture())
        .expect("fixture import succeeds");
    store
}
