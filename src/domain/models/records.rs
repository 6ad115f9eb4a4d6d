use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{ContextItem, EntityKind};

/// Status marker of records that are still in force.
pub const ACTIVE_STATUS: &str = "ATIVO";

/// Whether a movement or classification is money going out or coming in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    #[default]
    #[serde(rename = "DESPESA", alias = "expense")]
    Expense,
    #[serde(rename = "RECEITA", alias = "revenue")]
    Revenue,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Expense => f.write_str("DESPESA"),
            EntryKind::Revenue => f.write_str("RECEITA"),
        }
    }
}

/// Counterparty: supplier, customer or billed party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: u64,
    pub kind: String,
    pub legal_name: String,
    #[serde(default)]
    pub trade_name: Option<String>,
    #[serde(default)]
    pub document: String,
    #[serde(default = "default_status")]
    pub status: String,
}

impl Person {
    pub fn names(&self) -> PersonName {
        PersonName {
            legal_name: self.legal_name.clone(),
            trade_name: self.trade_name.clone(),
        }
    }

    fn display_name(&self) -> &str {
        &self.legal_name
    }

    pub fn to_context_item(&self) -> ContextItem {
        let text = format!(
            "Pessoa {}; Fantasia {}; Tipo {}; Documento {}; Status {}",
            self.legal_name,
            self.trade_name.as_deref().unwrap_or("-"),
            self.kind,
            or_dash(&self.document),
            self.status
        );
        ContextItem::new(EntityKind::Persons, self.id, text)
    }
}

/// Catalog projection of a person used for name matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub legal_name: String,
    pub trade_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub id: u64,
    pub kind: EntryKind,
    pub description: String,
    #[serde(default = "default_status")]
    pub status: String,
}

impl Classification {
    pub fn to_context_item(&self) -> ContextItem {
        let text = format!(
            "Classificação {}; Tipo {}; Status {}",
            self.description, self.kind, self.status
        );
        ContextItem::new(EntityKind::Classifications, self.id, text)
    }
}

/// An invoice or ledger entry as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: u64,
    pub kind: EntryKind,
    #[serde(default)]
    pub invoice_number: Option<String>,
    pub issued_on: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    pub total_value: f64,
    pub counterparty_id: u64,
    pub billed_id: u64,
    #[serde(default)]
    pub classification_ids: Vec<u64>,
}

impl Movement {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case(ACTIVE_STATUS)
    }
}

/// Payment slice of a movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: u64,
    #[serde(default)]
    pub movement_id: Option<u64>,
    pub identification: String,
    pub due_on: NaiveDate,
    pub amount: f64,
    #[serde(default)]
    pub paid: f64,
    pub balance: f64,
    #[serde(default = "default_installment_status")]
    pub status: String,
}

/// Movement joined with its people and classification names.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementDetail {
    pub movement: Movement,
    pub counterparty: Option<Person>,
    pub billed_to: Option<Person>,
    pub classifications: Vec<String>,
}

impl MovementDetail {
    pub fn counterparty_names(&self) -> Vec<&str> {
        person_names(self.counterparty.as_ref())
    }

    pub fn to_context_item(&self) -> ContextItem {
        let movement = &self.movement;
        let text = format!(
            "NF {}; Tipo {}; Emissão {}; Valor {:.2}; Emitente {}; Destinatário {}; Classificações {}; Descrição {}",
            movement.invoice_number.as_deref().unwrap_or("-"),
            movement.kind,
            movement.issued_on,
            movement.total_value,
            self.counterparty.as_ref().map_or("-", Person::display_name),
            self.billed_to.as_ref().map_or("-", Person::display_name),
            join_or_dash(&self.classifications),
            movement.description.as_deref().unwrap_or("").trim()
        );
        ContextItem::new(EntityKind::Movements, movement.id, text)
    }
}

/// Installment joined with the counterparty and classifications of its
/// parent movement, when it has one.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallmentDetail {
    pub installment: Installment,
    pub counterparty: Option<Person>,
    pub classifications: Vec<String>,
}

impl InstallmentDetail {
    pub fn counterparty_names(&self) -> Vec<&str> {
        person_names(self.counterparty.as_ref())
    }

    pub fn to_context_item(&self) -> ContextItem {
        let installment = &self.installment;
        let text = format!(
            "Parcela {}; Vencimento {}; Valor {:.2}; Pago {:.2}; Saldo {:.2}; Status {}; Emitente {}; Classificações {}",
            installment.identification,
            installment.due_on,
            installment.amount,
            installment.paid,
            installment.balance,
            installment.status,
            self.counterparty.as_ref().map_or("-", Person::display_name),
            join_or_dash(&self.classifications)
        );
        ContextItem::new(EntityKind::Installments, installment.id, text)
    }
}

/// Bulk payload accepted by the store importer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSnapshot {
    #[serde(default)]
    pub persons: Vec<Person>,
    #[serde(default)]
    pub classifications: Vec<Classification>,
    #[serde(default)]
    pub movements: Vec<Movement>,
    #[serde(default)]
    pub installments: Vec<Installment>,
}

fn person_names(person: Option<&Person>) -> Vec<&str> {
    let Some(person) = person else {
        return Vec::new();
    };
    let mut names = vec![person.legal_name.as_str()];
    if let Some(trade) = person.trade_name.as_deref() {
        names.push(trade);
    }
    names
}

fn join_or_dash(values: &[String]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.join(", ")
    }
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

fn default_status() -> String {
    ACTIVE_STATUS.to_string()
}

fn default_installment_status() -> String {
    "PENDENTE".to_string()
}
