//! Domain layer: financial records, query filters and context items.

pub mod errors;
pub mod models;

pub use errors::DomainError;
pub use models::{
    Classification, ContextItem, EntityKind, EntryKind, Filter, Installment, InstallmentDetail,
    Movement, MovementDetail, Person, PersonName, RecordQuery, RecordSnapshot, ScoredItem,
    ACTIVE_STATUS,
};
