use std::cmp::Reverse;
use std::path::Path;

use ahash::AHashMap;
use bincode::Options;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use sled::{Config, Db, IVec, Tree};
use tracing::info;

use crate::{
    application::services::{CatalogReader, RecordStore},
    domain::{
        Classification, DomainError, Installment, InstallmentDetail, Movement, MovementDetail,
        Person, PersonName, RecordQuery, RecordSnapshot,
    },
};

const PERSONS_TREE: &str = "persons";
const CLASSIFICATIONS_TREE: &str = "classifications";
const MOVEMENTS_TREE: &str = "movements";
const INSTALLMENTS_TREE: &str = "installments";

/// Record counts written by [`SledRecordStore::import_snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ImportSummary {
    pub persons: usize,
    pub classifications: usize,
    pub movements: usize,
    pub installments: usize,
}

/// Embedded record store backed by `sled`.
///
/// Each entity kind lives in its own tree keyed by its big-endian id. Queries
/// scan the tree, apply the predicate and sort in memory, which is plenty
/// for a single ledger and keeps the store embeddable.
pub struct SledRecordStore {
    db: Db,
    persons: Tree,
    classifications: Tree,
    movements: Tree,
    installments: Tree,
    write_lock: Mutex<()>,
}

impl SledRecordStore {
    /// Opens (or creates) a sled database rooted at `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|err| {
            DomainError::storage(format!("failed to create data directory {:?}: {err}", dir))
        })?;

        let db = Config::default()
            .path(&dir)
            .cache_capacity(64 * 1024 * 1024)
            .mode(sled::Mode::HighThroughput)
            .open()
            .map_err(|err| DomainError::storage(format!("failed to open sled db: {err}")))?;

        Self::from_db(db)
    }

    /// In-memory store removed on drop; used by tests and dry runs.
    pub fn temporary() -> Result<Self, DomainError> {
        let db = Config::default()
            .temporary(true)
            .open()
            .map_err(|err| DomainError::storage(format!("failed to open temporary db: {err}")))?;

        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, DomainError> {
        let open = |name: &str| {
            db.open_tree(name).map_err(|err| {
                DomainError::storage(format!("failed to open {name} tree: {err}"))
            })
        };

        Ok(Self {
            persons: open(PERSONS_TREE)?,
            classifications: open(CLASSIFICATIONS_TREE)?,
            movements: open(MOVEMENTS_TREE)?,
            installments: open(INSTALLMENTS_TREE)?,
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Upserts every record of the snapshot, keyed by id.
    pub fn import_snapshot(&self, snapshot: &RecordSnapshot) -> Result<ImportSummary, DomainError> {
        let _guard = self.write_lock.lock();

        for person in &snapshot.persons {
            Self::put(&self.persons, person.id, person)?;
        }
        for class in &snapshot.classifications {
            Self::put(&self.classifications, class.id, class)?;
        }
        for movement in &snapshot.movements {
            Self::put(&self.movements, movement.id, movement)?;
        }
        for installment in &snapshot.installments {
            Self::put(&self.installments, installment.id, installment)?;
        }

        self.db
            .flush()
            .map_err(|err| DomainError::storage(format!("failed to flush records: {err}")))?;

        let summary = ImportSummary {
            persons: snapshot.persons.len(),
            classifications: snapshot.classifications.len(),
            movements: snapshot.movements.len(),
            installments: snapshot.installments.len(),
        };
        info!(target: "finrag::storage", ?summary, "imported record snapshot");
        Ok(summary)
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .serialize(value)
            .map_err(|err| DomainError::storage(format!("serialization error: {err}")))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .deserialize(bytes)
            .map_err(|err| DomainError::storage(format!("deserialization error: {err}")))
    }

    fn encode_key(id: u64) -> [u8; 8] {
        id.to_be_bytes()
    }

    fn put<T: serde::Serialize>(tree: &Tree, id: u64, value: &T) -> Result<(), DomainError> {
        let bytes = Self::serialize(value)?;
        tree.insert(Self::encode_key(id), bytes)
            .map_err(|err| DomainError::storage(format!("failed to persist record {id}: {err}")))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(tree: &Tree, id: u64) -> Result<Option<T>, DomainError> {
        tree.get(Self::encode_key(id))
            .map_err(|err| DomainError::storage(format!("failed to read record {id}: {err}")))?
            .map(|bytes: IVec| Self::deserialize(bytes.as_ref()))
            .transpose()
    }

    fn scan<T: DeserializeOwned>(tree: &Tree) -> Result<Vec<T>, DomainError> {
        tree.iter()
            .map(|entry| {
                let (_, value) = entry
                    .map_err(|err| DomainError::storage(format!("failed to read record: {err}")))?;
                Self::deserialize(value.as_ref())
            })
            .collect()
    }

    fn persons_by_id(&self) -> Result<AHashMap<u64, Person>, DomainError> {
        Ok(Self::scan::<Person>(&self.persons)?
            .into_iter()
            .map(|person| (person.id, person))
            .collect())
    }

    fn classification_names_by_id(&self) -> Result<AHashMap<u64, String>, DomainError> {
        Ok(Self::scan::<Classification>(&self.classifications)?
            .into_iter()
            .map(|class| (class.id, class.description))
            .collect())
    }

    fn join_movement(
        movement: Movement,
        people: &AHashMap<u64, Person>,
        classes: &AHashMap<u64, String>,
    ) -> MovementDetail {
        MovementDetail {
            counterparty: people.get(&movement.counterparty_id).cloned(),
            billed_to: people.get(&movement.billed_id).cloned(),
            classifications: movement
                .classification_ids
                .iter()
                .filter_map(|id| classes.get(id).cloned())
                .collect(),
            movement,
        }
    }
}

impl CatalogReader for SledRecordStore {
    fn classification_names(&self) -> Result<Vec<String>, DomainError> {
        Ok(Self::scan::<Classification>(&self.classifications)?
            .into_iter()
            .map(|class| class.description)
            .collect())
    }

    fn person_names(&self) -> Result<Vec<PersonName>, DomainError> {
        Ok(Self::scan::<Person>(&self.persons)?
            .iter()
            .map(Person::names)
            .collect())
    }
}

impl RecordStore for SledRecordStore {
    fn movements(&self, query: &RecordQuery) -> Result<Vec<MovementDetail>, DomainError> {
        let mut rows: Vec<Movement> = Self::scan::<Movement>(&self.movements)?
            .into_iter()
            .filter(|m| !query.active_only || m.is_active())
            .filter(|m| query.accepts_date(m.issued_on) && query.accepts_value(m.total_value))
            .collect();

        rows.sort_by_key(|m| Reverse((m.issued_on, m.id)));
        rows.truncate(query.limit);
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let people = self.persons_by_id()?;
        let classes = self.classification_names_by_id()?;
        Ok(rows
            .into_iter()
            .map(|movement| Self::join_movement(movement, &people, &classes))
            .collect())
    }

    fn installments(&self, query: &RecordQuery) -> Result<Vec<InstallmentDetail>, DomainError> {
        let mut rows: Vec<Installment> = Self::scan::<Installment>(&self.installments)?
            .into_iter()
            .filter(|i| query.accepts_date(i.due_on) && query.accepts_value(i.amount))
            .collect();

        rows.sort_by_key(|i| Reverse((i.due_on, i.id)));
        rows.truncate(query.limit);
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let people = self.persons_by_id()?;
        let classes = self.classification_names_by_id()?;
        let mut details = Vec::with_capacity(rows.len());
        for installment in rows {
            let parent = match installment.movement_id {
                Some(id) => Self::get::<Movement>(&self.movements, id)?
                    .map(|movement| Self::join_movement(movement, &people, &classes)),
                None => None,
            };
            let (counterparty, classifications) = parent
                .map(|detail| (detail.counterparty, detail.classifications))
                .unwrap_or_default();
            details.push(InstallmentDetail {
                installment,
                counterparty,
                classifications,
            });
        }
        Ok(details)
    }

    fn persons(&self, limit: usize) -> Result<Vec<Person>, DomainError> {
        let mut persons = Self::scan::<Person>(&self.persons)?;
        persons.sort_by_key(|p| Reverse(p.id));
        persons.truncate(limit);
        Ok(persons)
    }

    fn classifications(&self, limit: usize) -> Result<Vec<Classification>, DomainError> {
        let mut classes = Self::scan::<Classification>(&self.classifications)?;
        classes.sort_by_key(|c| Reverse(c.id));
        classes.truncate(limit);
        Ok(classes)
    }

    fn ping(&self) -> Result<(), DomainError> {
        self.db
            .flush()
            .map_err(|err| DomainError::storage(format!("failed to flush db: {err}")))?;

        Ok(())
    }
}
