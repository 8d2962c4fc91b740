//! Embedded persistence: one sled tree per entity, rows encoded as CBOR
use crate::error::StoreError;
use crate::invoice::Invoice;
use crate::notify::{EmailPayload, InAppNotification};
use crate::outbox::OutboxTask;
use crate::project::{Comment, Expense, ExpenseDeliverable, Project, ProjectScoped, Sale, Task};
use crate::provider::Provider;
use sled::{Batch, Db, Tree};
use std::path::Path;
use std::sync::Arc;

const RADICADO_KEY: &[u8] = b"radicado_seq";

/// A row type with its own tree, keyed by its id.
pub trait Record: minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()> {
    const ENTITY: &'static str;

    fn key(&self) -> &str;
    fn tree(store: &Store) -> &Tree;
}

#[derive(Clone)]
pub struct Store {
    instance: Arc<Db>,
    pub(crate) invoices: Tree,
    pub(crate) expenses: Tree,
    pub(crate) deliverables: Tree,
    pub(crate) projects: Tree,
    pub(crate) sales: Tree,
    pub(crate) tasks: Tree,
    pub(crate) comments: Tree,
    pub(crate) providers: Tree,
    pub(crate) notifications: Tree,
    pub(crate) mail: Tree,
    pub(crate) outbox: Tree,
    meta: Tree,
}

pub(crate) fn encode<R: Record>(record: &R) -> Result<Vec<u8>, StoreError> {
    minicbor::to_vec(record).map_err(|e| StoreError::Encode {
        entity: R::ENTITY,
        reason: e.to_string(),
    })
}

pub(crate) fn decode<R: Record>(bytes: &[u8]) -> Result<R, StoreError> {
    minicbor::decode(bytes).map_err(|e| StoreError::Decode {
        entity: R::ENTITY,
        reason: e.to_string(),
    })
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(Arc::new(db))
    }

    pub fn from_db(instance: Arc<Db>) -> Result<Self, StoreError> {
        Ok(Self {
            invoices: instance.open_tree("invoices")?,
            expenses: instance.open_tree("expenses")?,
            deliverables: instance.open_tree("expense_deliverables")?,
            projects: instance.open_tree("projects")?,
            sales: instance.open_tree("sales")?,
            tasks: instance.open_tree("tasks")?,
            comments: instance.open_tree("comments")?,
            providers: instance.open_tree("providers")?,
            notifications: instance.open_tree("notifications")?,
            mail: instance.open_tree("mail_outbox")?,
            outbox: instance.open_tree("effect_outbox")?,
            meta: instance.open_tree("meta")?,
            instance,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.instance.flush()?;
        Ok(())
    }

    /// Next intake number. Sequential and never reused, even across restarts.
    pub fn next_radicado(&self) -> Result<u64, StoreError> {
        let bumped = self.meta.update_and_fetch(RADICADO_KEY, |current| {
            let last = current
                .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
                .map(u64::from_be_bytes)
                .unwrap_or(0);
            Some((last + 1).to_be_bytes().to_vec())
        })?;

        bumped
            .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_ref()).ok())
            .map(u64::from_be_bytes)
            .ok_or(StoreError::Decode {
                entity: "radicado counter",
                reason: "counter is not an 8 byte integer".into(),
            })
    }

    pub fn insert<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        R::tree(self).insert(record.key().as_bytes(), encode(record)?)?;
        Ok(())
    }

    pub fn get<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError> {
        R::tree(self)
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn remove<R: Record>(&self, id: &str) -> Result<bool, StoreError> {
        Ok(R::tree(self).remove(id.as_bytes())?.is_some())
    }

    /// Full scan of an entity tree, keeping the rows `keep` accepts.
    pub fn scan<R: Record>(&self, keep: impl Fn(&R) -> bool) -> Result<Vec<R>, StoreError> {
        let mut rows = Vec::new();
        for entry in R::tree(self).iter() {
            let (_, bytes) = entry?;
            let row: R = decode(&bytes)?;
            if keep(&row) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    pub fn count<R: Record>(&self) -> usize {
        R::tree(self).len()
    }

    /// Remove every row of `R` owned by the project in one atomic batch.
    pub(crate) fn remove_scoped<R: Record + ProjectScoped>(
        &self,
        project_id: &str,
    ) -> Result<usize, StoreError> {
        let tree = R::tree(self);
        let mut batch = Batch::default();
        let mut removed = 0;

        for entry in tree.iter() {
            let (key, bytes) = entry?;
            let row: R = decode(&bytes)?;
            if row.project_id() == project_id {
                batch.remove(key);
                removed += 1;
            }
        }

        tree.apply_batch(batch)?;
        Ok(removed)
    }
}

impl Record for Invoice {
    const ENTITY: &'static str = "invoice";

    fn key(&self) -> &str {
        &self.id
    }
    fn tree(store: &Store) -> &Tree {
        &store.invoices
    }
}

impl Record for Expense {
    const ENTITY: &'static str = "expense";

    fn key(&self) -> &str {
        &self.id
    }
    fn tree(store: &Store) -> &Tree {
        &store.expenses
    }
}

impl Record for ExpenseDeliverable {
    const ENTITY: &'static str = "expense deliverable";

    fn key(&self) -> &str {
        &self.id
    }
    fn tree(store: &Store) -> &Tree {
        &store.deliverables
    }
}

impl Record for Project {
    const ENTITY: &'static str = "project";

    fn key(&self) -> &str {
        &self.id
    }
    fn tree(store: &Store) -> &Tree {
        &store.projects
    }
}

impl Record for Sale {
    const ENTITY: &'static str = "sale";

    fn key(&self) -> &str {
        &self.id
    }
    fn tree(store: &Store) -> &Tree {
        &store.sales
    }
}

impl Record for Task {
    const ENTITY: &'static str = "task";

    fn key(&self) -> &str {
        &self.id
    }
    fn tree(store: &Store) -> &Tree {
        &store.tasks
    }
}

impl Record for Comment {
    const ENTITY: &'static str = "comment";

    fn key(&self) -> &str {
        &self.id
    }
    fn tree(store: &Store) -> &Tree {
        &store.comments
    }
}

impl Record for Provider {
    const ENTITY: &'static str = "provider";

    fn key(&self) -> &str {
        &self.id
    }
    fn tree(store: &Store) -> &Tree {
        &store.providers
    }
}

impl Record for InAppNotification {
    const ENTITY: &'static str = "notification";

    fn key(&self) -> &str {
        &self.id
    }
    fn tree(store: &Store) -> &Tree {
        &store.notifications
    }
}

impl Record for EmailPayload {
    const ENTITY: &'static str = "email";

    fn key(&self) -> &str {
        &self.id
    }
    fn tree(store: &Store) -> &Tree {
        &store.mail
    }
}

impl Record for OutboxTask {
    const ENTITY: &'static str = "outbox task";

    fn key(&self) -> &str {
        &self.id
    }
    fn tree(store: &Store) -> &Tree {
        &store.outbox
    }
}
