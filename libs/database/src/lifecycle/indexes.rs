//! Reconcile collection indexes with the indexes models declare
//!
//! Destructive when `drop_first` is set; meant for deployment and migration
//! tooling, never for process start-up.

use std::collections::{BTreeSet, HashMap, HashSet};

use mongodb::IndexModel;
use mongodb::bson::Bson;
use tracing::{debug, info, instrument};

use super::driver::{DriverError, IndexManager};
use crate::common::{DatabaseError, DatabaseResult};

/// Name of the primary key index, never dropped
pub const ID_INDEX: &str = "_id_";

/// Indexes declared by one model for its backing collection
#[derive(Debug, Clone)]
pub struct ModelIndexes {
    pub collection: String,
    pub indexes: Vec<IndexModel>,
}

impl ModelIndexes {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: IndexModel) -> Self {
        self.indexes.push(index);
        self
    }

    /// Names the server will use for the declared indexes
    pub fn declared_names(&self) -> Vec<String> {
        self.indexes.iter().map(index_name).collect()
    }
}

/// What synchronization changed on one collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSyncReport {
    pub collection: String,
    /// Whether a drop-all was issued first
    pub dropped_all: bool,
    /// Undeclared indexes, and declared ones whose definition changed
    pub dropped: Vec<String>,
    pub created: Vec<String>,
}

/// Explicit `name` option, or the server default (`field_direction` pairs
/// joined by `_`, e.g. `project_id_1_due_at_-1`)
pub fn index_name(index: &IndexModel) -> String {
    if let Some(name) = index.options.as_ref().and_then(|o| o.name.clone()) {
        return name;
    }

    index
        .keys
        .iter()
        .map(|(field, direction)| format!("{}_{}", field, direction_label(direction)))
        .collect::<Vec<_>>()
        .join("_")
}

fn direction_label(direction: &Bson) -> String {
    match direction {
        Bson::Int32(v) => v.to_string(),
        Bson::Int64(v) => v.to_string(),
        Bson::Double(v) if v.fract() == 0.0 => (*v as i64).to_string(),
        Bson::String(v) => v.clone(),
        other => other.to_string(),
    }
}

/// Key pattern in a form comparable between a declared index and the one the
/// server reports
///
/// The server stores text indexes as `{_fts: "text", _ftsx: 1}` with the text
/// fields moved to `weights`, so text fields are compared as a set.
#[derive(Debug, PartialEq, Eq)]
struct KeyPattern {
    fields: Vec<(String, String)>,
    text: BTreeSet<String>,
}

impl KeyPattern {
    fn of(index: &IndexModel) -> Self {
        let mut fields = Vec::new();
        let mut text = BTreeSet::new();

        for (field, direction) in &index.keys {
            match direction {
                _ if field == "_fts" || field == "_ftsx" => {}
                Bson::String(kind) if kind == "text" => {
                    text.insert(field.clone());
                }
                other => fields.push((field.clone(), direction_label(other))),
            }
        }

        if index.keys.contains_key("_fts") {
            let weights = index.options.as_ref().and_then(|o| o.weights.as_ref());
            text.extend(weights.into_iter().flat_map(|w| w.keys().cloned()));
        }

        Self { fields, text }
    }
}

/// Same keys and same behavior-changing options (unique, sparse, partial
/// filter, TTL)
fn same_definition(existing: &IndexModel, declared: &IndexModel) -> bool {
    let unique = |i: &IndexModel| i.options.as_ref().and_then(|o| o.unique).unwrap_or(false);
    let sparse = |i: &IndexModel| i.options.as_ref().and_then(|o| o.sparse).unwrap_or(false);
    let partial = |i: &IndexModel| {
        i.options
            .as_ref()
            .and_then(|o| o.partial_filter_expression.clone())
    };
    let ttl = |i: &IndexModel| i.options.as_ref().and_then(|o| o.expire_after);

    KeyPattern::of(existing) == KeyPattern::of(declared)
        && unique(existing) == unique(declared)
        && sparse(existing) == sparse(declared)
        && partial(existing) == partial(declared)
        && ttl(existing) == ttl(declared)
}

/// Synchronize indexes for every model, in order
///
/// With `drop_first`, every index of a collection is dropped before the
/// reconcile step; a missing collection or index is expected on a first run and
/// ignored, any other drop error aborts the whole call.
pub struct IndexSynchronizer<'a, M: ?Sized> {
    manager: &'a M,
}

impl<'a, M> IndexSynchronizer<'a, M>
where
    M: IndexManager + ?Sized,
{
    pub fn new(manager: &'a M) -> Self {
        Self { manager }
    }

    #[instrument(skip(self, models), fields(models = models.len()))]
    pub async fn sync_indexes(
        &self,
        models: &[ModelIndexes],
        drop_first: bool,
    ) -> DatabaseResult<Vec<IndexSyncReport>> {
        let mut reports = Vec::with_capacity(models.len());

        for model in models {
            let report = self.sync_model(model, drop_first).await.map_err(|source| {
                DatabaseError::IndexSync {
                    collection: model.collection.clone(),
                    source,
                }
            })?;

            info!(
                collection = %report.collection,
                dropped_all = report.dropped_all,
                dropped = ?report.dropped,
                created = ?report.created,
                "Indexes synchronized"
            );
            reports.push(report);
        }

        Ok(reports)
    }

    async fn sync_model(
        &self,
        model: &ModelIndexes,
        drop_first: bool,
    ) -> Result<IndexSyncReport, DriverError> {
        let collection = model.collection.as_str();
        let mut report = IndexSyncReport {
            collection: model.collection.clone(),
            ..IndexSyncReport::default()
        };

        if drop_first {
            match self.manager.drop_all_indexes(collection).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(collection, "Nothing to drop: {}", e);
                }
                Err(e) => return Err(e),
            }
            report.dropped_all = true;
        }

        let existing = match self.manager.list_indexes(collection).await {
            Ok(indexes) => indexes,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };

        let declared: HashMap<String, &IndexModel> = model
            .indexes
            .iter()
            .map(|index| (index_name(index), index))
            .collect();
        let mut kept = HashSet::new();

        for index in &existing {
            let name = index_name(index);
            if name == ID_INDEX {
                continue;
            }
            match declared.get(&name) {
                Some(wanted) if same_definition(index, wanted) => {
                    kept.insert(name);
                }
                Some(_) => {
                    debug!(collection, index = %name, "Index definition changed, rebuilding");
                    self.manager.drop_index(collection, &name).await?;
                    report.dropped.push(name);
                }
                None => {
                    self.manager.drop_index(collection, &name).await?;
                    report.dropped.push(name);
                }
            }
        }

        let missing: Vec<IndexModel> = model
            .indexes
            .iter()
            .filter(|index| !kept.contains(&index_name(index)))
            .cloned()
            .collect();

        if !missing.is_empty() {
            report.created = missing.iter().map(index_name).collect();
            self.manager.create_indexes(collection, missing).await?;
        }

        Ok(report)
    }
}
