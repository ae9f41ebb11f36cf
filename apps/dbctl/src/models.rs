//! Indexes declared by the application's collections

use database::ModelIndexes;
use database::mongodb::IndexModel;
use database::mongodb::bson::{Document, doc};
use database::mongodb::options::IndexOptions;

fn index(keys: Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn named(keys: Document, options: IndexOptions) -> IndexModel {
    IndexModel::builder().keys(keys).options(options).build()
}

pub fn tasks() -> ModelIndexes {
    ModelIndexes::new("tasks")
        .with_index(index(doc! { "project_id": 1, "status": 1 }))
        .with_index(index(doc! { "due_date": 1 }))
        .with_index(named(
            doc! { "title": "text", "description": "text" },
            IndexOptions::builder().name("task_search".to_string()).build(),
        ))
}

pub fn notes() -> ModelIndexes {
    ModelIndexes::new("notes")
        .with_index(index(doc! { "owner_id": 1, "updated_at": -1 }))
        .with_index(index(doc! { "tags": 1 }))
}

pub fn calendar_events() -> ModelIndexes {
    ModelIndexes::new("calendar_events")
        .with_index(index(doc! { "owner_id": 1, "starts_at": 1 }))
        .with_index(index(doc! { "task_id": 1 }))
}

pub fn users() -> ModelIndexes {
    ModelIndexes::new("users").with_index(named(
        doc! { "email": 1 },
        IndexOptions::builder().unique(true).build(),
    ))
}

/// Every model, in synchronization order
pub fn all() -> Vec<ModelIndexes> {
    vec![tasks(), notes(), calendar_events(), users()]
}
