//! MongoDB driver bindings
//!
//! Connection configuration and the official-driver implementation of the
//! lifecycle seam traits.

mod config;
mod connector;

pub use config::ConnectionConfig;
pub use connector::{MongoConnector, MongoHandle};

// Re-export MongoDB types for convenience
pub use mongodb::{Client, ClientSession, Collection, Database, IndexModel, bson, options};
