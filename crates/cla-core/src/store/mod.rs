//! Signature persistence

mod memory;
mod postgres;
mod traits;

pub use memory::InMemorySignatureStore;
pub use postgres::PostgresSignatureStore;
pub use traits::{MarkSigned, SignatureStore, SignedUpdate, StoreResult};

use std::sync::Arc;

/// Signature store backend configuration.
#[derive(Debug, Clone, Default)]
pub enum SignatureStorageConfig {
    /// Records live in process memory only.
    #[default]
    Memory,
    /// Records persist in PostgreSQL; the schema is created on connect.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl SignatureStorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }

    pub async fn connect(&self) -> StoreResult<Arc<dyn SignatureStore>> {
        match self {
            Self::Memory => Ok(Arc::new(InMemorySignatureStore::new())),
            Self::Postgres {
                database_url,
                max_connections,
            } => Ok(Arc::new(
                PostgresSignatureStore::connect(database_url, *max_connections).await?,
            )),
        }
    }
}
