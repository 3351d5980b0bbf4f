//! redb-backed DCA agent store.
//!
//! Two tables mirror the key-value layout of the hosted cache this replaces:
//! a config table keyed by lowercase user address (the `dca:<address>` keys)
//! and an enrollment table standing in for the `dca:agents` set. Values are
//! postcard-encoded.

use alloy_primitives::Address;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Per-user DCA configuration, keyed by lowercase user address.
const CONFIGS: TableDefinition<&str, &[u8]> = TableDefinition::new("dca_configs");

/// Enrollment set: every address that ever enabled DCA.
const AGENTS: TableDefinition<&str, ()> = TableDefinition::new("dca_agents");

// =============================================================================
// ERROR TYPE
// =============================================================================

/// Errors from the DCA store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database could not be opened or created.
    #[error("store database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction could not be started.
    #[error("store transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table could not be opened.
    #[error("store table error: {0}")]
    Table(#[from] redb::TableError),

    /// Read or write failed.
    #[error("store access error: {0}")]
    Storage(#[from] redb::StorageError),

    /// Commit failed.
    #[error("store commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Stored value could not be decoded.
    #[error("store value corrupt: {0}")]
    Codec(#[from] postcard::Error),

    /// Stored key is not a valid address.
    #[error("store key is not an address: {0}")]
    InvalidKey(String),
}

// =============================================================================
// RECORDS
// =============================================================================

/// One executed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DcaPurchase {
    /// Unix seconds at execution time.
    pub timestamp_secs: u64,
    /// USDC spent, human units as a decimal string.
    pub usdc_spent: String,
    /// Token received, human units as a decimal string.
    pub token_received: String,
    /// Simulated price at execution, in whole-unit terms.
    pub price: String,
    /// Settlement transaction hash, when the receipt carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// Cached DCA configuration for one user.
///
/// The agent fields are present iff DCA was enabled through the API; an
/// entry without them is skipped by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DcaConfig {
    /// Whether the schedule is active. A disabled entry keeps its purchase
    /// history but is skipped by the executor.
    pub enabled: bool,
    /// USDC per purchase, human units as a decimal string.
    pub amount: String,
    /// Seconds between purchases.
    pub frequency_secs: u64,
    /// Purchase history, oldest first.
    pub purchases: Vec<DcaPurchase>,
    /// Unix milliseconds of the last executed purchase; 0 if never.
    pub last_purchase_ms: u64,
    /// Backend agent wallet address, once provisioned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_address: Option<Address>,
    /// Backend agent wallet id at the wallet service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

// =============================================================================
// STORE
// =============================================================================

/// Embedded DCA store.
///
/// All operations are synchronous point reads and writes against a small
/// keyspace; callers use them inline.
#[derive(Debug)]
pub struct DcaStore {
    db: Database,
}

fn store_key(address: Address) -> String {
    address.to_string().to_lowercase()
}

impl DcaStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        // Create tables up front so reads never race table creation.
        let txn = db.begin_write()?;
        {
            txn.open_table(CONFIGS)?;
            txn.open_table(AGENTS)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    /// Fetch the cached config for a user, if any.
    pub fn get(&self, address: Address) -> Result<Option<DcaConfig>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CONFIGS)?;
        let Some(value) = table.get(store_key(address).as_str())? else {
            return Ok(None);
        };
        Ok(Some(postcard::from_bytes(value.value())?))
    }

    /// Store a user's config and enroll the address.
    pub fn set(&self, address: Address, config: &DcaConfig) -> Result<(), StoreError> {
        let key = store_key(address);
        let value = postcard::to_stdvec(config)?;
        let txn = self.db.begin_write()?;
        {
            let mut configs = txn.open_table(CONFIGS)?;
            configs.insert(key.as_str(), value.as_slice())?;
            let mut agents = txn.open_table(AGENTS)?;
            agents.insert(key.as_str(), ())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove a user's config and unenroll the address.
    pub fn remove(&self, address: Address) -> Result<(), StoreError> {
        let key = store_key(address);
        let txn = self.db.begin_write()?;
        {
            let mut configs = txn.open_table(CONFIGS)?;
            configs.remove(key.as_str())?;
            let mut agents = txn.open_table(AGENTS)?;
            agents.remove(key.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// All enrolled user addresses, in key order.
    pub fn list_agents(&self) -> Result<Vec<Address>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(AGENTS)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (key, ()) = {
                let (k, v) = entry?;
                (k.value().to_string(), v.value())
            };
            let address = key
                .parse::<Address>()
                .map_err(|_| StoreError::InvalidKey(key))?;
            out.push(address);
        }
        Ok(out)
    }
}

// =============================================================================
// TESTS
// =============================================================================
