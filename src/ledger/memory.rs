//! In-memory ledger for tests and local simulation.

use super::address::SessionAddress;
use super::record::{SessionRecord, SessionStatus, RECORD_SIZE};
use super::traits::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory ledger. Clones share the same storage.
#[derive(Clone)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

struct Entry {
    data: [u8; RECORD_SIZE],
    sealed_state: Option<Vec<u8>>,
}

struct LedgerState {
    accounts: HashMap<SessionAddress, Entry>,
    writes: u64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                accounts: HashMap::new(),
                writes: 0,
            })),
        }
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".to_string()))
    }

    /// Raw encoded bytes at `address` (for test inspection).
    pub fn raw_record(&self, address: &SessionAddress) -> Option<Vec<u8>> {
        self.lock()
            .ok()?
            .accounts
            .get(address)
            .map(|entry| entry.data.to_vec())
    }

    /// Overwrite raw bytes at `address` (for test setup).
    pub fn put_raw(&self, address: SessionAddress, data: [u8; RECORD_SIZE]) {
        if let Ok(mut state) = self.lock() {
            state.accounts.insert(
                address,
                Entry {
                    data,
                    sealed_state: None,
                },
            );
        }
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.lock().map(|s| s.writes).unwrap_or(0)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_record(&self, address: &SessionAddress) -> LedgerResult<SessionRecord> {
        let state = self.lock()?;
        let entry = state
            .accounts
            .get(address)
            .ok_or(LedgerError::NotFound(*address))?;
        Ok(SessionRecord::decode(&entry.data)?)
    }

    async fn create_record(
        &self,
        address: &SessionAddress,
        record: &SessionRecord,
    ) -> LedgerResult<()> {
        let mut state = self.lock()?;
        if state.accounts.contains_key(address) {
            return Err(LedgerError::AlreadyExists(*address));
        }
        state.accounts.insert(
            *address,
            Entry {
                data: record.encode(),
                sealed_state: None,
            },
        );
        state.writes += 1;
        Ok(())
    }

    async fn update_record(
        &self,
        address: &SessionAddress,
        expected: SessionStatus,
        record: &SessionRecord,
        sealed_state: Option<&[u8]>,
    ) -> LedgerResult<()> {
        let mut state = self.lock()?;
        let entry = state
            .accounts
            .get_mut(address)
            .ok_or(LedgerError::NotFound(*address))?;

        let current = SessionRecord::decode(&entry.data)?;
        if current.status != expected {
            return Err(LedgerError::StatusConflict {
                expected,
                actual: current.status,
            });
        }

        entry.data = record.encode();
        if let Some(sealed) = sealed_state {
            entry.sealed_state = Some(sealed.to_vec());
        }
        state.writes += 1;
        Ok(())
    }

    async fn get_sealed_state(&self, address: &SessionAddress) -> LedgerResult<Option<Vec<u8>>> {
        let state = self.lock()?;
        let entry = state
            .accounts
            .get(address)
            .ok_or(LedgerError::NotFound(*address))?;
        Ok(entry.sealed_state.clone())
    }
}
