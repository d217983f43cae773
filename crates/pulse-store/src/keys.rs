//! Key encoding for the RocksDB adapter.
//!
//! Run keys are time-prefixed: `run:{scheduled_for_ms:013}:{ulid}`. The
//! zero-padded millisecond timestamp sorts lexicographically, so scanning
//! the runs family from the start yields runs in ascending due-time order.
//! Two index keys point into it: `id:{run_id}` for point lookups and
//! `occ:{job_id}:{scheduled_for_ms:013}` as the unique occurrence
//! constraint behind idempotent run creation.

use ulid::Ulid;

use crate::error::StoreError;

/// Key for run records.
/// Format: run:{scheduled_for_ms:013}:{ulid}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunKey {
    /// Due time in milliseconds since the Unix epoch
    pub scheduled_for_ms: i64,
    /// The run id
    pub ulid: Ulid,
}

impl RunKey {
    /// Build a key from a run's due time and id.
    pub fn new(scheduled_for_ms: i64, run_id: &str) -> Result<Self, StoreError> {
        let ulid: Ulid = run_id
            .parse()
            .map_err(|e| StoreError::Key(format!("Invalid run id ULID: {}", e)))?;
        Ok(Self {
            scheduled_for_ms,
            ulid,
        })
    }

    /// Encode key to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("run:{:013}:{}", self.scheduled_for_ms, self.ulid).into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StoreError::Key(format!("Invalid UTF-8: {}", e)))?;
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 || parts[0] != "run" {
            return Err(StoreError::Key(format!("Invalid run key format: {}", s)));
        }
        let scheduled_for_ms: i64 = parts[1]
            .parse()
            .map_err(|e| StoreError::Key(format!("Invalid timestamp: {}", e)))?;
        let ulid: Ulid = parts[2]
            .parse()
            .map_err(|e| StoreError::Key(format!("Invalid ULID: {}", e)))?;
        Ok(Self {
            scheduled_for_ms,
            ulid,
        })
    }

    /// The run id (ULID string) for this key
    pub fn run_id(&self) -> String {
        self.ulid.to_string()
    }
}

/// Index key mapping a run id to its run key.
/// Format: id:{run_id}
pub fn run_id_key(run_id: &str) -> Vec<u8> {
    format!("id:{}", run_id).into_bytes()
}

/// Unique occurrence key for (job, due time).
/// Format: occ:{job_id}:{scheduled_for_ms:013}
pub fn occurrence_key(job_id: &str, scheduled_for_ms: i64) -> Vec<u8> {
    format!("occ:{}:{:013}", job_id, scheduled_for_ms).into_bytes()
}
