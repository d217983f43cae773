//! File-backed distribution backend.
//!
//! In the portal the backend is the employee directory plus the token
//! ledger. The daemon binary runs outside the portal, so it resolves
//! recipients from a JSON roster file and records issuance in the log.
//! Token amounts still flow through the run counters, which makes this
//! backend good enough for staging and operational rehearsals.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use pulse_scheduler::{BackendError, DistributionBackend, Recipient};
use pulse_types::{JobPayload, RecipientFilter};

fn default_active() -> bool {
    true
}

/// One employee in the roster file.
#[derive(Debug, Clone, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub department: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,
}

/// Backend resolving recipients from a static roster file.
pub struct FileRoster {
    entries: Vec<RosterEntry>,
}

impl FileRoster {
    /// Load a roster from a JSON array of entries.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<RosterEntry> = serde_json::from_str(&raw)?;
        info!(count = entries.len(), path = %path.display(), "Loaded roster");
        Ok(Self { entries })
    }

    fn matches(entry: &RosterEntry, filter: &RecipientFilter) -> bool {
        if !entry.active && !filter.include_inactive {
            return false;
        }
        if !filter.employee_ids.is_empty() && !filter.employee_ids.contains(&entry.id) {
            return false;
        }
        if !filter.departments.is_empty() {
            let Some(department) = &entry.department else {
                return false;
            };
            if !filter.departments.contains(department) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl DistributionBackend for FileRoster {
    async fn resolve_recipients(
        &self,
        payload: &JobPayload,
    ) -> Result<Vec<Recipient>, BackendError> {
        let filter = payload.filter();
        Ok(self
            .entries
            .iter()
            .filter(|e| Self::matches(e, filter))
            .map(|e| Recipient {
                id: e.id.clone(),
                display_name: e.name.clone(),
            })
            .collect())
    }

    async fn execute_unit(
        &self,
        payload: &JobPayload,
        recipient: &Recipient,
    ) -> Result<u64, BackendError> {
        match payload {
            JobPayload::TokenDistribution {
                token_kind, amount, ..
            } => {
                info!(
                    recipient = %recipient.id,
                    name = %recipient.display_name,
                    amount,
                    kind = %token_kind,
                    "Issued tokens"
                );
            }
            JobPayload::Notification { template, .. } => {
                info!(
                    recipient = %recipient.id,
                    template = %template,
                    "Delivered notification"
                );
            }
        }
        Ok(payload.units_per_recipient())
    }
}
