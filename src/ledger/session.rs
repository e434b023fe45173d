//! Session Store - keeps the ledger for the lifetime of one login session
//!
//! The snapshot lives under a fixed key inside the session directory and is
//! removed on logout, so counts never outlive the session.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::OrderLedger;

/// Fixed storage key for the order snapshot
pub const SESSION_KEY: &str = "green_fc_orders";

#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
struct SessionState {
    orders: OrderLedger,
    saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: Option<PathBuf>,
}

impl SessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: Some(dir.as_ref().join(format!("{}.json", SESSION_KEY))),
        }
    }

    /// A store that keeps nothing
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub async fn save(&self, ledger: &OrderLedger) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let state = SessionState {
            orders: ledger.clone(),
            saved_at: Some(Utc::now()),
        };

        let json = serde_json::to_string_pretty(&state)
            .context("Failed to serialize order session")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await
                .context("Failed to create session directory")?;
        }
        fs::write(path, json).await
            .context("Failed to write order session")?;

        debug!("Saved {} orders to session", ledger.total());
        Ok(())
    }

    /// Missing snapshots load as an empty ledger.
    pub async fn load(&self) -> Result<OrderLedger> {
        let Some(path) = &self.path else {
            return Ok(OrderLedger::default());
        };
        if !path.exists() {
            return Ok(OrderLedger::default());
        }

        let json = fs::read_to_string(path).await
            .context("Failed to read order session")?;
        let state: SessionState = serde_json::from_str(&json)
            .context("Failed to deserialize order session")?;

        Ok(state.orders)
    }

    pub async fn clear(&self) -> Result<()> {
        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path).await?;
            }
        }
        Ok(())
    }
}
