//! Lunch App
//!
//! Top-level session object shared by the HTTP API and the console: the
//! catalog, the order ledger, the selection controller and the credential.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{ApiKey, AppConfig, GeminiConfig};
use crate::error::AppError;
use crate::ledger::{OrderLedger, OrderLine, SessionStore};
use crate::menu::Catalog;
use crate::recommend::{validate_api_key, GeminiProvider, RecommendError, RecommendationProvider};
use crate::selection::{SelectionController, SelectionError};

/// Ledger view for presentation
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub lines: Vec<OrderLine>,
    pub total: u32,
}

pub struct LunchApp {
    catalog: Arc<Catalog>,
    ledger: Mutex<OrderLedger>,
    session: SessionStore,
    selection: SelectionController,
    gemini: GeminiConfig,
    credential: Mutex<Option<ApiKey>>,
}

impl LunchApp {
    /// Builds the app from configuration, restoring this session's orders.
    pub async fn new(config: AppConfig) -> Result<Arc<Self>> {
        let catalog = Arc::new(Catalog::green_fc());
        let selection = SelectionController::new(catalog.clone(), config.selection.clone());
        let session = match &config.session_dir {
            Some(dir) => SessionStore::new(dir),
            None => SessionStore::disabled(),
        };

        let app = Self::from_parts(catalog, selection, session, config.gemini.clone());

        let mut restored = app.session.load().await?;
        let dropped = restored.retain_known(&app.catalog);
        if dropped > 0 {
            warn!("Dropped {} invalid entries from the stored order session", dropped);
        }
        if !restored.is_empty() {
            info!("Restored {} orders from this session", restored.total());
        }
        *app.ledger.lock().await = restored;

        if let Some(key) = config.api_key {
            app.install_credential(key).await;
        }

        Ok(Arc::new(app))
    }

    pub fn from_parts(
        catalog: Arc<Catalog>,
        selection: SelectionController,
        session: SessionStore,
        gemini: GeminiConfig,
    ) -> Self {
        Self {
            catalog,
            ledger: Mutex::new(OrderLedger::new()),
            session,
            selection,
            gemini,
            credential: Mutex::new(None),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    // ── Orders ──────────────────────────────────────────────────────────────

    pub async fn orders(&self) -> OrderSummary {
        let ledger = self.ledger.lock().await;
        OrderSummary {
            lines: ledger.lines(&self.catalog),
            total: ledger.total(),
        }
    }

    pub async fn increment(&self, item_id: &str) -> Result<u32, AppError> {
        self.ensure_known(item_id)?;
        let mut ledger = self.ledger.lock().await;
        let count = ledger.increment(item_id);
        self.persist(&ledger).await;
        Ok(count)
    }

    pub async fn decrement(&self, item_id: &str) -> Result<u32, AppError> {
        self.ensure_known(item_id)?;
        let mut ledger = self.ledger.lock().await;
        let count = ledger.decrement(item_id);
        self.persist(&ledger).await;
        Ok(count)
    }

    /// Wipes all orders. The caller decides how confirmation is obtained.
    pub async fn clear_orders(&self, confirmed: bool) -> Result<(), AppError> {
        if !confirmed {
            return Err(AppError::ConfirmationRequired);
        }
        let mut ledger = self.ledger.lock().await;
        ledger.clear();
        self.persist(&ledger).await;
        info!("Orders cleared");
        Ok(())
    }

    /// Adds the current selection result to the ledger.
    pub async fn order_result(&self) -> Result<u32, AppError> {
        let (item, _) = self
            .selection
            .current_result()
            .await
            .ok_or(SelectionError::NoResult)?;
        self.increment(&item.id).await
    }

    fn ensure_known(&self, item_id: &str) -> Result<(), AppError> {
        if self.catalog.contains_id(item_id) {
            Ok(())
        } else {
            Err(AppError::UnknownItem(item_id.to_string()))
        }
    }

    async fn persist(&self, ledger: &OrderLedger) {
        if let Err(e) = self.session.save(ledger).await {
            warn!("Could not save order session: {:#}", e);
        }
    }

    // ── Credential ──────────────────────────────────────────────────────────

    pub async fn has_credential(&self) -> bool {
        self.credential.lock().await.is_some()
    }

    /// Validates a key against the service before adopting it.
    pub async fn set_api_key(&self, raw_key: &str) -> Result<(), AppError> {
        let key = ApiKey::parse(raw_key)?;
        if !validate_api_key(&self.gemini, key.expose()).await {
            return Err(RecommendError::InvalidCredential.into());
        }
        self.install_credential(key).await;
        Ok(())
    }

    async fn install_credential(&self, key: ApiKey) {
        let provider: Arc<dyn RecommendationProvider> =
            Arc::new(GeminiProvider::new(self.gemini.clone(), key.clone(), &self.catalog));
        self.install_provider(provider).await;
        *self.credential.lock().await = Some(key);
        info!("Gemini credential installed");
    }

    /// Wires any recommendation service into the controller.
    pub async fn install_provider(&self, provider: Arc<dyn RecommendationProvider>) {
        self.selection.set_provider(Some(provider)).await;
    }

    /// Ends the session: forgets the credential, the orders and the snapshot.
    pub async fn logout(&self) -> Result<(), AppError> {
        *self.credential.lock().await = None;
        self.selection.set_provider(None).await;
        self.selection.cancel().await;
        self.ledger.lock().await.clear();
        self.session.clear().await?;
        info!("Logged out");
        Ok(())
    }
}
