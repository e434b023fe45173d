//! Green FC Lunch Manager
//!
//! Picks today's lunch for the squad and keeps the order tally:
//! - Random spin over the fixed menu catalog
//! - AI coach recommendations (Gemini), validated against the catalog
//! - Per-item order ledger with session-scoped snapshots
//! - HTTP API with a live selection event stream

pub mod app;
pub mod config;
pub mod error;
pub mod ledger;
pub mod menu;
pub mod recommend;
pub mod selection;
pub mod server;

// Re-exports for convenience
pub use app::LunchApp;
pub use config::AppConfig;
pub use ledger::OrderLedger;
pub use menu::{Catalog, MenuItem};
pub use recommend::{Recommendation, RecommendationProvider};
pub use selection::{SelectionController, SelectionState};
