//! PaperflowAI backend: customers, offers, orders, invoices and the
//! bookkeeping around them.

#[macro_use]
pub mod models;

pub mod api;
pub mod bookkeeping;
pub mod config;
pub mod customer_match;
pub mod db;
pub mod document_gen;
pub mod error;
pub mod extract;
pub mod lifecycle;
pub mod money;
pub mod numbering;
pub mod services;
pub mod state;
pub mod time_stats;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
