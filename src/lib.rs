pub mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod state;
pub mod store;

pub use app::build_router;
