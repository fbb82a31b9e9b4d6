pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod external;
pub mod models;
pub mod observability;
pub mod state;
