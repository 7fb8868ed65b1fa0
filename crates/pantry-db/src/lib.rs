//! PostgreSQL persistence for pantry: connection config, pool and
//! migrations, row models, and query functions.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
