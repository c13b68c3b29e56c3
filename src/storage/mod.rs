//! Persistence.

mod postgres;

pub use postgres::PgStore;

/// Schema applied by `dbauth` deployments.
pub const SCHEMA: &str = include_str!("../../sql/schema.sql");
