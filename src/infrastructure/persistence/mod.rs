pub mod database;
pub mod series_store;

pub use database::Database;
pub use series_store::SqliteSeriesStore;
