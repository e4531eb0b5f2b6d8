pub mod csv_loader;
pub mod persistence;
pub mod repositories;
pub mod sentiment;

pub use persistence::{Database, SqliteSeriesStore};
pub use repositories::InMemorySeriesStore;
