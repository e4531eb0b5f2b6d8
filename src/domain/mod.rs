// Domain-specific error types
pub mod errors;

// Normalization and windowing
pub mod ml;

// Forecast and signal records
pub mod prediction;

// Repository traits
pub mod repositories;

// Sentiment collaborator contract
pub mod sentiment;

// Observations and series validation
pub mod series;
