// Sequence model: network, optimizer, training loop
pub mod ml;

// Run orchestration
pub mod pipeline;

// Prediction to trading signal
pub mod signals;

pub use pipeline::{PipelineRun, PredictionPipeline};
