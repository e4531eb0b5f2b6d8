mod network;
mod optimizer;
pub mod sequence_model;

pub use sequence_model::SequenceModel;
