pub mod normalizer;
pub mod windows;
