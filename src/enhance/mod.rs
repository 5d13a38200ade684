//! Prompt enhancement

pub mod enhancer;

pub use enhancer::{enhance, Enhancement};
