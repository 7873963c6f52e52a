//! Shader sources, include preprocessing and programs

pub mod builtin;
mod preprocessor;
mod program;
mod registry;
mod storage;

pub use preprocessor::*;
pub use program::*;
pub use registry::*;
pub use storage::*;
