pub mod headless;
pub mod traits;
pub mod types;

pub use headless::*;
pub use traits::*;
pub use types::*;
