pub mod diagnostics;
pub mod health;
pub mod notes;

pub use diagnostics::*;
pub use health::*;
pub use notes::*;
