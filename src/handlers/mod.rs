pub mod health;
pub mod diagnostics;
pub mod room_kick;

pub use health::*;
pub use diagnostics::*;
pub use room_kick::*;
