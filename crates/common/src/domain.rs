mod card;
mod fusion;
mod result;
mod telemetry;

pub use card::*;
pub use fusion::*;
pub use result::*;
pub use telemetry::*;
