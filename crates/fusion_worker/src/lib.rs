pub mod domain;
pub mod fusion_worker;
pub mod redis;

pub use crate::domain::*;
pub use crate::fusion_worker::*;
pub use crate::redis::*;
