mod card_repository;
mod client;
mod config;

pub use card_repository::*;
pub use client::*;
pub use config::*;
