mod backoff;
mod cache_writer;
mod client;
mod consumer;
mod reading_store;
mod stream_client;
mod traits;

pub use backoff::*;
pub use cache_writer::*;
pub use client::*;
pub use consumer::*;
pub use reading_store::*;
pub use stream_client::*;
pub use traits::*;
