mod card_resolver;
mod ingestion_service;
mod snapshot_fusion;
mod telemetry_decoder;

pub use card_resolver::*;
pub use ingestion_service::*;
pub use snapshot_fusion::*;
pub use telemetry_decoder::*;
