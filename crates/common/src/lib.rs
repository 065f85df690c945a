pub mod domain;
pub mod garde;
pub mod postgres;
pub mod redis;
pub mod telemetry;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockCacheWriter;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockCardRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockFusionEngine;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockReadingStore;
#[cfg(any(test, feature = "testing"))]
pub use crate::redis::MockStreamGroupClient;
