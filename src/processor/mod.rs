pub mod aggregator;
pub mod anomaly_detector;
pub mod cleaner;
pub mod deduplicator;
pub mod fuser;
pub mod loader;
pub mod reporter;
pub mod validation;

pub use aggregator::*;
pub use anomaly_detector::*;
pub use cleaner::*;
pub use deduplicator::*;
pub use fuser::*;
pub use loader::*;
pub use reporter::*;
pub use validation::*;
