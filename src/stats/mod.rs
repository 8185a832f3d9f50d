pub mod extractors;
pub mod merge;
pub mod payload;

pub use extractors::StatName;
pub use merge::{merge, MergePlan};
pub use payload::StatisticsPayload;
