pub mod daily_aggregator;
pub mod domain;

pub use daily_aggregator::*;
pub use domain::*;
