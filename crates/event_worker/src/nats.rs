mod archiver_consumer_service;
mod dead_letter_consumer_service;
mod transformer_consumer_service;

pub use archiver_consumer_service::*;
pub use dead_letter_consumer_service::*;
pub use transformer_consumer_service::*;
