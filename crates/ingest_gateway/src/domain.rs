mod bulk_ingestion_service;
mod event_ingestion_service;

pub use bulk_ingestion_service::*;
pub use event_ingestion_service::*;
