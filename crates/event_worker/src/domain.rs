mod archive_service;
mod dead_letter_service;
mod transform_service;

pub use archive_service::*;
pub use dead_letter_service::*;
pub use transform_service::*;
