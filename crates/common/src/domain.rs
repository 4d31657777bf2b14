mod blob_archive;
mod dead_letter;
mod in_memory_row_store;
mod normalized_record;
mod raw_event;
mod result;

pub use blob_archive::*;
pub use dead_letter::*;
pub use in_memory_row_store::*;
pub use normalized_record::*;
pub use raw_event::*;
pub use result::*;
