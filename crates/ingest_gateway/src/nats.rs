mod raw_event_producer;
mod upload_watcher;

pub use raw_event_producer::*;
pub use upload_watcher::*;
