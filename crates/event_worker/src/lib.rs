pub mod domain;
pub mod event_worker;
pub mod nats;

pub use domain::*;
pub use event_worker::*;
pub use nats::*;
