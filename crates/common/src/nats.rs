mod client;
mod delivery_policy;
mod middleware;
mod object_store;
mod queued_message;
mod trace_context;
mod tower_consumer;
mod traits;

pub use client::*;
pub use delivery_policy::*;
pub use middleware::*;
pub use object_store::*;
pub use queued_message::*;
pub use trace_context::*;
pub use tower_consumer::*;
pub use traits::*;
