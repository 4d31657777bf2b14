pub mod domain;
pub mod http;
pub mod ingest_gateway;
pub mod nats;

pub use domain::*;
pub use http::*;
pub use ingest_gateway::*;
pub use nats::*;
