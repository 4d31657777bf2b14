mod error;
mod handlers;
mod router;

pub use error::*;
pub use handlers::*;
pub use router::*;
