mod client;
mod row_store;

pub use client::*;
pub use row_store::*;
