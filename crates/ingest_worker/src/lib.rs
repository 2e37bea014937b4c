pub mod domain;
pub mod ingest_loop;
pub mod nats;
pub mod sink;

pub use ingest_loop::*;
