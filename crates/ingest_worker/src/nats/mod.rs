mod client;
mod jetstream_source;

pub use client::*;
pub use jetstream_source::*;
