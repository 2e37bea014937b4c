mod device;
mod error;
mod event;
mod message;
mod row;
mod sink;
mod timestamp;

pub use device::*;
pub use error::*;
pub use event::*;
pub use message::*;
pub use row::*;
pub use sink::*;
pub use timestamp::*;
