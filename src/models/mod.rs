pub mod counter;
pub mod like_event;
pub mod relation;

pub use counter::*;
pub use like_event::*;
pub use relation::*;
