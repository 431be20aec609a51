pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Clean, List, Mount, Status, Unmount};
