pub mod handlers;
mod registry;

pub use registry::{ShareEntry, ShareRegistry, ShareSnapshot};
