pub mod window_registry;

pub use window_registry::{UpsertResult, WindowRegistry};
