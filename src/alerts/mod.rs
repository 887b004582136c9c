pub mod consumer;
pub mod cooldown;

pub use consumer::AlertConsumer;
