pub mod classifier;

pub use classifier::find_opportunities;
