pub mod market_scanner;
pub mod schedule;
pub mod window_scanner;

pub use market_scanner::MarketScanner;
pub use window_scanner::WindowScanner;
