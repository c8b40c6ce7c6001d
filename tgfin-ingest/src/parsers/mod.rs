pub mod amount;

pub use amount::{AmountExtractor, AmountStrategy, detect_currency};
