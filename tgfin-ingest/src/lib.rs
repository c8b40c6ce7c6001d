//! tgfin-ingest: message-source abstraction, amount parsers and the
//! message → transaction classifier.

pub mod classify;
pub mod parsers;
pub mod source;
pub mod sources;
pub mod types;

pub use classify::{Classification, Classifier};
pub use source::{MessageSource, SourceError, Subscription};
pub use sources::{JsonFileSource, MemorySource};
pub use types::{GroupConfig, IncomingMessage, SourceMessage};
