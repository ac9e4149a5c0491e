pub mod config;
pub mod error;
pub mod exchange;
pub mod retry;
pub mod types;

pub use config::{Config, Credentials, ExchangeMode, ExtractionSettings};
pub use error::{Error, ErrorKind, Result, ShardError};
pub use exchange::ExchangeClient;
pub use retry::{RetryPolicy, RetrySettings};
pub use types::*;
