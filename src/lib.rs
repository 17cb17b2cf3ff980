pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod fields;
pub mod rate_limiter;
pub mod request;
pub mod response;

pub use client::Client;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, Tier};
pub use error::{Error, RateLimitError, Result};
pub use fields::{Fields, AVAILABLE_FIELDS};
pub use rate_limiter::{RateClass, RateLimitStatus};
pub use request::Format;
pub use response::{Payload, ResponseMetadata};
