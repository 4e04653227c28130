pub mod retry;

pub use retry::{retry, RetryConfig, RetryExhausted};
