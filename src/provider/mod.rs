mod retry;
mod traits;

pub use retry::{complete_with_retry, RetryConfig};
pub use traits::*;
