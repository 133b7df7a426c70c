pub mod adapter;
pub mod retry;

pub use adapter::{DEFAULT_PARTITION, DEFAULT_SCAN_PAGE_SIZE, RecordStore};
pub use retry::{RetryPolicy, put_with_retry};
