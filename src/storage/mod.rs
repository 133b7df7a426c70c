pub mod durable;
pub mod engine;
pub mod memory;
pub mod persistence;
pub mod table;

pub use durable::DurableRowStore;
pub use engine::RowStore;
pub use memory::InMemoryRowStore;
pub use persistence::{DurabilityMode, FileSink, WalSink};
pub use table::Partition;
