pub mod service;

pub use service::{CountSummary, QueryService};
