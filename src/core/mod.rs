pub mod error;
pub mod types;
pub mod value;

pub use error::{RegistryError, Result};
pub use types::{Columns, RowEntity, RowPage};
pub use value::Value;
