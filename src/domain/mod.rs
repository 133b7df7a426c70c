pub mod record;
pub mod vision;

pub use record::{TrackedObjectRecord, validate_name};
pub use vision::VisionState;
