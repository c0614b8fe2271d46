pub mod backends;
pub mod boundary;
pub mod download;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod settings;

pub use backends::{AttemptOutcome, AttemptRequest, FailureKind, ImageTransformBackend};
pub use error::TransformError;
pub use orchestrator::{Orchestrator, TransformSuccess};
pub use settings::{GenerationSettings, StudioConfig};
