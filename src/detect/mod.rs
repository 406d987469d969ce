mod backend;
pub mod backends;
mod registry;
mod result;

pub use backend::{is_unavailable, CollaboratorUnavailable, DetectorBackend};
pub use backends::{ScriptStep, ScriptedBackend, StubBackend, SyntheticBackend};
pub use registry::{BackendRegistry, SharedBackend};
pub use result::Detection;
