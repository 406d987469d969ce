pub mod scripted;
pub mod stub;
pub mod synthetic;

pub use scripted::{ScriptStep, ScriptedBackend};
pub use stub::StubBackend;
pub use synthetic::SyntheticBackend;
