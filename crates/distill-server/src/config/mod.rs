// crates/distill-server/src/config/mod.rs
// Configuration: on-disk layout context value + config.json loading

pub mod file;
pub mod paths;

pub use file::{AnnotatorMode, DistillConfig};
pub use paths::{DistillPaths, sanitize_session_id};
