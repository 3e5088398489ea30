pub mod common;
pub mod extract;
pub mod launch;
pub mod overlay;
pub mod patches;
