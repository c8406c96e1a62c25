//! Public library modules for the CLI crate
pub mod input;
pub mod render;
