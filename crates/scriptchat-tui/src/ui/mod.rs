//! UI rendering.

mod chat;
mod render;
mod theme;
mod utils;

pub use render::render;
