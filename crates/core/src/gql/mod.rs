pub mod batch;
pub mod cache;
pub mod compiler;
pub mod error;
pub mod ext;
pub mod loader;
pub mod resolver;
pub mod schema;
pub mod sdl;
