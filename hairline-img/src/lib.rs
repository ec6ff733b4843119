pub mod analysis;
pub mod catalog;
pub mod compositor;
pub mod config;
pub mod geometry;
pub mod landmarks;
pub mod provider;
pub mod session;
pub mod shapes;
pub mod smoothing;
pub mod source;
pub mod sprites;
pub mod tracker;

pub use crate::compositor::Compositor;
pub use crate::config::Config;
pub use crate::tracker::Tracker;
