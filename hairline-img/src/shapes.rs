pub mod point;
pub mod polygon;
pub mod rect;
