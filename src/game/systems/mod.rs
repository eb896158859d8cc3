pub mod hit;
pub mod motion;
pub mod spawn;
