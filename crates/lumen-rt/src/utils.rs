pub mod math;
pub mod tool;
