pub mod command;
pub mod utils;
