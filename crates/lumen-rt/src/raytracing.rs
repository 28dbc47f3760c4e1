pub mod builder;
pub mod config;
pub mod group;
pub mod pipeline;
pub mod properties;
pub mod sbt;
