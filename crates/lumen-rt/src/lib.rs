//! Vulkan ray tracing pipelines with their shader binding tables.
//!
//! [`raytracing::builder::RaytracingPipelineBuilder`] creates a
//! [`raytracing::pipeline::RaytracingPipeline`], which owns the pipeline, its layout and the table
//! buffer. Recording goes through the free functions in [`common::command_buffer`].

pub mod common;
pub mod raytracing;
mod utils;
