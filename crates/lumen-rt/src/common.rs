pub mod buffer;
pub mod command_buffer;
pub mod command_pool;
pub mod context;
pub mod debug;
pub mod descriptor_pool;
pub mod descriptor_set;
pub mod descriptor_set_layout;
pub mod device;
pub mod extension;
pub mod instance;
pub mod layer;
pub mod memory;
pub mod pipeline_layout;
pub mod shader;
