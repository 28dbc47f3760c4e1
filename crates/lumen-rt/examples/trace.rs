use anyhow::{
    ensure,
    Result,
};
use ash::vk;
use bytemuck::{
    Pod,
    Zeroable,
};
use lumen_base::path::{
    get_config_root,
    get_shader_spv_root,
};
use lumen_rt::{
    common::{
        buffer::Buffer,
        command_buffer::{
            begin_single_time_command,
            bind_descriptors,
            bind_pipeline,
            end_single_time_command,
            push_constants,
            trace_rays,
        },
        command_pool::CommandPool,
        context::DeviceContext,
        descriptor_pool::DescriptorPool,
        descriptor_set::DescriptorSet,
    },
    raytracing::{
        builder::RaytracingPipelineBuilder,
        config::RaytracingPipelineConfig,
    },
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Configs {
    pipeline: String,
    width: u32,
    height: u32,
    validation: bool,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct TracePushConstants {
    width: u32,
    height: u32,
}

fn main() -> Result<()> {
    std::env::set_var("RUST_LOG", "debug");
    env_logger::init();

    log::info!("Parsing arguments");
    let config_root = get_config_root("lumen-rt")?;
    let configs: Configs =
        serde_json::from_str(&std::fs::read_to_string(config_root.join("trace.json"))?)?;
    log::info!("{:?}", configs);

    log::info!("Compiling shaders");
    lumen_shader::command::compile_all()?;

    let context = DeviceContext::new(configs.validation)?;
    let device = context.ash_device();

    log::info!("Building pipeline");
    let pipeline_config = RaytracingPipelineConfig::from_path(&config_root.join(&configs.pipeline))?;
    let pipeline = RaytracingPipelineBuilder::from_config(&pipeline_config, &get_shader_spv_root()?)?
        .build(context.raytracing_device())?;
    log::info!(
        "shader binding table: {} bytes, record stride {}, handle size {}",
        pipeline.table_size(),
        pipeline.table_offset_size(),
        pipeline.table_entry_size()
    );

    let pixel_count = (configs.width * configs.height) as usize;
    let output_buffer = Buffer::new(
        (pixel_count * std::mem::size_of::<u32>()) as vk::DeviceSize,
        vk::BufferUsageFlags::STORAGE_BUFFER,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        context.physical_device(),
        device.clone(),
        context.ash_instance(),
    )?;

    let descriptor_pool = DescriptorPool::new(
        &[vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(1)],
        1,
        device.clone(),
    )?;
    let set_layouts = pipeline.descriptor_set_layouts().collect::<Vec<_>>();
    let descriptor_set = DescriptorSet::new(&set_layouts, descriptor_pool.vk_pool(), device.clone())?;

    let buffer_info = [vk::DescriptorBufferInfo::default()
        .buffer(output_buffer.vk_buffer())
        .offset(0)
        .range(vk::WHOLE_SIZE)];
    let descriptor_writes = [vk::WriteDescriptorSet::default()
        .dst_set(descriptor_set.vk_descriptor_set(0))
        .dst_binding(0)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
        .buffer_info(&buffer_info)];
    unsafe {
        device.update_descriptor_sets(&descriptor_writes, &[]);
    }

    log::info!("Tracing rays");
    let command_pool = CommandPool::new(context.queue_family_index(), device.clone())?;
    let command_buffer = begin_single_time_command(command_pool.vk_command_pool(), device)?;

    bind_pipeline(device, command_buffer, &pipeline);
    bind_descriptors(
        device,
        command_buffer,
        pipeline.layout(),
        descriptor_set.vk_descriptor_sets(),
    );
    push_constants(
        device,
        command_buffer,
        pipeline.layout(),
        vk::ShaderStageFlags::RAYGEN_KHR,
        0,
        &TracePushConstants {
            width: configs.width,
            height: configs.height,
        },
    )?;
    let regions = pipeline.trace_rays_regions(0)?;
    trace_rays(
        &context.raytracing_device().raytracing_pipeline,
        command_buffer,
        &regions,
        vk::Extent3D {
            width: configs.width,
            height: configs.height,
            depth: 1,
        },
    );

    end_single_time_command(
        command_buffer,
        context.queue(),
        command_pool.vk_command_pool(),
        device,
    )?;

    let output = output_buffer.read_buffer()?;
    let values = output
        .chunks_exact(std::mem::size_of::<u32>())
        .map(|bytes| bytemuck::pod_read_unaligned::<u32>(bytes))
        .collect::<Vec<_>>();
    for (i, value) in values.iter().enumerate() {
        ensure!(*value == i as u32, "pixel {} holds {}", i, value);
    }
    log::info!("{} pixels written by the raygen shader", values.len());
    Ok(())
}
