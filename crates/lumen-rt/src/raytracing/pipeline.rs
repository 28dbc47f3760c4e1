use super::{
    group::{
        ShaderGroup,
        ShaderStageKind,
    },
    properties::RaytracingPipelineProperties,
    sbt::{
        ShaderBindingTableGroupsInfo,
        TraceRaysRegions,
    },
};
use crate::common::{
    buffer::Buffer,
    command_buffer::Pipeline,
    descriptor_set_layout::DescriptorSetLayout,
    pipeline_layout::{
        PipelineLayout,
        PipelineLayoutRef,
    },
    shader::ShaderModule,
};
use anyhow::Result;
use ash::vk;

/// Owned `vk::Pipeline`, destroyed on drop.
pub(crate) struct PipelineHandle {
    pipeline: vk::Pipeline,
    device: ash::Device,
}

impl PipelineHandle {
    pub(crate) fn new(pipeline: vk::Pipeline, device: ash::Device) -> Self {
        Self { pipeline, device }
    }

    pub(crate) fn vk_pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

/// A ray tracing pipeline together with its layout and shader binding table.
///
/// Built by [`RaytracingPipelineBuilder`](super::builder::RaytracingPipelineBuilder) and immutable
/// afterwards. The pipeline, its layout, the descriptor set layouts, the shader modules and the
/// table buffer are owned exclusively and released once when the value is dropped. The type is
/// move-only:
///
/// ```compile_fail
/// fn assert_clone<T: Clone>() {}
/// assert_clone::<lumen_rt::raytracing::pipeline::RaytracingPipeline>();
/// ```
pub struct RaytracingPipeline {
    // fields drop in declaration order, the pipeline goes first
    pub(super) pipeline: PipelineHandle,
    pub(super) shader_binding_table: Buffer,
    pub(super) pipeline_layout: PipelineLayout,
    pub(super) descriptor_set_layouts: Vec<DescriptorSetLayout>,
    pub(super) shader_modules: Vec<ShaderModule>,
    pub(super) shader_stages: Vec<ShaderStageKind>,
    pub(super) shader_groups: Vec<ShaderGroup>,
    pub(super) shader_group_create_infos: Vec<vk::RayTracingShaderGroupCreateInfoKHR<'static>>,
    pub(super) shader_binding_table_groups_info: ShaderBindingTableGroupsInfo,
    pub(super) push_constant_ranges: Vec<vk::PushConstantRange>,
    pub(super) create_flags: vk::PipelineCreateFlags,
    pub(super) max_recursion_depth: u32,
    pub(super) properties: RaytracingPipelineProperties,
}

impl RaytracingPipeline {
    pub fn layout_handle(&self) -> vk::PipelineLayout {
        self.pipeline_layout.vk_pipeline_layout()
    }

    pub fn layout(&self) -> PipelineLayoutRef<'_, Self> {
        PipelineLayoutRef::new(self, self.layout_handle(), &self.push_constant_ranges)
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline.vk_pipeline()
    }

    /// Shader group base alignment; entry offsets times this give byte offsets.
    pub fn table_offset_size(&self) -> vk::DeviceSize {
        self.properties.table_offset_size()
    }

    /// Shader group handle size.
    pub fn table_entry_size(&self) -> vk::DeviceSize {
        self.properties.table_entry_size()
    }

    pub fn table_size(&self) -> vk::DeviceSize {
        self.shader_binding_table.size()
    }

    pub fn shader_binding_table_handle(&self) -> vk::Buffer {
        self.shader_binding_table.vk_buffer()
    }

    pub fn shader_binding_table_address(&self) -> Result<vk::DeviceAddress> {
        self.shader_binding_table.device_address()
    }

    pub fn shader_binding_table_groups(&self) -> &ShaderBindingTableGroupsInfo {
        &self.shader_binding_table_groups_info
    }

    /// Regions for `vkCmdTraceRaysKHR` starting at the given raygen entry.
    pub fn trace_rays_regions(&self, raygen_entry: u64) -> Result<TraceRaysRegions> {
        TraceRaysRegions::new(
            &self.shader_binding_table_groups_info,
            self.shader_binding_table_address()?,
            &self.properties,
            raygen_entry,
        )
    }

    pub fn properties(&self) -> &RaytracingPipelineProperties {
        &self.properties
    }

    pub fn max_recursion_depth(&self) -> u32 {
        self.max_recursion_depth
    }

    pub fn create_flags(&self) -> vk::PipelineCreateFlags {
        self.create_flags
    }

    pub fn shader_stages(&self) -> &[ShaderStageKind] {
        &self.shader_stages
    }

    pub fn shader_modules(&self) -> impl Iterator<Item = vk::ShaderModule> + '_ {
        self.shader_modules
            .iter()
            .map(|module| module.vk_shader_module())
    }

    pub fn shader_groups(&self) -> &[ShaderGroup] {
        &self.shader_groups
    }

    pub fn shader_group_create_infos(&self) -> &[vk::RayTracingShaderGroupCreateInfoKHR<'static>] {
        &self.shader_group_create_infos
    }

    pub fn descriptor_set_layouts(&self) -> impl Iterator<Item = vk::DescriptorSetLayout> + '_ {
        self.descriptor_set_layouts
            .iter()
            .map(|layout| layout.vk_descriptor_set_layout())
    }

    pub fn push_constant_ranges(&self) -> &[vk::PushConstantRange] {
        &self.push_constant_ranges
    }
}

impl Pipeline for RaytracingPipeline {
    const BIND_POINT: vk::PipelineBindPoint = vk::PipelineBindPoint::RAY_TRACING_KHR;

    fn vk_pipeline(&self) -> vk::Pipeline {
        self.handle()
    }
}
