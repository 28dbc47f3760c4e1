use super::{
    config::RaytracingPipelineConfig,
    group::{
        ShaderGroup,
        ShaderGroupKind,
        ShaderStageKind,
    },
    pipeline::{
        PipelineHandle,
        RaytracingPipeline,
    },
    properties::RaytracingPipelineProperties,
    sbt::ShaderBindingTableGroupsInfo,
};
use crate::common::{
    buffer::Buffer,
    context::RaytracingDevice,
    descriptor_set_layout::DescriptorSetLayout,
    pipeline_layout::PipelineLayout,
    shader::{
        read_shader_code,
        ShaderModule,
    },
};
use anyhow::{
    bail,
    ensure,
    Result,
};
use ash::vk;
use lumen_base::path::resolve_relative_to;
use std::{
    ffi::CString,
    path::{
        Path,
        PathBuf,
    },
};

#[derive(Debug, Clone)]
pub enum ShaderSource {
    Path(PathBuf),
    Code(Vec<u8>),
}

#[derive(Debug, Clone)]
struct ShaderStage {
    kind: ShaderStageKind,
    source: ShaderSource,
    entry_point: CString,
}

/// Collects shader stages, groups and layout information, then creates a [`RaytracingPipeline`].
#[derive(Debug, Clone)]
pub struct RaytracingPipelineBuilder {
    stages: Vec<ShaderStage>,
    groups: Vec<ShaderGroup>,
    max_recursion_depth: u32,
    flags: vk::PipelineCreateFlags,
    descriptor_set_layouts: Vec<Vec<vk::DescriptorSetLayoutBinding<'static>>>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl Default for RaytracingPipelineBuilder {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            groups: Vec::new(),
            max_recursion_depth: 1,
            flags: vk::PipelineCreateFlags::empty(),
            descriptor_set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
        }
    }
}

impl RaytracingPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder populated from a JSON description; relative shader paths are joined onto `spv_root`.
    pub fn from_config(config: &RaytracingPipelineConfig, spv_root: &Path) -> Result<Self> {
        let mut builder = Self::new().max_recursion_depth(config.max_recursion_depth);
        for shader in config.shaders.iter() {
            builder = builder.shader_with_entry_point(
                shader.stage,
                ShaderSource::Path(resolve_relative_to(spv_root, &shader.path)),
                &shader.entry_point,
            )?;
        }
        for group in config.groups.iter() {
            builder = builder.group(*group);
        }
        for bindings in config.descriptor_set_layouts.iter() {
            let bindings: Vec<_> = bindings.iter().map(|binding| binding.to_vk()).collect();
            builder = builder.descriptor_set_layout(&bindings);
        }
        for push_constant in config.push_constants.iter() {
            builder = builder.push_constant_range(push_constant.to_vk());
        }
        Ok(builder)
    }

    /// Adds a SPIR-V file with a `main` entry point.
    ///
    /// Groups refer to stages by their position in call order, starting at 0.
    pub fn shader(self, kind: ShaderStageKind, path: impl Into<PathBuf>) -> Self {
        self.push_stage(kind, ShaderSource::Path(path.into()), CString::from(c"main"))
    }

    /// Adds in-memory SPIR-V with a `main` entry point.
    pub fn shader_code(self, kind: ShaderStageKind, code: Vec<u8>) -> Self {
        self.push_stage(kind, ShaderSource::Code(code), CString::from(c"main"))
    }

    pub fn shader_with_entry_point(
        self,
        kind: ShaderStageKind,
        source: ShaderSource,
        entry_point: &str,
    ) -> Result<Self> {
        let entry_point = CString::new(entry_point)?;
        Ok(self.push_stage(kind, source, entry_point))
    }

    fn push_stage(mut self, kind: ShaderStageKind, source: ShaderSource, entry_point: CString) -> Self {
        self.stages.push(ShaderStage {
            kind,
            source,
            entry_point,
        });
        self
    }

    pub fn group(mut self, group: ShaderGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn max_recursion_depth(mut self, max_recursion_depth: u32) -> Self {
        self.max_recursion_depth = max_recursion_depth;
        self
    }

    pub fn flags(mut self, flags: vk::PipelineCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Adds the next descriptor set layout; set numbers follow call order.
    pub fn descriptor_set_layout(mut self, bindings: &[vk::DescriptorSetLayoutBinding<'static>]) -> Self {
        self.descriptor_set_layouts.push(bindings.to_vec());
        self
    }

    pub fn push_constant_range(mut self, range: vk::PushConstantRange) -> Self {
        self.push_constant_ranges.push(range);
        self
    }

    fn stage_kinds(&self) -> Vec<ShaderStageKind> {
        self.stages.iter().map(|stage| stage.kind).collect()
    }

    /// Checks everything that can be checked without a device.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.stages.is_empty(), "ray tracing pipeline has no shader stages");
        ensure!(
            self.groups
                .iter()
                .any(|group| group.kind() == ShaderGroupKind::Raygen),
            "ray tracing pipeline needs at least one raygen group"
        );

        let stage_kinds = self.stage_kinds();
        for (i, group) in self.groups.iter().enumerate() {
            if let Err(e) = group.validate(&stage_kinds) {
                bail!("shader group {}: {}", i, e);
            }
        }

        for (i, range) in self.push_constant_ranges.iter().enumerate() {
            ensure!(
                range.size > 0 && range.offset % 4 == 0 && range.size % 4 == 0,
                "push constant range {} must have a non-zero size and 4 byte aligned offset and size",
                i
            );
            ensure!(
                !range.stage_flags.is_empty(),
                "push constant range {} has no shader stages",
                i
            );
        }
        Ok(())
    }

    /// Checks the builder against device limits.
    pub fn validate_against(&self, properties: &RaytracingPipelineProperties) -> Result<()> {
        properties.validate()?;
        ensure!(
            self.max_recursion_depth <= properties.max_ray_recursion_depth,
            "max recursion depth {} exceeds the device limit {}",
            self.max_recursion_depth,
            properties.max_ray_recursion_depth
        );
        Ok(())
    }

    /// Shader binding table layout this builder would produce under `properties`.
    pub fn table_layout(
        &self,
        properties: &RaytracingPipelineProperties,
    ) -> Result<ShaderBindingTableGroupsInfo> {
        ShaderBindingTableGroupsInfo::new(self.groups.iter().map(|group| group.kind()), properties)
    }

    pub fn build(&self, raytracing_device: &RaytracingDevice) -> Result<RaytracingPipeline> {
        self.validate()?;

        let device = &raytracing_device.device;

        log::info!("query raytracing properties");
        let properties = RaytracingPipelineProperties::query(
            &raytracing_device.instance,
            raytracing_device.physical_device,
        );
        log::debug!("{:?}", properties);
        self.validate_against(&properties)?;

        log::info!("creating {} shader modules", self.stages.len());
        let mut shader_modules = Vec::with_capacity(self.stages.len());
        for stage in self.stages.iter() {
            let shader_module = match &stage.source {
                ShaderSource::Path(path) => {
                    log::debug!("loading {:?} shader {:?}", stage.kind, path);
                    ShaderModule::new(&read_shader_code(path)?, device.clone())?
                }
                ShaderSource::Code(code) => ShaderModule::new(code, device.clone())?,
            };
            shader_modules.push(shader_module);
        }

        log::info!("creating raytracing pipeline layout");
        let mut descriptor_set_layouts = Vec::with_capacity(self.descriptor_set_layouts.len());
        for bindings in self.descriptor_set_layouts.iter() {
            descriptor_set_layouts.push(DescriptorSetLayout::new(bindings, device.clone())?);
        }
        let set_layouts = descriptor_set_layouts
            .iter()
            .map(|layout| layout.vk_descriptor_set_layout())
            .collect::<Vec<_>>();
        let pipeline_layout_create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&self.push_constant_ranges);
        let pipeline_layout = PipelineLayout::new(&pipeline_layout_create_info, device.clone())?;

        log::info!("creating raytracing pipeline");
        let shader_stages = self
            .stages
            .iter()
            .zip(shader_modules.iter())
            .map(|(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .module(module.vk_shader_module())
                    .stage(stage.kind.vk_stage_flags())
                    .name(&stage.entry_point)
            })
            .collect::<Vec<_>>();
        let shader_group_create_infos = self
            .groups
            .iter()
            .map(|group| group.to_vk())
            .collect::<Vec<_>>();
        // pipeline derivation is not supported
        let raytracing_pipeline_create_info = vk::RayTracingPipelineCreateInfoKHR::default()
            .flags(self.flags)
            .stages(&shader_stages)
            .groups(&shader_group_create_infos)
            .layout(pipeline_layout.vk_pipeline_layout())
            .max_pipeline_ray_recursion_depth(self.max_recursion_depth)
            .base_pipeline_handle(vk::Pipeline::null())
            .base_pipeline_index(-1);

        let created = unsafe {
            raytracing_device
                .raytracing_pipeline
                .create_ray_tracing_pipelines(
                    vk::DeferredOperationKHR::null(),
                    vk::PipelineCache::null(),
                    std::slice::from_ref(&raytracing_pipeline_create_info),
                    None,
                )
        };
        let pipelines = match created {
            Ok(pipelines) => pipelines,
            Err((partial, e)) => {
                for pipeline in partial.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                    unsafe { device.destroy_pipeline(pipeline, None) };
                }
                return Err(e.into());
            }
        };
        let pipeline = PipelineHandle::new(pipelines[0], device.clone());

        log::info!("create shader binding table");
        let groups_info = self.table_layout(&properties)?;
        for (kind, group) in groups_info.table_order() {
            log::debug!(
                "{:?}: {} entries at entry {} (byte {})",
                kind,
                group.num_entries,
                group.offset,
                group.byte_offset
            );
        }

        let group_count = shader_group_create_infos.len() as u32;
        let shader_handle_storage = unsafe {
            raytracing_device
                .raytracing_pipeline
                .get_ray_tracing_shader_group_handles(
                    pipeline.vk_pipeline(),
                    0,
                    group_count,
                    (group_count * properties.shader_group_handle_size) as usize,
                )?
        };
        let table = groups_info.layout_handles(&shader_handle_storage, &properties)?;

        let shader_binding_table = Buffer::with_data(
            &table,
            vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            raytracing_device.physical_device,
            device.clone(),
            &raytracing_device.instance,
        )?;

        Ok(RaytracingPipeline {
            pipeline,
            shader_binding_table,
            pipeline_layout,
            descriptor_set_layouts,
            shader_modules,
            shader_stages: self.stage_kinds(),
            shader_groups: self.groups.clone(),
            shader_group_create_infos,
            shader_binding_table_groups_info: groups_info,
            push_constant_ranges: self.push_constant_ranges.clone(),
            create_flags: self.flags,
            max_recursion_depth: self.max_recursion_depth,
            properties,
        })
    }
}
