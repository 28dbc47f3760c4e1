use anyhow::{
    ensure,
    Result,
};
use ash::vk;

/// Driver limits that drive shader binding table layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RaytracingPipelineProperties {
    pub shader_group_handle_size: u32,
    pub shader_group_base_alignment: u32,
    pub shader_group_handle_alignment: u32,
    pub max_ray_recursion_depth: u32,
}

impl RaytracingPipelineProperties {
    pub fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let mut raytracing_pipeline_props =
            vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
        let mut physical_device_props =
            vk::PhysicalDeviceProperties2::default().push_next(&mut raytracing_pipeline_props);
        unsafe {
            instance.get_physical_device_properties2(physical_device, &mut physical_device_props);
        }
        Self::from(&raytracing_pipeline_props)
    }

    /// Unit for converting entry offsets into byte offsets.
    pub fn table_offset_size(&self) -> vk::DeviceSize {
        self.shader_group_base_alignment as vk::DeviceSize
    }

    /// Bytes of one shader group handle.
    pub fn table_entry_size(&self) -> vk::DeviceSize {
        self.shader_group_handle_size as vk::DeviceSize
    }

    /// Every record starts on a base alignment boundary, so a handle must fit into one.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.shader_group_handle_size > 0,
            "driver reported a zero shader group handle size"
        );
        ensure!(
            self.shader_group_base_alignment > 0,
            "driver reported a zero shader group base alignment"
        );
        ensure!(
            self.shader_group_handle_size <= self.shader_group_base_alignment,
            "shader group handle size {} exceeds the base alignment {}",
            self.shader_group_handle_size,
            self.shader_group_base_alignment
        );
        Ok(())
    }
}

impl From<&vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'_>> for RaytracingPipelineProperties {
    fn from(props: &vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'_>) -> Self {
        Self {
            shader_group_handle_size: props.shader_group_handle_size,
            shader_group_base_alignment: props.shader_group_base_alignment,
            shader_group_handle_alignment: props.shader_group_handle_alignment,
            max_ray_recursion_depth: props.max_ray_recursion_depth,
        }
    }
}
