use anyhow::Result;
use ash::vk;

pub struct PipelineLayout {
    pipeline_layout: vk::PipelineLayout,
    device: ash::Device,
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}

impl PipelineLayout {
    pub fn new(
        pipeline_layout_create_info: &vk::PipelineLayoutCreateInfo,
        device: ash::Device,
    ) -> Result<Self> {
        let pipeline_layout =
            unsafe { device.create_pipeline_layout(pipeline_layout_create_info, None)? };
        Ok(Self {
            pipeline_layout,
            device,
        })
    }

    pub fn vk_pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }
}

/// Borrowed view of a pipeline's layout, handed to descriptor binding and push constant recording.
///
/// The pipeline type parameter carries the bind point the layout is used with.
pub struct PipelineLayoutRef<'a, P> {
    pipeline: &'a P,
    layout: vk::PipelineLayout,
    push_constant_ranges: &'a [vk::PushConstantRange],
}

impl<'a, P> PipelineLayoutRef<'a, P> {
    pub fn new(
        pipeline: &'a P,
        layout: vk::PipelineLayout,
        push_constant_ranges: &'a [vk::PushConstantRange],
    ) -> Self {
        Self {
            pipeline,
            layout,
            push_constant_ranges,
        }
    }

    pub fn pipeline(&self) -> &'a P {
        self.pipeline
    }

    pub fn vk_pipeline_layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn push_constant_ranges(&self) -> &'a [vk::PushConstantRange] {
        self.push_constant_ranges
    }
}

impl<P> Clone for PipelineLayoutRef<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for PipelineLayoutRef<'_, P> {}
