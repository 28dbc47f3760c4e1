use super::pipeline_layout::PipelineLayoutRef;
use crate::raytracing::sbt::TraceRaysRegions;
use anyhow::Result;
use ash::vk;

/// A pipeline kind that can be bound to a command buffer.
pub trait Pipeline {
    /// Bind point used for both the pipeline and descriptor sets bound under its layout.
    const BIND_POINT: vk::PipelineBindPoint;

    fn vk_pipeline(&self) -> vk::Pipeline;
}

/// The subset of `vkCmd*` entry points used to record pipeline state.
pub trait CommandRecorder {
    fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    );

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stage_flags: vk::ShaderStageFlags,
        offset: u32,
        constants: &[u8],
    );
}

impl CommandRecorder for ash::Device {
    fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        unsafe { ash::Device::cmd_bind_pipeline(self, command_buffer, bind_point, pipeline) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            ash::Device::cmd_bind_descriptor_sets(
                self,
                command_buffer,
                bind_point,
                layout,
                first_set,
                descriptor_sets,
                dynamic_offsets,
            )
        }
    }

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stage_flags: vk::ShaderStageFlags,
        offset: u32,
        constants: &[u8],
    ) {
        unsafe {
            ash::Device::cmd_push_constants(
                self,
                command_buffer,
                layout,
                stage_flags,
                offset,
                constants,
            )
        }
    }
}

/// `vkCmdTraceRaysKHR`, provided by the ray tracing pipeline extension loader.
pub trait TraceRaysRecorder {
    fn cmd_trace_rays(
        &self,
        command_buffer: vk::CommandBuffer,
        regions: &TraceRaysRegions,
        extent: vk::Extent3D,
    );
}

impl TraceRaysRecorder for ash::khr::ray_tracing_pipeline::Device {
    fn cmd_trace_rays(
        &self,
        command_buffer: vk::CommandBuffer,
        regions: &TraceRaysRegions,
        extent: vk::Extent3D,
    ) {
        unsafe {
            ash::khr::ray_tracing_pipeline::Device::cmd_trace_rays(
                self,
                command_buffer,
                &regions.raygen,
                &regions.miss,
                &regions.hit,
                &regions.callable,
                extent.width,
                extent.height,
                extent.depth,
            )
        }
    }
}

pub fn bind_pipeline<R: CommandRecorder, P: Pipeline>(
    recorder: &R,
    command_buffer: vk::CommandBuffer,
    pipeline: &P,
) {
    log::debug!("bind pipeline {:?} at {:?}", pipeline.vk_pipeline(), P::BIND_POINT);
    recorder.cmd_bind_pipeline(command_buffer, P::BIND_POINT, pipeline.vk_pipeline());
}

/// Binds `descriptor_sets` starting at set 0 under the given pipeline layout.
pub fn bind_descriptors<R: CommandRecorder, P: Pipeline>(
    recorder: &R,
    command_buffer: vk::CommandBuffer,
    layout: PipelineLayoutRef<'_, P>,
    descriptor_sets: &[vk::DescriptorSet],
) {
    log::debug!(
        "bind {} descriptor sets at {:?}",
        descriptor_sets.len(),
        P::BIND_POINT
    );
    recorder.cmd_bind_descriptor_sets(
        command_buffer,
        P::BIND_POINT,
        layout.vk_pipeline_layout(),
        0,
        descriptor_sets,
        &[],
    );
}

/// Checks a push constant write of `size` bytes at `offset` against the layout's ranges.
///
/// Every byte must be covered for each stage in `stage_flags`, and `stage_flags` must include
/// all stages of every range the write overlaps.
fn check_push_constant_ranges(
    ranges: &[vk::PushConstantRange],
    stage_flags: vk::ShaderStageFlags,
    offset: u32,
    size: usize,
) -> Result<()> {
    anyhow::ensure!(!stage_flags.is_empty(), "push constants need at least one stage");
    anyhow::ensure!(size > 0, "push constants must not be empty");

    let start = u64::from(offset);
    let end = start + size as u64;
    let range_end = |range: &vk::PushConstantRange| u64::from(range.offset) + u64::from(range.size);

    for range in ranges {
        let overlaps = u64::from(range.offset) < end && start < range_end(range);
        anyhow::ensure!(
            !overlaps || stage_flags.contains(range.stage_flags),
            "push constants [{}, {}) for {:?} overlap range [{}, {}) declared for {:?}",
            start,
            end,
            stage_flags,
            range.offset,
            range_end(range),
            range.stage_flags
        );
    }

    let raw = stage_flags.as_raw();
    for stage in (0..u32::BITS)
        .map(|bit| 1u32 << bit)
        .filter(|bit| raw & bit != 0)
        .map(vk::ShaderStageFlags::from_raw)
    {
        let mut cursor = start;
        while cursor < end {
            cursor = ranges
                .iter()
                .filter(|range| range.stage_flags.contains(stage))
                .filter(|range| u64::from(range.offset) <= cursor && cursor < range_end(range))
                .map(range_end)
                .max()
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "push constant byte {} for {:?} is outside the pipeline layout ranges",
                        cursor,
                        stage
                    )
                })?;
        }
    }
    Ok(())
}

/// Records `value` as push constants.
pub fn push_constants<R: CommandRecorder, P: Pipeline, T: bytemuck::Pod>(
    recorder: &R,
    command_buffer: vk::CommandBuffer,
    layout: PipelineLayoutRef<'_, P>,
    stage_flags: vk::ShaderStageFlags,
    offset: u32,
    value: &T,
) -> Result<()> {
    let constants = bytemuck::bytes_of(value);
    check_push_constant_ranges(
        layout.push_constant_ranges(),
        stage_flags,
        offset,
        constants.len(),
    )?;

    recorder.cmd_push_constants(
        command_buffer,
        layout.vk_pipeline_layout(),
        stage_flags,
        offset,
        constants,
    );
    Ok(())
}

pub fn trace_rays<R: TraceRaysRecorder>(
    recorder: &R,
    command_buffer: vk::CommandBuffer,
    regions: &TraceRaysRegions,
    extent: vk::Extent3D,
) {
    log::debug!(
        "trace rays {}x{}x{} from raygen record {:#x}",
        extent.width,
        extent.height,
        extent.depth,
        regions.raygen.device_address
    );
    recorder.cmd_trace_rays(command_buffer, regions, extent);
}

pub fn begin_single_time_command(
    command_pool: vk::CommandPool,
    device: &ash::Device,
) -> Result<vk::CommandBuffer> {
    let command_buffer_allocate_info = vk::CommandBufferAllocateInfo::default()
        .command_buffer_count(1)
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY);

    let command_buffer = unsafe { device.allocate_command_buffers(&command_buffer_allocate_info)? }[0];

    let begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        device.begin_command_buffer(command_buffer, &begin_info)?;
    }

    Ok(command_buffer)
}

pub fn end_single_time_command(
    command_buffer: vk::CommandBuffer,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    device: &ash::Device,
) -> Result<()> {
    let command_buffers = [command_buffer];
    let submitted = unsafe {
        device.end_command_buffer(command_buffer).and_then(|_| {
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            device.queue_submit(queue, &[submit_info], vk::Fence::null())?;
            device.queue_wait_idle(queue)
        })
    };

    unsafe {
        device.free_command_buffers(command_pool, &command_buffers);
    }
    submitted?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedCommand {
        BindPipeline {
            bind_point: vk::PipelineBindPoint,
            pipeline: vk::Pipeline,
        },
        BindDescriptorSets {
            bind_point: vk::PipelineBindPoint,
            layout: vk::PipelineLayout,
            first_set: u32,
            descriptor_sets: Vec<vk::DescriptorSet>,
        },
        PushConstants {
            layout: vk::PipelineLayout,
            stage_flags: vk::ShaderStageFlags,
            offset: u32,
            constants: Vec<u8>,
        },
    }

    #[derive(Default)]
    pub struct MockRecorder {
        pub commands: RefCell<Vec<RecordedCommand>>,
    }

    impl CommandRecorder for MockRecorder {
        fn cmd_bind_pipeline(
            &self,
            _command_buffer: vk::CommandBuffer,
            bind_point: vk::PipelineBindPoint,
            pipeline: vk::Pipeline,
        ) {
            self.commands
                .borrow_mut()
                .push(RecordedCommand::BindPipeline {
                    bind_point,
                    pipeline,
                });
        }

        fn cmd_bind_descriptor_sets(
            &self,
            _command_buffer: vk::CommandBuffer,
            bind_point: vk::PipelineBindPoint,
            layout: vk::PipelineLayout,
            first_set: u32,
            descriptor_sets: &[vk::DescriptorSet],
            _dynamic_offsets: &[u32],
        ) {
            self.commands
                .borrow_mut()
                .push(RecordedCommand::BindDescriptorSets {
                    bind_point,
                    layout,
                    first_set,
                    descriptor_sets: descriptor_sets.to_vec(),
                });
        }

        fn cmd_push_constants(
            &self,
            _command_buffer: vk::CommandBuffer,
            layout: vk::PipelineLayout,
            stage_flags: vk::ShaderStageFlags,
            offset: u32,
            constants: &[u8],
        ) {
            self.commands
                .borrow_mut()
                .push(RecordedCommand::PushConstants {
                    layout,
                    stage_flags,
                    offset,
                    constants: constants.to_vec(),
                });
        }
    }

    #[derive(Default)]
    struct MockTraceRays {
        calls: RefCell<Vec<(vk::DeviceAddress, vk::DeviceAddress, vk::Extent3D)>>,
    }

    impl TraceRaysRecorder for MockTraceRays {
        fn cmd_trace_rays(
            &self,
            _command_buffer: vk::CommandBuffer,
            regions: &TraceRaysRegions,
            extent: vk::Extent3D,
        ) {
            self.calls.borrow_mut().push((
                regions.raygen.device_address,
                regions.miss.device_address,
                extent,
            ));
        }
    }

    struct ComputeLike(vk::Pipeline);

    impl Pipeline for ComputeLike {
        const BIND_POINT: vk::PipelineBindPoint = vk::PipelineBindPoint::COMPUTE;

        fn vk_pipeline(&self) -> vk::Pipeline {
            self.0
        }
    }

    #[test]
    fn test_bind_pipeline_uses_bind_point_of_pipeline_kind() {
        let recorder = MockRecorder::default();
        let pipeline = ComputeLike(vk::Pipeline::from_raw(7));
        bind_pipeline(&recorder, vk::CommandBuffer::null(), &pipeline);

        assert_eq!(
            recorder.commands.into_inner(),
            vec![RecordedCommand::BindPipeline {
                bind_point: vk::PipelineBindPoint::COMPUTE,
                pipeline: vk::Pipeline::from_raw(7),
            }]
        );
    }

    #[test]
    fn test_bind_descriptors_forwards_layout_and_sets() {
        let recorder = MockRecorder::default();
        let pipeline = ComputeLike(vk::Pipeline::from_raw(7));
        let layout = PipelineLayoutRef::new(&pipeline, vk::PipelineLayout::from_raw(3), &[]);
        let sets = [vk::DescriptorSet::from_raw(10), vk::DescriptorSet::from_raw(11)];
        bind_descriptors(&recorder, vk::CommandBuffer::null(), layout, &sets);

        assert_eq!(
            recorder.commands.into_inner(),
            vec![RecordedCommand::BindDescriptorSets {
                bind_point: vk::PipelineBindPoint::COMPUTE,
                layout: vk::PipelineLayout::from_raw(3),
                first_set: 0,
                descriptor_sets: sets.to_vec(),
            }]
        );
    }

    #[test]
    fn test_push_constants_within_range() {
        let recorder = MockRecorder::default();
        let pipeline = ComputeLike(vk::Pipeline::from_raw(7));
        let ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(16)];
        let layout = PipelineLayoutRef::new(&pipeline, vk::PipelineLayout::from_raw(3), &ranges);

        push_constants(
            &recorder,
            vk::CommandBuffer::null(),
            layout,
            vk::ShaderStageFlags::COMPUTE,
            8,
            &[1u32, 2u32],
        )
        .unwrap();

        let commands = recorder.commands.into_inner();
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            RecordedCommand::PushConstants {
                offset, constants, ..
            } => {
                assert_eq!(*offset, 8);
                assert_eq!(constants.as_slice(), bytemuck::bytes_of(&[1u32, 2u32]));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_push_constants_outside_range_is_rejected() {
        let recorder = MockRecorder::default();
        let pipeline = ComputeLike(vk::Pipeline::from_raw(7));
        let ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(8)];
        let layout = PipelineLayoutRef::new(&pipeline, vk::PipelineLayout::from_raw(3), &ranges);

        let overflow = push_constants(
            &recorder,
            vk::CommandBuffer::null(),
            layout,
            vk::ShaderStageFlags::COMPUTE,
            4,
            &[0u32, 0u32],
        );
        let wrong_stage = push_constants(
            &recorder,
            vk::CommandBuffer::null(),
            layout,
            vk::ShaderStageFlags::FRAGMENT,
            0,
            &0u32,
        );

        assert!(overflow.is_err());
        assert!(wrong_stage.is_err());
        assert!(recorder.commands.into_inner().is_empty());
    }

    fn raygen_miss_layout_ranges() -> [vk::PushConstantRange; 3] {
        [
            vk::PushConstantRange::default()
                .stage_flags(vk::ShaderStageFlags::RAYGEN_KHR)
                .offset(0)
                .size(4),
            vk::PushConstantRange::default()
                .stage_flags(vk::ShaderStageFlags::RAYGEN_KHR)
                .offset(4)
                .size(4),
            vk::PushConstantRange::default()
                .stage_flags(vk::ShaderStageFlags::RAYGEN_KHR | vk::ShaderStageFlags::MISS_KHR)
                .offset(16)
                .size(8),
        ]
    }

    #[test]
    fn test_push_constants_empty_stage_flags_is_rejected() {
        let recorder = MockRecorder::default();
        let pipeline = ComputeLike(vk::Pipeline::from_raw(7));
        let ranges = raygen_miss_layout_ranges();
        let layout = PipelineLayoutRef::new(&pipeline, vk::PipelineLayout::from_raw(3), &ranges);

        let result = push_constants(
            &recorder,
            vk::CommandBuffer::null(),
            layout,
            vk::ShaderStageFlags::empty(),
            0,
            &0u32,
        );

        assert!(result.is_err());
        assert!(recorder.commands.into_inner().is_empty());
    }

    #[test]
    fn test_push_constants_must_name_every_stage_of_shared_range() {
        let recorder = MockRecorder::default();
        let pipeline = ComputeLike(vk::Pipeline::from_raw(7));
        let ranges = raygen_miss_layout_ranges();
        let layout = PipelineLayoutRef::new(&pipeline, vk::PipelineLayout::from_raw(3), &ranges);

        let raygen_only = push_constants(
            &recorder,
            vk::CommandBuffer::null(),
            layout,
            vk::ShaderStageFlags::RAYGEN_KHR,
            16,
            &[0u32, 0u32],
        );
        assert!(raygen_only.is_err());
        assert!(recorder.commands.borrow().is_empty());

        push_constants(
            &recorder,
            vk::CommandBuffer::null(),
            layout,
            vk::ShaderStageFlags::RAYGEN_KHR | vk::ShaderStageFlags::MISS_KHR,
            16,
            &[0u32, 0u32],
        )
        .unwrap();
        assert_eq!(recorder.commands.into_inner().len(), 1);
    }

    #[test]
    fn test_push_constants_spanning_adjacent_ranges() {
        let recorder = MockRecorder::default();
        let pipeline = ComputeLike(vk::Pipeline::from_raw(7));
        let ranges = raygen_miss_layout_ranges();
        let layout = PipelineLayoutRef::new(&pipeline, vk::PipelineLayout::from_raw(3), &ranges);

        push_constants(
            &recorder,
            vk::CommandBuffer::null(),
            layout,
            vk::ShaderStageFlags::RAYGEN_KHR,
            0,
            &[1u32, 2u32],
        )
        .unwrap();

        // [8, 16) is a gap between the declared ranges.
        let across_gap = push_constants(
            &recorder,
            vk::CommandBuffer::null(),
            layout,
            vk::ShaderStageFlags::RAYGEN_KHR,
            4,
            &[1u32, 2u32],
        );
        assert!(across_gap.is_err());
        assert_eq!(recorder.commands.into_inner().len(), 1);
    }

    #[test]
    fn test_push_constants_range_end_does_not_overflow() {
        let recorder = MockRecorder::default();
        let pipeline = ComputeLike(vk::Pipeline::from_raw(7));
        let ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::RAYGEN_KHR)
            .offset(u32::MAX - 3)
            .size(8)];
        let layout = PipelineLayoutRef::new(&pipeline, vk::PipelineLayout::from_raw(3), &ranges);

        let result = push_constants(
            &recorder,
            vk::CommandBuffer::null(),
            layout,
            vk::ShaderStageFlags::RAYGEN_KHR,
            0,
            &0u32,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_trace_rays_forwards_regions_and_extent() {
        let recorder = MockTraceRays::default();
        let mut regions = TraceRaysRegions::default();
        regions.raygen.device_address = 0x4000;
        regions.miss.device_address = 0x4040;
        let extent = vk::Extent3D {
            width: 16,
            height: 8,
            depth: 1,
        };
        trace_rays(&recorder, vk::CommandBuffer::null(), &regions, extent);

        let calls = recorder.calls.into_inner();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 0x4000);
        assert_eq!(calls[0].1, 0x4040);
        assert_eq!(
            (calls[0].2.width, calls[0].2.height, calls[0].2.depth),
            (16, 8, 1)
        );
    }
}
