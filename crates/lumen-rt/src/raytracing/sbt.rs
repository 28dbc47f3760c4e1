//! Shader binding table layout.
//!
//! Groups keep the order in which they were declared. Every group gets one record whose stride is
//! the driver's shader group base alignment, so any record can start a region passed to
//! `vkCmdTraceRaysKHR`. Consecutive groups of the same kind form one [`ShaderGroupInfo`] run.

use super::{
    group::ShaderGroupKind,
    properties::RaytracingPipelineProperties,
};
use crate::utils::math::align_up;
use anyhow::{
    bail,
    ensure,
    Result,
};
use ash::vk;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShaderGroupInfo {
    /// Number of shader records in this group
    pub num_entries: u64,
    /// Entry offset (not byte offset) of the first record within the table
    pub offset: vk::DeviceSize,
    /// Byte offset (not entry offset) of the first record within the table
    pub byte_offset: vk::DeviceSize,
}

impl ShaderGroupInfo {
    /// Region covering every record of this group.
    pub fn region(
        &self,
        table_address: vk::DeviceAddress,
        stride: vk::DeviceSize,
    ) -> vk::StridedDeviceAddressRegionKHR {
        vk::StridedDeviceAddressRegionKHR::default()
            .device_address(table_address + self.byte_offset)
            .stride(stride)
            .size(self.num_entries * stride)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderBindingTableGroupsInfo {
    pub raygen_groups_info: Vec<ShaderGroupInfo>,
    pub miss_groups_info: Vec<ShaderGroupInfo>,
    pub hit_groups_info: Vec<ShaderGroupInfo>,
    pub callable_groups_info: Vec<ShaderGroupInfo>,
    /// Byte offset one past the last record
    pub end_offset: vk::DeviceSize,
    /// Bytes needed to hold the whole table
    pub total_size: vk::DeviceSize,
}

impl ShaderBindingTableGroupsInfo {
    /// Lays out groups of the given kinds, in order.
    pub fn new<I>(kinds: I, properties: &RaytracingPipelineProperties) -> Result<Self>
    where
        I: IntoIterator<Item = ShaderGroupKind>,
    {
        properties.validate()?;
        let stride = properties.table_offset_size();

        let mut info = Self::default();
        let mut current: Option<(ShaderGroupKind, ShaderGroupInfo)> = None;
        let mut entry_count: u64 = 0;
        for kind in kinds {
            let continues_run = matches!(current, Some((current_kind, _)) if current_kind == kind);
            if continues_run {
                if let Some((_, group)) = current.as_mut() {
                    group.num_entries += 1;
                }
            } else {
                let group = ShaderGroupInfo {
                    num_entries: 1,
                    offset: entry_count,
                    byte_offset: entry_count * stride,
                };
                if let Some((finished_kind, finished)) = current.replace((kind, group)) {
                    info.groups_mut(finished_kind).push(finished);
                }
            }
            entry_count += 1;
        }
        if let Some((finished_kind, finished)) = current {
            info.groups_mut(finished_kind).push(finished);
        }

        info.end_offset = entry_count * stride;
        info.total_size = align_up(info.end_offset, stride);
        Ok(info)
    }

    pub fn groups(&self, kind: ShaderGroupKind) -> &[ShaderGroupInfo] {
        match kind {
            ShaderGroupKind::Raygen => &self.raygen_groups_info,
            ShaderGroupKind::Miss => &self.miss_groups_info,
            ShaderGroupKind::Hit => &self.hit_groups_info,
            ShaderGroupKind::Callable => &self.callable_groups_info,
        }
    }

    fn groups_mut(&mut self, kind: ShaderGroupKind) -> &mut Vec<ShaderGroupInfo> {
        match kind {
            ShaderGroupKind::Raygen => &mut self.raygen_groups_info,
            ShaderGroupKind::Miss => &mut self.miss_groups_info,
            ShaderGroupKind::Hit => &mut self.hit_groups_info,
            ShaderGroupKind::Callable => &mut self.callable_groups_info,
        }
    }

    /// All runs ordered by their position in the table.
    pub fn table_order(&self) -> Vec<(ShaderGroupKind, ShaderGroupInfo)> {
        let mut runs: Vec<_> = [
            ShaderGroupKind::Raygen,
            ShaderGroupKind::Miss,
            ShaderGroupKind::Hit,
            ShaderGroupKind::Callable,
        ]
        .iter()
        .flat_map(|&kind| self.groups(kind).iter().map(move |group| (kind, *group)))
        .collect();
        runs.sort_by_key(|(_, group)| group.offset);
        runs
    }

    pub fn entry_count(&self) -> u64 {
        self.table_order()
            .iter()
            .map(|(_, group)| group.num_entries)
            .sum()
    }

    /// Copies tightly packed group handles, as returned by `vkGetRayTracingShaderGroupHandlesKHR`,
    /// to the start of their records. Record padding stays zeroed.
    pub fn layout_handles(
        &self,
        handles: &[u8],
        properties: &RaytracingPipelineProperties,
    ) -> Result<Vec<u8>> {
        let handle_size = properties.table_entry_size() as usize;
        let stride = properties.table_offset_size() as usize;
        let entry_count = self.entry_count() as usize;
        ensure!(
            handles.len() >= entry_count * handle_size,
            "expected {} bytes of shader group handles, got {}",
            entry_count * handle_size,
            handles.len()
        );
        ensure!(
            entry_count * stride <= self.total_size as usize,
            "{} records of {} bytes do not fit into a table of {} bytes",
            entry_count,
            stride,
            self.total_size
        );

        let mut table = vec![0u8; self.total_size as usize];
        for (record, handle) in table
            .chunks_exact_mut(stride)
            .zip(handles.chunks_exact(handle_size))
            .take(entry_count)
        {
            record[..handle_size].copy_from_slice(handle);
        }
        Ok(table)
    }
}

/// The four regions passed to `vkCmdTraceRaysKHR`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceRaysRegions {
    pub raygen: vk::StridedDeviceAddressRegionKHR,
    pub miss: vk::StridedDeviceAddressRegionKHR,
    pub hit: vk::StridedDeviceAddressRegionKHR,
    pub callable: vk::StridedDeviceAddressRegionKHR,
}

impl TraceRaysRegions {
    /// Selects the `raygen_entry`-th raygen record and the first run of every other kind.
    /// Kinds without groups get an empty region.
    pub fn new(
        groups_info: &ShaderBindingTableGroupsInfo,
        table_address: vk::DeviceAddress,
        properties: &RaytracingPipelineProperties,
        raygen_entry: u64,
    ) -> Result<Self> {
        let stride = properties.table_offset_size();
        ensure!(
            table_address % stride == 0,
            "shader binding table address {:#x} is not aligned to {}",
            table_address,
            stride
        );

        let mut remaining = raygen_entry;
        let mut raygen = None;
        for group in groups_info.groups(ShaderGroupKind::Raygen) {
            if remaining < group.num_entries {
                raygen = Some(
                    vk::StridedDeviceAddressRegionKHR::default()
                        .device_address(table_address + group.byte_offset + remaining * stride)
                        .stride(stride)
                        .size(stride),
                );
                break;
            }
            remaining -= group.num_entries;
        }
        let Some(raygen) = raygen else {
            bail!("raygen entry {} does not exist", raygen_entry);
        };

        let first_region = |kind| {
            groups_info
                .groups(kind)
                .first()
                .map(|group| group.region(table_address, stride))
                .unwrap_or_default()
        };

        Ok(Self {
            raygen,
            miss: first_region(ShaderGroupKind::Miss),
            hit: first_region(ShaderGroupKind::Hit),
            callable: first_region(ShaderGroupKind::Callable),
        })
    }
}
