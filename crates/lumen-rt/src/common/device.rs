use crate::utils::tool::convert_char_to_string;
use anyhow::{
    bail,
    Result,
};
use ash::vk;
use std::{
    collections::HashSet,
    ffi::CStr,
};

const DEVICE_EXTENSIONS: [&CStr; 3] = [
    ash::khr::deferred_host_operations::NAME,
    ash::khr::acceleration_structure::NAME,
    ash::khr::ray_tracing_pipeline::NAME,
];

/// Picks the first device exposing a compute queue, the ray tracing extensions and the
/// `rayTracingPipeline` feature. Discrete GPUs are preferred.
pub fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32)> {
    let physical_devices = unsafe { instance.enumerate_physical_devices()? };

    log::debug!(
        "{} devices (GPU) found with vulkan support.",
        physical_devices.len()
    );

    let mut result = None;
    for &physical_device in physical_devices.iter() {
        let Some(queue_family_index) = is_physical_device_suitable(instance, physical_device)?
        else {
            continue;
        };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = convert_char_to_string(&properties.device_name)?;
        log::debug!("suitable device: {} ({:?})", device_name, properties.device_type);

        let is_discrete = properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
        match result {
            None => result = Some((physical_device, queue_family_index, is_discrete)),
            Some((_, _, false)) if is_discrete => {
                result = Some((physical_device, queue_family_index, is_discrete))
            }
            _ => {}
        }
    }

    match result {
        None => bail!("Failed to find a GPU with ray tracing pipeline support!"),
        Some((physical_device, queue_family_index, _)) => Ok((physical_device, queue_family_index)),
    }
}

pub fn find_compute_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Option<u32> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    queue_families
        .iter()
        .position(|queue_family| {
            queue_family.queue_count > 0
                && queue_family.queue_flags.contains(vk::QueueFlags::COMPUTE)
        })
        .map(|index| index as u32)
}

fn is_physical_device_suitable(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<Option<u32>> {
    let Some(queue_family_index) = find_compute_queue_family(instance, physical_device) else {
        return Ok(None);
    };
    if !check_device_extension_support(instance, physical_device)? {
        return Ok(None);
    }

    let mut raytracing_pipeline_features =
        vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default();
    let mut buffer_device_address_features =
        vk::PhysicalDeviceBufferDeviceAddressFeatures::default();
    let mut features = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut raytracing_pipeline_features)
        .push_next(&mut buffer_device_address_features);
    unsafe { instance.get_physical_device_features2(physical_device, &mut features) };

    let is_supported = raytracing_pipeline_features.ray_tracing_pipeline == vk::TRUE
        && buffer_device_address_features.buffer_device_address == vk::TRUE;
    Ok(is_supported.then_some(queue_family_index))
}

pub fn create_logical_device(
    queue_family_index: u32,
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<Device> {
    let queue_priorities = [1.0_f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family_index)
        .queue_priorities(&queue_priorities)];

    // raytracing_pipeline_features
    let mut raytracing_pipeline_features =
        vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default().ray_tracing_pipeline(true);

    // acceleration_structure_features
    let mut acceleration_structure_features =
        vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default().acceleration_structure(true);

    // buffer_device_address_features
    let mut buffer_device_address_features =
        vk::PhysicalDeviceBufferDeviceAddressFeatures::default().buffer_device_address(true);

    // physical_device_features
    let mut physical_device_features = vk::PhysicalDeviceFeatures2::default()
        .features(vk::PhysicalDeviceFeatures::default().shader_int64(true))
        .push_next(&mut raytracing_pipeline_features)
        .push_next(&mut acceleration_structure_features)
        .push_next(&mut buffer_device_address_features);

    let extension_names = DEVICE_EXTENSIONS
        .iter()
        .map(|extension| extension.as_ptr())
        .collect::<Vec<_>>();
    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut physical_device_features);
    let device = Device::new(&device_create_info, physical_device, instance)?;
    Ok(device)
}

fn check_device_extension_support(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<bool> {
    let available_extensions =
        unsafe { instance.enumerate_device_extension_properties(physical_device)? };

    let mut required_extensions: HashSet<String> = DEVICE_EXTENSIONS
        .iter()
        .map(|extension| extension.to_string_lossy().to_string())
        .collect();

    for extension in available_extensions.iter() {
        let extension_name = convert_char_to_string(&extension.extension_name)?;
        required_extensions.remove(&extension_name);
    }

    if !required_extensions.is_empty() {
        log::debug!("missing device extensions: {:?}", required_extensions);
    }
    Ok(required_extensions.is_empty())
}

pub struct Device {
    device: ash::Device,
}

impl Device {
    pub fn new(
        device_create_info: &vk::DeviceCreateInfo,
        physical_device: vk::PhysicalDevice,
        instance: &ash::Instance,
    ) -> Result<Self> {
        let device = unsafe { instance.create_device(physical_device, device_create_info, None)? };
        Ok(Self { device })
    }

    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
        }
    }
}
