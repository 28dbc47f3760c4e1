use super::{
    debug::DebugUtils,
    device::{
        create_logical_device,
        pick_physical_device,
        Device,
    },
    instance::Instance,
    layer::{
        check_layer_support,
        required_layer_names,
    },
};
use anyhow::{
    bail,
    Result,
};
use ash::vk;

/// Device-level entry points needed to build ray tracing pipelines.
///
/// Holds cloned dispatch tables only; it does not own the instance or device.
#[derive(Clone)]
pub struct RaytracingDevice {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub raytracing_pipeline: ash::khr::ray_tracing_pipeline::Device,
}

impl RaytracingDevice {
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
    ) -> Self {
        let raytracing_pipeline = ash::khr::ray_tracing_pipeline::Device::new(instance, device);
        Self {
            instance: instance.clone(),
            physical_device,
            device: device.clone(),
            raytracing_pipeline,
        }
    }
}

/// Headless Vulkan context: instance, optional validation, one logical device and a compute queue.
pub struct DeviceContext {
    raytracing_device: RaytracingDevice,
    queue: vk::Queue,
    queue_family_index: u32,
    device: Device,
    _debug_utils: Option<DebugUtils>,
    instance: Instance,
    _entry: ash::Entry,
}

impl DeviceContext {
    pub fn new(enable_validation: bool) -> Result<Self> {
        log::info!("loading vulkan entry");
        let entry = unsafe { ash::Entry::load()? };

        if enable_validation {
            if check_layer_support(&entry, &required_layer_names())? {
                log::info!("Validation layers are supported!");
            } else {
                bail!("Validation layers are not supported!");
            }
        }

        log::info!("creating instance");
        let instance = Instance::new(&entry, enable_validation)?;

        let debug_utils = if enable_validation {
            log::info!("setting up debug utils");
            Some(DebugUtils::new(&entry, instance.instance())?)
        } else {
            None
        };

        log::info!("picking physical device");
        let (physical_device, queue_family_index) = pick_physical_device(instance.instance())?;

        log::info!("creating logical device");
        let device = create_logical_device(queue_family_index, instance.instance(), physical_device)?;
        let queue = unsafe { device.ash_device().get_device_queue(queue_family_index, 0) };

        let raytracing_device =
            RaytracingDevice::new(instance.instance(), physical_device, device.ash_device());

        Ok(Self {
            raytracing_device,
            queue,
            queue_family_index,
            device,
            _debug_utils: debug_utils,
            instance,
            _entry: entry,
        })
    }

    pub fn raytracing_device(&self) -> &RaytracingDevice {
        &self.raytracing_device
    }

    pub fn ash_device(&self) -> &ash::Device {
        self.device.ash_device()
    }

    pub fn ash_instance(&self) -> &ash::Instance {
        self.instance.instance()
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.raytracing_device.physical_device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    pub fn device_wait_idle(&self) -> Result<()> {
        unsafe { self.ash_device().device_wait_idle()? };
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        if let Err(e) = self.device_wait_idle() {
            log::error!("failed to wait for device idle: {:?}", e);
        }
    }
}
