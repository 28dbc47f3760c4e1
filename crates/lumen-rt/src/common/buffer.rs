use super::memory::find_memory_type;
use anyhow::{
    ensure,
    Result,
};
use ash::vk;

fn ensure_device_addressable(usage_flags: vk::BufferUsageFlags) -> Result<()> {
    ensure!(
        usage_flags.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS),
        "buffer with usage {:?} has no SHADER_DEVICE_ADDRESS",
        usage_flags
    );
    Ok(())
}

fn flush_mapped_memory(
    device: &ash::Device,
    device_memory: vk::DeviceMemory,
    size: vk::DeviceSize,
) -> Result<()> {
    let mapped_range = [vk::MappedMemoryRange::default()
        .memory(device_memory)
        .size(size)];
    unsafe {
        device.flush_mapped_memory_ranges(&mapped_range)?;
    }
    Ok(())
}

fn invalidate_mapped_memory(
    device: &ash::Device,
    device_memory: vk::DeviceMemory,
    size: vk::DeviceSize,
) -> Result<()> {
    let mapped_range = [vk::MappedMemoryRange::default()
        .memory(device_memory)
        .size(size)];
    unsafe {
        device.invalidate_mapped_memory_ranges(&mapped_range)?;
    }
    Ok(())
}

/// A `vk::Buffer` bound to its own dedicated allocation.
///
/// Memory is mapped only while copying in or out, so the buffer does not keep a host pointer around.
pub struct Buffer {
    buffer: vk::Buffer,
    device: ash::Device,
    device_memory: vk::DeviceMemory,
    memory_property_flags: vk::MemoryPropertyFlags,
    usage_flags: vk::BufferUsageFlags,
    size: vk::DeviceSize,
}

impl Buffer {
    pub fn new(
        size: vk::DeviceSize,
        usage_flags: vk::BufferUsageFlags,
        memory_property_flags: vk::MemoryPropertyFlags,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        instance: &ash::Instance,
    ) -> Result<Self> {
        ensure!(size > 0, "cannot create an empty buffer");

        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage_flags)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&create_info, None)? };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let mut alloc_flags_info =
            if usage_flags.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
                vk::MemoryAllocateFlagsInfo::default()
                    .flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS)
                    .device_mask(0)
            } else {
                vk::MemoryAllocateFlagsInfo::default()
            };

        let memory_type = match find_memory_type(
            mem_requirements.memory_type_bits,
            memory_property_flags,
            physical_device,
            instance,
        ) {
            Ok(memory_type) => memory_type,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type)
            .push_next(&mut alloc_flags_info);

        let device_memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(device_memory) => device_memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        // from here on Drop releases both the buffer and its memory
        let buffer = Self {
            buffer,
            device,
            device_memory,
            memory_property_flags,
            usage_flags,
            size,
        };
        unsafe {
            buffer
                .device
                .bind_buffer_memory(buffer.buffer, buffer.device_memory, 0)?;
        }

        log::debug!(
            "created buffer {:?}: {} bytes, usage {:?}",
            buffer.buffer,
            size,
            usage_flags
        );
        Ok(buffer)
    }

    /// Creates a host visible buffer and fills it with `data`.
    pub fn with_data(
        data: &[u8],
        usage_flags: vk::BufferUsageFlags,
        memory_property_flags: vk::MemoryPropertyFlags,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        instance: &ash::Instance,
    ) -> Result<Self> {
        let buffer = Self::new(
            data.len() as vk::DeviceSize,
            usage_flags,
            memory_property_flags,
            physical_device,
            device,
            instance,
        )?;
        buffer.update_buffer(data)?;
        Ok(buffer)
    }

    pub fn update_buffer(&self, data: &[u8]) -> Result<()> {
        ensure!(
            self.is_host_visible(),
            "buffer {:?} is not host visible",
            self.buffer
        );
        ensure!(
            data.len() as vk::DeviceSize <= self.size,
            "{} bytes do not fit into a buffer of {} bytes",
            data.len(),
            self.size
        );

        unsafe {
            let mapped_memory = self.device.map_memory(
                self.device_memory,
                0,
                self.size,
                vk::MemoryMapFlags::empty(),
            )?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped_memory as *mut u8, data.len());
        }

        let flushed = if !self
            .memory_property_flags
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        {
            flush_mapped_memory(&self.device, self.device_memory, vk::WHOLE_SIZE)
        } else {
            Ok(())
        };
        unsafe { self.device.unmap_memory(self.device_memory) };
        flushed
    }

    /// Copies the whole buffer content back to the host.
    pub fn read_buffer(&self) -> Result<Vec<u8>> {
        ensure!(
            self.is_host_visible(),
            "buffer {:?} is not host visible",
            self.buffer
        );

        let mut data = vec![0u8; self.size as usize];
        unsafe {
            let mapped_memory = self.device.map_memory(
                self.device_memory,
                0,
                self.size,
                vk::MemoryMapFlags::empty(),
            )?;
            if !self
                .memory_property_flags
                .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
            {
                if let Err(e) =
                    invalidate_mapped_memory(&self.device, self.device_memory, vk::WHOLE_SIZE)
                {
                    self.device.unmap_memory(self.device_memory);
                    return Err(e);
                }
            }
            std::ptr::copy_nonoverlapping(
                mapped_memory as *const u8,
                data.as_mut_ptr(),
                data.len(),
            );
            self.device.unmap_memory(self.device_memory);
        }
        Ok(data)
    }

    pub fn device_address(&self) -> Result<vk::DeviceAddress> {
        ensure_device_addressable(self.usage_flags)?;
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer);
        Ok(unsafe { self.device.get_buffer_device_address(&info) })
    }

    pub fn vk_buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    fn is_host_visible(&self) -> bool {
        self.memory_property_flags
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.device_memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_address_requires_usage_flag() {
        assert!(ensure_device_addressable(
            vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
        )
        .is_ok());
        assert!(ensure_device_addressable(vk::BufferUsageFlags::STORAGE_BUFFER).is_err());
        assert!(ensure_device_addressable(vk::BufferUsageFlags::empty()).is_err());
    }
}
