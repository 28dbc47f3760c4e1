use anyhow::{
    bail,
    Result,
};
use ash::vk;

pub fn find_memory_type(
    type_filter: u32,
    required_properties: vk::MemoryPropertyFlags,
    physical_device: vk::PhysicalDevice,
    instance: &ash::Instance,
) -> Result<u32> {
    let mem_props = unsafe { instance.get_physical_device_memory_properties(physical_device) };
    select_memory_type(&mem_props, type_filter, required_properties)
}

fn select_memory_type(
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    required_properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let memory_types = &mem_props.memory_types[..mem_props.memory_type_count as usize];
    for (type_i, mem_type) in memory_types.iter().enumerate() {
        if type_filter & (1 << type_i) != 0 && mem_type.property_flags.contains(required_properties)
        {
            return Ok(type_i as u32);
        }
    }
    bail!(
        "failed to find suitable memory type! type_filter: {:?}, properties: {:?}",
        type_filter,
        required_properties
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = flags.len() as u32;
        for (i, &property_flags) in flags.iter().enumerate() {
            props.memory_types[i].property_flags = property_flags;
        }
        props
    }

    #[test]
    fn test_select_memory_type() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host]);

        assert_eq!(select_memory_type(&props, 0b11, host).unwrap(), 1);
        assert_eq!(
            select_memory_type(&props, 0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
        // the filter excludes the only host visible type
        assert!(select_memory_type(&props, 0b01, host).is_err());
    }
}
