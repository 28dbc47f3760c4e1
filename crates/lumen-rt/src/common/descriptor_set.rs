use anyhow::Result;
use ash::vk;

pub struct DescriptorSet {
    descriptor_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: vk::DescriptorPool,
    device: ash::Device,
}

impl DescriptorSet {
    pub fn new(
        set_layouts: &[vk::DescriptorSetLayout],
        descriptor_pool: vk::DescriptorPool,
        device: ash::Device,
    ) -> Result<Self> {
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(descriptor_pool)
            .set_layouts(set_layouts);
        let descriptor_sets = unsafe { device.allocate_descriptor_sets(&allocate_info)? };

        Ok(Self {
            descriptor_sets,
            descriptor_pool,
            device,
        })
    }

    pub fn vk_descriptor_set(&self, index: usize) -> vk::DescriptorSet {
        self.descriptor_sets[index]
    }

    pub fn vk_descriptor_sets(&self) -> &[vk::DescriptorSet] {
        &self.descriptor_sets
    }
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self
                .device
                .free_descriptor_sets(self.descriptor_pool, &self.descriptor_sets)
            {
                log::error!("failed to free descriptor sets: {:?}", e);
            }
        }
    }
}
