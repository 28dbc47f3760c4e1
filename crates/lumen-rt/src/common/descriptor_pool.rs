use anyhow::Result;
use ash::vk;

pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: ash::Device,
}

impl DescriptorPool {
    pub fn new(
        pool_sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
        device: ash::Device,
    ) -> Result<Self> {
        // sets are freed individually by DescriptorSet
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .pool_sizes(pool_sizes)
            .max_sets(max_sets);
        let pool = unsafe { device.create_descriptor_pool(&create_info, None)? };

        Ok(Self { pool, device })
    }

    pub fn vk_pool(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}
