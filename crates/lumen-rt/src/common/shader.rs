use anyhow::{
    ensure,
    Context,
    Result,
};
use ash::vk;
use std::{
    io::Cursor,
    path::Path,
};

pub fn read_shader_code(shader_path: &Path) -> Result<Vec<u8>> {
    ensure!(
        shader_path.exists(),
        "Shader path does not exist: {:?}",
        shader_path
    );
    std::fs::read(shader_path).with_context(|| format!("failed to read {:?}", shader_path))
}

/// Reinterprets SPIR-V bytes as words, checking the magic number and length.
pub fn spirv_words(code: &[u8]) -> Result<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(code)).context("invalid SPIR-V binary")?;
    Ok(words)
}

pub struct ShaderModule {
    shader_module: vk::ShaderModule,
    device: ash::Device,
}

impl ShaderModule {
    pub fn new(code: &[u8], device: ash::Device) -> Result<Self> {
        let words = spirv_words(code)?;
        let shader_module_create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let shader_module =
            unsafe { device.create_shader_module(&shader_module_create_info, None)? };
        Ok(Self {
            shader_module,
            device,
        })
    }

    pub fn vk_shader_module(&self) -> vk::ShaderModule {
        self.shader_module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.shader_module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spirv_words() {
        let mut code = Vec::new();
        for word in [0x0723_0203u32, 0x0001_0600, 0, 1, 0] {
            code.extend_from_slice(&word.to_le_bytes());
        }
        let words = spirv_words(&code).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], 0x0723_0203);
    }

    #[test]
    fn test_spirv_words_rejects_truncated_code() {
        let code = [0x03u8, 0x02, 0x23, 0x07, 0x00, 0x00];
        assert!(spirv_words(&code).is_err());
    }

    #[test]
    fn test_read_missing_shader() {
        assert!(read_shader_code(Path::new("/nonexistent/missing.rgen.spv")).is_err());
    }
}
