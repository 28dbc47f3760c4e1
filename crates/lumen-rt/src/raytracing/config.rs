use super::group::{
    combined_stage_flags,
    ShaderGroup,
    ShaderStageKind,
};
use anyhow::{
    ensure,
    Context,
    Result,
};
use ash::vk;
use serde::Deserialize;
use std::path::{
    Path,
    PathBuf,
};

fn default_entry_point() -> String {
    "main".to_owned()
}

fn default_max_recursion_depth() -> u32 {
    1
}

fn default_descriptor_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShaderStageConfig {
    pub stage: ShaderStageKind,
    /// SPIR-V file, relative paths are resolved against the SPIR-V root
    pub path: PathBuf,
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    Sampler,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformBuffer,
    StorageBuffer,
    AccelerationStructure,
}

impl DescriptorKind {
    pub fn vk_descriptor_type(&self) -> vk::DescriptorType {
        match self {
            DescriptorKind::Sampler => vk::DescriptorType::SAMPLER,
            DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorKind::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            DescriptorKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorKind::AccelerationStructure => {
                vk::DescriptorType::ACCELERATION_STRUCTURE_KHR
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DescriptorBindingConfig {
    pub binding: u32,
    #[serde(rename = "type")]
    pub descriptor_type: DescriptorKind,
    #[serde(default = "default_descriptor_count")]
    pub count: u32,
    pub stages: Vec<ShaderStageKind>,
}

impl DescriptorBindingConfig {
    pub fn to_vk(&self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.binding)
            .descriptor_type(self.descriptor_type.vk_descriptor_type())
            .descriptor_count(self.count)
            .stage_flags(combined_stage_flags(&self.stages))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushConstantConfig {
    pub stages: Vec<ShaderStageKind>,
    #[serde(default)]
    pub offset: u32,
    pub size: u32,
}

impl PushConstantConfig {
    pub fn to_vk(&self) -> vk::PushConstantRange {
        vk::PushConstantRange::default()
            .stage_flags(combined_stage_flags(&self.stages))
            .offset(self.offset)
            .size(self.size)
    }
}

/// JSON description of a ray tracing pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RaytracingPipelineConfig {
    pub shaders: Vec<ShaderStageConfig>,
    pub groups: Vec<ShaderGroup>,
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: u32,
    #[serde(default)]
    pub descriptor_set_layouts: Vec<Vec<DescriptorBindingConfig>>,
    #[serde(default)]
    pub push_constants: Vec<PushConstantConfig>,
}

impl RaytracingPipelineConfig {
    pub fn from_path(config_path: &Path) -> Result<Self> {
        ensure!(
            config_path.exists(),
            "Config doesn't exist: {:?}",
            config_path
        );
        let contents = std::fs::read_to_string(config_path)?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {:?}", config_path))?;
        log::debug!("loaded pipeline config {:?}", config_path);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"{
        "shaders": [
            { "stage": "raygen", "path": "trace/basic.rgen.spv" },
            { "stage": "miss", "path": "trace/basic.rmiss.spv" },
            { "stage": "closest_hit", "path": "/abs/basic.rchit.spv", "entry_point": "hit_main" }
        ],
        "groups": [
            { "type": "raygen", "shader": 0 },
            { "type": "miss", "shader": 1 },
            { "type": "triangles_hit", "closest_hit": 2 }
        ],
        "max_recursion_depth": 2,
        "descriptor_set_layouts": [
            [ { "binding": 0, "type": "storage_buffer", "stages": ["raygen", "closest_hit"] } ]
        ],
        "push_constants": [ { "stages": ["raygen"], "size": 8 } ]
    }"#;

    #[test]
    fn test_parse_config() {
        let config: RaytracingPipelineConfig = serde_json::from_str(BASIC).unwrap();

        assert_eq!(config.shaders.len(), 3);
        assert_eq!(config.shaders[0].stage, ShaderStageKind::Raygen);
        assert_eq!(config.shaders[0].entry_point, "main");
        assert_eq!(config.shaders[2].entry_point, "hit_main");
        assert_eq!(
            config.groups,
            vec![
                ShaderGroup::Raygen { shader: 0 },
                ShaderGroup::Miss { shader: 1 },
                ShaderGroup::TrianglesHit {
                    closest_hit: Some(2),
                    any_hit: None,
                },
            ]
        );
        assert_eq!(config.max_recursion_depth, 2);

        let binding = config.descriptor_set_layouts[0][0].to_vk();
        assert_eq!(binding.descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(
            binding.stage_flags,
            vk::ShaderStageFlags::RAYGEN_KHR | vk::ShaderStageFlags::CLOSEST_HIT_KHR
        );

        let range = config.push_constants[0].to_vk();
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 8);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::RAYGEN_KHR);
    }

    #[test]
    fn test_defaults() {
        let config: RaytracingPipelineConfig = serde_json::from_str(
            r#"{
                "shaders": [ { "stage": "raygen", "path": "a.rgen.spv" } ],
                "groups": [ { "type": "raygen", "shader": 0 } ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_recursion_depth, 1);
        assert!(config.descriptor_set_layouts.is_empty());
        assert!(config.push_constants.is_empty());
    }

    #[test]
    fn test_reject_unknown_group_type() {
        let result: Result<RaytracingPipelineConfig, _> = serde_json::from_str(
            r#"{
                "shaders": [ { "stage": "raygen", "path": "a.rgen.spv" } ],
                "groups": [ { "type": "mesh", "shader": 0 } ]
            }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_bundled_configs_parse() {
        let config_root = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs");
        let config = RaytracingPipelineConfig::from_path(&config_root.join("basic.json")).unwrap();
        assert_eq!(config.shaders.len(), 3);
        assert_eq!(config.groups.len(), 3);
        assert_eq!(config.groups[0], ShaderGroup::Raygen { shader: 0 });
        assert_eq!(config.push_constants[0].size, 8);
    }

    #[test]
    fn test_missing_config_file() {
        assert!(RaytracingPipelineConfig::from_path(Path::new("/nonexistent/pipeline.json")).is_err());
    }
}
