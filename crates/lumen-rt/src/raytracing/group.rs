use anyhow::{
    bail,
    ensure,
    Result,
};
use ash::vk;
use serde::Deserialize;

/// Ray tracing shader stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStageKind {
    Raygen,
    Miss,
    ClosestHit,
    AnyHit,
    Intersection,
    Callable,
}

impl ShaderStageKind {
    pub fn vk_stage_flags(&self) -> vk::ShaderStageFlags {
        match self {
            ShaderStageKind::Raygen => vk::ShaderStageFlags::RAYGEN_KHR,
            ShaderStageKind::Miss => vk::ShaderStageFlags::MISS_KHR,
            ShaderStageKind::ClosestHit => vk::ShaderStageFlags::CLOSEST_HIT_KHR,
            ShaderStageKind::AnyHit => vk::ShaderStageFlags::ANY_HIT_KHR,
            ShaderStageKind::Intersection => vk::ShaderStageFlags::INTERSECTION_KHR,
            ShaderStageKind::Callable => vk::ShaderStageFlags::CALLABLE_KHR,
        }
    }
}

pub fn combined_stage_flags(stages: &[ShaderStageKind]) -> vk::ShaderStageFlags {
    stages
        .iter()
        .fold(vk::ShaderStageFlags::empty(), |flags, stage| {
            flags | stage.vk_stage_flags()
        })
}

/// The four regions of a shader binding table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderGroupKind {
    Raygen,
    Miss,
    Hit,
    Callable,
}

/// One entry of the shader group table. Shader indices refer to the pipeline's stage list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShaderGroup {
    Raygen {
        shader: u32,
    },
    Miss {
        shader: u32,
    },
    Callable {
        shader: u32,
    },
    TrianglesHit {
        closest_hit: Option<u32>,
        any_hit: Option<u32>,
    },
    ProceduralHit {
        intersection: u32,
        closest_hit: Option<u32>,
        any_hit: Option<u32>,
    },
}

impl ShaderGroup {
    pub fn kind(&self) -> ShaderGroupKind {
        match self {
            ShaderGroup::Raygen { .. } => ShaderGroupKind::Raygen,
            ShaderGroup::Miss { .. } => ShaderGroupKind::Miss,
            ShaderGroup::Callable { .. } => ShaderGroupKind::Callable,
            ShaderGroup::TrianglesHit { .. } | ShaderGroup::ProceduralHit { .. } => {
                ShaderGroupKind::Hit
            }
        }
    }

    /// (shader index, expected stage) pairs referenced by this group.
    fn referenced_shaders(&self) -> Vec<(u32, ShaderStageKind)> {
        let mut shaders = Vec::with_capacity(3);
        match *self {
            ShaderGroup::Raygen { shader } => shaders.push((shader, ShaderStageKind::Raygen)),
            ShaderGroup::Miss { shader } => shaders.push((shader, ShaderStageKind::Miss)),
            ShaderGroup::Callable { shader } => shaders.push((shader, ShaderStageKind::Callable)),
            ShaderGroup::TrianglesHit {
                closest_hit,
                any_hit,
            } => {
                shaders.extend(closest_hit.map(|i| (i, ShaderStageKind::ClosestHit)));
                shaders.extend(any_hit.map(|i| (i, ShaderStageKind::AnyHit)));
            }
            ShaderGroup::ProceduralHit {
                intersection,
                closest_hit,
                any_hit,
            } => {
                shaders.push((intersection, ShaderStageKind::Intersection));
                shaders.extend(closest_hit.map(|i| (i, ShaderStageKind::ClosestHit)));
                shaders.extend(any_hit.map(|i| (i, ShaderStageKind::AnyHit)));
            }
        }
        shaders
    }

    /// Checks that every referenced shader exists in `stages` and has the stage this group expects.
    pub fn validate(&self, stages: &[ShaderStageKind]) -> Result<()> {
        if let ShaderGroup::TrianglesHit {
            closest_hit: None,
            any_hit: None,
        } = self
        {
            bail!("triangles hit group without closest hit or any hit shader");
        }

        for (index, expected) in self.referenced_shaders() {
            let Some(actual) = stages.get(index as usize) else {
                bail!(
                    "{:?} group references shader {} but only {} shaders exist",
                    self.kind(),
                    index,
                    stages.len()
                );
            };
            ensure!(
                *actual == expected,
                "{:?} group expects shader {} to be a {:?} stage, found {:?}",
                self.kind(),
                index,
                expected,
                actual
            );
        }
        Ok(())
    }

    pub fn to_vk(&self) -> vk::RayTracingShaderGroupCreateInfoKHR<'static> {
        let unused = vk::SHADER_UNUSED_KHR;
        let create_info = vk::RayTracingShaderGroupCreateInfoKHR::default();
        match *self {
            ShaderGroup::Raygen { shader }
            | ShaderGroup::Miss { shader }
            | ShaderGroup::Callable { shader } => create_info
                .ty(vk::RayTracingShaderGroupTypeKHR::GENERAL)
                .general_shader(shader)
                .closest_hit_shader(unused)
                .any_hit_shader(unused)
                .intersection_shader(unused),
            ShaderGroup::TrianglesHit {
                closest_hit,
                any_hit,
            } => create_info
                .ty(vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP)
                .general_shader(unused)
                .closest_hit_shader(closest_hit.unwrap_or(unused))
                .any_hit_shader(any_hit.unwrap_or(unused))
                .intersection_shader(unused),
            ShaderGroup::ProceduralHit {
                intersection,
                closest_hit,
                any_hit,
            } => create_info
                .ty(vk::RayTracingShaderGroupTypeKHR::PROCEDURAL_HIT_GROUP)
                .general_shader(unused)
                .closest_hit_shader(closest_hit.unwrap_or(unused))
                .any_hit_shader(any_hit.unwrap_or(unused))
                .intersection_shader(intersection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAGES: [ShaderStageKind; 5] = [
        ShaderStageKind::Raygen,
        ShaderStageKind::Miss,
        ShaderStageKind::ClosestHit,
        ShaderStageKind::AnyHit,
        ShaderStageKind::Intersection,
    ];

    #[test]
    fn test_group_kind() {
        assert_eq!(ShaderGroup::Raygen { shader: 0 }.kind(), ShaderGroupKind::Raygen);
        assert_eq!(ShaderGroup::Callable { shader: 0 }.kind(), ShaderGroupKind::Callable);
        assert_eq!(
            ShaderGroup::ProceduralHit {
                intersection: 4,
                closest_hit: None,
                any_hit: None,
            }
            .kind(),
            ShaderGroupKind::Hit
        );
    }

    #[test]
    fn test_general_group_to_vk() {
        let info = ShaderGroup::Miss { shader: 1 }.to_vk();
        assert_eq!(info.ty, vk::RayTracingShaderGroupTypeKHR::GENERAL);
        assert_eq!(info.general_shader, 1);
        assert_eq!(info.closest_hit_shader, vk::SHADER_UNUSED_KHR);
        assert_eq!(info.any_hit_shader, vk::SHADER_UNUSED_KHR);
        assert_eq!(info.intersection_shader, vk::SHADER_UNUSED_KHR);
    }

    #[test]
    fn test_hit_groups_to_vk() {
        let triangles = ShaderGroup::TrianglesHit {
            closest_hit: Some(2),
            any_hit: None,
        }
        .to_vk();
        assert_eq!(triangles.ty, vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP);
        assert_eq!(triangles.general_shader, vk::SHADER_UNUSED_KHR);
        assert_eq!(triangles.closest_hit_shader, 2);
        assert_eq!(triangles.any_hit_shader, vk::SHADER_UNUSED_KHR);

        let procedural = ShaderGroup::ProceduralHit {
            intersection: 4,
            closest_hit: Some(2),
            any_hit: Some(3),
        }
        .to_vk();
        assert_eq!(procedural.ty, vk::RayTracingShaderGroupTypeKHR::PROCEDURAL_HIT_GROUP);
        assert_eq!(procedural.intersection_shader, 4);
        assert_eq!(procedural.any_hit_shader, 3);
    }

    #[test]
    fn test_validate() {
        assert!(ShaderGroup::Raygen { shader: 0 }.validate(&STAGES).is_ok());
        assert!(ShaderGroup::ProceduralHit {
            intersection: 4,
            closest_hit: Some(2),
            any_hit: Some(3),
        }
        .validate(&STAGES)
        .is_ok());

        // wrong stage kind
        assert!(ShaderGroup::Miss { shader: 0 }.validate(&STAGES).is_err());
        // out of range
        assert!(ShaderGroup::Raygen { shader: 9 }.validate(&STAGES).is_err());
        // empty hit group
        assert!(ShaderGroup::TrianglesHit {
            closest_hit: None,
            any_hit: None,
        }
        .validate(&STAGES)
        .is_err());
    }

    #[test]
    fn test_combined_stage_flags() {
        assert_eq!(
            combined_stage_flags(&[ShaderStageKind::Raygen, ShaderStageKind::ClosestHit]),
            vk::ShaderStageFlags::RAYGEN_KHR | vk::ShaderStageFlags::CLOSEST_HIT_KHR
        );
        assert_eq!(combined_stage_flags(&[]), vk::ShaderStageFlags::empty());
    }
}
