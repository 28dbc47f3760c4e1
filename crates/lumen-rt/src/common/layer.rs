use crate::utils::tool::convert_char_to_string;
use anyhow::Result;

const LAYER_KHRONOS_VALIDATION: &str = "VK_LAYER_KHRONOS_validation";

pub fn required_layer_names() -> Vec<&'static str> {
    vec![LAYER_KHRONOS_VALIDATION]
}

pub fn check_layer_support(entry: &ash::Entry, layer_names: &[&str]) -> Result<bool> {
    let layer_properties = unsafe { entry.enumerate_instance_layer_properties()? };

    if layer_properties.is_empty() {
        log::warn!("No available layers.");
        return Ok(false);
    }

    log::debug!("Instance Available Layers: ");
    let mut available_layer_names = Vec::with_capacity(layer_properties.len());
    for layer in layer_properties.iter() {
        let layer_name = convert_char_to_string(&layer.layer_name)?;
        log::debug!("\t{}", layer_name);
        available_layer_names.push(layer_name);
    }

    Ok(contains_all(&available_layer_names, layer_names))
}

fn contains_all(available: &[String], required: &[&str]) -> bool {
    required
        .iter()
        .all(|required| available.iter().any(|name| name == required))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_all() {
        let available = vec![
            "VK_LAYER_KHRONOS_validation".to_string(),
            "VK_LAYER_MESA_device_select".to_string(),
        ];
        assert!(contains_all(&available, &required_layer_names()));
        assert!(contains_all(&available, &[]));
        assert!(!contains_all(&available, &["VK_LAYER_LUNARG_api_dump"]));
    }
}
