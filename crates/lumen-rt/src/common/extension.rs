use ash::ext::debug_utils;
use std::ffi::c_char;

/// Instance extensions for headless ray tracing; debug utils only when validation is on.
pub fn required_extension_names(enable_validation: bool) -> Vec<*const c_char> {
    let mut names = vec![ash::khr::get_physical_device_properties2::NAME.as_ptr()];
    if enable_validation {
        names.push(debug_utils::NAME.as_ptr());
    }
    names
}
