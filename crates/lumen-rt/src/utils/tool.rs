use anyhow::{
    Context,
    Result,
};
use std::{
    ffi::CStr,
    os::raw::c_char,
};

/// Converts a fixed-size, nul-terminated `[c_char; N]` from a Vulkan property struct to a String.
pub fn convert_char_to_string(raw_string_array: &[c_char]) -> Result<String> {
    let bytes: Vec<u8> = raw_string_array.iter().map(|&c| c as u8).collect();
    let raw_string =
        CStr::from_bytes_until_nul(&bytes).context("string is not nul-terminated")?;
    Ok(raw_string.to_str()?.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_char_to_string() {
        let mut raw = [0 as c_char; 16];
        for (dst, src) in raw.iter_mut().zip(b"VK_KHR_test") {
            *dst = *src as c_char;
        }
        assert_eq!(convert_char_to_string(&raw).unwrap(), "VK_KHR_test");
    }

    #[test]
    fn test_convert_char_to_string_without_nul() {
        let raw = [b'a' as c_char; 4];
        assert!(convert_char_to_string(&raw).is_err());
    }
}
