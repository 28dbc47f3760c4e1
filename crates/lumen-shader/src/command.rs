use anyhow::{
    ensure,
    Context,
    Result,
};
use lumen_base::path::{
    get_shader_spv_root,
    get_shader_src_root,
};
use log;
use std::{
    io::Write,
    path::{
        Path,
        PathBuf,
    },
    process::Command,
};

/// File extensions of the ray tracing stages understood by `glslc`.
pub const RAYTRACING_SHADER_EXTENSIONS: [&str; 6] =
    ["rgen", "rmiss", "rchit", "rahit", "rint", "rcall"];

/// Maps `<src_root>/a/b.rgen` to `<spv_root>/a/b.rgen.spv`.
pub fn spv_output_path(input_path: &Path, src_root: &Path, spv_root: &Path) -> Result<PathBuf> {
    let input_filename = input_path
        .file_name()
        .context("failed to get file name")?
        .to_str()
        .context("failed to convert to string")?;
    let output_filename = format!("{}.spv", input_filename);

    let relative_input_path = input_path.strip_prefix(src_root)?;
    let relative_output_path = relative_input_path.with_file_name(output_filename);
    Ok(spv_root.join(relative_output_path))
}

pub fn compile(input_path: &Path) -> Result<PathBuf> {
    let output_path = spv_output_path(
        input_path,
        &get_shader_src_root()?,
        &get_shader_spv_root()?,
    )?;

    let output_dir = output_path.parent().context("failed to get parent")?;
    if !output_dir.exists() {
        std::fs::create_dir_all(output_dir)?;
    }

    log::info!(
        "compiling shader: {} -> {}",
        input_path.display(),
        output_path.display()
    );
    let output = Command::new("glslc")
        .arg(input_path.as_os_str())
        .arg("--target-env=vulkan1.3")
        .arg("--target-spv=spv1.6")
        .arg("-g")
        .arg("-O")
        .arg("-o")
        .arg(output_path.as_os_str())
        .output()
        .context("failed to launch glslc")?;
    std::io::stderr().write_all(&output.stderr)?;
    ensure!(
        output.status.success(),
        "failed to compile shader: {}",
        input_path.display()
    );
    Ok(output_path)
}

pub fn compile_all() -> Result<Vec<PathBuf>> {
    let shader_src_root = get_shader_src_root()?;
    let extensions = RAYTRACING_SHADER_EXTENSIONS.iter().cloned().collect();
    let target_paths = crate::utils::glob_shader_src(&shader_src_root, &extensions)?;
    log::debug!(
        "{} shader sources found under {}",
        target_paths.len(),
        shader_src_root.display()
    );

    let mut outputs = Vec::with_capacity(target_paths.len());
    for path in target_paths {
        outputs.push(compile(&path)?);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spv_output_path() {
        let src_root = Path::new("/work/shader/src");
        let spv_root = Path::new("/work/shader/spv");
        let output = spv_output_path(
            Path::new("/work/shader/src/trace/basic.rchit"),
            src_root,
            spv_root,
        )
        .unwrap();
        assert_eq!(output, PathBuf::from("/work/shader/spv/trace/basic.rchit.spv"));
    }

    #[test]
    fn test_spv_output_path_outside_root() {
        let result = spv_output_path(
            Path::new("/elsewhere/basic.rgen"),
            Path::new("/work/shader/src"),
            Path::new("/work/shader/spv"),
        );
        assert!(result.is_err());
    }
}
