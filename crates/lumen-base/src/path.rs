use anyhow::Result;
use git2;
use std::path::{
    Path,
    PathBuf,
};

pub fn get_project_root() -> Result<PathBuf> {
    let repo = git2::Repository::discover(std::env::current_dir()?)?;
    let workdir = repo
        .workdir()
        .ok_or_else(|| git2::Error::from_str("No workdir"))?;
    Ok(workdir.to_path_buf())
}

pub fn get_shader_root() -> Result<PathBuf> {
    let project_root = get_project_root()?;
    Ok(project_root.join("shader"))
}

pub fn get_shader_src_root() -> Result<PathBuf> {
    let shader_root = get_shader_root()?;
    Ok(shader_root.join("src"))
}

pub fn get_shader_spv_root() -> Result<PathBuf> {
    let shader_root = get_shader_root()?;
    Ok(shader_root.join("spv"))
}

/// Directory holding the JSON pipeline descriptions of `crate_name`.
pub fn get_config_root(crate_name: &str) -> Result<PathBuf> {
    let project_root = get_project_root()?;
    Ok(project_root.join("crates").join(crate_name).join("configs"))
}

/// Absolute paths are kept as-is, relative ones are joined onto `root`.
pub fn resolve_relative_to(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
