use anyhow::Result;
use lumen_shader::command::compile_all;

fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
    let compiled = compile_all()?;
    log::info!("compiled {} ray tracing shaders", compiled.len());
    Ok(())
}
