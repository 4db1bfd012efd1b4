use std::path::Path;

use cask_core::config;

use super::CmdResult;

pub(crate) fn run_config_generate(url: &str, dest: &str) -> CmdResult {
    let path = Path::new(dest);
    if path.exists() {
        return Err(format!("file already exists: {}", path.display()).into());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, config::minimal_config_template(url))?;
    println!("Config written to: {}", path.display());
    println!("Run `cask init` to create the repository.");
    Ok(())
}
