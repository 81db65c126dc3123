//! Creates one pixel shader per function defined in a Unity include file,
//! so every function can be compiled in isolation.

use log::debug;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

pub use cms_sequence_cginc_to_macros::cginc_to_macros;
pub use cms_sequence_cginc_to_macros::GenerateError;
pub use cms_sequence_cginc_to_macros::Input;
pub use cms_sequence_cginc_to_macros::Output;
pub use cms_shared::IncludeHandler;
pub use cms_shared::NullIncludeHandler;
pub use cms_transform_hst_to_psmain::detect_profiles;
pub use cms_transform_hst_to_psmain::GeneratorOptions;
pub use cms_transform_hst_to_psmain::MacroShader;
pub use cms_transform_hst_to_psmain::ReturnSemanticPolicy;
pub use cms_transform_hst_to_psmain::SemanticPolicy;
pub use cms_transform_hst_to_psmain::ShaderModel;
pub use cms_transform_hst_to_psmain::SkippedFunction;

#[cfg(test)]
mod tests;

/// Loads includes from a list of directories, searched in order
#[derive(PartialEq, Debug, Clone)]
pub struct DirectoryIncludeHandler {
    pub include_paths: Vec<PathBuf>,
}

impl DirectoryIncludeHandler {
    pub fn new<P: Into<PathBuf>>(include_paths: impl IntoIterator<Item = P>) -> DirectoryIncludeHandler {
        DirectoryIncludeHandler { include_paths: include_paths.into_iter().map(Into::into).collect() }
    }
}

impl IncludeHandler for DirectoryIncludeHandler {
    fn load(&self, file_name: &str) -> Result<String, ()> {
        let file_path = Path::new(file_name);
        if file_path.is_absolute() {
            return fs::read_to_string(file_path).map_err(|_| ());
        }
        for dir in &self.include_paths {
            if let Ok(contents) = fs::read_to_string(dir.join(file_path)) {
                return Ok(contents);
            }
        }
        Err(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed to create output directory {}: {source}", .path.display())]
    CreateDirectory { path: PathBuf, source: io::Error },
    #[error("failed to write {}: {source}", .path.display())]
    WriteShader { path: PathBuf, source: io::Error },
}

/// Writes each shader to `<output_dir>/<name>.hlsl`, replacing existing files
pub fn write_shaders(output_dir: &Path, shaders: &[MacroShader]) -> Result<Vec<PathBuf>, WriteError> {
    fs::create_dir_all(output_dir).map_err(|source| {
        WriteError::CreateDirectory {
            path: output_dir.to_path_buf(),
            source,
        }
    })?;
    let mut written = Vec::with_capacity(shaders.len());
    for shader in shaders {
        let path = output_dir.join(shader.file_name());
        if let Err(source) = fs::write(&path, &shader.text) {
            return Err(WriteError::WriteShader { path, source });
        }
        let profiles = detect_profiles(&shader.text).iter().map(|p| p.to_string()).collect::<Vec<_>>();
        debug!("wrote {} ({})", path.display(), profiles.join(", "));
        written.push(path);
    }
    Ok(written)
}

/// Prints the console form of each shader
pub fn print_shaders(shaders: &[MacroShader]) {
    for shader in shaders {
        println!("{}", shader.console_text);
    }
}
