//! Turns function definitions into standalone pixel shaders that call
//! through a `PSMain` entry point

mod options;
mod profile;
mod psmain;

pub use options::GeneratorOptions;
pub use options::ReturnSemanticPolicy;
pub use options::SemanticPolicy;
pub use profile::detect_profiles;
pub use profile::metadata_line;
pub use profile::ShaderModel;
pub use profile::ShaderProfile;
pub use profile::ShaderType;
pub use profile::UnknownShaderModel;
pub use psmain::assign_semantics;
pub use psmain::render_console;
pub use psmain::render_shader;
pub use psmain::transform_module;
pub use psmain::MacroShader;
pub use psmain::MacroShaders;
pub use psmain::SkippedFunction;
