use crate::profile::ShaderModel;

/// How input semantics are chosen for the entry point's parameters
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SemanticPolicy {
    /// `COLORi` where `i` is the parameter's position
    Positional,
    /// `A`, `B`, ... for parameters without modifiers or semantics, `COLORi`
    /// for everything else
    Lettered,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ReturnSemanticPolicy {
    /// Always end the signature with `: SV_TARGET`
    Always,
    /// Leave the semantic off functions returning `void`
    OmitForVoid,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GeneratorOptions {
    /// Shader models written to the metadata line
    pub metadata: Vec<ShaderModel>,
    /// File every generated shader includes
    pub shader_include: String,
    pub entry_point: String,
    pub semantics: SemanticPolicy,
    pub return_semantic: ReturnSemanticPolicy,
    /// Functions with more parameters than this are skipped
    pub max_params: usize,
}

impl Default for GeneratorOptions {
    fn default() -> GeneratorOptions {
        GeneratorOptions {
            metadata: ShaderModel::all(),
            shader_include: "UnityCG.cginc".to_string(),
            entry_point: "PSMain".to_string(),
            semantics: SemanticPolicy::Positional,
            return_semantic: ReturnSemanticPolicy::Always,
            max_params: 26,
        }
    }
}
