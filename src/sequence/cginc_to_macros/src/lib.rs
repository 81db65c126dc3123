//! Generates macro shaders from an HLSL include file, entirely in memory

use cms_shared::File;
use cms_transform_htk_to_hst::ParseError;
use cms_transform_lexer::LexError;
use cms_transform_preprocess::PreprocessError;
use log::debug;

pub use cms_shared::IncludeHandler;
pub use cms_transform_hst_to_psmain::GeneratorOptions;
pub use cms_transform_hst_to_psmain::MacroShader;
pub use cms_transform_hst_to_psmain::MacroShaders as Output;
pub use cms_transform_hst_to_psmain::SkippedFunction;

#[derive(PartialEq, Debug, Clone, thiserror::Error)]
pub enum GenerateError {
    #[error(transparent)]
    PreprocessError(#[from] PreprocessError),
    #[error(transparent)]
    LexError(#[from] LexError),
    #[error(transparent)]
    ParseError(#[from] ParseError),
}

pub struct Input {
    /// Name used for the main file in diagnostics
    pub file_name: String,
    pub main_file: String,
    pub file_loader: Box<dyn IncludeHandler>,
    pub options: GeneratorOptions,
}

pub fn cginc_to_macros(input: Input) -> Result<Output, GenerateError> {
    let preprocessed = cms_transform_preprocess::preprocess(&input.main_file,
                                                            File::Name(input.file_name.clone()),
                                                            &*input.file_loader)?;

    let tokens = cms_transform_lexer::lex(&preprocessed)?;

    let module = cms_transform_htk_to_hst::parse(&tokens.stream, &preprocessed)?;
    debug!("{}: {} root definitions, {} function definitions",
           input.file_name,
           module.root_definitions.len(),
           module.function_definitions().count());

    Ok(cms_transform_hst_to_psmain::transform_module(&module, &input.options))
}

#[cfg(test)]
struct NoIncludes;

#[cfg(test)]
impl IncludeHandler for NoIncludes {
    fn load(&self, _: &str) -> Result<String, ()> {
        Err(())
    }
}

#[cfg(test)]
fn input(source: &str) -> Input {
    Input {
        file_name: "UnityCG.cginc".to_string(),
        main_file: source.to_string(),
        file_loader: Box::new(NoIncludes),
        options: GeneratorOptions::default(),
    }
}

#[test]
fn test_cginc_to_macros() {
    let output = cginc_to_macros(input("struct v2f { float4 pos : SV_POSITION; };\n\
                                        float4 Tint(float4 c0, float4 c1) { return c0 * c1; }\n\
                                        float Declared(float x);\n"))
        .unwrap();
    assert_eq!(output.shaders.len(), 1);
    assert_eq!(output.shaders[0].name, "Tint");
    assert!(output.shaders[0]
        .text
        .contains("float4 PSMain(float4 c0 : COLOR0, float4 c1 : COLOR1) : SV_TARGET\n{ return c0 * c1; }\n"));
    assert!(output.skipped.is_empty());
}

#[test]
fn test_stage_errors() {
    match cginc_to_macros(input("#endif\n")) {
        Err(GenerateError::PreprocessError(_)) => {}
        other => panic!("expected preprocess error, got {:?}", other),
    }
    match cginc_to_macros(input("float $x;")) {
        Err(GenerateError::LexError(_)) => {}
        other => panic!("expected lex error, got {:?}", other),
    }
    match cginc_to_macros(input("float f() { return 0;")) {
        Err(err @ GenerateError::ParseError(_)) => {
            assert!(err.to_string().starts_with("UnityCG.cginc:1:"))
        }
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn test_annotated_and_macro_typed_functions() {
    let output = cginc_to_macros(input("float Reg(float a : register(c0)) { return a; }\n\
                                        float Next(float b) { return b; }\n\
                                        float4 _Color;\n"))
        .unwrap();
    let names = output.shaders.iter().map(|shader| shader.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Reg", "Next"]);
    assert!(output.shaders[0].text.contains("float PSMain(float a : COLOR0) : SV_TARGET\n{ return a; }\n"));

    let output = cginc_to_macros(input("#define VEC(n) float##n\n\
                                        #define COLOR_T VEC\n\
                                        COLOR_T(4) Tint(float4 c) { return c; }\n\
                                        float4 _Color;\n"))
        .unwrap();
    assert_eq!(output.shaders.len(), 1);
    assert_eq!(output.shaders[0].name, "Tint");
    assert!(output.shaders[0].text.contains("float4 PSMain(float4 c : COLOR0) : SV_TARGET\n{ return c; }\n"));
}

#[test]
fn test_unparsed_function_is_fatal() {
    match cginc_to_macros(input("float Bad(float a b) { return a; }\nfloat4 _Color;\n")) {
        Err(GenerateError::ParseError(_)) => {}
        other => panic!("expected parse error, got {:?}", other),
    }
}
