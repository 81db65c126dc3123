use crate::options::{GeneratorOptions, ReturnSemanticPolicy, SemanticPolicy};
use crate::profile::metadata_line;
use cms_lang_hst::*;
use cms_shared::FileLocation;
use log::warn;
use std::collections::HashSet;
use std::fmt;

const LETTERS: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generated shader for one function definition
#[derive(PartialEq, Debug, Clone)]
pub struct MacroShader {
    pub name: String,
    /// Contents of `<name>.hlsl`
    pub text: String,
    /// Form printed to the console, without metadata or include
    pub console_text: String,
}

impl MacroShader {
    pub fn file_name(&self) -> String {
        format!("{}.hlsl", self.name)
    }
}

/// Function left out because it has too many parameters
#[derive(PartialEq, Debug, Clone)]
pub struct SkippedFunction {
    pub name: String,
    pub location: FileLocation,
    pub param_count: usize,
    pub max_params: usize,
}

impl fmt::Display for SkippedFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f,
               "{}: skipping function {}: {} parameters is more than the {} supported",
               self.location,
               self.name,
               self.param_count,
               self.max_params)
    }
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct MacroShaders {
    pub shaders: Vec<MacroShader>,
    pub skipped: Vec<SkippedFunction>,
}

/// Semantic for each parameter, in order
pub fn assign_semantics(params: &[FunctionParam], policy: SemanticPolicy) -> Vec<String> {
    let mut letters = LETTERS.iter();
    params.iter()
          .enumerate()
          .map(|(index, param)| {
              let letter = match policy {
                  SemanticPolicy::Lettered if param.is_simple() => letters.next(),
                  _ => None,
              };
              match letter {
                  Some(&letter) => (letter as char).to_string(),
                  None => format!("COLOR{}", index),
              }
          })
          .collect()
}

fn check_param_count(def: &FunctionDefinition, options: &GeneratorOptions) -> Result<(), SkippedFunction> {
    let param_count = def.signature.params.len();
    if param_count > options.max_params {
        return Err(SkippedFunction {
            name: def.name().to_string(),
            location: def.signature.name.location.clone(),
            param_count,
            max_params: options.max_params,
        });
    }
    Ok(())
}

fn render_signature(def: &FunctionDefinition, name: &str, options: &GeneratorOptions) -> String {
    let signature = &def.signature;
    let semantics = assign_semantics(&signature.params, options.semantics);
    let params = signature.params
                          .iter()
                          .zip(semantics)
                          .map(|(param, semantic)| format!("{} : {}", param.text, semantic))
                          .collect::<Vec<_>>();
    let returntype = if signature.returntype.is_const {
        format!("const {}", signature.returntype.text)
    } else {
        signature.returntype.text.clone()
    };
    let target = match options.return_semantic {
        ReturnSemanticPolicy::OmitForVoid if signature.returntype.is_void() => "",
        _ => " : SV_TARGET",
    };
    format!("{} {}({}){}", returntype, name, params.join(", "), target)
}

/// Renders the `.hlsl` file for a function definition
pub fn render_shader(def: &FunctionDefinition, options: &GeneratorOptions) -> Result<MacroShader, SkippedFunction> {
    check_param_count(def, options)?;
    let text = format!("{}\n\n#include \"{}\"\n\n{}\n{}\n",
                       metadata_line(&options.metadata),
                       options.shader_include,
                       render_signature(def, &options.entry_point, options),
                       def.body.text);
    Ok(MacroShader {
        name: def.name().to_string(),
        text,
        console_text: format!("{}\n{}$", render_signature(def, def.name(), options), def.body.text),
    })
}

/// Renders the console form, which keeps the function's own name and ends
/// with a `$` marker
pub fn render_console(def: &FunctionDefinition, options: &GeneratorOptions) -> Result<String, SkippedFunction> {
    render_shader(def, options).map(|shader| shader.console_text)
}

/// Renders every function definition in the module, in source order
pub fn transform_module(module: &Module, options: &GeneratorOptions) -> MacroShaders {
    let mut output = MacroShaders::default();
    let mut names = HashSet::new();
    for def in module.function_definitions() {
        match render_shader(def, options) {
            Ok(shader) => {
                if !names.insert(shader.name.clone()) {
                    warn!("{}: function {} is defined more than once, the last definition wins",
                          def.signature.name.location,
                          shader.name);
                }
                output.shaders.push(shader);
            }
            Err(skipped) => {
                warn!("{}", skipped);
                output.skipped.push(skipped);
            }
        }
    }
    output
}

#[cfg(test)]
fn param(text: &str, modifiers: Vec<ParamModifier>, semantic: Option<&str>) -> FunctionParam {
    let mut words = text.split_whitespace().rev();
    let name = words.next().unwrap_or("").to_string();
    let param_type = words.next().unwrap_or("").to_string();
    FunctionParam {
        name,
        modifiers,
        param_type: Type::from_text(&param_type),
        array_dims: vec![],
        semantic: semantic.map(|s| Semantic(s.to_string())),
        default_value: None,
        text: text.to_string(),
    }
}

#[cfg(test)]
fn simple(text: &str) -> FunctionParam {
    param(text, vec![], None)
}

#[cfg(test)]
fn function(returntype: &str, name: &str, params: Vec<FunctionParam>, body: &str) -> FunctionDefinition {
    FunctionDefinition {
        signature: FunctionSignature {
            name: cms_shared::Located::none(name.to_string()),
            returntype: Type::from_text(returntype),
            params,
            return_semantic: None,
            attributes: vec![],
        },
        body: FunctionBody {
            text: body.to_string(),
            span: cms_shared::StreamSpan::new(0, body.len() as u64),
        },
    }
}

#[cfg(test)]
fn module(functions: Vec<FunctionDefinition>) -> Module {
    Module { root_definitions: functions.into_iter().map(RootDefinition::Function).collect() }
}

#[test]
fn test_positional_shader() {
    let foo = function("float4",
                       "Foo",
                       vec![simple("float4 c0"), simple("float4 c1")],
                       "{\n    return c0 * c1;\n}");
    let shader = render_shader(&foo, &GeneratorOptions::default()).unwrap();
    assert_eq!(shader.file_name(), "Foo.hlsl");
    assert_eq!(shader.text,
               "// SM: 4_1, 5_0\n\
                \n\
                #include \"UnityCG.cginc\"\n\
                \n\
                float4 PSMain(float4 c0 : COLOR0, float4 c1 : COLOR1) : SV_TARGET\n\
                {\n    return c0 * c1;\n}\n");
    // Rendering is deterministic
    assert_eq!(render_shader(&foo, &GeneratorOptions::default()).unwrap(), shader);
}

#[test]
fn test_lettered_semantics() {
    let options = GeneratorOptions {
        semantics: SemanticPolicy::Lettered,
        ..GeneratorOptions::default()
    };
    let bar = function("float4", "Bar", vec![simple("float2 uv")], "{ return uv.xyxy; }");
    let shader = render_shader(&bar, &options).unwrap();
    assert!(shader.text.contains("float4 PSMain(float2 uv : A) : SV_TARGET\n"));

    let params = vec![simple("float2 uv"),
                      param("in float3 normal", vec![ParamModifier::In], None),
                      param("float4 color", vec![], Some("COLOR")),
                      simple("float scale"),
                      param("nointerpolation float id", vec![ParamModifier::NoInterpolation], None)];
    assert_eq!(assign_semantics(&params, SemanticPolicy::Lettered),
               vec!["A", "COLOR1", "COLOR2", "B", "COLOR4"]);
    assert_eq!(assign_semantics(&params, SemanticPolicy::Positional),
               vec!["COLOR0", "COLOR1", "COLOR2", "COLOR3", "COLOR4"]);
}

#[test]
fn test_existing_semantic_replaced() {
    let baz = function("void",
                       "Baz",
                       vec![param("float4 c0", vec![], Some("COLOR0"))],
                       "{ }");
    let always = render_shader(&baz, &GeneratorOptions::default()).unwrap();
    assert!(always.text.contains("void PSMain(float4 c0 : COLOR0) : SV_TARGET\n"));

    let omit = GeneratorOptions {
        return_semantic: ReturnSemanticPolicy::OmitForVoid,
        ..GeneratorOptions::default()
    };
    let shader = render_shader(&baz, &omit).unwrap();
    assert!(shader.text.contains("void PSMain(float4 c0 : COLOR0)\n{ }\n"));

    // Only exactly `void` drops the semantic
    let not_void = function("float4", "Qux", vec![], "{ return 0; }");
    assert!(render_shader(&not_void, &omit).unwrap().text.contains("float4 PSMain() : SV_TARGET\n"));
}

#[test]
fn test_param_guard() {
    let params = |count: usize| (0..count).map(|i| simple(&format!("float p{}", i))).collect::<Vec<_>>();
    let wide = function("float", "Wide", params(27), "{ return 0; }");
    let skipped = render_shader(&wide, &GeneratorOptions::default()).unwrap_err();
    assert_eq!(skipped.name, "Wide");
    assert_eq!(skipped.param_count, 27);
    assert_eq!(skipped.to_string(),
               "<unknown>:0:0: skipping function Wide: 27 parameters is more than the 26 supported");

    let lettered = GeneratorOptions {
        semantics: SemanticPolicy::Lettered,
        ..GeneratorOptions::default()
    };
    assert!(render_shader(&wide, &lettered).is_err());
    let full = function("float", "Full", params(26), "{ return 0; }");
    let shader = render_shader(&full, &lettered).unwrap();
    assert!(shader.text.contains("float p0 : A, "));
    assert!(shader.text.contains("float p25 : Z)"));

    // Letters run out before COLORi would be needed only with a raised limit
    let raised = GeneratorOptions {
        max_params: 28,
        ..lettered
    };
    let semantics = assign_semantics(&params(28), raised.semantics);
    assert_eq!(semantics[25], "Z");
    assert_eq!(semantics[26], "COLOR26");
}

#[test]
fn test_console_form() {
    let foo = function("float4", "Foo", vec![simple("float4 c0")], "{ return c0; }");
    assert_eq!(render_console(&foo, &GeneratorOptions::default()).unwrap(),
               "float4 Foo(float4 c0 : COLOR0) : SV_TARGET\n{ return c0; }$");
}

#[test]
fn test_const_return_type() {
    let mut def = function("float", "Half", vec![], "{ return 0.5; }");
    def.signature.returntype.is_const = true;
    assert!(render_shader(&def, &GeneratorOptions::default())
        .unwrap()
        .text
        .contains("const float PSMain() : SV_TARGET\n"));
}

#[test]
fn test_custom_options() {
    let options = GeneratorOptions {
        metadata: vec![crate::ShaderModel::V5_0],
        shader_include: "Common.hlsl".to_string(),
        entry_point: "Main".to_string(),
        ..GeneratorOptions::default()
    };
    let def = function("float", "F", vec![], "{ return 1; }");
    assert_eq!(render_shader(&def, &options).unwrap().text,
               "// SM: 5_0\n\n#include \"Common.hlsl\"\n\nfloat Main() : SV_TARGET\n{ return 1; }\n");
}

#[test]
fn test_transform_module() {
    let params = (0..27).map(|i| simple(&format!("float p{}", i))).collect::<Vec<_>>();
    let module = module(vec![function("float", "First", vec![], "{ return 1; }"),
                             function("float", "Wide", params, "{ return 0; }"),
                             function("float", "Last", vec![simple("float x")], "{ return x; }"),
                             function("float", "First", vec![simple("int x")], "{ return x; }")]);
    let output = transform_module(&module, &GeneratorOptions::default());
    let names = output.shaders.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["First", "Last", "First"]);
    assert_eq!(output.skipped.len(), 1);
    assert_eq!(output.skipped[0].name, "Wide");
    for shader in &output.shaders {
        assert_eq!(crate::detect_profiles(&shader.text).len(), 2);
    }
}

#[cfg(test)]
mod captured_log {
    use log::{Level, Log, Metadata, Record};
    use std::cell::RefCell;
    use std::sync::Once;

    thread_local! {
        static RECORDS: RefCell<Vec<(Level, String)>> = RefCell::new(vec![]);
    }

    struct CaptureLogger;

    impl Log for CaptureLogger {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            RECORDS.with(|records| records.borrow_mut().push((record.level(), record.args().to_string())));
        }

        fn flush(&self) {}
    }

    static INIT: Once = Once::new();
    static LOGGER: CaptureLogger = CaptureLogger;

    /// Records logged on this thread while `f` runs
    pub fn capture<F: FnOnce()>(f: F) -> Vec<(Level, String)> {
        INIT.call_once(|| {
            if log::set_logger(&LOGGER).is_ok() {
                log::set_max_level(log::LevelFilter::Trace);
            }
        });
        RECORDS.with(|records| records.borrow_mut().clear());
        f();
        RECORDS.with(|records| records.borrow_mut().drain(..).collect())
    }
}

#[test]
fn test_transform_module_warnings() {
    let params = (0..27).map(|i| simple(&format!("float p{}", i))).collect::<Vec<_>>();
    let module = module(vec![function("float", "Wide", params, "{ return 0; }"),
                             function("float", "Twice", vec![], "{ return 1; }"),
                             function("float", "Twice", vec![simple("float x")], "{ return x; }")]);
    let records = captured_log::capture(|| {
        transform_module(&module, &GeneratorOptions::default());
    });
    let warnings = records.iter()
                          .filter(|&&(level, _)| level == log::Level::Warn)
                          .map(|(_, message)| message.as_str())
                          .collect::<Vec<_>>();
    assert_eq!(warnings,
               vec!["<unknown>:0:0: skipping function Wide: 27 parameters is more than the 26 supported",
                    "<unknown>:0:0: function Twice is defined more than once, the last definition wins"]);
}
