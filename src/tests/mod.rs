use super::*;
use std::collections::HashMap;
use std::fs;

struct MemoryIncludeHandler(HashMap<&'static str, &'static str>);

impl IncludeHandler for MemoryIncludeHandler {
    fn load(&self, file_name: &str) -> Result<String, ()> {
        self.0.get(file_name).map(|s| s.to_string()).ok_or(())
    }
}

fn run_with(source: &'static str, includes: &[(&'static str, &'static str)], options: GeneratorOptions) -> Output {
    let input = Input {
        file_name: "UnityCG.cginc".to_string(),
        main_file: source.to_string(),
        file_loader: Box::new(MemoryIncludeHandler(includes.iter().cloned().collect())),
        options,
    };
    let output = cginc_to_macros(input);
    assert!(output.is_ok(), "{:?}", output);
    output.unwrap()
}

fn run(source: &'static str) -> Output {
    run_with(source, &[], GeneratorOptions::default())
}

fn names(output: &Output) -> Vec<&str> {
    output.shaders.iter().map(|shader| shader.name.as_str()).collect()
}

const CGINC: &'static str = "#ifndef UNITY_CG_INCLUDED\n\
                             #define UNITY_CG_INCLUDED\n\
                             #include \"UnityShaderVariables.cginc\"\n\
                             \n\
                             struct appdata_base {\n\
                             \x20   float4 vertex : POSITION;\n\
                             };\n\
                             \n\
                             // Forward declaration\n\
                             float3 ShadeSH9(half4 normal);\n\
                             \n\
                             inline float Luminance(half3 rgb)\n\
                             {\n\
                             \x20   return dot(rgb, UNITY_LUMINANCE);\n\
                             }\n\
                             \n\
                             #if 0\n\
                             float Disabled(float x) { return x; }\n\
                             #endif\n\
                             \n\
                             float4 Tint(float4 c0, float4 c1)\n\
                             {\n\
                             \x20   return c0 * c1; /* keep */\n\
                             }\n\
                             #endif\n";

const VARIABLES: &'static str = "#define UNITY_LUMINANCE half3(0.22, 0.707, 0.071)\n\
                                 float4 _Time;\n";

#[test]
fn unity_cg_full() {
    let output = run_with(CGINC, &[("UnityShaderVariables.cginc", VARIABLES)], GeneratorOptions::default());
    assert_eq!(names(&output), vec!["Luminance", "Tint"]);
    assert!(output.skipped.is_empty());

    assert_eq!(output.shaders[0].file_name(), "Luminance.hlsl");
    assert_eq!(output.shaders[0].text,
               "// SM: 4_1, 5_0\n\
                \n\
                #include \"UnityCG.cginc\"\n\
                \n\
                float PSMain(half3 rgb : COLOR0) : SV_TARGET\n\
                {\n    return dot(rgb, UNITY_LUMINANCE);\n}\n");
    assert_eq!(output.shaders[1].text,
               "// SM: 4_1, 5_0\n\
                \n\
                #include \"UnityCG.cginc\"\n\
                \n\
                float4 PSMain(float4 c0 : COLOR0, float4 c1 : COLOR1) : SV_TARGET\n\
                {\n    return c0 * c1; /* keep */\n}\n");
    assert_eq!(output.shaders[1].console_text,
               "float4 Tint(float4 c0 : COLOR0, float4 c1 : COLOR1) : SV_TARGET\n\
                {\n    return c0 * c1; /* keep */\n}$");
}

#[test]
fn unresolved_include_is_not_fatal() {
    let output = run(CGINC);
    assert_eq!(names(&output), vec!["Luminance", "Tint"]);
}

#[test]
fn generation_is_deterministic() {
    let includes = [("UnityShaderVariables.cginc", VARIABLES)];
    let first = run_with(CGINC, &includes, GeneratorOptions::default());
    let second = run_with(CGINC, &includes, GeneratorOptions::default());
    assert_eq!(first, second);
}

#[test]
fn lettered_semantics() {
    let options = GeneratorOptions {
        semantics: SemanticPolicy::Lettered,
        return_semantic: ReturnSemanticPolicy::OmitForVoid,
        ..GeneratorOptions::default()
    };
    let output = run_with("void Blend(float4 a, inout float4 b, float4 c : COLOR) { b = a * c; }\n\
                           half Scale(half x, half y) { return x * y; }\n",
                          &[],
                          options);
    assert_eq!(output.shaders[0].text.lines().nth(4),
               Some("void PSMain(float4 a : A, inout float4 b : COLOR1, float4 c : COLOR2)"));
    assert_eq!(output.shaders[1].text.lines().nth(4),
               Some("half PSMain(half x : A, half y : B) : SV_TARGET"));
}

#[test]
fn too_many_params_are_skipped() {
    const WIDE: &'static str = "float Wide(float a, float b, float c, float d, float e, float f, float g, \
                                float h, float i, float j, float k, float l, float m, float n, float o, \
                                float p, float q, float r, float s, float t, float u, float v, float w, \
                                float x, float y, float z, float extra) { return a; }\n\
                                float Narrow(float a) { return a; }\n";
    let output = run(WIDE);
    assert_eq!(names(&output), vec!["Narrow"]);
    assert_eq!(output.skipped.len(), 1);
    assert_eq!(output.skipped[0].name, "Wide");
    assert_eq!(output.skipped[0].param_count, 27);
}

#[test]
fn declarations_produce_no_shaders() {
    let output = run("struct v2f { float4 pos : SV_POSITION; };\n\
                      cbuffer Globals { float4 _Color; };\n\
                      typedef float4 color;\n\
                      float4 _MainTex_ST;\n\
                      float Declared(float x);\n");
    assert!(output.shaders.is_empty());
    assert!(output.skipped.is_empty());
}

#[test]
fn write_shaders_to_directory() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("shaders").join("macros");
    let output = run_with(CGINC, &[("UnityShaderVariables.cginc", VARIABLES)], GeneratorOptions::default());

    let written = write_shaders(&output_dir, &output.shaders).unwrap();
    assert_eq!(written, vec![output_dir.join("Luminance.hlsl"), output_dir.join("Tint.hlsl")]);
    assert_eq!(fs::read_to_string(&written[1]).unwrap(), output.shaders[1].text);

    // Existing files are replaced
    fs::write(&written[0], "stale").unwrap();
    write_shaders(&output_dir, &output.shaders).unwrap();
    assert_eq!(fs::read_to_string(&written[0]).unwrap(), output.shaders[0].text);
}

#[test]
fn write_shaders_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    fs::write(&blocker, "").unwrap();
    let output = run("float One() { return 1; }\n");
    match write_shaders(&blocker.join("macros"), &output.shaders) {
        Err(err @ WriteError::CreateDirectory { .. }) => {
            assert!(err.to_string().contains("macros"));
        }
        other => panic!("expected directory error, got {:?}", other),
    }
}

#[test]
fn directory_include_handler() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    fs::write(second.path().join("HLSLSupport.cginc"), "#define SUPPORT 1\n").unwrap();
    fs::write(first.path().join("Shared.cginc"), "first").unwrap();
    fs::write(second.path().join("Shared.cginc"), "second").unwrap();

    let handler = DirectoryIncludeHandler::new(vec![first.path(), second.path()]);
    assert_eq!(handler.load("HLSLSupport.cginc"), Ok("#define SUPPORT 1\n".to_string()));
    assert_eq!(handler.load("Shared.cginc"), Ok("first".to_string()));
    assert_eq!(handler.load("Missing.cginc"), Err(()));

    let absolute = second.path().join("Shared.cginc");
    let empty = DirectoryIncludeHandler::new(Vec::<PathBuf>::new());
    assert_eq!(empty.load(absolute.to_str().unwrap()), Ok("second".to_string()));
}
