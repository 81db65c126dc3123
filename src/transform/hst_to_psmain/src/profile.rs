use std::fmt;
use std::str::FromStr;

/// Direct3D shader model a generated file is compiled for
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ShaderModel {
    V4_1,
    V5_0,
}

impl ShaderModel {
    pub fn all() -> Vec<ShaderModel> {
        vec![ShaderModel::V4_1, ShaderModel::V5_0]
    }
}

impl fmt::Display for ShaderModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ShaderModel::V4_1 => write!(f, "4_1"),
            ShaderModel::V5_0 => write!(f, "5_0"),
        }
    }
}

#[derive(PartialEq, Debug, Clone, thiserror::Error)]
#[error("unknown shader model `{0}` (expected 4_1 or 5_0)")]
pub struct UnknownShaderModel(pub String);

impl FromStr for ShaderModel {
    type Err = UnknownShaderModel;

    fn from_str(s: &str) -> Result<ShaderModel, UnknownShaderModel> {
        match s.trim() {
            "4_1" | "4.1" => Ok(ShaderModel::V4_1),
            "5_0" | "5.0" => Ok(ShaderModel::V5_0),
            other => Err(UnknownShaderModel(other.to_string())),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ShaderType {
    Vertex,
    Pixel,
}

impl ShaderType {
    pub fn entry_point(&self) -> &'static str {
        match *self {
            ShaderType::Vertex => "VSMain",
            ShaderType::Pixel => "PSMain",
        }
    }
}

impl fmt::Display for ShaderType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ShaderType::Vertex => write!(f, "vs"),
            ShaderType::Pixel => write!(f, "ps"),
        }
    }
}

/// Compile target such as `ps_5_0`
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct ShaderProfile {
    pub ty: ShaderType,
    pub model: ShaderModel,
}

impl fmt::Display for ShaderProfile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}_{}", self.ty, self.model)
    }
}

/// First line of a generated file, read back by the shader compile step
pub fn metadata_line(models: &[ShaderModel]) -> String {
    let models = models.iter().map(|m| m.to_string()).collect::<Vec<_>>();
    format!("// SM: {}", models.join(", "))
}

/// Profiles the shader compile step builds a file with
///
/// Shader models come from the first line and shader types from the entry
/// points found anywhere in the text. Either being absent means the file is
/// not compiled at all.
pub fn detect_profiles(text: &str) -> Vec<ShaderProfile> {
    let first_line = match text.lines().next() {
        Some(line) => line,
        None => return vec![],
    };

    let mut types = Vec::with_capacity(2);
    if text.contains(ShaderType::Vertex.entry_point()) {
        types.push(ShaderType::Vertex);
    }
    if text.contains(ShaderType::Pixel.entry_point()) {
        types.push(ShaderType::Pixel);
    }

    let models = ShaderModel::all()
        .into_iter()
        .filter(|model| first_line.contains(&model.to_string()))
        .collect::<Vec<_>>();

    let mut profiles = Vec::with_capacity(types.len() * models.len());
    for ty in &types {
        for model in &models {
            profiles.push(ShaderProfile {
                ty: *ty,
                model: *model,
            });
        }
    }
    profiles
}

#[test]
fn test_metadata_line() {
    assert_eq!(metadata_line(&ShaderModel::all()), "// SM: 4_1, 5_0");
    assert_eq!(metadata_line(&[ShaderModel::V5_0]), "// SM: 5_0");
}

#[test]
fn test_shader_model_from_str() {
    assert_eq!("4_1".parse::<ShaderModel>(), Ok(ShaderModel::V4_1));
    assert_eq!(" 5_0".parse::<ShaderModel>(), Ok(ShaderModel::V5_0));
    assert_eq!("3_0".parse::<ShaderModel>(), Err(UnknownShaderModel("3_0".to_string())));
}

#[test]
fn test_detect_profiles() {
    let profile = |ty, model| ShaderProfile { ty, model };
    let pixel = "// SM: 4_1, 5_0\n\nfloat4 PSMain() : SV_TARGET\n{ return 0; }\n";
    assert_eq!(detect_profiles(pixel),
               vec![profile(ShaderType::Pixel, ShaderModel::V4_1),
                    profile(ShaderType::Pixel, ShaderModel::V5_0)]);
    assert_eq!(detect_profiles(pixel)[1].to_string(), "ps_5_0");

    let both = "// SM: 5_0\nvoid VSMain() {}\nfloat4 PSMain() : SV_TARGET { return 0; }";
    assert_eq!(detect_profiles(both),
               vec![profile(ShaderType::Vertex, ShaderModel::V5_0),
                    profile(ShaderType::Pixel, ShaderModel::V5_0)]);

    // Models are only read from the first line
    assert_eq!(detect_profiles("float4 PSMain() { return 0; }\n// SM: 5_0"), vec![]);
    assert_eq!(detect_profiles("// SM: 5_0\nfloat4 Main() { return 0; }"), vec![]);
    assert_eq!(detect_profiles(""), vec![]);
}
