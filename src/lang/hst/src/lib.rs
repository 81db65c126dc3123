//! Declaration level HLSL syntax tree
//!
//! Only the outline of each root definition is kept. Function bodies, struct
//! members and initialisers are stored as source text and never parsed.

use cms_shared::*;

/// Keyword placed before a parameter type
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum ParamModifier {
    In,
    Out,
    InOut,
    Uniform,
    Const,
    Linear,
    Centroid,
    NoInterpolation,
    NoPerspective,
    Sample,
    Point,
    Line,
    Triangle,
    LineAdj,
    TriangleAdj,
}

impl ParamModifier {
    /// Modifiers that are not reserved words and lex as identifiers
    pub fn from_contextual_name(name: &str) -> Option<ParamModifier> {
        Some(match name {
            "linear" => ParamModifier::Linear,
            "centroid" => ParamModifier::Centroid,
            "nointerpolation" => ParamModifier::NoInterpolation,
            "noperspective" => ParamModifier::NoPerspective,
            "sample" => ParamModifier::Sample,
            "point" => ParamModifier::Point,
            "line" => ParamModifier::Line,
            "triangle" => ParamModifier::Triangle,
            "lineadj" => ParamModifier::LineAdj,
            "triangleadj" => ParamModifier::TriangleAdj,
            _ => return None,
        })
    }
}

/// A type as written in the source, e.g. `float4` or `vector<float, 4>`
#[derive(PartialEq, Debug, Clone)]
pub struct Type {
    pub text: String,
    pub is_const: bool,
}

impl Type {
    pub fn from_text(text: &str) -> Type {
        Type {
            text: text.to_string(),
            is_const: false,
        }
    }

    pub fn is_void(&self) -> bool {
        self.text == "void"
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Semantic(pub String);

#[derive(PartialEq, Debug, Clone)]
pub struct FunctionParam {
    pub name: String,
    pub modifiers: Vec<ParamModifier>,
    pub param_type: Type,
    pub array_dims: Vec<String>,
    pub semantic: Option<Semantic>,
    pub default_value: Option<String>,
    /// Source text from the first modifier up to the last array dimension.
    /// Semantic and default value are not part of it.
    pub text: String,
}

impl FunctionParam {
    /// A parameter without modifiers or semantic annotation
    pub fn is_simple(&self) -> bool {
        self.modifiers.is_empty() && self.semantic.is_none()
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct FunctionSignature {
    pub name: Located<String>,
    pub returntype: Type,
    pub params: Vec<FunctionParam>,
    pub return_semantic: Option<Semantic>,
    pub attributes: Vec<String>,
}

/// Braced function body, `{` through the matching `}`
#[derive(PartialEq, Debug, Clone)]
pub struct FunctionBody {
    pub text: String,
    pub span: StreamSpan,
}

#[derive(PartialEq, Debug, Clone)]
pub struct FunctionDefinition {
    pub signature: FunctionSignature,
    pub body: FunctionBody,
}

impl FunctionDefinition {
    pub fn name(&self) -> &str {
        &self.signature.name
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct StructDefinition {
    pub name: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ConstantBuffer {
    pub name: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Typedef {
    pub name: String,
}

#[derive(PartialEq, Debug, Clone)]
pub enum RootDefinition {
    Struct(StructDefinition),
    ConstantBuffer(ConstantBuffer),
    Typedef(Typedef),
    /// Anything else that ends in `;` at the top level
    GlobalVariable,
    Function(FunctionDefinition),
    FunctionDeclaration(FunctionSignature),
    Empty,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Module {
    pub root_definitions: Vec<RootDefinition>,
}

impl Module {
    /// Functions that have a body, in source order
    pub fn function_definitions(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.root_definitions.iter().filter_map(|root| match *root {
            RootDefinition::Function(ref def) => Some(def),
            _ => None,
        })
    }
}

#[cfg(test)]
fn param(text: &str, modifiers: Vec<ParamModifier>, semantic: Option<&str>) -> FunctionParam {
    FunctionParam {
        name: "p".to_string(),
        modifiers,
        param_type: Type::from_text("float4"),
        array_dims: vec![],
        semantic: semantic.map(|s| Semantic(s.to_string())),
        default_value: None,
        text: text.to_string(),
    }
}

#[test]
fn test_simple_param() {
    assert!(param("float4 p", vec![], None).is_simple());
    assert!(!param("in float4 p", vec![ParamModifier::In], None).is_simple());
    assert!(!param("float4 p", vec![], Some("TEXCOORD0")).is_simple());
    assert!(!param("nointerpolation float4 p", vec![ParamModifier::NoInterpolation], None).is_simple());
}

#[test]
fn test_function_definitions_filter() {
    let signature = FunctionSignature {
        name: Located::none("Foo".to_string()),
        returntype: Type::from_text("void"),
        params: vec![],
        return_semantic: None,
        attributes: vec![],
    };
    let module = Module {
        root_definitions: vec![
            RootDefinition::FunctionDeclaration(signature.clone()),
            RootDefinition::Struct(StructDefinition { name: "S".to_string() }),
            RootDefinition::Function(FunctionDefinition {
                signature,
                body: FunctionBody {
                    text: "{ }".to_string(),
                    span: StreamSpan::new(0, 3),
                },
            }),
        ],
    };
    let names = module.function_definitions().map(|f| f.name()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Foo"]);
    assert!(Type::from_text("void").is_void());
    assert!(!Type::from_text("void4").is_void());
}
