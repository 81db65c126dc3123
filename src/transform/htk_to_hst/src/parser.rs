use cms_lang_hst::*;
use cms_lang_htk::*;
use cms_shared::*;
use cms_transform_preprocess::PreprocessedText;
use nom::branch::alt;
use nom::combinator::{map, opt};
use nom::error::{ErrorKind, ParseError as NomParseError};
use nom::multi::{many0, separated_list0};
use nom::sequence::{preceded, terminated};
use nom::IResult;

#[derive(PartialEq, Debug, Clone, Copy, thiserror::Error)]
pub enum ParseErrorReason {
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,
    #[error("failed to parse declaration")]
    FailedToParse,
    #[error("unexpected token")]
    WrongToken,
    #[error("bracket is never closed")]
    UnclosedBracket,
}

#[derive(PartialEq, Debug, Clone, thiserror::Error)]
#[error("{1}: {0}")]
pub struct ParseError(pub ParseErrorReason, pub FileLocation);

/// Parser error with the remaining tokens where it happened
#[derive(PartialEq, Debug, Clone)]
struct ErrorContext<'t>(ParseErrorReason, &'t [LexToken]);

impl<'t> NomParseError<&'t [LexToken]> for ErrorContext<'t> {
    fn from_error_kind(input: &'t [LexToken], _: ErrorKind) -> Self {
        ErrorContext(ParseErrorReason::FailedToParse, input)
    }

    fn append(_: &'t [LexToken], _: ErrorKind, other: Self) -> Self {
        other
    }

    // Keep the error from the alternative that got furthest
    fn or(self, other: Self) -> Self {
        if other.1.len() < self.1.len() {
            other
        } else {
            self
        }
    }
}

type PResult<'t, T> = IResult<&'t [LexToken], T, ErrorContext<'t>>;

fn fail<T>(reason: ParseErrorReason, input: &[LexToken]) -> PResult<'_, T> {
    Err(nom::Err::Error(ErrorContext(reason, input)))
}

fn is_end(input: &[LexToken]) -> bool {
    matches!(input.first(), None | Some(LexToken(Token::Eof, _)))
}

fn unexpected<T>(input: &[LexToken]) -> PResult<'_, T> {
    if is_end(input) {
        fail(ParseErrorReason::UnexpectedEndOfStream, input)
    } else {
        fail(ParseErrorReason::WrongToken, input)
    }
}

fn end_of(input: &[LexToken]) -> &[LexToken] {
    &input[input.len().saturating_sub(1)..]
}

fn token<'t>(expected: Token) -> impl Fn(&'t [LexToken]) -> PResult<'t, &'t LexToken> {
    move |input: &'t [LexToken]| match input.first() {
        Some(tok) if tok.0 == expected => Ok((&input[1..], tok)),
        _ => unexpected(input),
    }
}

fn identifier(input: &[LexToken]) -> PResult<'_, (String, StreamSpan)> {
    match input.first() {
        Some(LexToken(Token::Id(Identifier(name)), span)) => Ok((&input[1..], (name.clone(), *span))),
        _ => unexpected(input),
    }
}

fn span_of(tokens: &[LexToken]) -> Option<StreamSpan> {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => Some(first.1.join(&last.1)),
        _ => None,
    }
}

fn source_of(tokens: &[LexToken], text: &PreprocessedText) -> String {
    match span_of(tokens) {
        Some(span) => text.source_text(&span).to_string(),
        None => String::new(),
    }
}

fn consumed<'t>(before: &'t [LexToken], after: &'t [LexToken]) -> &'t [LexToken] {
    &before[..(before.len() - after.len())]
}

/// Consumes `open` through the matching `close`
fn balanced<'t>(open: Token, close: Token) -> impl Fn(&'t [LexToken]) -> PResult<'t, StreamSpan> {
    move |input: &'t [LexToken]| {
        let (_, first) = token(open.clone())(input)?;
        let mut depth = 0u32;
        for (index, tok) in input.iter().enumerate() {
            if tok.0 == open {
                depth += 1;
            } else if tok.0 == close {
                depth -= 1;
                if depth == 0 {
                    return Ok((&input[(index + 1)..], first.1.join(&tok.1)));
                }
            } else if tok.0 == Token::Eof {
                break;
            }
        }
        fail(ParseErrorReason::UnclosedBracket, end_of(input))
    }
}

/// Tokens up to the first of `stops` outside of any brackets
fn scan_until<'t>(input: &'t [LexToken], stops: &[Token]) -> PResult<'t, &'t [LexToken]> {
    let mut depth = 0u32;
    for (index, tok) in input.iter().enumerate() {
        if depth == 0 && stops.contains(&tok.0) {
            return Ok((&input[index..], &input[..index]));
        }
        match tok.0 {
            Token::Eof => break,
            Token::LeftParen | Token::LeftSquareBracket | Token::LeftBrace => depth += 1,
            Token::RightParen | Token::RightSquareBracket | Token::RightBrace => {
                if depth == 0 {
                    return fail(ParseErrorReason::WrongToken, &input[index..]);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    fail(ParseErrorReason::UnexpectedEndOfStream, end_of(input))
}

fn bracket_contents(text: &str) -> String {
    text.trim_start_matches('[').trim_end_matches(']').trim().to_string()
}

// Qualifiers that lex as identifiers but belong to the type
fn type_prefix(input: &[LexToken]) -> PResult<'_, ()> {
    match input.first().and_then(|tok| tok.0.as_identifier()) {
        Some("row_major") | Some("column_major") | Some("snorm") | Some("unorm") | Some("precise") => {
            Ok((&input[1..], ()))
        }
        _ => unexpected(input),
    }
}

fn typename<'t>(input: &'t [LexToken], text: &PreprocessedText) -> PResult<'t, Type> {
    let (start, is_const) = map(opt(token(Token::Const)), |c| c.is_some())(input)?;
    let (rest, _) = many0(type_prefix)(start)?;
    let (rest, _) = opt(token(Token::Unsigned))(rest)?;
    let (rest, _) = identifier(rest)?;
    let (rest, _) = opt(balanced(Token::LeftAngleBracket, Token::RightAngleBracket))(rest)?;
    Ok((rest,
        Type {
            text: source_of(consumed(start, rest), text),
            is_const,
        }))
}

fn storage_class(input: &[LexToken]) -> PResult<'_, ()> {
    match input.first() {
        Some(LexToken(Token::Inline, _)) |
        Some(LexToken(Token::Static, _)) |
        Some(LexToken(Token::Extern, _)) => Ok((&input[1..], ())),
        _ => unexpected(input),
    }
}

fn param_modifier(input: &[LexToken]) -> PResult<'_, ParamModifier> {
    let modifier = match input.first() {
        Some(LexToken(Token::In, _)) => ParamModifier::In,
        Some(LexToken(Token::Out, _)) => ParamModifier::Out,
        Some(LexToken(Token::InOut, _)) => ParamModifier::InOut,
        Some(LexToken(Token::Uniform, _)) => ParamModifier::Uniform,
        Some(LexToken(Token::Const, _)) => ParamModifier::Const,
        Some(LexToken(Token::Id(Identifier(name)), _)) => {
            // `point`, `line` and friends are only modifiers when a type and
            // a name follow them
            let declares_more = matches!(input.get(1), Some(LexToken(Token::Id(_), _))) &&
                                !matches!(input.get(2).map(|tok| &tok.0),
                                          Some(Token::Comma) | Some(Token::RightParen) |
                                          Some(Token::Colon) | Some(Token::Equals) |
                                          Some(Token::LeftSquareBracket));
            match ParamModifier::from_contextual_name(name) {
                Some(modifier) if declares_more => modifier,
                _ => return unexpected(input),
            }
        }
        _ => return unexpected(input),
    };
    Ok((&input[1..], modifier))
}

// `: SEMANTIC`, `: register(...)` or `: packoffset(...)`
fn annotation(input: &[LexToken]) -> PResult<'_, Option<String>> {
    let (rest, _) = token(Token::Colon)(input)?;
    let (rest, (name, _)) = identifier(rest)?;
    match &name[..] {
        "register" | "packoffset" => {
            let (rest, _) = balanced(Token::LeftParen, Token::RightParen)(rest)?;
            Ok((rest, None))
        }
        _ => Ok((rest, Some(name))),
    }
}

/// The first semantic among any number of annotations
fn semantic(input: &[LexToken]) -> PResult<'_, Option<Semantic>> {
    let (rest, annotations) = many0(annotation)(input)?;
    Ok((rest, annotations.into_iter().flatten().next().map(Semantic)))
}

fn functionparam<'t>(input: &'t [LexToken], text: &PreprocessedText) -> PResult<'t, FunctionParam> {
    let (rest, modifiers) = many0(param_modifier)(input)?;
    let (rest, param_type) = typename(rest, text)?;
    let (rest, (name, _)) = identifier(rest)?;
    let (rest, dims) = many0(balanced(Token::LeftSquareBracket, Token::RightSquareBracket))(rest)?;
    let declaration = consumed(input, rest);
    let (rest, semantic) = semantic(rest)?;
    let (rest, default_value) =
        opt(preceded(token(Token::Equals),
                     |i| scan_until(i, &[Token::Comma, Token::RightParen])))(rest)?;
    Ok((rest,
        FunctionParam {
            name,
            modifiers,
            param_type,
            array_dims: dims.iter().map(|span| bracket_contents(text.source_text(span))).collect(),
            semantic,
            default_value: default_value.map(|tokens| source_of(tokens, text)),
            text: source_of(declaration, text),
        }))
}

fn paramlist<'t>(input: &'t [LexToken], text: &PreprocessedText) -> PResult<'t, Vec<FunctionParam>> {
    let (rest, _) = token(Token::LeftParen)(input)?;
    if let (Some(Some("void")), Some(LexToken(Token::RightParen, _))) =
        (rest.first().map(|tok| tok.0.as_identifier()), rest.get(1)) {
        return Ok((&rest[2..], vec![]));
    }
    terminated(separated_list0(token(Token::Comma), |i| functionparam(i, text)),
               token(Token::RightParen))(rest)
}

fn function<'t>(input: &'t [LexToken], text: &PreprocessedText) -> PResult<'t, RootDefinition> {
    let (rest, attributes) = many0(balanced(Token::LeftSquareBracket, Token::RightSquareBracket))(input)?;
    let (rest, _) = many0(storage_class)(rest)?;
    let (rest, returntype) = typename(rest, text)?;
    let (rest, (name, name_span)) = identifier(rest)?;
    let (rest, params) = paramlist(rest, text)?;
    let (rest, return_semantic) = semantic(rest)?;

    let location = text.get_file_location(&name_span.start).unwrap_or_else(|()| FileLocation::none());
    let signature = FunctionSignature {
        name: Located::new(name, location),
        returntype,
        params,
        return_semantic,
        attributes: attributes.iter().map(|span| bracket_contents(text.source_text(span))).collect(),
    };

    match balanced(Token::LeftBrace, Token::RightBrace)(rest) {
        Ok((rest, span)) => {
            let body = FunctionBody {
                text: text.source_text(&span).to_string(),
                span,
            };
            Ok((rest, RootDefinition::Function(FunctionDefinition { signature, body })))
        }
        Err(nom::Err::Error(body_err)) => {
            match token(Token::Semicolon)(rest) {
                Ok((rest, _)) => Ok((rest, RootDefinition::FunctionDeclaration(signature))),
                Err(nom::Err::Error(decl_err)) => Err(nom::Err::Error(body_err.or(decl_err))),
                Err(err) => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

fn structdefinition(input: &[LexToken]) -> PResult<'_, RootDefinition> {
    let (rest, _) = token(Token::Struct)(input)?;
    let (rest, (name, _)) = identifier(rest)?;
    let (rest, _) = balanced(Token::LeftBrace, Token::RightBrace)(rest)?;
    let (rest, _) = scan_until(rest, &[Token::Semicolon])?;
    let (rest, _) = token(Token::Semicolon)(rest)?;
    Ok((rest, RootDefinition::Struct(StructDefinition { name })))
}

fn cbuffer(input: &[LexToken]) -> PResult<'_, RootDefinition> {
    let (rest, _) = alt((token(Token::ConstantBuffer), token(Token::TextureBuffer)))(input)?;
    let (rest, (name, _)) = identifier(rest)?;
    let (rest, _) = opt(preceded(token(Token::Colon), |i| scan_until(i, &[Token::LeftBrace])))(rest)?;
    let (rest, _) = balanced(Token::LeftBrace, Token::RightBrace)(rest)?;
    let (rest, _) = opt(token(Token::Semicolon))(rest)?;
    Ok((rest, RootDefinition::ConstantBuffer(ConstantBuffer { name })))
}

fn typedef(input: &[LexToken]) -> PResult<'_, RootDefinition> {
    let (rest, _) = token(Token::Typedef)(input)?;
    let (rest, declaration) = scan_until(rest, &[Token::Semicolon])?;
    let (rest, _) = token(Token::Semicolon)(rest)?;
    match declaration.iter().rev().find_map(|tok| tok.0.as_identifier()) {
        Some(name) => Ok((rest, RootDefinition::Typedef(Typedef { name: name.to_string() }))),
        None => fail(ParseErrorReason::FailedToParse, input),
    }
}

// True when a top level `(...)` is followed by a `{`, which only a function
// definition can contain
fn has_function_body(declaration: &[LexToken]) -> bool {
    let mut depth = 0u32;
    for (index, tok) in declaration.iter().enumerate() {
        match tok.0 {
            Token::LeftParen | Token::LeftSquareBracket | Token::LeftBrace => depth += 1,
            Token::RightParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 && matches!(declaration.get(index + 1), Some(LexToken(Token::LeftBrace, _))) {
                    return true;
                }
            }
            Token::RightSquareBracket | Token::RightBrace => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    false
}

fn globalvariable(input: &[LexToken]) -> PResult<'_, RootDefinition> {
    let (rest, declaration) = scan_until(input, &[Token::Semicolon])?;
    if declaration.is_empty() || has_function_body(declaration) {
        return fail(ParseErrorReason::FailedToParse, input);
    }
    let (rest, _) = token(Token::Semicolon)(rest)?;
    Ok((rest, RootDefinition::GlobalVariable))
}

fn rootdefinition<'t>(input: &'t [LexToken], text: &PreprocessedText) -> PResult<'t, RootDefinition> {
    alt((structdefinition,
         cbuffer,
         typedef,
         |i| function(i, text),
         globalvariable,
         map(token(Token::Semicolon), |_| RootDefinition::Empty)))(input)
}

fn module<'t>(input: &'t [LexToken], text: &PreprocessedText) -> PResult<'t, Vec<RootDefinition>> {
    let mut roots = Vec::new();
    let mut rest = input;
    while !is_end(rest) {
        let (remaining, root) = rootdefinition(rest, text)?;
        roots.push(root);
        rest = remaining;
    }
    Ok((rest, roots))
}

/// Parses the outline of every root definition in a token stream
///
/// `text` is the preprocessed text the tokens were lexed from. It supplies
/// the verbatim source for function bodies, parameters and types along with
/// file locations.
pub fn parse(source: &[LexToken], text: &PreprocessedText) -> Result<Module, ParseError> {
    match module(source, text) {
        Ok((_, root_definitions)) => Ok(Module { root_definitions }),
        Err(nom::Err::Error(ErrorContext(reason, position))) |
        Err(nom::Err::Failure(ErrorContext(reason, position))) => {
            let location = position
                .first()
                .and_then(|tok| text.get_file_location(&tok.1.start).ok())
                .unwrap_or_else(FileLocation::none);
            Err(ParseError(reason, location))
        }
        Err(nom::Err::Incomplete(_)) => {
            Err(ParseError(ParseErrorReason::UnexpectedEndOfStream, FileLocation::none()))
        }
    }
}

#[cfg(test)]
fn parse_str(source: &str) -> Result<Module, ParseError> {
    use cms_transform_lexer::lex;
    use cms_transform_preprocess::preprocess_single;
    let preprocessed = preprocess_single(source).expect("preprocess failed");
    let tokens = lex(&preprocessed).expect("lex failed");
    parse(&tokens.stream, &preprocessed)
}

#[cfg(test)]
fn parse_function(source: &str) -> FunctionDefinition {
    let module = parse_str(source).unwrap();
    match module.root_definitions.as_slice() {
        [RootDefinition::Function(def)] => def.clone(),
        other => panic!("expected a single function in `{}`, got {:?}", source, other),
    }
}

#[test]
fn test_function_definition() {
    let def = parse_function("float4 Foo(float4 a, float b) { return a * b; }");
    assert_eq!(def.name(), "Foo");
    assert_eq!(def.signature.name.location,
               FileLocation(File::Unknown, Line(1), Column(8)));
    assert_eq!(def.signature.returntype, Type::from_text("float4"));
    assert_eq!(def.signature.params.len(), 2);
    assert_eq!(def.signature.params[0],
               FunctionParam {
                   name: "a".to_string(),
                   modifiers: vec![],
                   param_type: Type::from_text("float4"),
                   array_dims: vec![],
                   semantic: None,
                   default_value: None,
                   text: "float4 a".to_string(),
               });
    assert_eq!(def.signature.params[1].text, "float b");
    assert_eq!(def.body.text, "{ return a * b; }");
    assert_eq!(def.signature.return_semantic, None);
}

#[test]
fn test_function_modifiers_and_semantics() {
    let def = parse_function("inline void Bar(in float3 v : POSITION, out float4 o,\n\
                              nointerpolation float x, const int i) : SV_Target { o = v.xyzz; }");
    assert_eq!(def.signature.returntype.text, "void");
    assert!(def.signature.returntype.is_void());
    let params = &def.signature.params;
    assert_eq!(params[0].modifiers, vec![ParamModifier::In]);
    assert_eq!(params[0].semantic, Some(Semantic("POSITION".to_string())));
    assert_eq!(params[0].text, "in float3 v");
    assert_eq!(params[1].modifiers, vec![ParamModifier::Out]);
    assert_eq!(params[2].modifiers, vec![ParamModifier::NoInterpolation]);
    assert_eq!(params[2].param_type.text, "float");
    assert_eq!(params[3].modifiers, vec![ParamModifier::Const]);
    assert!(params.iter().all(|p| !p.is_simple()));
    assert_eq!(def.signature.return_semantic, Some(Semantic("SV_Target".to_string())));
}

#[test]
fn test_function_param_forms() {
    let def = parse_function("float4 Sample(Texture2D<float4> tex, SamplerState s, float w[4], \
                              float bias = 0.5, float3 line) { return 0; }");
    let params = &def.signature.params;
    assert_eq!(params[0].param_type.text, "Texture2D<float4>");
    assert_eq!(params[0].text, "Texture2D<float4> tex");
    assert_eq!(params[1].param_type.text, "SamplerState");
    assert_eq!(params[2].array_dims, vec!["4".to_string()]);
    assert_eq!(params[2].text, "float w[4]");
    assert_eq!(params[3].default_value, Some("0.5".to_string()));
    assert_eq!(params[3].text, "float bias");
    assert_eq!(params[4].name, "line");
    assert!(params[4].is_simple());

    let def = parse_function("float One(void) { return 1; }");
    assert!(def.signature.params.is_empty());
    let def = parse_function("float One() { return 1; }");
    assert!(def.signature.params.is_empty());

    let def = parse_function("unsigned int Count(unsigned int n) { return n; }");
    assert_eq!(def.signature.returntype.text, "unsigned int");
    assert_eq!(def.signature.params[0].text, "unsigned int n");

    let def = parse_function("[maxvertexcount(3)] void GS(point float4 p[1], inout TriangleStream<float4> s) { }");
    assert_eq!(def.signature.attributes, vec!["maxvertexcount(3)".to_string()]);
    assert_eq!(def.signature.params[0].modifiers, vec![ParamModifier::Point]);
    assert_eq!(def.signature.params[1].param_type.text, "TriangleStream<float4>");
}

#[test]
fn test_function_body_verbatim() {
    let def = parse_function("#define ONE 1.0\nfloat One() { /* one */ return ONE; }");
    assert_eq!(def.body.text, "{ /* one */ return ONE; }");
    let def = parse_function("float Two()\n{\n    // two\n    return 2.0;\n}\n");
    assert_eq!(def.body.text, "{\n    // two\n    return 2.0;\n}");
    let def = parse_function("float Nested(float x) { if (x > 0) { return 1; } return { 0 }; }");
    assert_eq!(def.body.text, "{ if (x > 0) { return 1; } return { 0 }; }");
}

#[test]
fn test_root_definitions() {
    let module = parse_str("struct appdata { float4 vertex : POSITION; };\n\
                            cbuffer UnityPerCamera : register(b0) { float4 _Time; };\n\
                            typedef float4 color;\n\
                            uniform float4 _ProjectionParams;\n\
                            static const float3 weights[2] = { float3(1, 0, 0), float3(0, 1, 0) };\n\
                            ;\n\
                            float Decl(float x);\n\
                            float Def(float x) { return x; }\n\
                            UNITY_DECLARE_SHADOWMAP(_ShadowMapTexture);\n")
        .unwrap();
    let roots = &module.root_definitions;
    assert_eq!(roots.len(), 9);
    assert_eq!(roots[0], RootDefinition::Struct(StructDefinition { name: "appdata".to_string() }));
    assert_eq!(roots[1], RootDefinition::ConstantBuffer(ConstantBuffer { name: "UnityPerCamera".to_string() }));
    assert_eq!(roots[2], RootDefinition::Typedef(Typedef { name: "color".to_string() }));
    assert_eq!(roots[3], RootDefinition::GlobalVariable);
    assert_eq!(roots[4], RootDefinition::GlobalVariable);
    assert_eq!(roots[5], RootDefinition::Empty);
    assert!(matches!(roots[6], RootDefinition::FunctionDeclaration(ref sig) if *sig.name == "Decl"));
    assert!(matches!(roots[7], RootDefinition::Function(ref def) if def.name() == "Def"));
    assert_eq!(roots[8], RootDefinition::GlobalVariable);
    assert_eq!(module.function_definitions().count(), 1);
}

#[test]
fn test_empty_module() {
    assert_eq!(parse_str("").unwrap().root_definitions, vec![]);
    assert_eq!(parse_str("// nothing\n").unwrap().root_definitions, vec![]);
}

#[test]
fn test_parse_errors() {
    assert_eq!(parse_str("}"),
               Err(ParseError(ParseErrorReason::WrongToken, FileLocation(File::Unknown, Line(1), Column(1)))));
    match parse_str("void f() { return;") {
        Err(ParseError(ParseErrorReason::UnclosedBracket, _)) => {}
        other => panic!("unexpected parse result {:?}", other),
    }
    assert!(parse_str("float4 f(float x { }").is_err());
    assert_eq!(parse_str("float x;\nfloat y").unwrap_err().0,
               ParseErrorReason::UnexpectedEndOfStream);
}

#[test]
fn test_register_annotations() {
    let module = parse_str("float Reg(float a : register(c0)) { return a; }\n\
                            float Next(float b) { return b; }\n\
                            float4 _Color;\n")
        .unwrap();
    let names = module.function_definitions().map(|def| def.name()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Reg", "Next"]);
    assert_eq!(module.root_definitions[2], RootDefinition::GlobalVariable);

    let def = parse_function("float4 Packed(float4 c : COLOR0 : register(s1), float x : packoffset(c0.y))\n\
                              : SV_Target : register(o0) { return c * x; }");
    let params = &def.signature.params;
    assert_eq!(params[0].semantic, Some(Semantic("COLOR0".to_string())));
    assert_eq!(params[0].text, "float4 c");
    assert_eq!(params[1].semantic, None);
    assert_eq!(params[1].text, "float x");
    assert_eq!(def.signature.return_semantic, Some(Semantic("SV_Target".to_string())));
    assert_eq!(def.body.text, "{ return c * x; }");
}

#[test]
fn test_unparsed_function_is_an_error() {
    // A definition that fails to parse is never swallowed as a global
    let err = parse_str("float4 _Before;\n\
                         float Bad(float a b) { return a; }\n\
                         float Good(float b) { return b; }\n\
                         float4 _After;\n")
        .unwrap_err();
    assert_eq!(err.1, FileLocation(File::Unknown, Line(2), Column(19)));
    assert!(parse_str("float Odd(float a) : register(b0 { return a; }\nfloat4 _After;").is_err());
}
