
use cms_shared::*;

#[derive(PartialEq, Debug, Clone)]
pub struct Identifier(pub String);

#[derive(PartialEq, Debug, Clone)]
pub enum Token {
    Eof, // Marks the end of a stream

    Id(Identifier),
    LiteralInt(u64), // Int (Hlsl ints do not have sign, the - is an operator on the literal)
    LiteralUInt(u64), // Int with explicit unsigned type
    LiteralLong(u64), // Int with explicit long type
    LiteralHalf(f32),
    LiteralFloat(f32),
    LiteralDouble(f64),
    LiteralString(String),
    True,
    False,

    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    LeftSquareBracket,
    RightSquareBracket,
    LeftAngleBracket,
    RightAngleBracket,
    Semicolon,
    Comma,
    QuestionMark,
    Colon,

    Plus,
    Minus,
    ForwardSlash,
    Percent,
    Asterix,
    VerticalBar,
    Ampersand,
    Hat,
    Equals,
    Hash,
    At,
    ExclamationPoint,
    Tilde,
    Period,
    DoubleEquals,
    ExclamationEquals,
    Backslash,

    If,
    Else,
    For,
    While,
    Do,
    Switch,
    Return,

    Struct,
    ConstantBuffer,
    TextureBuffer,
    Typedef,

    In,
    Out,
    InOut,
    Uniform,

    Const,
    Unsigned,

    Extern,
    Static,
    Inline,
    GroupShared,
}

impl Token {
    /// Name of the identifier if the token is one
    pub fn as_identifier(&self) -> Option<&str> {
        match *self {
            Token::Id(Identifier(ref name)) => Some(name),
            _ => None,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct LexToken(pub Token, pub StreamSpan);

#[derive(PartialEq, Debug, Clone)]
pub struct Tokens {
    pub stream: Vec<LexToken>,
}

#[test]
fn test_as_identifier() {
    assert_eq!(Token::Id(Identifier("uv".to_string())).as_identifier(), Some("uv"));
    assert_eq!(Token::Struct.as_identifier(), None);
}
