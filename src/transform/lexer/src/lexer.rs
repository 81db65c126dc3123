use cms_lang_htk::*;
use cms_shared::*;
use cms_transform_preprocess::PreprocessedText;
use nom::branch::alt;
use nom::bytes::complete::{escaped, is_not, tag, take_until, take_while};
use nom::character::complete::{anychar, char, digit0, digit1, hex_digit1, multispace1, oct_digit1, one_of, satisfy};
use nom::combinator::{map, map_res, opt, recognize, value};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, tuple};
use nom::IResult;

#[derive(PartialEq, Debug, Clone, thiserror::Error)]
pub enum LexError {
    #[error("{0}: failed to parse token near `{1}`")]
    FailedToParse(FileLocation, String),
    #[error("{0}: unexpected end of stream")]
    UnexpectedEndOfStream(FileLocation),
}

type LResult<'a, T> = IResult<&'a str, T>;

fn int_suffix(input: &str) -> LResult<Option<char>> {
    opt(one_of("uUlL"))(input)
}

fn literal_int(input: &str) -> LResult<Token> {
    let (input, value) = alt((
        map_res(preceded(alt((tag("0x"), tag("0X"))), hex_digit1), |digits: &str| {
            u64::from_str_radix(digits, 16)
        }),
        map_res(preceded(char('0'), oct_digit1), |digits: &str| u64::from_str_radix(digits, 8)),
        map_res(digit1, |digits: &str| digits.parse::<u64>()),
    ))(input)?;
    let (input, suffix) = int_suffix(input)?;
    Ok((input,
        match suffix {
            None => Token::LiteralInt(value),
            Some('u') | Some('U') => Token::LiteralUInt(value),
            Some(_) => Token::LiteralLong(value),
        }))
}

#[test]
fn test_literal_int() {
    let p = literal_int;
    assert_eq!(p("0u"), Ok(("", Token::LiteralUInt(0))));
    assert_eq!(p("0 "), Ok((" ", Token::LiteralInt(0))));
    assert_eq!(p("12 "), Ok((" ", Token::LiteralInt(12))));
    assert_eq!(p("12u"), Ok(("", Token::LiteralUInt(12))));
    assert_eq!(p("12l"), Ok(("", Token::LiteralLong(12))));
    assert_eq!(p("12L"), Ok(("", Token::LiteralLong(12))));
    assert_eq!(p("0x3 "), Ok((" ", Token::LiteralInt(3))));
    assert_eq!(p("0xA1 "), Ok((" ", Token::LiteralInt(161))));
    assert_eq!(p("0xA1u"), Ok(("", Token::LiteralUInt(161))));
    assert_eq!(p("0123u"), Ok(("", Token::LiteralUInt(83))));
}

fn fractional_constant(input: &str) -> LResult<&str> {
    alt((recognize(tuple((digit0, char('.'), digit1))), recognize(pair(digit1, char('.')))))(input)
}

fn exponent(input: &str) -> LResult<&str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

fn literal_float(input: &str) -> LResult<Token> {
    let mantissa = alt((
        recognize(pair(fractional_constant, opt(exponent))),
        recognize(pair(digit1, exponent)),
    ));
    map_res(pair(mantissa, opt(one_of("hHfFlL"))), |(text, suffix): (&str, Option<char>)| {
        text.parse::<f64>().map(|value| match suffix {
            Some('h') | Some('H') => Token::LiteralHalf(value as f32),
            Some('l') | Some('L') => Token::LiteralDouble(value),
            _ => Token::LiteralFloat(value as f32),
        })
    })(input)
}

#[test]
fn test_literal_float() {
    let p = literal_float;
    assert_eq!(p("0.0f"), Ok(("", Token::LiteralFloat(0.0))));
    assert_eq!(p("2.0 "), Ok((" ", Token::LiteralFloat(2.0))));
    assert_eq!(p("2.0L"), Ok(("", Token::LiteralDouble(2.0))));
    assert_eq!(p("0.5h"), Ok(("", Token::LiteralHalf(0.5))));
    assert_eq!(p(".5"), Ok(("", Token::LiteralFloat(0.5))));
    assert_eq!(p("1."), Ok(("", Token::LiteralFloat(1.0))));
    assert_eq!(p("1e2"), Ok(("", Token::LiteralFloat(100.0))));
    assert_eq!(p("1.5e-1f"), Ok(("", Token::LiteralFloat(0.15))));
    assert!(p("12").is_err());
}

fn literal_string(input: &str) -> LResult<Token> {
    map(delimited(char('"'), opt(escaped(is_not("\"\\\n"), '\\', anychar)), char('"')),
        |text: Option<&str>| Token::LiteralString(text.unwrap_or("").to_string()))(input)
}

fn identifier_text(input: &str) -> LResult<&str> {
    recognize(pair(satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
                   take_while(|c: char| c.is_ascii_alphanumeric() || c == '_')))(input)
}

fn reserved_word(name: &str) -> Option<Token> {
    Some(match name {
        "true" => Token::True,
        "false" => Token::False,
        "if" => Token::If,
        "else" => Token::Else,
        "for" => Token::For,
        "while" => Token::While,
        "do" => Token::Do,
        "switch" => Token::Switch,
        "return" => Token::Return,
        "struct" => Token::Struct,
        "cbuffer" => Token::ConstantBuffer,
        "tbuffer" => Token::TextureBuffer,
        "typedef" => Token::Typedef,
        "in" => Token::In,
        "out" => Token::Out,
        "inout" => Token::InOut,
        "uniform" => Token::Uniform,
        "const" => Token::Const,
        "unsigned" => Token::Unsigned,
        "extern" => Token::Extern,
        "static" => Token::Static,
        "inline" => Token::Inline,
        "groupshared" => Token::GroupShared,
        _ => return None,
    })
}

fn word(input: &str) -> LResult<Token> {
    map(identifier_text, |name: &str| match reserved_word(name) {
        Some(token) => token,
        None => Token::Id(Identifier(name.to_string())),
    })(input)
}

fn symbol_brackets(input: &str) -> LResult<Token> {
    alt((
        value(Token::LeftBrace, char('{')),
        value(Token::RightBrace, char('}')),
        value(Token::LeftParen, char('(')),
        value(Token::RightParen, char(')')),
        value(Token::LeftSquareBracket, char('[')),
        value(Token::RightSquareBracket, char(']')),
        value(Token::LeftAngleBracket, char('<')),
        value(Token::RightAngleBracket, char('>')),
    ))(input)
}

fn symbol_operators(input: &str) -> LResult<Token> {
    alt((
        value(Token::DoubleEquals, tag("==")),
        value(Token::ExclamationEquals, tag("!=")),
        value(Token::Semicolon, char(';')),
        value(Token::Comma, char(',')),
        value(Token::Plus, char('+')),
        value(Token::Minus, char('-')),
        value(Token::ForwardSlash, char('/')),
        value(Token::Percent, char('%')),
        value(Token::Asterix, char('*')),
        value(Token::VerticalBar, char('|')),
        value(Token::Ampersand, char('&')),
        value(Token::Hat, char('^')),
        value(Token::Equals, char('=')),
        value(Token::Hash, char('#')),
        value(Token::At, char('@')),
        value(Token::ExclamationPoint, char('!')),
        value(Token::Tilde, char('~')),
        value(Token::Period, char('.')),
        value(Token::Colon, char(':')),
        value(Token::QuestionMark, char('?')),
        value(Token::Backslash, char('\\')),
    ))(input)
}

fn token(input: &str) -> LResult<Token> {
    alt((literal_float, literal_int, literal_string, word, symbol_brackets, symbol_operators))(input)
}

fn line_comment(input: &str) -> LResult<&str> {
    recognize(pair(tag("//"), take_while(|c| c != '\n')))(input)
}

fn block_comment(input: &str) -> LResult<&str> {
    recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

fn whitespace(input: &str) -> LResult<()> {
    value((), many0(alt((multispace1, line_comment, block_comment))))(input)
}

#[test]
fn test_whitespace() {
    assert_eq!(whitespace(""), Ok(("", ())));
    assert_eq!(whitespace(" "), Ok(("", ())));
    assert_eq!(whitespace("//\n"), Ok(("", ())));
    assert_eq!(whitespace("// comment\n"), Ok(("", ())));
    assert_eq!(whitespace("/* comment */"), Ok(("", ())));
    assert_eq!(whitespace("/* line 1\n\t star *\n\t line 3 */"), Ok(("", ())));
    assert_eq!(whitespace("/* line 1\n\t slash /\n\t line 3 */ x"), Ok(("x", ())));
}

// Tokens with byte offsets, or the offset where lexing failed
fn token_stream(input: &str) -> Result<Vec<LexToken>, usize> {
    let total_length = input.len();
    let mut stream = vec![];
    let mut remaining = input;
    loop {
        remaining = match whitespace(remaining) {
            Ok((rest, ())) => rest,
            Err(_) => return Err(total_length - remaining.len()),
        };
        if remaining.is_empty() {
            return Ok(stream);
        }
        let start = (total_length - remaining.len()) as u64;
        // Unterminated block comment
        if remaining.starts_with("/*") {
            return Err(start as usize);
        }
        match token(remaining) {
            Ok((rest, tok)) => {
                let end = (total_length - rest.len()) as u64;
                stream.push(LexToken(tok, StreamSpan::new(start, end)));
                remaining = rest;
            }
            Err(_) => return Err(start as usize),
        }
    }
}

/// Splits preprocessed text into tokens, ending the stream with `Token::Eof`
pub fn lex(preprocessed: &PreprocessedText) -> Result<Tokens, LexError> {
    let code = preprocessed.as_str();
    match token_stream(code) {
        Ok(mut stream) => {
            let end = code.len() as u64;
            stream.push(LexToken(Token::Eof, StreamSpan::new(end, end)));
            Ok(Tokens { stream })
        }
        Err(offset) => {
            let location = preprocessed
                .get_file_location(&StreamLocation(offset as u64))
                .unwrap_or_else(|()| FileLocation::none());
            let rest = &code[offset..];
            if rest.starts_with("/*") || rest.starts_with('"') {
                Err(LexError::UnexpectedEndOfStream(location))
            } else {
                let snippet = rest.lines().next().unwrap_or("").chars().take(20).collect();
                Err(LexError::FailedToParse(location, snippet))
            }
        }
    }
}

#[test]
fn test_token() {
    fn id(name: &str) -> Token {
        Token::Id(Identifier(name.to_string()))
    }

    assert!(token("").is_err());
    assert_eq!(token(";"), Ok(("", Token::Semicolon)));
    assert_eq!(token("name"), Ok(("", id("name"))));
    assert_eq!(token("_Time.y"), Ok((".y", id("_Time"))));
    assert_eq!(token("12 "), Ok((" ", Token::LiteralInt(12))));
    assert_eq!(token("1.0f"), Ok(("", Token::LiteralFloat(1.0))));
    assert_eq!(token("\"str\\\"ing\""), Ok(("", Token::LiteralString("str\\\"ing".to_string()))));
    assert_eq!(token("\"\""), Ok(("", Token::LiteralString("".to_string()))));

    assert_eq!(token("{"), Ok(("", Token::LeftBrace)));
    assert_eq!(token("}"), Ok(("", Token::RightBrace)));
    assert_eq!(token("("), Ok(("", Token::LeftParen)));
    assert_eq!(token(")"), Ok(("", Token::RightParen)));
    assert_eq!(token("["), Ok(("", Token::LeftSquareBracket)));
    assert_eq!(token("]"), Ok(("", Token::RightSquareBracket)));
    assert_eq!(token("<<"), Ok(("<", Token::LeftAngleBracket)));
    assert_eq!(token(">"), Ok(("", Token::RightAngleBracket)));

    assert_eq!(token("=="), Ok(("", Token::DoubleEquals)));
    assert_eq!(token("= "), Ok((" ", Token::Equals)));
    assert_eq!(token("!="), Ok(("", Token::ExclamationEquals)));
    assert_eq!(token("! "), Ok((" ", Token::ExclamationPoint)));
    assert_eq!(token("&&"), Ok(("&", Token::Ampersand)));
    assert_eq!(token("||"), Ok(("|", Token::VerticalBar)));
    assert_eq!(token("-"), Ok(("", Token::Minus)));
    assert_eq!(token(":"), Ok(("", Token::Colon)));
    assert_eq!(token("?"), Ok(("", Token::QuestionMark)));
    assert_eq!(token("#"), Ok(("", Token::Hash)));

    assert_eq!(token("if"), Ok(("", Token::If)));
    assert_eq!(token("return"), Ok(("", Token::Return)));
    assert_eq!(token("struct"), Ok(("", Token::Struct)));
    assert_eq!(token("cbuffer"), Ok(("", Token::ConstantBuffer)));
    assert_eq!(token("typedef"), Ok(("", Token::Typedef)));
    assert_eq!(token("in"), Ok(("", Token::In)));
    assert_eq!(token("out"), Ok(("", Token::Out)));
    assert_eq!(token("inout"), Ok(("", Token::InOut)));
    assert_eq!(token("uniform"), Ok(("", Token::Uniform)));
    assert_eq!(token("const"), Ok(("", Token::Const)));
    assert_eq!(token("inline"), Ok(("", Token::Inline)));
    assert_eq!(token("true"), Ok(("", Token::True)));

    // Reserved words only match whole identifiers
    assert_eq!(token("structName"), Ok(("", id("structName"))));
    assert_eq!(token("input"), Ok(("", id("input"))));
    assert_eq!(token("inoutValue"), Ok(("", id("inoutValue"))));
}

#[test]
fn test_token_stream() {
    fn at(tok: Token, start: u64, end: u64) -> LexToken {
        LexToken(tok, StreamSpan::new(start, end))
    }
    fn id(name: &str) -> Token {
        Token::Id(Identifier(name.to_string()))
    }

    assert_eq!(token_stream(""), Ok(vec![]));
    assert_eq!(token_stream(" a "), Ok(vec![at(id("a"), 1, 2)]));
    assert_eq!(token_stream("void func();"),
               Ok(vec![at(id("void"), 0, 4),
                       at(id("func"), 5, 9),
                       at(Token::LeftParen, 9, 10),
                       at(Token::RightParen, 10, 11),
                       at(Token::Semicolon, 11, 12)]));
    assert_eq!(token_stream("-12l"),
               Ok(vec![at(Token::Minus, 0, 1), at(Token::LiteralLong(12), 1, 4)]));
    assert_eq!(token_stream("a /* b */ c // d\ne"),
               Ok(vec![at(id("a"), 0, 1), at(id("c"), 10, 11), at(id("e"), 17, 18)]));
    assert_eq!(token_stream("a $"), Err(2));
    assert_eq!(token_stream("a /* b"), Err(2));
}

#[test]
fn test_lex() {
    use cms_transform_preprocess::preprocess_single;

    let text = preprocess_single("#define F float\nF4 f(F x) { return x; }").unwrap();
    let tokens = lex(&text).unwrap();
    let kinds = tokens.stream.iter().map(|t| t.0.clone()).collect::<Vec<_>>();
    assert_eq!(kinds,
               vec![Token::Id(Identifier("F4".to_string())),
                    Token::Id(Identifier("f".to_string())),
                    Token::LeftParen,
                    Token::Id(Identifier("float".to_string())),
                    Token::Id(Identifier("x".to_string())),
                    Token::RightParen,
                    Token::LeftBrace,
                    Token::Return,
                    Token::Id(Identifier("x".to_string())),
                    Token::Semicolon,
                    Token::RightBrace,
                    Token::Eof]);
    let end = text.as_str().len() as u64;
    assert_eq!(tokens.stream.last().unwrap().1, StreamSpan::new(end, end));

    let empty = preprocess_single("").unwrap();
    assert_eq!(lex(&empty).unwrap().stream,
               vec![LexToken(Token::Eof, StreamSpan::new(0, 0))]);
}

#[test]
fn test_lex_errors() {
    use cms_transform_preprocess::preprocess_single;

    let text = preprocess_single("float x;\nfloat $y;").unwrap();
    match lex(&text) {
        Err(LexError::FailedToParse(FileLocation(_, Line(2), Column(7)), snippet)) => {
            assert_eq!(snippet, "$y;")
        }
        other => panic!("unexpected lex result {:?}", other),
    }
    let text = preprocess_single("float x = \"abc").unwrap();
    match lex(&text) {
        Err(LexError::UnexpectedEndOfStream(FileLocation(_, Line(1), Column(11)))) => {}
        other => panic!("unexpected lex result {:?}", other),
    }
}
