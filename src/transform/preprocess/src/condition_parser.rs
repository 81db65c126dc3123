use crate::preprocess::PreprocessErrorReason;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{char, hex_digit1, multispace0};
use nom::combinator::{all_consuming, map, map_res, not, opt, recognize, value};
use nom::error::{Error, ErrorKind};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::IResult;

// Evaluates the integer expression of an #if / #elif after `defined` and
// macros have been resolved. Identifiers that survive substitution are 0.

type CResult<'a, T> = IResult<&'a str, T>;

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> CResult<'a, O>
where
    F: FnMut(&'a str) -> CResult<'a, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn int_suffix(input: &str) -> CResult<&str> {
    take_while(|c: char| c == 'u' || c == 'U' || c == 'l' || c == 'L')(input)
}

fn literal_hex(input: &str) -> CResult<i64> {
    map_res(
        preceded(alt((tag("0x"), tag("0X"))), hex_digit1),
        |digits: &str| i64::from_str_radix(digits, 16),
    )(input)
}

fn literal_decimal(input: &str) -> CResult<i64> {
    map_res(take_while1(|c: char| c.is_ascii_digit()), |digits: &str| {
        if digits.len() > 1 && digits.starts_with('0') {
            i64::from_str_radix(&digits[1..], 8)
        } else {
            digits.parse::<i64>()
        }
    })(input)
}

fn literal(input: &str) -> CResult<i64> {
    terminated(alt((literal_hex, literal_decimal)), int_suffix)(input)
}

fn identifier(input: &str) -> CResult<i64> {
    value(
        0,
        recognize(pair(
            take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
            take_while(is_identifier_char),
        )),
    )(input)
}

fn primary(input: &str) -> CResult<i64> {
    ws(alt((
        literal,
        delimited(char('('), conditional, char(')')),
        identifier,
    )))(input)
}

fn unary(input: &str) -> CResult<i64> {
    alt((
        map(preceded(ws(terminated(char('!'), not(char('=')))), unary), |v| (v == 0) as i64),
        map(preceded(ws(char('-')), unary), |v: i64| v.wrapping_neg()),
        map(preceded(ws(char('~')), unary), |v: i64| !v),
        preceded(ws(char('+')), unary),
        primary,
    ))(input)
}

fn apply(op: &str, lhs: i64, rhs: i64) -> Option<i64> {
    Some(match op {
        "||" => ((lhs != 0) || (rhs != 0)) as i64,
        "&&" => ((lhs != 0) && (rhs != 0)) as i64,
        "|" => lhs | rhs,
        "^" => lhs ^ rhs,
        "&" => lhs & rhs,
        "==" => (lhs == rhs) as i64,
        "!=" => (lhs != rhs) as i64,
        "<" => (lhs < rhs) as i64,
        ">" => (lhs > rhs) as i64,
        "<=" => (lhs <= rhs) as i64,
        ">=" => (lhs >= rhs) as i64,
        "<<" => lhs.checked_shl(u32::try_from(rhs).ok()?)?,
        ">>" => lhs.checked_shr(u32::try_from(rhs).ok()?)?,
        "+" => lhs.wrapping_add(rhs),
        "-" => lhs.wrapping_sub(rhs),
        "*" => lhs.wrapping_mul(rhs),
        "/" => lhs.checked_div(rhs)?,
        "%" => lhs.checked_rem(rhs)?,
        _ => return None,
    })
}

fn left_assoc<'a>(
    input: &'a str,
    operand: fn(&'a str) -> CResult<'a, i64>,
    operator: fn(&'a str) -> CResult<'a, &'a str>,
) -> CResult<'a, i64> {
    let (mut input, mut lhs) = operand(input)?;
    loop {
        match operator(input) {
            Ok((rest, op)) => {
                let (rest, rhs) = operand(rest)?;
                lhs = match apply(op, lhs, rhs) {
                    Some(v) => v,
                    None => return Err(nom::Err::Failure(Error::new(input, ErrorKind::Verify))),
                };
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, lhs)),
            Err(err) => return Err(err),
        }
    }
}

fn op_multiplicative(input: &str) -> CResult<&str> {
    ws(alt((tag("*"), tag("/"), tag("%"))))(input)
}

fn op_additive(input: &str) -> CResult<&str> {
    ws(alt((tag("+"), tag("-"))))(input)
}

fn op_shift(input: &str) -> CResult<&str> {
    ws(alt((tag("<<"), tag(">>"))))(input)
}

fn op_relational(input: &str) -> CResult<&str> {
    ws(alt((
        tag("<="),
        tag(">="),
        terminated(tag("<"), not(char('<'))),
        terminated(tag(">"), not(char('>'))),
    )))(input)
}

fn op_equality(input: &str) -> CResult<&str> {
    ws(alt((tag("=="), tag("!="))))(input)
}

fn op_bitand(input: &str) -> CResult<&str> {
    ws(terminated(tag("&"), not(char('&'))))(input)
}

fn op_bitxor(input: &str) -> CResult<&str> {
    ws(tag("^"))(input)
}

fn op_bitor(input: &str) -> CResult<&str> {
    ws(terminated(tag("|"), not(char('|'))))(input)
}

fn op_logical_and(input: &str) -> CResult<&str> {
    ws(tag("&&"))(input)
}

fn op_logical_or(input: &str) -> CResult<&str> {
    ws(tag("||"))(input)
}

fn multiplicative(input: &str) -> CResult<i64> {
    left_assoc(input, unary, op_multiplicative)
}

fn additive(input: &str) -> CResult<i64> {
    left_assoc(input, multiplicative, op_additive)
}

fn shift(input: &str) -> CResult<i64> {
    left_assoc(input, additive, op_shift)
}

fn relational(input: &str) -> CResult<i64> {
    left_assoc(input, shift, op_relational)
}

fn equality(input: &str) -> CResult<i64> {
    left_assoc(input, relational, op_equality)
}

fn bitand(input: &str) -> CResult<i64> {
    left_assoc(input, equality, op_bitand)
}

fn bitxor(input: &str) -> CResult<i64> {
    left_assoc(input, bitand, op_bitxor)
}

fn bitor(input: &str) -> CResult<i64> {
    left_assoc(input, bitxor, op_bitor)
}

fn logical_and(input: &str) -> CResult<i64> {
    left_assoc(input, bitor, op_logical_and)
}

fn logical_or(input: &str) -> CResult<i64> {
    left_assoc(input, logical_and, op_logical_or)
}

fn conditional(input: &str) -> CResult<i64> {
    let (input, test) = logical_or(input)?;
    let (input, branches) = opt(pair(
        preceded(ws(char('?')), conditional),
        preceded(ws(char(':')), conditional),
    ))(input)?;
    Ok(match branches {
        Some((if_true, if_false)) => (input, if test != 0 { if_true } else { if_false }),
        None => (input, test),
    })
}

pub fn parse(condition: &str) -> Result<bool, PreprocessErrorReason> {
    match all_consuming(ws(conditional))(condition) {
        Ok((_, v)) => Ok(v != 0),
        Err(_) => Err(PreprocessErrorReason::FailedToParseIfCondition(condition.to_string())),
    }
}

#[test]
fn test_condition_parser() {
    assert_eq!(parse("0").unwrap(), false);
    assert_eq!(parse("1").unwrap(), true);
    assert_eq!(parse("!0").unwrap(), true);
    assert_eq!(parse("!1").unwrap(), false);
    assert_eq!(parse(" ( 1 ) ").unwrap(), true);
}

#[test]
fn test_condition_operators() {
    assert_eq!(parse("1 && 0").unwrap(), false);
    assert_eq!(parse("1 || 0").unwrap(), true);
    assert_eq!(parse("0 || 0 && 1").unwrap(), false);
    assert_eq!(parse("2 + 3 * 4 == 14").unwrap(), true);
    assert_eq!(parse("(2 + 3) * 4 == 20").unwrap(), true);
    assert_eq!(parse("1 << 4 == 16").unwrap(), true);
    assert_eq!(parse("300 >= 300").unwrap(), true);
    assert_eq!(parse("300 < 200").unwrap(), false);
    assert_eq!(parse("6 & 3").unwrap(), true);
    assert_eq!(parse("4 & 3").unwrap(), false);
    assert_eq!(parse("4 | 0 && 1").unwrap(), true);
    assert_eq!(parse("5 != 5").unwrap(), false);
    assert_eq!(parse("-1 < 0").unwrap(), true);
    assert_eq!(parse("~0 == -1").unwrap(), true);
    assert_eq!(parse("1 ? 0 : 1").unwrap(), false);
    assert_eq!(parse("0 ? 0 : 1").unwrap(), true);
}

#[test]
fn test_condition_literals() {
    assert_eq!(parse("0x10 == 16").unwrap(), true);
    assert_eq!(parse("010 == 8").unwrap(), true);
    assert_eq!(parse("1u").unwrap(), true);
    assert_eq!(parse("100L == 100").unwrap(), true);
}

#[test]
fn test_condition_identifiers() {
    assert_eq!(parse("UNDEFINED_THING").unwrap(), false);
    assert_eq!(parse("!UNDEFINED_THING").unwrap(), true);
    assert_eq!(parse("UNDEFINED_THING || 1").unwrap(), true);
}

#[test]
fn test_condition_errors() {
    assert!(parse("").is_err());
    assert!(parse("1 +").is_err());
    assert!(parse("(1").is_err());
    assert!(parse("1 / 0").is_err());
}
