use crate::preprocess::PreprocessErrorReason;
use std::collections::HashMap;

pub(crate) fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

pub(crate) fn is_identifier_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Length of the identifier at the start of `text`, 0 if there is none
pub(crate) fn identifier_length(text: &str) -> usize {
    let bytes = text.as_bytes();
    match bytes.first() {
        Some(&c) if is_identifier_start(c) => {
            1 + bytes[1..].iter().take_while(|&&c| is_identifier_char(c)).count()
        }
        _ => 0,
    }
}

/// Index just past the string literal starting at `start`
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            b'\n' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

#[derive(PartialEq, Debug, Clone, Copy)]
struct MacroArg(usize);

#[derive(PartialEq, Debug, Clone)]
enum MacroSegment {
    Text(String),
    /// Argument after full macro expansion
    Arg(MacroArg),
    /// Argument next to a `##`, inserted as written
    RawArg(MacroArg),
    /// `#arg`
    Stringize(MacroArg),
    /// `##`
    Paste,
}

#[derive(PartialEq, Debug, Clone)]
pub(crate) struct Macro {
    name: String,
    params: Option<Vec<String>>,
    variadic: bool,
    body: Vec<MacroSegment>,
}

impl Macro {
    pub fn from_definition(
        name: &str,
        params: Option<Vec<String>>,
        body: &str,
    ) -> Result<Macro, PreprocessErrorReason> {
        let variadic = match params {
            Some(ref params) => {
                for (index, param) in params.iter().enumerate() {
                    let valid = if param == "..." {
                        index == params.len() - 1
                    } else {
                        identifier_length(param) == param.len() && !param.is_empty()
                    };
                    if !valid {
                        return Err(PreprocessErrorReason::InvalidDefine);
                    }
                }
                params.last().map_or(false, |p| p == "...")
            }
            None => false,
        };
        let params = params.map(|params| {
            params
                .into_iter()
                .map(|p| if p == "..." { "__VA_ARGS__".to_string() } else { p })
                .collect::<Vec<_>>()
        });

        let find_param = |name: &str| match params {
            Some(ref params) => params.iter().position(|p| p == name).map(MacroArg),
            None => None,
        };

        let bytes = body.as_bytes();
        let mut segments = vec![];
        let mut text_start = 0;
        let mut i = 0;
        while i < bytes.len() {
            let c = bytes[i];
            if c == b'"' {
                i = skip_string(bytes, i);
            } else if is_identifier_start(c) && (i == 0 || !is_identifier_char(bytes[i - 1])) {
                let len = identifier_length(&body[i..]);
                match find_param(&body[i..(i + len)]) {
                    Some(arg) => {
                        push_text(&mut segments, &body[text_start..i]);
                        segments.push(MacroSegment::Arg(arg));
                        text_start = i + len;
                    }
                    None => {}
                }
                i += len;
            } else if c == b'#' && bytes.get(i + 1) == Some(&b'#') {
                push_text(&mut segments, &body[text_start..i]);
                segments.push(MacroSegment::Paste);
                i += 2;
                text_start = i;
            } else if c == b'#' && params.is_some() {
                let after = &body[(i + 1)..];
                let trimmed = after.trim_start();
                let len = identifier_length(trimmed);
                match find_param(&trimmed[..len]) {
                    Some(arg) if len > 0 => {
                        push_text(&mut segments, &body[text_start..i]);
                        segments.push(MacroSegment::Stringize(arg));
                        i = i + 1 + (after.len() - trimmed.len()) + len;
                        text_start = i;
                    }
                    _ => i += 1,
                }
            } else {
                i += 1;
            }
        }
        push_text(&mut segments, &body[text_start..]);

        Ok(Macro {
            name: name.to_string(),
            params,
            variadic,
            body: mark_pasted(segments),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, raw_args: &[String], expanded_args: &[String]) -> String {
        let mut output = String::new();
        for segment in &self.body {
            match *segment {
                MacroSegment::Text(ref text) => output.push_str(text),
                MacroSegment::Arg(MacroArg(index)) => output.push_str(&expanded_args[index]),
                MacroSegment::RawArg(MacroArg(index)) => output.push_str(&raw_args[index]),
                MacroSegment::Stringize(MacroArg(index)) => {
                    output.push('"');
                    let collapsed = raw_args[index].split_whitespace().collect::<Vec<_>>().join(" ");
                    output.push_str(&collapsed.replace('\\', "\\\\").replace('"', "\\\""));
                    output.push('"');
                }
                MacroSegment::Paste => {}
            }
        }
        output
    }
}

// Split whitespace runs into their own segments so pasting can drop them
fn push_text(segments: &mut Vec<MacroSegment>, text: &str) {
    let mut rest = text;
    while !rest.is_empty() {
        let ws = rest.len() - rest.trim_start().len();
        let len = if ws > 0 {
            ws
        } else {
            rest.find(char::is_whitespace).unwrap_or(rest.len())
        };
        segments.push(MacroSegment::Text(rest[..len].to_string()));
        rest = &rest[len..];
    }
}

fn is_blank(segment: &MacroSegment) -> bool {
    match *segment {
        MacroSegment::Text(ref text) => text.trim().is_empty(),
        _ => false,
    }
}

fn mark_pasted(segments: Vec<MacroSegment>) -> Vec<MacroSegment> {
    let mut output: Vec<MacroSegment> = Vec::with_capacity(segments.len());
    let mut after_paste = false;
    for segment in segments {
        if segment == MacroSegment::Paste {
            while output.last().map_or(false, is_blank) {
                output.pop();
            }
            if let Some(MacroSegment::Arg(arg)) = output.last().cloned() {
                output.pop();
                output.push(MacroSegment::RawArg(arg));
            }
            output.push(segment);
            after_paste = true;
            continue;
        }
        if after_paste && is_blank(&segment) {
            continue;
        }
        let segment = match segment {
            MacroSegment::Arg(arg) if after_paste => MacroSegment::RawArg(arg),
            other => other,
        };
        after_paste = false;
        output.push(segment);
    }
    output
}

/// Piece of a substituted region. Offsets are relative to the region text.
#[derive(PartialEq, Debug, Clone)]
pub(crate) enum SubstitutedSegment {
    Text(usize, usize),
    Replaced(String, usize),
}

#[derive(PartialEq, Debug, Clone)]
pub(crate) struct SubstitutionError {
    pub reason: PreprocessErrorReason,
    pub offset: usize,
}

pub(crate) struct MacroTable {
    macros: HashMap<String, Macro>,
}

impl MacroTable {
    pub fn new() -> MacroTable {
        MacroTable {
            macros: HashMap::new(),
        }
    }

    /// Adds a macro, returning the definition it replaced
    pub fn define(&mut self, macro_def: Macro) -> Option<Macro> {
        self.macros.insert(macro_def.name.clone(), macro_def)
    }

    pub fn undefine(&mut self, name: &str) -> Option<Macro> {
        self.macros.remove(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Substitute every macro in `text`, keeping untouched runs as offsets
    pub fn substitute(&self, text: &str) -> Result<Vec<SubstitutedSegment>, SubstitutionError> {
        self.substitute_disabled(text, &mut vec![])
    }

    /// Substitute every macro in `text` and flatten the result
    pub fn expand(&self, text: &str) -> Result<String, SubstitutionError> {
        self.expand_disabled(text, &mut vec![])
    }

    fn expand_disabled(&self, text: &str, disabled: &mut Vec<String>) -> Result<String, SubstitutionError> {
        let segments = self.substitute_disabled(text, disabled)?;
        let mut output = String::with_capacity(text.len());
        for segment in segments {
            match segment {
                SubstitutedSegment::Text(start, end) => output.push_str(&text[start..end]),
                SubstitutedSegment::Replaced(replaced, _) => output.push_str(&replaced),
            }
        }
        Ok(output)
    }

    fn substitute_disabled(
        &self,
        text: &str,
        disabled: &mut Vec<String>,
    ) -> Result<Vec<SubstitutedSegment>, SubstitutionError> {
        let bytes = text.as_bytes();
        let mut segments = vec![];
        let mut text_start = 0;
        let mut i = 0;
        while i < bytes.len() {
            let c = bytes[i];
            if c == b'"' {
                i = skip_string(bytes, i);
                continue;
            }
            if !is_identifier_start(c) || (i > 0 && is_identifier_char(bytes[i - 1])) {
                i += 1;
                continue;
            }
            let len = identifier_length(&text[i..]);
            let name = &text[i..(i + len)];
            let macro_def = match self.macros.get(name) {
                Some(m) if !disabled.iter().any(|d| d == name) => m,
                _ => {
                    i += len;
                    continue;
                }
            };
            match self.invoke(macro_def, text, i + len, disabled) {
                Ok(Some((replaced, next))) => {
                    if text_start < i {
                        segments.push(SubstitutedSegment::Text(text_start, i));
                    }
                    segments.push(SubstitutedSegment::Replaced(replaced, i));
                    i = next;
                    text_start = next;
                }
                Ok(None) => i += len,
                Err(reason) => return Err(SubstitutionError { reason, offset: i }),
            }
        }
        if text_start < bytes.len() {
            segments.push(SubstitutedSegment::Text(text_start, bytes.len()));
        }
        Ok(segments)
    }

    // Returns the replacement text and the offset after the invocation, or
    // None when a function-like macro name is not followed by arguments
    fn invoke(
        &self,
        macro_def: &Macro,
        text: &str,
        after_name: usize,
        disabled: &mut Vec<String>,
    ) -> Result<Option<(String, usize)>, PreprocessErrorReason> {
        let (raw_args, next) = match macro_def.params {
            None => (vec![], after_name),
            Some(ref params) => {
                let remaining = &text[after_name..];
                let gap = remaining.len() - remaining.trim_start().len();
                if !remaining[gap..].starts_with('(') {
                    return Ok(None);
                }
                let open = after_name + gap;
                let (args, next) = match collect_args(text, open) {
                    Some(found) => found,
                    None => {
                        return Err(PreprocessErrorReason::MacroArgumentsNeverEnd(
                            macro_def.name.clone(),
                        ))
                    }
                };
                (match_args(&macro_def.name, params.len(), macro_def.variadic, args)?, next)
            }
        };

        let mut expanded_args = Vec::with_capacity(raw_args.len());
        for arg in &raw_args {
            expanded_args.push(self.expand_disabled(arg, disabled).map_err(|err| err.reason)?);
        }
        let rendered = macro_def.render(&raw_args, &expanded_args);

        disabled.push(macro_def.name.clone());
        let replaced = self.expand_disabled(&rendered, disabled);
        disabled.pop();
        let replaced = replaced.map_err(|err| err.reason)?;

        self.continue_invocation(macro_def, replaced, text, next, disabled).map(Some)
    }

    // A replacement that ends in a function-like macro name takes its
    // arguments from the text after the original invocation
    fn continue_invocation(
        &self,
        macro_def: &Macro,
        mut replaced: String,
        text: &str,
        mut next: usize,
        disabled: &mut Vec<String>,
    ) -> Result<(String, usize), PreprocessErrorReason> {
        loop {
            let trimmed_len = replaced.trim_end().len();
            let name_start = trailing_identifier(&replaced[..trimmed_len]);
            let name = &replaced[name_start..trimmed_len];
            let tail_def = match self.macros.get(name) {
                Some(m) if m.params.is_some() && m.name != macro_def.name && !disabled.iter().any(|d| d == name) => m,
                _ => break,
            };
            match self.invoke(tail_def, text, next, disabled)? {
                Some((tail, after)) => {
                    replaced.truncate(name_start);
                    replaced.push_str(&tail);
                    next = after;
                }
                None => break,
            }
        }
        Ok((replaced, next))
    }
}

// Start of the identifier that `text` ends with, or `text.len()` if none
fn trailing_identifier(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut start = bytes.len();
    while start > 0 && is_identifier_char(bytes[start - 1]) {
        start -= 1;
    }
    while start < bytes.len() && !is_identifier_start(bytes[start]) {
        start += 1;
    }
    start
}

// Splits the arguments of an invocation whose `(` is at `open`
fn collect_args(text: &str, open: usize) -> Option<(Vec<&str>, usize)> {
    let bytes = text.as_bytes();
    let mut args = vec![];
    let mut depth = 0;
    let mut arg_start = open + 1;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    args.push(text[arg_start..i].trim());
                    return Some((args, i + 1));
                }
            }
            b',' if depth == 1 => {
                args.push(text[arg_start..i].trim());
                arg_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn match_args(
    name: &str,
    param_count: usize,
    variadic: bool,
    args: Vec<&str>,
) -> Result<Vec<String>, PreprocessErrorReason> {
    let mismatch = || PreprocessErrorReason::MacroExpectsDifferentNumberOfArguments(name.to_string());
    if param_count == 0 {
        return match args.as_slice() {
            [""] => Ok(vec![]),
            _ => Err(mismatch()),
        };
    }
    if variadic {
        let fixed = param_count - 1;
        if args.len() < fixed {
            return Err(mismatch());
        }
        let mut matched = args[..fixed].iter().map(|a| a.to_string()).collect::<Vec<_>>();
        matched.push(args[fixed..].join(", "));
        return Ok(matched);
    }
    if args.len() != param_count {
        return Err(mismatch());
    }
    Ok(args.into_iter().map(|a| a.to_string()).collect())
}

#[cfg(test)]
fn table(definitions: &[(&str, Option<&[&str]>, &str)]) -> MacroTable {
    let mut table = MacroTable::new();
    for &(name, params, body) in definitions {
        let params = params.map(|p| p.iter().map(|s| s.to_string()).collect());
        table.define(Macro::from_definition(name, params, body).unwrap());
    }
    table
}

#[test]
fn macro_from_definition() {
    let m = Macro::from_definition("B", None, "0").unwrap();
    assert_eq!(m.body, vec![MacroSegment::Text("0".to_string())]);
    let m = Macro::from_definition("B", Some(vec!["x".to_string()]), "x").unwrap();
    assert_eq!(m.body, vec![MacroSegment::Arg(MacroArg(0))]);
    let m = Macro::from_definition("B", Some(vec!["x".to_string(), "xy".to_string()]), "(x || xy)")
        .unwrap();
    assert_eq!(m.body,
               vec![MacroSegment::Text("(".to_string()),
                    MacroSegment::Arg(MacroArg(0)),
                    MacroSegment::Text(" ".to_string()),
                    MacroSegment::Text("||".to_string()),
                    MacroSegment::Text(" ".to_string()),
                    MacroSegment::Arg(MacroArg(1)),
                    MacroSegment::Text(")".to_string())]);
    assert!(Macro::from_definition("B", Some(vec!["1x".to_string()]), "").is_err());
    assert!(Macro::from_definition("B", Some(vec!["...".to_string(), "x".to_string()]), "").is_err());
}

#[test]
fn macro_resolve() {
    let t = table(&[("B", None, "0"), ("BC", None, "1")]);
    assert_eq!(t.expand("(A || B) && BC").unwrap(), "(A || 0) && 1");

    let t = table(&[("B", Some(&["x", "y"][..]), "(x && y)"), ("BC", None, "1")]);
    assert_eq!(t.expand("(A || B(0, 1)) && BC").unwrap(), "(A || (0 && 1)) && 1");
}

#[test]
fn macro_nested_arguments() {
    let t = table(&[("MUL", Some(&["a", "b"][..]), "mul(a, b)")]);
    assert_eq!(t.expand("MUL(f(x, y), z)").unwrap(), "mul(f(x, y), z)");
    assert_eq!(t.expand("MUL (m,\n v)").unwrap(), "mul(m, v)");
    // Not an invocation without arguments
    assert_eq!(t.expand("MUL;").unwrap(), "MUL;");
}

#[test]
fn macro_recursion_stops() {
    let t = table(&[("X", None, "X + 1"), ("A", None, "B"), ("B", None, "A")]);
    assert_eq!(t.expand("X").unwrap(), "X + 1");
    assert_eq!(t.expand("A").unwrap(), "A");
}

#[test]
fn macro_paste_and_stringize() {
    let t = table(&[
        ("DECLARE_TEX2D", Some(&["tex"][..]), "Texture2D tex; SamplerState sampler##tex"),
        ("STR", Some(&["x"][..]), "#x"),
        ("CAT", Some(&["a", "b"][..]), "a ## b"),
        ("NAME", None, "value"),
    ]);
    assert_eq!(t.expand("DECLARE_TEX2D(_MainTex)").unwrap(),
               "Texture2D _MainTex; SamplerState sampler_MainTex");
    assert_eq!(t.expand("STR(a  +  b)").unwrap(), "\"a + b\"");
    // Pasted arguments are not expanded before pasting
    assert_eq!(t.expand("CAT(NAME, 2)").unwrap(), "NAME2");
}

#[test]
fn macro_variadic() {
    let t = table(&[("CALL", Some(&["f", "..."][..]), "f(__VA_ARGS__)")]);
    assert_eq!(t.expand("CALL(g, 1, 2)").unwrap(), "g(1, 2)");
}

#[test]
fn macro_argument_errors() {
    let t = table(&[("F", Some(&["a", "b"][..]), "a"), ("G", Some(&[][..]), "g")]);
    assert_eq!(t.expand("F(1)").unwrap_err().reason,
               PreprocessErrorReason::MacroExpectsDifferentNumberOfArguments("F".to_string()));
    assert_eq!(t.expand("x F(1, 2").unwrap_err(),
               SubstitutionError {
                   reason: PreprocessErrorReason::MacroArgumentsNeverEnd("F".to_string()),
                   offset: 2,
               });
    assert_eq!(t.expand("G()").unwrap(), "g");
    assert!(t.expand("G(1)").is_err());
}

#[test]
fn macro_substitute_offsets() {
    let t = table(&[("HALF", None, "float")]);
    assert_eq!(t.substitute("HALF x = y;").unwrap(),
               vec![SubstitutedSegment::Replaced("float".to_string(), 0),
                    SubstitutedSegment::Text(4, 11)]);
    // Strings and identifier substrings are left alone
    assert_eq!(t.substitute("HALFS \"HALF\"").unwrap(),
               vec![SubstitutedSegment::Text(0, 12)]);
}

#[test]
fn macro_rescan_with_following_text() {
    let t = table(&[
        ("VEC", Some(&["n"][..]), "float##n"),
        ("COLOR_T", None, "VEC"),
        ("ID", Some(&["x"][..]), "x"),
        ("APPLY", Some(&["f"][..]), "f"),
    ]);
    assert_eq!(t.expand("COLOR_T(4) c").unwrap(), "float4 c");
    assert_eq!(t.expand("COLOR_T (3)").unwrap(), "float3");
    assert_eq!(t.expand("APPLY(ID)(3)").unwrap(), "3");
    // Without arguments the name is left as it is
    assert_eq!(t.expand("COLOR_T c").unwrap(), "VEC c");
    assert_eq!(t.substitute("COLOR_T(2) x").unwrap(),
               vec![SubstitutedSegment::Replaced("float2".to_string(), 0),
                    SubstitutedSegment::Text(10, 12)]);
}
