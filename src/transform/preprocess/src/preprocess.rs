use crate::condition_parser;
use crate::macros::{identifier_length, Macro, MacroTable, SubstitutedSegment};
use cms_shared::*;
use log::{debug, warn};
use std::fmt;

/// Includes nested deeper than this are assumed to be recursive
const MAX_INCLUDE_DEPTH: usize = 64;

#[derive(PartialEq, Debug, Clone, thiserror::Error)]
pub enum PreprocessErrorReason {
    #[error("unknown preprocessor command #{0}")]
    UnknownCommand(String),
    #[error("invalid #include command")]
    InvalidInclude,
    #[error("include nesting too deep at \"{0}\"")]
    IncludeDepthExceeded(String),
    #[error("invalid #define command")]
    InvalidDefine,
    #[error("invalid #undef command")]
    InvalidUndef,
    #[error("expected end of macro arguments for {0}")]
    MacroArgumentsNeverEnd(String),
    #[error("macro {0} requires different number of arguments")]
    MacroExpectsDifferentNumberOfArguments(String),
    #[error("invalid #if: {0}")]
    InvalidIf(String),
    #[error("#if condition parser failed: {0}")]
    FailedToParseIfCondition(String),
    #[error("invalid #ifdef: {0}")]
    InvalidIfdef(String),
    #[error("encountered #elif but with no matching #if")]
    ElifNotMatched,
    #[error("encountered #else but with no matching #if")]
    ElseNotMatched,
    #[error("encountered #endif but with no matching #if")]
    EndIfNotMatched,
    #[error("not enough #endif's encountered")]
    ConditionChainNotFinished,
}

/// Preprocessor failure with the location of the offending directive or
/// macro invocation
#[derive(PartialEq, Debug, Clone)]
pub struct PreprocessError(pub PreprocessErrorReason, pub FileLocation);

impl std::error::Error for PreprocessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.1, self.0)
    }
}

struct SourceFile {
    name: File,
    /// Text as loaded, used for verbatim slices
    original: String,
    /// Text with comments replaced by spaces, same length as `original`
    code: String,
    line_starts: Vec<u64>,
}

impl SourceFile {
    fn new(name: File, original: String) -> SourceFile {
        let code = blank_comments(&original);
        let mut line_starts = vec![0];
        line_starts.extend(original.match_indices('\n').map(|(index, _)| index as u64 + 1));
        SourceFile {
            name,
            original,
            code,
            line_starts,
        }
    }

    fn location(&self, offset: u64) -> FileLocation {
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        FileLocation(self.name.clone(),
                     Line(line as u64 + 1),
                     Column(offset - self.line_starts[line] + 1))
    }
}

// Replace comments with spaces so directives and macros never see them while
// every byte keeps its offset
fn blank_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                output.push(if bytes[i] == b'\r' { b'\r' } else { b' ' });
                i += 1;
            }
        } else if c == b'/' && bytes.get(i + 1) == Some(&b'*') {
            output.extend_from_slice(b"  ");
            i += 2;
            while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                output.push(match bytes[i] {
                    b'\n' => b'\n',
                    b'\r' => b'\r',
                    _ => b' ',
                });
                i += 1;
            }
            let closing = std::cmp::min(2, bytes.len() - i);
            output.extend(std::iter::repeat(b' ').take(closing));
            i += closing;
        } else if c == b'"' {
            output.push(c);
            i += 1;
            while i < bytes.len() && bytes[i] != b'"' && bytes[i] != b'\n' {
                if bytes[i] == b'\\' && i + 1 < bytes.len() {
                    output.push(bytes[i]);
                    i += 1;
                }
                output.push(bytes[i]);
                i += 1;
            }
            if i < bytes.len() && bytes[i] == b'"' {
                output.push(b'"');
                i += 1;
            }
        } else {
            output.push(c);
            i += 1;
        }
    }
    // Only whole comments were replaced with ASCII so this never loses data
    String::from_utf8_lossy(&output).into_owned()
}

#[derive(PartialEq, Debug, Clone, Copy)]
enum Origin {
    /// Text copied from a file, offsets advance with the stream
    File { file: usize, offset: u64 },
    /// Text produced by the preprocessor, every byte maps to one place
    Synthetic { file: usize, offset: u64 },
}

#[derive(PartialEq, Debug, Clone, Copy)]
struct Segment {
    stream: u64,
    origin: Origin,
}

struct MappedLocation {
    file: usize,
    offset: u64,
    linear: bool,
}

struct SourceMap {
    segments: Vec<Segment>,
}

impl SourceMap {
    fn continues(&self, stream: u64, origin: &Origin) -> bool {
        match (self.segments.last(), origin) {
            (Some(&Segment { stream: last_stream, origin: Origin::File { file: last_file, offset: last_offset } }),
             &Origin::File { file, offset }) => {
                last_file == file && last_offset + (stream - last_stream) == offset
            }
            _ => false,
        }
    }

    fn map(&self, stream_location: &StreamLocation) -> Option<MappedLocation> {
        let index = self.segments.partition_point(|segment| segment.stream <= stream_location.0);
        if index == 0 {
            return None;
        }
        let segment = &self.segments[index - 1];
        Some(match segment.origin {
            Origin::File { file, offset } => {
                MappedLocation {
                    file,
                    offset: offset + (stream_location.0 - segment.stream),
                    linear: true,
                }
            }
            Origin::Synthetic { file, offset } => {
                MappedLocation {
                    file,
                    offset,
                    linear: false,
                }
            }
        })
    }
}

struct IntermediateText {
    buffer: String,
    source_map: SourceMap,
}

impl IntermediateText {
    fn new() -> IntermediateText {
        IntermediateText {
            buffer: String::new(),
            source_map: SourceMap { segments: vec![] },
        }
    }

    fn push_file_text(&mut self, segment: &str, file: usize, offset: u64) {
        self.push(segment, Origin::File { file, offset });
    }

    fn push_synthetic_text(&mut self, segment: &str, file: usize, offset: u64) {
        self.push(segment, Origin::Synthetic { file, offset });
    }

    fn push(&mut self, segment: &str, origin: Origin) {
        if segment.is_empty() {
            return;
        }
        let stream = self.buffer.len() as u64;
        if !self.source_map.continues(stream, &origin) {
            self.source_map.segments.push(Segment { stream, origin });
        }
        self.buffer.push_str(segment);
    }
}

/// Output of the preprocessor along with a map back to the source files
pub struct PreprocessedText {
    code: String,
    files: Vec<SourceFile>,
    source_map: SourceMap,
}

impl PreprocessedText {
    pub fn as_bytes(&self) -> &[u8] {
        self.code.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.code
    }

    pub fn get_file_location(&self, stream_location: &StreamLocation) -> Result<FileLocation, ()> {
        match self.source_map.map(stream_location) {
            Some(mapped) => Ok(self.files[mapped.file].location(mapped.offset)),
            None => Err(()),
        }
    }

    /// Preprocessed text inside `span`
    pub fn text(&self, span: &StreamSpan) -> &str {
        self.code.get((span.start.0 as usize)..(span.end.0 as usize)).unwrap_or("")
    }

    /// Source text inside `span` as written in its file, including comments
    /// and unexpanded macros
    ///
    /// Only available when both ends of the span were copied from the same
    /// file.
    pub fn original_text(&self, span: &StreamSpan) -> Option<&str> {
        if span.end.0 <= span.start.0 {
            return None;
        }
        let first = self.source_map.map(&span.start)?;
        let last = self.source_map.map(&StreamLocation(span.end.0 - 1))?;
        if !first.linear || !last.linear || first.file != last.file || last.offset < first.offset {
            return None;
        }
        self.files[first.file].original.get((first.offset as usize)..(last.offset as usize + 1))
    }

    /// Original text when available, otherwise the preprocessed text
    pub fn source_text(&self, span: &StreamSpan) -> &str {
        match self.original_text(span) {
            Some(text) => text,
            None => self.text(span),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
struct Condition {
    active: bool,
    taken: bool,
    parent_active: bool,
    seen_else: bool,
}

/// Stores the active #if blocks
struct ConditionChain(Vec<Condition>);

impl ConditionChain {
    fn new() -> ConditionChain {
        ConditionChain(vec![])
    }

    fn push(&mut self, gate: bool) {
        let parent_active = self.is_active();
        self.0.push(Condition {
            active: parent_active && gate,
            taken: gate,
            parent_active,
            seen_else: false,
        });
    }

    /// If the condition of the next #elif has to be evaluated
    fn elif_needs_condition(&self) -> Result<bool, PreprocessErrorReason> {
        match self.0.last() {
            Some(c) if !c.seen_else => Ok(c.parent_active && !c.taken),
            _ => Err(PreprocessErrorReason::ElifNotMatched),
        }
    }

    fn elif(&mut self, gate: bool) -> Result<(), PreprocessErrorReason> {
        match self.0.last_mut() {
            Some(c) if !c.seen_else => {
                if c.parent_active && !c.taken {
                    c.active = gate;
                    c.taken = gate;
                } else {
                    c.active = false;
                }
                Ok(())
            }
            _ => Err(PreprocessErrorReason::ElifNotMatched),
        }
    }

    fn switch(&mut self) -> Result<(), PreprocessErrorReason> {
        match self.0.last_mut() {
            Some(c) if !c.seen_else => {
                c.seen_else = true;
                c.active = c.parent_active && !c.taken;
                c.taken = true;
                Ok(())
            }
            _ => Err(PreprocessErrorReason::ElseNotMatched),
        }
    }

    fn pop(&mut self) -> Result<(), PreprocessErrorReason> {
        match self.0.pop() {
            Some(_) => Ok(()),
            None => Err(PreprocessErrorReason::EndIfNotMatched),
        }
    }

    fn is_active(&self) -> bool {
        self.0.last().map_or(true, |c| c.active)
    }
}

// End of the line starting at `pos`, past the newline
fn line_end(code: &str, pos: usize) -> usize {
    match code[pos..].find('\n') {
        Some(sz) => pos + sz + 1,
        None => code.len(),
    }
}

// End of a directive starting at `pos`, following escaped endlines
fn directive_end(code: &str, mut pos: usize) -> usize {
    loop {
        let end = line_end(code, pos);
        let line = code[pos..end].trim_end_matches('\n').trim_end_matches('\r');
        if end == code.len() || !line.ends_with('\\') {
            return end;
        }
        pos = end;
    }
}

fn is_directive_line(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

// Find the run of lines before the next directive
fn find_region(code: &str, mut pos: usize) -> usize {
    while pos < code.len() {
        let end = line_end(code, pos);
        pos = end;
        if pos < code.len() && is_directive_line(&code[pos..line_end(code, pos)]) {
            break;
        }
    }
    pos
}

// Replace `defined X` and `defined(X)` with 1 or 0 before macro expansion
fn resolve_defined(condition: &str, macros: &MacroTable) -> Result<String, PreprocessErrorReason> {
    let invalid = || PreprocessErrorReason::InvalidIf(condition.to_string());
    let mut output = String::with_capacity(condition.len());
    let mut remaining = condition;
    while let Some(sz) = remaining.find("defined") {
        let before = &remaining[..sz];
        let after = &remaining[(sz + 7)..];
        let separated_before = !before.bytes().last().map_or(false, |c| c.is_ascii_alphanumeric() || c == b'_');
        let separated_after = !after.bytes().next().map_or(false, |c| c.is_ascii_alphanumeric() || c == b'_');
        if !separated_before || !separated_after {
            output.push_str(&remaining[..(sz + 7)]);
            remaining = after;
            continue;
        }
        output.push_str(before);
        let args = after.trim_start();
        let (name, rest) = if let Some(inner) = args.strip_prefix('(') {
            let inner = inner.trim_start();
            let len = identifier_length(inner);
            let close = inner[len..].trim_start();
            match close.strip_prefix(')') {
                Some(rest) if len > 0 => (&inner[..len], rest),
                _ => return Err(invalid()),
            }
        } else {
            let len = identifier_length(args);
            if len == 0 {
                return Err(invalid());
            }
            (&args[..len], &args[len..])
        };
        output.push_str(if macros.is_defined(name) { "1" } else { "0" });
        remaining = rest;
    }
    output.push_str(remaining);
    Ok(output)
}

struct Preprocessor<'h> {
    include_handler: &'h dyn IncludeHandler,
    files: Vec<SourceFile>,
    macros: MacroTable,
    condition_chain: ConditionChain,
    buffer: IntermediateText,
    depth: usize,
}

impl<'h> Preprocessor<'h> {
    fn error(&self, reason: PreprocessErrorReason, file: usize, offset: u64) -> PreprocessError {
        PreprocessError(reason, self.files[file].location(offset))
    }

    fn add_file(&mut self, name: File, contents: String) -> usize {
        self.files.push(SourceFile::new(name, contents));
        self.files.len() - 1
    }

    fn evaluate_condition(&self, condition: &str) -> Result<bool, PreprocessErrorReason> {
        if condition.is_empty() {
            return Err(PreprocessErrorReason::InvalidIf(condition.to_string()));
        }
        let resolved = resolve_defined(condition, &self.macros)?;
        let expanded = self.macros.expand(&resolved).map_err(|err| err.reason)?;
        condition_parser::parse(&expanded)
    }

    fn preprocess_file(&mut self, file: usize) -> Result<(), PreprocessError> {
        let code = self.files[file].code.clone();
        let mut pos = 0;
        while pos < code.len() {
            let end = line_end(&code, pos);
            let line = &code[pos..end];
            if is_directive_line(line) {
                let hash = pos + (line.len() - line.trim_start().len());
                let end = directive_end(&code, pos);
                let command = code[(hash + 1)..end].replace("\\\r\n", "\n").replace("\\\n", "\n");
                self.preprocess_command(command.trim(), file, hash as u64)?;
                pos = end;
            } else {
                let region_end = find_region(&code, pos);
                if self.condition_chain.is_active() {
                    self.store_region(&code[pos..region_end], file, pos as u64)?;
                }
                pos = region_end;
            }
        }
        Ok(())
    }

    fn store_region(&mut self, region: &str, file: usize, base: u64) -> Result<(), PreprocessError> {
        let segments = match self.macros.substitute(region) {
            Ok(segments) => segments,
            Err(err) => return Err(self.error(err.reason, file, base + err.offset as u64)),
        };
        for segment in segments {
            match segment {
                SubstitutedSegment::Text(start, end) => {
                    self.buffer.push_file_text(&region[start..end], file, base + start as u64)
                }
                SubstitutedSegment::Replaced(text, at) => {
                    self.buffer.push_synthetic_text(&text, file, base + at as u64)
                }
            }
        }
        Ok(())
    }

    fn preprocess_command(&mut self, command: &str, file: usize, offset: u64) -> Result<(), PreprocessError> {
        let name_length = identifier_length(command);
        let (name, args) = command.split_at(name_length);
        let active = self.condition_chain.is_active();
        let result = match name {
            "if" | "ifdef" | "ifndef" if !active => {
                self.condition_chain.push(false);
                Ok(())
            }
            "if" => {
                let gate = self.evaluate_condition(args.trim());
                gate.map(|gate| self.condition_chain.push(gate))
            }
            "ifdef" | "ifndef" => {
                let macro_name = args.trim();
                if macro_name.is_empty() || identifier_length(macro_name) != macro_name.len() {
                    Err(PreprocessErrorReason::InvalidIfdef(command.to_string()))
                } else {
                    let exists = self.macros.is_defined(macro_name);
                    self.condition_chain.push(if name == "ifndef" { !exists } else { exists });
                    Ok(())
                }
            }
            "elif" => {
                match self.condition_chain.elif_needs_condition() {
                    Ok(true) => {
                        let gate = self.evaluate_condition(args.trim());
                        gate.and_then(|gate| self.condition_chain.elif(gate))
                    }
                    Ok(false) => self.condition_chain.elif(false),
                    Err(err) => Err(err),
                }
            }
            "else" => self.condition_chain.switch(),
            "endif" => self.condition_chain.pop(),
            _ if !active => Ok(()),
            "include" => return self.include(args, file, offset),
            "define" => self.define(args, file, offset),
            "undef" => {
                let macro_name = args.trim();
                if macro_name.is_empty() || identifier_length(macro_name) != macro_name.len() {
                    Err(PreprocessErrorReason::InvalidUndef)
                } else {
                    self.macros.undefine(macro_name);
                    Ok(())
                }
            }
            "error" | "warning" => {
                warn!("{}: #{} {}", self.files[file].location(offset), name, args.trim());
                Ok(())
            }
            "pragma" | "line" | "" => Ok(()),
            _ => Err(PreprocessErrorReason::UnknownCommand(name.to_string())),
        };
        result.map_err(|reason| self.error(reason, file, offset))
    }

    fn include(&mut self, args: &str, file: usize, offset: u64) -> Result<(), PreprocessError> {
        let args = args.trim();
        let end = match args.chars().next() {
            Some('"') => '"',
            Some('<') => '>',
            _ => return Err(self.error(PreprocessErrorReason::InvalidInclude, file, offset)),
        };
        let file_name = match args[1..].find(end) {
            Some(sz) if args[(sz + 2)..].trim().is_empty() => &args[1..(sz + 1)],
            _ => return Err(self.error(PreprocessErrorReason::InvalidInclude, file, offset)),
        };

        if self.depth >= MAX_INCLUDE_DEPTH {
            let reason = PreprocessErrorReason::IncludeDepthExceeded(file_name.to_string());
            return Err(self.error(reason, file, offset));
        }

        match self.include_handler.load(file_name) {
            Ok(contents) => {
                let included = self.add_file(File::Name(file_name.to_string()), contents);
                self.depth += 1;
                self.preprocess_file(included)?;
                self.depth -= 1;
                // Keep the last line of the include file apart from the
                // first line after the #include
                self.buffer.push_synthetic_text("\n", file, offset);
            }
            Err(()) => {
                warn!("{}: could not find include file \"{}\", continuing without it",
                      self.files[file].location(offset),
                      file_name);
            }
        }
        Ok(())
    }

    fn define(&mut self, args: &str, file: usize, offset: u64) -> Result<(), PreprocessErrorReason> {
        if !args.starts_with(|c: char| c == ' ' || c == '\t') {
            return Err(PreprocessErrorReason::InvalidDefine);
        }
        let remaining = args.trim_start();
        let name_length = identifier_length(remaining);
        if name_length == 0 {
            return Err(PreprocessErrorReason::InvalidDefine);
        }
        let (name, after) = remaining.split_at(name_length);

        // A parenthesis directly after the name starts the parameter list
        let (params, body) = match after.strip_prefix('(') {
            Some(param_text) => {
                let close = param_text.find(')').ok_or(PreprocessErrorReason::InvalidDefine)?;
                let params = if param_text[..close].trim().is_empty() {
                    vec![]
                } else {
                    param_text[..close].split(',').map(|p| p.trim().to_string()).collect()
                };
                (Some(params), &param_text[(close + 1)..])
            }
            None => (None, after),
        };

        let macro_def = Macro::from_definition(name, params, body.trim())?;
        if let Some(previous) = self.macros.define(macro_def) {
            debug!("{}: redefinition of macro {}", self.files[file].location(offset), previous.name());
        }
        Ok(())
    }
}

/// Runs the preprocessor over `input`, loading `#include`s through
/// `include_handler`
pub fn preprocess(input: &str,
                  file_name: File,
                  include_handler: &dyn IncludeHandler)
                  -> Result<PreprocessedText, PreprocessError> {
    let mut preprocessor = Preprocessor {
        include_handler,
        files: vec![],
        macros: MacroTable::new(),
        condition_chain: ConditionChain::new(),
        buffer: IntermediateText::new(),
        depth: 0,
    };
    let main_file = preprocessor.add_file(file_name, input.to_string());
    preprocessor.preprocess_file(main_file)?;

    if !preprocessor.condition_chain.0.is_empty() {
        let end = input.len() as u64;
        return Err(preprocessor.error(PreprocessErrorReason::ConditionChainNotFinished, main_file, end));
    }

    Ok(PreprocessedText {
        code: preprocessor.buffer.buffer,
        files: preprocessor.files,
        source_map: preprocessor.buffer.source_map,
    })
}

pub fn preprocess_single(input: &str) -> Result<PreprocessedText, PreprocessError> {
    preprocess(input, File::Unknown, &NullIncludeHandler)
}

#[cfg(test)]
fn pp(input: &str) -> String {
    preprocess_single(input).unwrap().code
}

#[cfg(test)]
fn pp_reason(input: &str) -> PreprocessErrorReason {
    match preprocess_single(input) {
        Ok(_) => panic!("expected `{}` to fail", input),
        Err(PreprocessError(reason, _)) => reason,
    }
}

#[test]
fn test_empty() {
    assert_eq!(pp(""), "");
    assert_eq!(pp("test"), "test");
    assert_eq!(pp("t1\nt2"), "t1\nt2");
    assert_eq!(pp("t1\r\nt2"), "t1\r\nt2");
}

#[test]
fn test_comments_blanked() {
    assert_eq!(pp("a // b\nc"), "a     \nc");
    assert_eq!(pp("a /* b\n */c"), "a     \n   c");
    assert_eq!(pp("\"//\" x"), "\"//\" x");
    // A directive inside a comment is not a directive
    assert_eq!(pp("/*\n#error\n*/x"), "  \n      \n  x");
}

#[test]
fn test_define() {
    assert_eq!(pp("#define X 0\nX"), "0");
    assert_eq!(pp("#define X 0\nX X"), "0 0");
    assert_eq!(pp("#define X 1\r\nX"), "1");
    assert_eq!(pp("#define X 2\n#define Y X\nX"), "2");
    assert_eq!(pp("#define X 2\\\n + 3\nX"), "2\n + 3");
    assert_eq!(pp("#define X(a) a\nX(2)"), "2");
    assert_eq!(pp("#define X(a,b) a+b\nX(2,3)"), "2+3");
    assert_eq!(pp("#define X(X,b) X+b\nX(2,3)"), "2+3");
    assert_eq!(pp("#define X(a,b) a+\\\nb\nX(2,3)"), "2+\n3");
    assert_eq!(pp("#define X"), "");
    assert_eq!(pp("#define X 0\n#define Y 1\nX Y"), "0 1");
    assert_eq!(pp("#define X 0\n#define XY 1\nXY X"), "1 0");
    assert_eq!(pp("#define X(a) a\n#define Y 1\nX(Y)"), "1");
    assert_eq!(pp("#define X(a,ab,ba,b) a ab a ba b ab a\nX(0,1,2,3)"), "0 1 0 2 3 1 0");
    // Rescanning picks up macros defined after the user macro
    assert_eq!(pp("#define Y X\n#define X 3\nY"), "3");
    assert_eq!(pp("#define X 1 // one\nX"), "1");
}

#[test]
fn test_define_multiline_invocation() {
    assert_eq!(pp("#define F(a, b) a * b\nF(x,\n  y);"), "x * y;");
}

#[test]
fn test_undef_and_redefine() {
    assert_eq!(pp("#define X 0\n#undef X\nX"), "X");
    assert_eq!(pp("#define X 0\n#define X 1\nX"), "1");
    assert_eq!(pp_reason("#undef"), PreprocessErrorReason::InvalidUndef);
    assert_eq!(pp_reason("#define"), PreprocessErrorReason::InvalidDefine);
    assert_eq!(pp_reason("#define 1X 2"), PreprocessErrorReason::InvalidDefine);
}

#[test]
fn test_condition() {
    assert_eq!(pp_reason("#if 0\nX"), PreprocessErrorReason::ConditionChainNotFinished);
    assert_eq!(pp("#if 0\nX\n#endif"), "");
    assert_eq!(pp("#if 1\nX\n#endif"), "X\n");
    assert_eq!(pp("#if 0\nX\n#else\nY\n#endif"), "Y\n");
    assert_eq!(pp("#if 1\nX\n#else\nY\n#endif"), "X\n");
    assert_eq!(pp("#if !0\nX\n#else\nY\n#endif"), "X\n");
    assert_eq!(pp("#if !1\nX\n#else\nY\n#endif"), "Y\n");
    assert_eq!(pp("#if\t 1  \n X  \n #else \n Y \n#endif \n\t"), " X  \n\t");
    assert_eq!(pp("#define TRUE 1\n#if TRUE\nX\n#else\nY\n#endif"), "X\n");
    assert_eq!(pp("#define TRUE\n#ifdef TRUE\nX\n#else\nY\n#endif"), "X\n");
    assert_eq!(pp("#define TRUE\n#ifndef TRUE\nX\n#else\nY\n#endif"), "Y\n");
    assert_eq!(pp("#define TRUE 0\n#ifndef TRUE\nX\n#else\nY\n#endif"), "Y\n");
    assert_eq!(pp("#if 0\n#define X Y\n#endif\nX"), "X");
    assert_eq!(pp("#if 1\n#define X Y\n#else\n#define X Z\n#endif\nX"), "Y");
    assert_eq!(pp("#if 1 // comment\n#define X Y\n#else // comment\n#include\"fail\"\n#endif // \
                   comment\nX"),
               "Y");
}

#[test]
fn test_condition_elif() {
    let src = "#if A == 1\none\n#elif A == 2\ntwo\n#elif A == 3\nthree\n#else\nother\n#endif";
    assert_eq!(pp(&format!("#define A 1\n{}", src)), "one\n");
    assert_eq!(pp(&format!("#define A 2\n{}", src)), "two\n");
    assert_eq!(pp(&format!("#define A 3\n{}", src)), "three\n");
    assert_eq!(pp(&format!("#define A 4\n{}", src)), "other\n");
    // Only the first true branch is taken
    assert_eq!(pp("#if 1\na\n#elif 1\nb\n#endif"), "a\n");
    // Skipped #elif conditions are never evaluated
    assert_eq!(pp("#if 1\na\n#elif ((\nb\n#endif"), "a\n");
    // Nested blocks in an inactive branch stay inactive
    assert_eq!(pp("#if 0\n#if 1\na\n#else\nb\n#endif\n#else\nc\n#endif"), "c\n");
}

#[test]
fn test_condition_defined() {
    assert_eq!(pp("#define A\n#if defined(A) && !defined B\nX\n#endif"), "X\n");
    assert_eq!(pp("#if defined(A) || defined(SHADER_API_D3D11)\nX\n#endif"), "");
    assert_eq!(pp("#define SHADER_TARGET 50\n#if SHADER_TARGET >= 30\nX\n#endif"), "X\n");
    assert_eq!(pp_reason("#if defined(\n#endif"),
               PreprocessErrorReason::InvalidIf("defined(".to_string()));
}

#[test]
fn test_condition_errors() {
    assert_eq!(pp_reason("#else\n"), PreprocessErrorReason::ElseNotMatched);
    assert_eq!(pp_reason("#endif\n"), PreprocessErrorReason::EndIfNotMatched);
    assert_eq!(pp_reason("#elif 1\n"), PreprocessErrorReason::ElifNotMatched);
    assert_eq!(pp_reason("#if 1\n#else\n#else\n#endif"), PreprocessErrorReason::ElseNotMatched);
    assert_eq!(pp_reason("#if 1\n#else\n#elif 1\n#endif"), PreprocessErrorReason::ElifNotMatched);
    assert_eq!(pp_reason("#if\n#endif"), PreprocessErrorReason::InvalidIf("".to_string()));
    assert_eq!(pp_reason("#ifdef A B\n#endif"),
               PreprocessErrorReason::InvalidIfdef("ifdef A B".to_string()));
}

#[test]
fn test_other_commands() {
    assert_eq!(pp("#pragma target 3.0\nX"), "X");
    assert_eq!(pp("#line 10\nX"), "X");
    assert_eq!(pp("#error unsupported\nX"), "X");
    assert_eq!(pp("#if 0\n#unknown\n#endif\nX"), "X");
    assert_eq!(pp_reason("#unknown\n"), PreprocessErrorReason::UnknownCommand("unknown".to_string()));
}

#[cfg(test)]
struct TestFileLoader;

#[cfg(test)]
impl IncludeHandler for TestFileLoader {
    fn load(&self, file_name: &str) -> Result<String, ()> {
        Ok(match file_name {
               "1.csh" => "X",
               "2.csh" => "Y",
               "guarded.cginc" => "#ifndef GUARD\n#define GUARD\nZ\n#endif\n",
               "self.cginc" => "#include \"self.cginc\"\n",
               _ => return Err(()),
           }
           .to_string())
    }
}

#[cfg(test)]
fn pf(contents: &str) -> Result<PreprocessedText, PreprocessError> {
    preprocess(contents, File::Name("main.cginc".to_string()), &TestFileLoader)
}

#[test]
fn test_include() {
    // Unknown files are skipped
    assert_eq!(pf("#include \"unknown.csh\"").unwrap().code, "");
    assert_eq!(pf("a\n#include \"unknown.csh\"\nb").unwrap().code, "a\nb");
    assert!(pf("#include").is_err());
    assert!(pf("#include\n").is_err());
    // Normal case
    assert_eq!(pf("#include \"1.csh\"\n").unwrap().code, "X\n");
    // End of file include
    assert_eq!(pf("#include \"1.csh\"").unwrap().code, "X\n");
    // Extra whitespace
    assert_eq!(pf("#include \"1.csh\"\t\n").unwrap().code, "X\n");
    // Less whitespace
    assert_eq!(pf("#include\"1.csh\"\n").unwrap().code, "X\n");
    // Alternative delimiters (not treated differently currently)
    assert_eq!(pf("#include <1.csh>\n").unwrap().code, "X\n");
    assert_eq!(pf("#include<1.csh>\n").unwrap().code, "X\n");
    assert!(pf("#include \"1.csh>\n").is_err());
    assert!(pf("#include <1.csh\"\n").is_err());
    // Comments after includes needs to work
    assert_eq!(pf("#include \"1.csh\" // include \n").unwrap().code, "X\n");
    assert_eq!(pf("#include \"1.csh\"\n#include \"2.csh\"").unwrap().code, "X\nY\n");
    // We don't want to read files that are #if'd out
    assert_eq!(pf("#if 1\n#include \"1.csh\"\n#else\n#include \"unknown.csh\"\n#endif").unwrap().code,
               "X\n");
    // Include guards
    assert_eq!(pf("#include \"guarded.cginc\"\n#include \"guarded.cginc\"\n").unwrap().code,
               "Z\n\n\n");
}

#[test]
fn test_include_recursion() {
    match pf("#include \"self.cginc\"") {
        Err(PreprocessError(PreprocessErrorReason::IncludeDepthExceeded(name), _)) => {
            assert_eq!(name, "self.cginc")
        }
        _ => panic!("expected recursive include to fail"),
    }
}

#[test]
fn test_file_locations() {
    let text = pf("a\n#include \"1.csh\"\n  b").unwrap();
    assert_eq!(text.code, "a\nX\n  b");
    assert_eq!(text.get_file_location(&StreamLocation(0)).unwrap(),
               FileLocation(File::Name("main.cginc".to_string()), Line(1), Column(1)));
    assert_eq!(text.get_file_location(&StreamLocation(2)).unwrap(),
               FileLocation(File::Name("1.csh".to_string()), Line(1), Column(1)));
    assert_eq!(text.get_file_location(&StreamLocation(6)).unwrap(),
               FileLocation(File::Name("main.cginc".to_string()), Line(3), Column(3)));
    assert!(preprocess_single("").unwrap().get_file_location(&StreamLocation(0)).is_err());
}

#[test]
fn test_error_location() {
    match pf("x\n  #bogus") {
        Err(err) => assert_eq!(err.to_string(), "main.cginc:2:3: unknown preprocessor command #bogus"),
        Ok(_) => panic!("expected failure"),
    }
}

#[test]
fn test_original_text() {
    let text = preprocess_single("#define HALF half\nHALF f() { return /* one */ HALF(1); }").unwrap();
    assert_eq!(text.as_str(), "half f() { return           half(1); }");
    let open = text.as_str().find('{').unwrap() as u64;
    let close = text.as_str().len() as u64;
    let span = StreamSpan::new(open, close);
    assert_eq!(text.original_text(&span), Some("{ return /* one */ HALF(1); }"));
    assert_eq!(text.text(&span), "{ return           half(1); }");
    // Macro output has no single source position
    let replaced = StreamSpan::new(0, 4);
    assert_eq!(text.original_text(&replaced), None);
    assert_eq!(text.source_text(&replaced), "half");
}
