
use std::fmt;

/// A file used as an input
#[derive(PartialEq, Debug, Clone)]
pub enum File {
    Unknown,
    Name(String),
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            File::Unknown => write!(f, "<unknown>"),
            File::Name(ref name) => write!(f, "{}", name),
        }
    }
}

/// A line number in a file
#[derive(PartialEq, Debug, Clone)]
pub struct Line(pub u64);

/// The column index in a line
#[derive(PartialEq, Debug, Clone)]
pub struct Column(pub u64);

/// Fully qualified location
#[derive(PartialEq, Debug, Clone)]
pub struct FileLocation(pub File, pub Line, pub Column);

impl FileLocation {
    pub fn none() -> FileLocation {
        FileLocation(File::Unknown, Line(0), Column(0))
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.0, (self.1).0, (self.2).0)
    }
}

/// The raw number of bytes from the start of a stream
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub struct StreamLocation(pub u64);

/// Half open byte range `[start, end)` inside a stream
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct StreamSpan {
    pub start: StreamLocation,
    pub end: StreamLocation,
}

impl StreamSpan {
    pub fn new(start: u64, end: u64) -> StreamSpan {
        StreamSpan {
            start: StreamLocation(start),
            end: StreamLocation(end),
        }
    }

    /// Span covering both `self` and `other`
    pub fn join(&self, other: &StreamSpan) -> StreamSpan {
        StreamSpan {
            start: std::cmp::min(self.start, other.start),
            end: std::cmp::max(self.end, other.end),
        }
    }
}

/// Wrapper to pair a node with a FileLocation
#[derive(PartialEq, Debug, Clone)]
pub struct Located<T> {
    pub node: T,
    pub location: FileLocation,
}

impl<T> Located<T> {
    pub fn new(node: T, loc: FileLocation) -> Located<T> {
        Located {
            node,
            location: loc,
        }
    }
    pub fn none(node: T) -> Located<T> {
        Located {
            node,
            location: FileLocation::none(),
        }
    }
}

impl<T> std::ops::Deref for Located<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.node
    }
}

/// Trait for loading files from #include directives
///
/// A failed load is not an error for the caller: the include is treated as
/// an empty file.
pub trait IncludeHandler {
    fn load(&self, file_name: &str) -> Result<String, ()>;
}

/// A file loader that fails to load any files
pub struct NullIncludeHandler;

impl IncludeHandler for NullIncludeHandler {
    fn load(&self, _: &str) -> Result<String, ()> {
        Err(())
    }
}

#[test]
fn test_file_location_display() {
    let loc = FileLocation(File::Name("UnityCG.cginc".to_string()), Line(12), Column(5));
    assert_eq!(loc.to_string(), "UnityCG.cginc:12:5");
    assert_eq!(FileLocation::none().to_string(), "<unknown>:0:0");
}

#[test]
fn test_span_join() {
    let a = StreamSpan::new(4, 9);
    let b = StreamSpan::new(2, 6);
    assert_eq!(a.join(&b), StreamSpan::new(2, 9));
}
