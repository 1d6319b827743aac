use crate::models::{Clipping, Highlight};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

/// Line that terminates every record in a Kindle clippings export.
pub const SEPARATOR: &str = "==========";

/// Header, metadata, blank line, highlight text.
pub const MIN_BLOCK_LINES: usize = 4;

const HIGHLIGHT_LINE: usize = 3;
const ADDED_ON_FORMAT: &str = "%A, %B %d, %Y %I:%M:%S %p";

static HEADER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*) \((.*)\)$").expect("header pattern is valid"));

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    BlockTooShort { record: usize, lines: usize },
    MissingAuthor { record: usize, header: String },
    InvalidUtf8 { record: usize, line: usize },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::BlockTooShort { record, lines } => {
                write!(
                    f,
                    "Record {} has {} lines, expected at least {}",
                    record, lines, MIN_BLOCK_LINES
                )
            }
            ParseError::MissingAuthor { record, header } => {
                write!(
                    f,
                    "Record {} header has no '(Author)' suffix: '{}'",
                    record, header
                )
            }
            ParseError::InvalidUtf8 { record, line } => {
                write!(f, "Record {} line {} is not valid UTF-8", record, line)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Splits a stream of lines into records on [`SEPARATOR`].
///
/// Lines are buffered until a separator arrives, at which point the buffered
/// block is handed back and the buffer starts over. Whatever is still buffered
/// when the input ends is an unterminated fragment and is never emitted.
#[derive(Debug, Default)]
pub struct Segmenter {
    buffer: Vec<String>,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: String) -> Option<Vec<String>> {
        if line == SEPARATOR {
            return Some(std::mem::take(&mut self.buffer));
        }

        self.buffer.push(line);
        None
    }

    /// Number of lines buffered since the last separator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Splits `"Title (Author)"` into its parts. The title capture is greedy, so
/// only the last parenthesized group counts as the author.
pub fn parse_header(line: &str) -> Option<(&str, &str)> {
    let caps = HEADER_REGEX.captures(line)?;
    let title = caps.get(1)?.as_str();
    let author = caps.get(2)?.as_str();
    Some((title, author))
}

/// Parses one segmented block. `record` is the 1-based position of the block
/// in the file and only feeds error messages.
pub fn parse_block(record: usize, block: &[String]) -> Result<Clipping, ParseError> {
    if block.len() < MIN_BLOCK_LINES {
        return Err(ParseError::BlockTooShort {
            record,
            lines: block.len(),
        });
    }

    let (title, author) = parse_header(&block[0]).ok_or_else(|| ParseError::MissingAuthor {
        record,
        header: block[0].clone(),
    })?;

    let meta = parse_metadata(&block[1]);

    Ok(Clipping {
        title: title.to_string(),
        author: author.to_string(),
        highlight: Highlight {
            text: block[HIGHLIGHT_LINE].clone(),
            page: meta.page,
            location: meta.location,
            added_on: meta.added_on,
        },
    })
}

#[derive(Debug, Default, PartialEq)]
pub struct Metadata {
    pub page: Option<u32>,
    pub location: Option<String>,
    pub added_on: Option<NaiveDateTime>,
}

/// Reads the `- Your Highlight on page 7 | Location 120-121 | Added on ...`
/// line. Every field is optional; firmware versions disagree on the layout.
pub fn parse_metadata(line: &str) -> Metadata {
    let mut meta = Metadata::default();

    for segment in line.split(" | ") {
        if let Some(value) = value_after(segment, "page ") {
            meta.page = value.parse().ok();
        }
        if let Some(value) =
            value_after(segment, "location ").or_else(|| value_after(segment, "loc. "))
        {
            meta.location = Some(value.to_string());
        }
        if let Some(start) = find_key(segment, "added on ") {
            meta.added_on = parse_added_on(segment[start..].trim());
        }
    }

    meta
}

fn find_key(segment: &str, key: &str) -> Option<usize> {
    segment
        .to_ascii_lowercase()
        .find(key)
        .map(|pos| pos + key.len())
}

fn value_after<'a>(segment: &'a str, key: &str) -> Option<&'a str> {
    let start = find_key(segment, key)?;
    segment[start..].split_whitespace().next()
}

fn parse_added_on(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, ADDED_ON_FORMAT).ok()
}
