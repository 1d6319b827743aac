use crate::convert::{trim_line_ending, ConvertError};
use std::io::{BufRead, Write};

/// Location line the web highlights page prints above every highlight.
pub const WEB_HIGHLIGHT_MARKER: &str = "Yellow highlight | Location:";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WebFilterStats {
    pub retained: usize,
    pub dropped: usize,
}

pub fn output_filename(book: Option<&str>) -> String {
    format!("{}_highlights.txt", book.unwrap_or_default())
}

/// Copies every line not containing [`WEB_HIGHLIGHT_MARKER`] to `out`, each
/// terminated by a newline. Line bytes are passed through as they are, so
/// text that is not UTF-8 survives the copy.
pub fn filter_lines<R: BufRead, W: Write>(
    input: R,
    out: &mut W,
) -> Result<WebFilterStats, ConvertError> {
    let mut stats = WebFilterStats::default();

    for raw in input.split(b'\n') {
        let raw = raw.map_err(ConvertError::Read)?;
        let line = trim_line_ending(&raw);

        if String::from_utf8_lossy(line).contains(WEB_HIGHLIGHT_MARKER) {
            stats.dropped += 1;
            continue;
        }

        out.write_all(line).map_err(ConvertError::Write)?;
        out.write_all(b"\n").map_err(ConvertError::Write)?;
        stats.retained += 1;
    }

    Ok(stats)
}
