use crate::library::Aggregator;
use crate::models::Book;
use crate::parser::{self, ParseError, Segmenter};
use crate::report;
use crate::web::{self, WebFilterStats};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const BOM: &[u8] = b"\xef\xbb\xbf";

#[derive(Debug)]
pub enum ConvertError {
    InputOpen { path: PathBuf, source: io::Error },
    OutputOpen { path: PathBuf, source: io::Error },
    Read(io::Error),
    Write(io::Error),
    NoHighlights { book: Option<String> },
}

impl std::fmt::Display for ConvertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvertError::InputOpen { path, source } => {
                write!(f, "Failed to open input '{}': {}", path.display(), source)
            }
            ConvertError::OutputOpen { path, source } => {
                write!(f, "Failed to open output '{}': {}", path.display(), source)
            }
            ConvertError::Read(e) => write!(f, "Failed to read input: {}", e),
            ConvertError::Write(e) => write!(f, "Failed to write output: {}", e),
            ConvertError::NoHighlights { book: Some(title) } => {
                write!(f, "No highlights found for book '{}'", title)
            }
            ConvertError::NoHighlights { book: None } => write!(f, "No highlights found"),
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConvertError::InputOpen { source, .. } | ConvertError::OutputOpen { source, .. } => {
                Some(source)
            }
            ConvertError::Read(e) | ConvertError::Write(e) => Some(e),
            ConvertError::NoHighlights { .. } => None,
        }
    }
}

/// Result of reading a clippings export, before anything is written.
#[derive(Debug, PartialEq)]
pub struct ParsedClippings {
    pub books: Vec<Book>,
    /// Every separator-terminated record, matching or not.
    pub records: usize,
    pub skipped: Vec<ParseError>,
}

#[derive(Debug, PartialEq)]
pub struct ConversionSummary {
    pub records: usize,
    pub skipped: usize,
    pub books: Vec<(String, usize)>,
    pub output: PathBuf,
}

#[derive(Debug, PartialEq)]
pub struct WebSummary {
    pub stats: WebFilterStats,
    pub output: PathBuf,
}

/// Segments, parses and aggregates a clippings export.
///
/// Malformed records, including ones with bytes that are not UTF-8, are
/// logged and skipped; only I/O failures abort.
pub fn parse_clippings<R: BufRead>(
    reader: R,
    book: Option<&str>,
) -> Result<ParsedClippings, ConvertError> {
    let mut segmenter = Segmenter::new();
    let mut aggregator = Aggregator::new(book);
    let mut records = 0;
    let mut skipped = Vec::new();
    // Position within the current block of its first line that failed to decode.
    let mut invalid_line: Option<usize> = None;

    for (i, raw) in reader.split(b'\n').enumerate() {
        let raw = raw.map_err(ConvertError::Read)?;
        let mut bytes = trim_line_ending(&raw);
        if i == 0 {
            bytes = bytes.strip_prefix(BOM).unwrap_or(bytes);
        }

        let line = match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => {
                invalid_line.get_or_insert(segmenter.pending());
                String::from_utf8_lossy(bytes).into_owned()
            }
        };

        let Some(block) = segmenter.push(line) else {
            continue;
        };
        records += 1;

        let parsed = match invalid_line.take() {
            Some(pos) => Err(ParseError::InvalidUtf8 {
                record: records,
                line: pos + 1,
            }),
            None => parser::parse_block(records, &block),
        };

        match parsed {
            Ok(clipping) => {
                let title = clipping.title.clone();
                let highlight = &clipping.highlight;
                debug!(
                    record = records,
                    title = %title,
                    page = ?highlight.page,
                    location = ?highlight.location,
                    added_on = ?highlight.added_on,
                    "Parsed record"
                );
                if !aggregator.add(clipping) {
                    debug!(record = records, title = %title, "Skipping record for other book");
                }
            }
            Err(e) => {
                warn!("Skipping malformed record: {}", e);
                skipped.push(e);
            }
        }
    }

    if segmenter.pending() > 0 {
        debug!(lines = segmenter.pending(), "Ignoring unterminated trailing record");
    }

    info!(
        records,
        kept = aggregator.highlight_count(),
        skipped = skipped.len(),
        "Parsed clippings"
    );

    Ok(ParsedClippings {
        books: aggregator.into_books(),
        records,
        skipped,
    })
}

/// Converts the export at `input` into a Markdown highlights file in `out_dir`.
///
/// An existing output file is truncated, so rerunning the same conversion
/// gives the same file.
pub fn convert_clippings(
    input: &Path,
    book: Option<&str>,
    out_dir: &Path,
) -> Result<ConversionSummary, ConvertError> {
    let file = File::open(input).map_err(|source| ConvertError::InputOpen {
        path: input.to_path_buf(),
        source,
    })?;

    let parsed = parse_clippings(BufReader::new(file), book)?;

    if parsed.books.is_empty() {
        return Err(ConvertError::NoHighlights {
            book: book.filter(|b| !b.is_empty()).map(String::from),
        });
    }

    let output = out_dir.join(report::output_filename(book));
    let out_file = File::create(&output).map_err(|source| ConvertError::OutputOpen {
        path: output.clone(),
        source,
    })?;

    let mut writer = BufWriter::new(out_file);
    report::write_report(&mut writer, &parsed.books).map_err(ConvertError::Write)?;
    writer.flush().map_err(ConvertError::Write)?;

    info!(output = %output.display(), books = parsed.books.len(), "Wrote report");

    Ok(ConversionSummary {
        records: parsed.records,
        skipped: parsed.skipped.len(),
        books: parsed
            .books
            .iter()
            .map(|b| (b.title.clone(), b.highlights.len()))
            .collect(),
        output,
    })
}

/// Copies a web highlights export to `<book>_highlights.txt` in `out_dir`,
/// dropping the per-highlight location lines. Appends to an existing file.
pub fn convert_web(
    input: &Path,
    book: Option<&str>,
    out_dir: &Path,
) -> Result<WebSummary, ConvertError> {
    let file = File::open(input).map_err(|source| ConvertError::InputOpen {
        path: input.to_path_buf(),
        source,
    })?;

    let output = out_dir.join(web::output_filename(book));
    let out_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&output)
        .map_err(|source| ConvertError::OutputOpen {
            path: output.clone(),
            source,
        })?;

    let mut writer = BufWriter::new(out_file);
    let stats = web::filter_lines(BufReader::new(file), &mut writer)?;
    writer.flush().map_err(ConvertError::Write)?;

    info!(retained = stats.retained, dropped = stats.dropped, "Filtered web highlights");

    Ok(WebSummary { stats, output })
}

/// Drops the `\r` left by CRLF line endings once the `\n` is split off.
pub(crate) fn trim_line_ending(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SAMPLE_CLIPPINGS: &str = "\
Dune (Frank Herbert)
- Your Highlight on Location 120-121 | Added on Sunday, January 25, 2026 10:30:00 AM

A beginning is the time for taking the most delicate care.
==========
Emma (Jane Austen)
- Your Highlight on page 3 | Location 40-41 | Added on Sunday, January 25, 2026 11:00:00 AM

Emma Woodhouse, handsome, clever, and rich.
==========
Dune (Frank Herbert)
- Your Highlight on Location 300-301 | Added on Monday, January 26, 2026 09:15:00 PM

Fear is the mind-killer.
==========
";

    const MALFORMED_CLIPPINGS: &str = "\
Dune (Frank Herbert)
- Your Highlight on Location 120-121

A beginning is the time for taking the most delicate care.
==========
Broken header without author
- Your Highlight on Location 1

text
==========
Dune (Frank Herbert)
- Your Bookmark on Location 5
==========
Dune (Frank Herbert)
- Your Highlight on Location 300-301

Fear is the mind-killer.
==========
";

    fn texts(book: &Book) -> Vec<&str> {
        book.highlights.iter().map(|h| h.text.as_str()).collect()
    }

    #[test]
    fn test_parse_clippings_counts_every_record() {
        let parsed = parse_clippings(SAMPLE_CLIPPINGS.as_bytes(), None).unwrap();

        assert_eq!(parsed.records, 3);
        assert!(parsed.skipped.is_empty());
        assert_eq!(parsed.books.len(), 2);
        assert_eq!(
            texts(&parsed.books[0]),
            vec![
                "A beginning is the time for taking the most delicate care.",
                "Fear is the mind-killer."
            ]
        );
        assert_eq!(parsed.books[1].highlights[0].page, Some(3));
        assert_eq!(
            parsed.books[0].highlights[1].added_on,
            chrono::NaiveDate::from_ymd_opt(2026, 1, 26)
                .unwrap()
                .and_hms_opt(21, 15, 0)
        );
    }

    #[test]
    fn test_parse_clippings_skips_record_with_invalid_utf8() {
        let first_record = &SAMPLE_CLIPPINGS[..SAMPLE_CLIPPINGS.find("Emma (").unwrap()];
        let mut input = first_record.as_bytes().to_vec();
        input.extend_from_slice(
            b"Caf\xe9 (Someone)\n- Your Highlight on Location 1\n\nBonjour \xe9\n==========\n",
        );
        input.extend_from_slice(
            b"Dune (Frank Herbert)\n- Your Highlight on Location 9\n\nStill here.\n==========\n",
        );

        let parsed = parse_clippings(&input[..], None).unwrap();

        assert_eq!(parsed.records, 3);
        assert_eq!(
            parsed.skipped,
            vec![ParseError::InvalidUtf8 { record: 2, line: 1 }]
        );
        assert_eq!(parsed.books.len(), 1);
        assert_eq!(
            texts(&parsed.books[0]),
            vec![
                "A beginning is the time for taking the most delicate care.",
                "Still here."
            ]
        );
    }

    #[test]
    fn test_parse_clippings_with_filter() {
        let parsed = parse_clippings(SAMPLE_CLIPPINGS.as_bytes(), Some("Emma")).unwrap();

        assert_eq!(parsed.records, 3);
        assert_eq!(parsed.books.len(), 1);
        assert_eq!(parsed.books[0].author, "Jane Austen");
    }

    #[test]
    fn test_parse_clippings_skips_malformed_records() {
        let parsed = parse_clippings(MALFORMED_CLIPPINGS.as_bytes(), None).unwrap();

        assert_eq!(parsed.records, 4);
        assert_eq!(
            parsed.skipped,
            vec![
                ParseError::MissingAuthor {
                    record: 2,
                    header: "Broken header without author".to_string(),
                },
                ParseError::BlockTooShort { record: 3, lines: 2 },
            ]
        );
        assert_eq!(parsed.books.len(), 1);
        assert_eq!(parsed.books[0].highlights.len(), 2);
    }

    #[test]
    fn test_parse_clippings_strips_bom_and_crlf() {
        let input = format!("\u{feff}{}", SAMPLE_CLIPPINGS.replace('\n', "\r\n"));

        let parsed = parse_clippings(input.as_bytes(), Some("Dune")).unwrap();

        assert_eq!(parsed.records, 3);
        assert_eq!(parsed.books[0].title, "Dune");
        assert_eq!(parsed.books[0].highlights.len(), 2);
    }

    #[test]
    fn test_convert_writes_report() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("My Clippings.txt");
        fs::write(&input, SAMPLE_CLIPPINGS).unwrap();

        let summary = convert_clippings(&input, None, dir.path()).unwrap();

        assert_eq!(summary.output, dir.path().join("highlights.txt"));
        assert_eq!(
            summary.books,
            vec![("Dune".to_string(), 2), ("Emma".to_string(), 1)]
        );
        let written = fs::read_to_string(&summary.output).unwrap();
        assert_eq!(
            written,
            "# Dune\n## Frank Herbert\n\n\
             * A beginning is the time for taking the most delicate care.\n\
             * Fear is the mind-killer.\n\
             # Emma\n## Jane Austen\n\n\
             * Emma Woodhouse, handsome, clever, and rich.\n"
        );
    }

    #[test]
    fn test_convert_truncates_existing_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("My Clippings.txt");
        fs::write(&input, SAMPLE_CLIPPINGS).unwrap();

        let first = convert_clippings(&input, Some("Emma"), dir.path()).unwrap();
        let first_content = fs::read_to_string(&first.output).unwrap();
        let second = convert_clippings(&input, Some("Emma"), dir.path()).unwrap();

        assert_eq!(second.output, dir.path().join("Emma.txt"));
        assert_eq!(fs::read_to_string(&second.output).unwrap(), first_content);
    }

    #[test]
    fn test_convert_no_highlights_for_book() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("My Clippings.txt");
        fs::write(&input, SAMPLE_CLIPPINGS).unwrap();

        let result = convert_clippings(&input, Some("Missing"), dir.path());

        assert!(matches!(
            result,
            Err(ConvertError::NoHighlights { book: Some(ref b) }) if b == "Missing"
        ));
        assert!(!dir.path().join("Missing.txt").exists());
    }

    #[test]
    fn test_convert_empty_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("empty.txt");
        fs::write(&input, "").unwrap();

        let result = convert_clippings(&input, None, dir.path());

        assert!(matches!(result, Err(ConvertError::NoHighlights { book: None })));
    }

    #[test]
    fn test_convert_missing_input() {
        let dir = tempfile::TempDir::new().unwrap();

        let result = convert_clippings(&dir.path().join("nope.txt"), None, dir.path());

        assert!(matches!(result, Err(ConvertError::InputOpen { .. })));
    }

    #[test]
    fn test_convert_empty_input_path() {
        let dir = tempfile::TempDir::new().unwrap();

        let result = convert_clippings(Path::new(""), None, dir.path());

        assert!(matches!(result, Err(ConvertError::InputOpen { .. })));
    }

    #[test]
    fn test_convert_unwritable_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("My Clippings.txt");
        fs::write(&input, SAMPLE_CLIPPINGS).unwrap();

        let result = convert_clippings(&input, None, &dir.path().join("missing-dir"));

        assert!(matches!(result, Err(ConvertError::OutputOpen { .. })));
    }

    #[test]
    fn test_convert_web_keeps_non_utf8_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("web.txt");
        fs::write(&input, b"first line\nbad \xff byte\nthird\n").unwrap();

        let summary = convert_web(&input, Some("Dune"), dir.path()).unwrap();

        assert_eq!(summary.stats, WebFilterStats { retained: 3, dropped: 0 });
        assert_eq!(
            fs::read(&summary.output).unwrap(),
            b"first line\nbad \xff byte\nthird\n".to_vec()
        );
    }

    #[test]
    fn test_convert_web_appends() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("web.txt");
        fs::write(
            &input,
            "Yellow highlight | Location: 120\nA beginning is the time.\nYellow highlight | Location: 300\nFear is the mind-killer.\n",
        )
        .unwrap();

        let first = convert_web(&input, Some("Dune"), dir.path()).unwrap();
        convert_web(&input, Some("Dune"), dir.path()).unwrap();

        assert_eq!(first.output, dir.path().join("Dune_highlights.txt"));
        assert_eq!(first.stats, WebFilterStats { retained: 2, dropped: 2 });
        assert_eq!(
            fs::read_to_string(&first.output).unwrap(),
            "A beginning is the time.\nFear is the mind-killer.\n".repeat(2)
        );
    }
}
