use crate::models::Book;
use std::io::{self, Write};

pub const DEFAULT_OUTPUT_FILE: &str = "highlights.txt";

/// `<book>.txt` for a filtered run, otherwise [`DEFAULT_OUTPUT_FILE`].
pub fn output_filename(book: Option<&str>) -> String {
    match book {
        Some(title) if !title.is_empty() => format!("{}.txt", title),
        _ => DEFAULT_OUTPUT_FILE.to_string(),
    }
}

pub fn write_book<W: Write>(out: &mut W, book: &Book) -> io::Result<()> {
    writeln!(out, "# {}", book.title)?;
    writeln!(out, "## {}", book.author)?;
    writeln!(out)?;
    for highlight in &book.highlights {
        writeln!(out, "* {}", highlight.text)?;
    }
    Ok(())
}

pub fn write_report<W: Write>(out: &mut W, books: &[Book]) -> io::Result<()> {
    for book in books {
        write_book(out, book)?;
    }
    Ok(())
}
