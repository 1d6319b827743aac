use crate::models::{Book, Clipping};
use std::collections::HashMap;

/// Collects parsed clippings into books.
///
/// Without a title filter every book is kept, grouped by exact title and in
/// order of first appearance. With a filter only clippings whose title equals
/// it are kept, and they all land in a single book.
#[derive(Debug)]
pub enum Aggregator {
    AllBooks {
        books: Vec<Book>,
        index: HashMap<String, usize>,
    },
    SingleBook {
        title: String,
        book: Option<Book>,
    },
}

impl Aggregator {
    pub fn new(filter: Option<&str>) -> Self {
        match filter {
            Some(title) if !title.is_empty() => Aggregator::SingleBook {
                title: title.to_string(),
                book: None,
            },
            _ => Aggregator::AllBooks {
                books: Vec::new(),
                index: HashMap::new(),
            },
        }
    }

    pub fn accepts(&self, title: &str) -> bool {
        match self {
            Aggregator::AllBooks { .. } => true,
            Aggregator::SingleBook { title: wanted, .. } => wanted == title,
        }
    }

    /// Adds a clipping, returning whether it passed the filter. The author of
    /// a book is whatever its first clipping said.
    pub fn add(&mut self, clipping: Clipping) -> bool {
        if !self.accepts(&clipping.title) {
            return false;
        }

        let Clipping {
            title,
            author,
            highlight,
        } = clipping;

        match self {
            Aggregator::AllBooks { books, index } => {
                let pos = *index.entry(title.clone()).or_insert_with(|| {
                    books.push(Book::new(title, author));
                    books.len() - 1
                });
                books[pos].highlights.push(highlight);
            }
            Aggregator::SingleBook { book, .. } => {
                book.get_or_insert_with(|| Book::new(title, author))
                    .highlights
                    .push(highlight);
            }
        }

        true
    }

    pub fn highlight_count(&self) -> usize {
        match self {
            Aggregator::AllBooks { books, .. } => books.iter().map(|b| b.highlights.len()).sum(),
            Aggregator::SingleBook { book, .. } => {
                book.as_ref().map(|b| b.highlights.len()).unwrap_or(0)
            }
        }
    }

    pub fn into_books(self) -> Vec<Book> {
        match self {
            Aggregator::AllBooks { books, .. } => books,
            Aggregator::SingleBook { book, .. } => book.into_iter().collect(),
        }
    }
}
