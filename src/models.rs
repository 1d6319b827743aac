use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub highlights: Vec<Highlight>,
}

impl Book {
    pub fn new(title: String, author: String) -> Self {
        Book {
            title,
            author,
            highlights: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub text: String,
    pub page: Option<u32>,
    pub location: Option<String>,
    pub added_on: Option<NaiveDateTime>,
}

/// One parsed clipping record, before it is attached to a book.
#[derive(Debug, Clone, PartialEq)]
pub struct Clipping {
    pub title: String,
    pub author: String,
    pub highlight: Highlight,
}
