use clap::Parser;
use std::path::PathBuf;

const INPUT_ENV: &str = "CLIPPINGS_PATH";
const BOOK_ENV: &str = "CLIPPINGS_BOOK";

#[derive(Parser, Debug)]
#[command(name = "kindle-clippings", version)]
#[command(about = "Convert Kindle clippings exports into Markdown highlight files")]
pub struct CliArgs {
    /// Path to the clippings file ("My Clippings.txt" or a web highlights export)
    #[arg(long = "in", value_name = "PATH")]
    pub input: Option<String>,

    /// Only keep highlights from the book with exactly this title
    #[arg(long, value_name = "TITLE")]
    pub book: Option<String>,

    /// Treat the input as a Kindle web highlights export
    #[arg(long)]
    pub web: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    Clippings,
    Web,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub input_path: PathBuf,
    pub book: Option<String>,
    pub mode: Mode,
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    InvalidArguments(String),
    InvalidBookTitle(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidArguments(details) => {
                write!(f, "Invalid arguments: {}", details)
            }
            ConfigError::InvalidBookTitle(title) => {
                write!(
                    f,
                    "Invalid book title: '{}'. It names the output file, so it cannot contain path separators",
                    title
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let cli = parse_cli(std::env::args_os())?;
        Self::from_args(cli, |key| std::env::var(key).ok())
    }

    fn from_args(cli: CliArgs, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // A missing path is left empty and reported when the file fails to open.
        let input_path = cli.input.or_else(|| env(INPUT_ENV)).unwrap_or_default();

        let book = cli
            .book
            .or_else(|| env(BOOK_ENV))
            .filter(|title| !title.is_empty());

        if let Some(ref title) = book {
            validate_book_title(title)?;
        }

        let mode = if cli.web { Mode::Web } else { Mode::Clippings };

        Ok(Config {
            input_path: PathBuf::from(input_path),
            book,
            mode,
        })
    }
}

/// Parses command-line flags. `--help` and `--version` print and exit here;
/// any other clap error becomes a [`ConfigError`] so it exits like the rest.
fn parse_cli<I, T>(args: I) -> Result<CliArgs, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match CliArgs::try_parse_from(args) {
        Ok(cli) => Ok(cli),
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let rendered = e.to_string();
            let details = rendered
                .lines()
                .next()
                .unwrap_or_default()
                .trim_start_matches("error: ");
            Err(ConfigError::InvalidArguments(details.to_string()))
        }
    }
}

fn validate_book_title(title: &str) -> Result<(), ConfigError> {
    if title.contains('/') || title.contains('\\') {
        return Err(ConfigError::InvalidBookTitle(title.to_string()));
    }
    Ok(())
}
