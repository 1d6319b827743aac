use kindle_clippings::config::{Config, Mode};
use kindle_clippings::convert::{self, ConvertError};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), ConvertError> {
    let book = config.book.as_deref();
    let out_dir = Path::new(".");

    match config.mode {
        Mode::Web => {
            let summary = convert::convert_web(&config.input_path, book, out_dir)?;
            println!("-> processed {} highlights", summary.stats.retained);
        }
        Mode::Clippings => {
            let summary = convert::convert_clippings(&config.input_path, book, out_dir)?;

            println!("parsed {} highlights\n", summary.records);
            if summary.skipped > 0 {
                println!("skipped {} malformed records", summary.skipped);
            }
            for (title, count) in &summary.books {
                println!("+ {} ({} highlights)", title, count);
            }
            println!("done");
        }
    }

    Ok(())
}
