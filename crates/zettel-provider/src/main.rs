//! zettel-cite
//!
//! Command-line front end for the citation provider.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use zettel_provider::{
    handle_line, CiteprocProvider, ConfigStore, JsonLinesRenderer, LogNotifier, NullRenderer,
    ProviderConfig, QueryOutcome, RendererChannel, StartupGate,
};

#[derive(Parser, Debug)]
#[command(name = "zettel-cite")]
#[command(about = "Render citations and bibliographies from a CSL-JSON or BibTeX library")]
struct Args {
    /// Library file (CSL-JSON or BibTeX)
    #[arg(short, long, value_name = "FILE")]
    library: Option<PathBuf>,

    /// Locale for rendered output, e.g. en-US or de-DE
    #[arg(long)]
    lang: Option<String>,

    /// Directory with locale-<lang>.xml files
    #[arg(long, value_name = "DIR")]
    locales: Option<PathBuf>,

    /// Configuration file (TOML or JSON); defaults to the user config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one citation, e.g. "[@smith2020, p. 12]"
    Cite { text: String },
    /// List citable keys with their previews
    Ids,
    /// Render the bibliography for the given keys
    Bibliography { keys: Vec<String> },
    /// List files attached to an entry
    Attachments { key: String },
    /// Answer JSON requests from stdin, one per line, and reload on change
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries results
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ProviderConfig::from_file(path)?,
        None => ProviderConfig::load_default()?,
    };
    if let Some(library) = args.library {
        config.csl_library = Some(library);
    }
    if let Some(lang) = args.lang {
        config.app_lang = lang;
    }
    if let Some(locales) = args.locales {
        config.locales_dir = Some(locales);
    }
    config.validate()?;

    let serving = matches!(args.command, Command::Serve);
    let renderer: Arc<dyn RendererChannel> = if serving {
        Arc::new(JsonLinesRenderer::new(std::io::stdout()))
    } else {
        Arc::new(NullRenderer)
    };
    let provider = CiteprocProvider::new(
        ConfigStore::new(config),
        StartupGate::open(Arc::new(LogNotifier)),
        renderer,
    );

    if serving {
        provider.start();
    }
    provider.load().await;

    let found = if serving {
        serve(&provider).await?;
        true
    } else if provider.is_ready() {
        run(&provider, args.command)?
    } else {
        eprintln!("Citation engine not available: {}", provider.state());
        false
    };

    provider.shutdown();
    if !found {
        std::process::exit(1);
    }
    Ok(())
}

/// Run a one-shot command; false when there was nothing to print
fn run(provider: &CiteprocProvider, command: Command) -> Result<bool, Box<dyn std::error::Error>> {
    let mut out = std::io::stdout().lock();
    match command {
        Command::Cite { text } => match provider.get_citation(&text) {
            Some(html) => writeln!(out, "{}", html)?,
            None => return Ok(false),
        },
        Command::Ids => {
            for hint in provider.get_ids().ids {
                writeln!(out, "{}\t{}", hint.id, hint.display_text)?;
            }
        }
        Command::Bibliography { keys } => {
            if provider.update_items(&keys) != QueryOutcome::Ready(true) {
                return Ok(false);
            }
            match provider.make_bibliography() {
                QueryOutcome::Ready(Some(bibliography)) => {
                    write!(out, "{}", bibliography.to_html())?
                }
                _ => return Ok(false),
            }
        }
        Command::Attachments { key } => match provider.get_attachments(&key) {
            Some(files) => {
                for file in files {
                    writeln!(out, "{}", file)?;
                }
            }
            None => return Ok(false),
        },
        Command::Serve => return Ok(false),
    }
    Ok(true)
}

/// Answer requests from stdin until it closes
async fn serve(provider: &CiteprocProvider) -> Result<(), Box<dyn std::error::Error>> {
    provider.mark_started();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    while let Some(line) = rx.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(provider, &line);
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", response)?;
        out.flush()?;
    }
    Ok(())
}
