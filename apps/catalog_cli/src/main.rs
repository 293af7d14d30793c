use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use catalog_core::{
    load_settings, CatalogSettings, DataService, FilterController, HttpTransport, Orchestrator,
    PageButton, PaginationController, RenderEvent, RenderTopic, SearchController,
};
use clap::Parser;
use shared::domain::{Entity, Generation, STAT_MAX};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Browse the species catalog from a terminal")]
struct Args {
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    page_size: Option<u32>,
    /// Initial name or id search.
    #[arg(long)]
    search: Option<String>,
    /// Type filter; repeat for several types.
    #[arg(long = "type")]
    types: Vec<String>,
    #[arg(long)]
    generation: Option<Generation>,
    #[arg(long)]
    page: Option<u32>,
    /// Print rendered pages as JSON.
    #[arg(long)]
    json: bool,
    /// Render once and exit instead of reading commands from stdin.
    #[arg(long)]
    once: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Input(String),
    Search(String),
    ClearSearch,
    ToggleType(String),
    Generation(Option<Generation>),
    Range { stat: String, min: u32, max: u32 },
    ClearFilters,
    Page(u32),
    Next,
    Previous,
    Refresh,
    Stats,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  input <text>            type into the search box (debounced)
  search <text>           search immediately; `search` alone clears it
  type <name>             toggle a type filter
  gen <1-9|I-IX|none>     set or clear the generation filter
  range <stat> <min> <max>
  clear                   drop every filter
  page <n> | next | prev
  refresh                 clear the cache and reload
  stats | help | quit";

fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(word, rest)| (word, rest.trim()));

    let command = match word.to_ascii_lowercase().as_str() {
        "input" => Command::Input(rest.to_string()),
        "search" | "s" if rest.is_empty() => Command::ClearSearch,
        "search" | "s" => Command::Search(rest.to_string()),
        "type" | "t" if rest.is_empty() => bail!("usage: type <name>"),
        "type" | "t" => Command::ToggleType(rest.to_string()),
        "gen" | "generation" => match rest.to_ascii_lowercase().as_str() {
            "" | "none" | "all" => Command::Generation(None),
            value => {
                let generation = value.parse().map_err(|err| anyhow!("{err}"))?;
                Command::Generation(Some(generation))
            }
        },
        "range" => {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            let [stat, min, max] = parts.as_slice() else {
                bail!("usage: range <stat> <min> <max>");
            };
            Command::Range {
                stat: stat.to_string(),
                min: min.parse().context("range min must be a number")?,
                max: max.parse().context("range max must be a number")?,
            }
        }
        "clear" => Command::ClearFilters,
        "page" | "p" => Command::Page(rest.parse().context("usage: page <n>")?),
        "next" | "n" => Command::Next,
        "prev" | "previous" => Command::Previous,
        "refresh" => Command::Refresh,
        "stats" => Command::Stats,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        "" => bail!("empty command"),
        other => bail!("unknown command `{other}`; try `help`"),
    };
    Ok(command)
}

fn entity_line(entity: &Entity) -> String {
    let stats = ["hp", "attack"]
        .iter()
        .filter_map(|key| entity.stat_value(key).map(|value| format!("{key}={value}")))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "#{:<5} {:<14} {:<18} {}",
        entity.id().0,
        entity.display_name(),
        entity.types().join("/"),
        stats
    )
}

fn buttons_line(buttons: &[PageButton]) -> String {
    buttons
        .iter()
        .map(|button| match button {
            PageButton::Page {
                number,
                active: true,
            } => format!("[{number}]"),
            PageButton::Page { number, .. } => number.to_string(),
            PageButton::Ellipsis => "...".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render(event: &RenderEvent, pagination: &PaginationController, json: bool) -> Result<()> {
    match event {
        RenderEvent::Loading { message } if !json => println!("{message}"),
        RenderEvent::Loading { .. } => {}
        RenderEvent::Rendered(result) if json => println!("{}", serde_json::to_string(result)?),
        RenderEvent::Rendered(result) => {
            for entity in &result.items {
                println!("{}", entity_line(entity));
            }
            println!("{}", pagination.summary());
            println!("{}", buttons_line(&pagination.buttons()));
        }
        RenderEvent::NoResults if json => {
            println!("{}", serde_json::json!({ "items": [], "total_count": 0 }))
        }
        RenderEvent::NoResults => println!("No Pokemon found"),
        RenderEvent::Error { message } if json => {
            println!("{}", serde_json::json!({ "error": message }))
        }
        RenderEvent::Error { message } => eprintln!("error: {message}"),
    }
    Ok(())
}

fn apply_overrides(settings: &mut CatalogSettings, args: &Args) {
    if let Some(base_url) = &args.base_url {
        settings.base_url = base_url.clone();
    }
    if let Some(page_size) = args.page_size {
        settings.page_size = page_size;
    }
}

/// Returns `false` when the session should end.
async fn execute(orchestrator: &Orchestrator, command: Command) -> bool {
    match command {
        Command::Input(text) => orchestrator.search().input(&text),
        Command::Search(text) => orchestrator.search().submit(&text),
        Command::ClearSearch => orchestrator.search().clear(),
        Command::ToggleType(kind) => {
            if orchestrator.filters().toggle_type(&kind).is_none() {
                eprintln!(
                    "unknown type `{kind}`; known: {}",
                    FilterController::known_types().join(", ")
                );
            }
        }
        Command::Generation(generation) => orchestrator.filters().set_generation(generation),
        Command::Range { stat, min, max } => {
            orchestrator
                .filters()
                .set_stat_range(&stat, min, max.min(STAT_MAX));
        }
        Command::ClearFilters => orchestrator.filters().clear_all(),
        Command::Page(page) => {
            if !orchestrator.pagination().go_to_page(page) {
                eprintln!(
                    "page {page} is not available (1-{})",
                    orchestrator.pagination().total_pages()
                );
            }
        }
        Command::Next => {
            orchestrator.pagination().next_page();
        }
        Command::Previous => {
            orchestrator.pagination().previous_page();
        }
        Command::Refresh => {
            orchestrator.refresh().await;
        }
        Command::Stats => {
            let stats = orchestrator.stats();
            println!(
                "displayed={} total={} cached={} loading={}",
                stats.displayed, stats.total_count, stats.cache_size, stats.is_loading
            );
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return false,
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    apply_overrides(&mut settings, &args);
    let base_url = settings.validate()?;
    info!(%base_url, page_size = settings.page_size, "starting catalog browser");

    let transport = HttpTransport::new(base_url, settings.request_timeout())?;
    let data = Arc::new(DataService::new(Arc::new(transport), &settings));
    let pagination =
        PaginationController::with_window(settings.page_size, settings.max_visible_pages);
    let orchestrator = Orchestrator::new(
        data,
        SearchController::new(settings.debounce()),
        FilterController::new(),
        pagination.clone(),
    );

    let json = args.json;
    for topic in [
        RenderTopic::Loading,
        RenderTopic::Rendered,
        RenderTopic::NoResults,
        RenderTopic::Error,
    ] {
        let pagination = pagination.clone();
        orchestrator
            .render_events()
            .subscribe(topic, move |event| render(event, &pagination, json));
    }

    for kind in &args.types {
        if orchestrator.filters().toggle_type(kind).is_none() {
            bail!("unknown type `{kind}`");
        }
    }
    if args.generation.is_some() {
        orchestrator.filters().set_generation(args.generation);
    }
    if let Some(query) = &args.search {
        orchestrator.search().submit(query);
    }
    if !orchestrator.process_pending().await {
        orchestrator.load_initial().await;
    }
    if let Some(page) = args.page {
        if orchestrator.pagination().go_to_page(page) {
            orchestrator.process_pending().await;
        }
    }

    if args.once {
        orchestrator.destroy();
        return Ok(());
    }

    let runner = tokio::spawn(Arc::clone(&orchestrator).run());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(command) => {
                if !execute(&orchestrator, command).await {
                    break;
                }
            }
            Err(err) => eprintln!("{err}"),
        }
    }

    orchestrator.search().destroy();
    orchestrator.destroy();
    runner.await.context("orchestrator loop panicked")?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
