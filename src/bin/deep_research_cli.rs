//! deep-research - interactive research from the terminal.
//!
//! Plans a topic, lets the user approve or revise the plan, runs the research
//! and writes the report with a bibliography to a markdown file. Ctrl+C during
//! the run stops searching and writes a partial report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use deep_research::config::Config;
use deep_research::llm::OpenAiCompatClient;
use deep_research::report::{default_output_path, render_with_bibliography, write_report};
use deep_research::research::{ResearchPlan, Researcher};
use deep_research::search::{MockSearch, SearchProvider, SearxngClient};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PLAN_QUERIES_SHOWN: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "deep-research", version, about, long_about = None)]
struct Cli {
    /// LM Studio (OpenAI-compatible) base URL
    #[arg(long)]
    lm_url: Option<String>,

    /// SearXNG base URL
    #[arg(long)]
    searx_url: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Maximum research rounds
    #[arg(long)]
    loops: Option<usize>,

    /// Queries per round and concurrent searches
    #[arg(long)]
    parallel: Option<usize>,

    /// Use the offline mock search provider
    #[arg(long)]
    mock: bool,

    /// Output file (default: results/<timestamp>_<topic>.md)
    #[arg(short = 'o')]
    output: Option<PathBuf>,

    /// Model context length in tokens
    #[arg(long)]
    ctx: Option<i64>,

    /// Fetch and summarize every page instead of using snippets
    #[arg(long)]
    deep: bool,

    /// Emphasize direct links to individual items
    #[arg(long)]
    result_links: bool,

    /// Decide/search/summarize loop without query expansion
    #[arg(long)]
    simple: bool,

    /// Unique sources to collect before stopping early
    #[arg(long)]
    min_results: Option<usize>,

    /// Milliseconds to wait before each search or fetch
    #[arg(long)]
    delay: Option<u64>,

    /// Pages per query (0 = until a page comes back empty)
    #[arg(long)]
    pages: Option<usize>,

    /// Research topic (skips the prompt)
    #[arg(long)]
    topic: Option<String>,

    /// Approve the plan without asking
    #[arg(long)]
    yes: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.lm_url {
            config.llm.base_url = url.clone();
        }
        if let Some(url) = &self.searx_url {
            config.searx_url = url.clone();
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }

        let research = &mut config.research;
        if let Some(loops) = self.loops {
            research.max_rounds = loops;
        }
        if let Some(parallel) = self.parallel {
            research.parallelism = parallel;
        }
        if let Some(ctx) = self.ctx {
            research.context_length = ctx;
        }
        if let Some(min) = self.min_results {
            research.min_results = min;
        }
        if let Some(delay) = self.delay {
            research.delay = Duration::from_millis(delay);
        }
        if let Some(pages) = self.pages {
            research.max_pages = pages;
        }
        research.deep_mode |= self.deep;
        research.result_links |= self.result_links;
        research.simple_mode |= self.simple;
    }
}

enum Choice {
    Approve,
    Revise(String),
    Quit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deep_research=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    cli.apply(&mut config);
    let settings = config.research.clone();

    if settings.deep_mode {
        println!("Deep mode: fetching and summarizing each page");
    }
    if settings.simple_mode {
        println!("Simple mode: quick research without query expansion");
    } else {
        let pages = match settings.max_pages {
            0 => "auto (until empty)".to_string(),
            n => n.to_string(),
        };
        println!(
            "Exhaustive mode | min results: {} | delay: {}ms | pages per query: {}",
            settings.min_results,
            settings.delay.as_millis(),
            pages
        );
    }

    let llm = Arc::new(OpenAiCompatClient::new(config.llm.clone())?);
    let search: Arc<dyn SearchProvider> = if cli.mock {
        println!("Using mock search engine");
        Arc::new(MockSearch::default())
    } else {
        println!("Using SearXNG at {}", config.searx_url);
        Arc::new(SearxngClient::new(config.searx_url.clone())?)
    };
    let researcher = Researcher::new(llm, search, settings.clone());

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let topic = match &cli.topic {
        Some(topic) => topic.trim().to_string(),
        None => prompt(&mut input, "\nEnter research topic: ").await?,
    };
    if topic.is_empty() {
        println!("Please enter a topic.");
        return Ok(());
    }

    let mut feedback = String::new();
    let plan = loop {
        println!("\nCreating research plan...");
        let plan = if feedback.is_empty() {
            researcher.create_plan(&topic, "").await?
        } else {
            researcher.revise_plan(&topic, &feedback).await?
        };
        print_plan(&plan, settings.simple_mode);

        if cli.yes {
            println!("\nPlan auto-approved. Starting research...");
            break plan;
        }
        match ask_choice(&mut input).await? {
            Choice::Approve => {
                println!("\nPlan approved. Starting research...");
                break plan;
            }
            Choice::Quit => {
                println!("Research cancelled.");
                return Ok(());
            }
            Choice::Revise(details) => feedback = details,
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nInterrupted: finishing current pages and writing a partial report...");
            on_interrupt.cancel();
        }
    });

    let started = Instant::now();
    let result = researcher.run(&topic, &plan, &cancel).await?;
    let output = render_with_bibliography(&result.report, &result.sources);
    let path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&topic, chrono::Local::now()));
    write_report(&path, &output).with_context(|| format!("writing {}", path.display()))?;

    println!("\n{}", output);
    if result.is_partial() {
        println!("\nPartial report (research was cancelled).");
    }
    println!(
        "\nDone in {:.1}s: {} sources, {} rounds. Saved to {}",
        started.elapsed().as_secs_f64(),
        result.sources.len(),
        result.stats.rounds,
        path.display()
    );
    Ok(())
}

async fn prompt(input: &mut Lines<BufReader<Stdin>>, text: &str) -> anyhow::Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(input.next_line().await?.unwrap_or_default().trim().to_string())
}

async fn ask_choice(input: &mut Lines<BufReader<Stdin>>) -> anyhow::Result<Choice> {
    println!("\nOptions:");
    println!("  [Enter]  - Approve and start research");
    println!("  [r]      - Revise plan (provide more details)");
    println!("  [q]      - Quit");
    let choice = prompt(input, "\nYour choice: ").await?;
    Ok(match choice.to_lowercase().as_str() {
        "" => Choice::Approve,
        "q" => Choice::Quit,
        "r" => Choice::Revise(
            prompt(input, "\nEnter additional details or answer the questions above:\n> ").await?,
        ),
        // anything else is taken as extra context
        _ => Choice::Revise(choice),
    })
}

fn print_plan(plan: &ResearchPlan, simple: bool) {
    let rule = "-".repeat(50);
    println!("\n{}\nRESEARCH PLAN\n{}", rule, rule);
    println!("\nUnderstanding: {}", plan.understanding_summary);
    if !plan.clarifying_questions.is_empty() {
        println!("\nClarifying questions:");
        for (i, q) in plan.clarifying_questions.iter().enumerate() {
            println!("   {}. {}", i + 1, q);
        }
    }
    println!("\nResearch steps:");
    for (i, step) in plan.research_steps.iter().enumerate() {
        println!("   {}. {}", i + 1, step);
    }
    println!("\nExpected outcome: {}", plan.expected_outcome);

    if !simple && !plan.search_queries.is_empty() {
        println!("\nSearch queries ({} total):", plan.search_queries.len());
        for (i, q) in plan.search_queries.iter().take(PLAN_QUERIES_SHOWN).enumerate() {
            println!("   {}. {}", i + 1, q);
        }
        if plan.search_queries.len() > PLAN_QUERIES_SHOWN {
            println!(
                "   ... and {} more queries",
                plan.search_queries.len() - PLAN_QUERIES_SHOWN
            );
        }
    }
    println!("{}", rule);
}
