use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use lugat::config::Config;
use lugat::review;
use lugat::store::CardStore;

#[derive(Parser)]
#[command(version, about = "Spaced-repetition flashcard service", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Card store CSV file
    #[arg(long, global = true)]
    cards: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory with lesson vocabulary CSVs
        #[arg(long)]
        lessons: Option<PathBuf>,
    },
    /// Print a user's due cards, most overdue first
    Due {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        lesson: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(cards) = cli.cards {
        config.cards_file = cards;
    }

    match cli.command {
        Command::Serve { port, lessons } => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(lessons) = lessons {
                config.lessons_dir = lessons;
            }
            tokio::runtime::Runtime::new()
                .context("Failed to start runtime")?
                .block_on(lugat::web::serve(&config))
        }
        Command::Due { user, lesson } => due(&config, &user, lesson.as_deref()),
    }
}

fn due(config: &Config, user: &str, lesson: Option<&str>) -> Result<()> {
    let now = chrono::Utc::now();
    let store = CardStore::read_only(&config.cards_file, now)
        .with_context(|| format!("Failed to open card store {:?}", config.cards_file))?;

    let due = review::due_cards(store.cards(), user, lesson, now, config.list_limit);
    if due.is_empty() {
        println!("No cards due for review.");
        return Ok(());
    }

    println!("{} cards due for review:", due.len());
    for card in due {
        println!(
            "  {}  {} / {}  (due {}, {} reps, ease {:.2})",
            card.id,
            card.front,
            card.back,
            card.schedule.due_at.format("%Y-%m-%d %H:%M"),
            card.schedule.repetitions,
            card.schedule.ease_factor
        );
    }
    Ok(())
}
