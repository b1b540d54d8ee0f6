//! wordchain CLI
//!
//! Manage a word database and query it the way a word-chain bot would.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;

use wordchain::config::load_config;
use wordchain::graph::finder::InMemoryExclusions;
use wordchain::types::{
    GameMode, NodeAxis, NodeCategory, NodeRole, PathFindResultType, PathUpdated, WordCondition,
    WordFlags,
};
use wordchain::{Engine, Error, Result};

#[derive(Debug, Parser)]
#[command(name = "wordchain", version, about = "Word-chain word index and path finder")]
struct Cli {
    /// Config file (defaults to the platform config directory).
    #[arg(long, short = 'c', value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config.
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    /// Print machine-readable JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or upgrade the database and print its statistics.
    Init,
    /// Add words.
    Add {
        words: Vec<String>,
        /// Curated or requested flags, e.g. `end`, `loan`, `middle-attack`.
        #[arg(long = "flag", value_name = "NAME")]
        flags: Vec<String>,
    },
    /// Delete words.
    Delete { words: Vec<String> },
    /// Find candidates that can follow a node or a previous word.
    Find {
        /// Node to chain from (or the previous word with `--after`).
        node: String,
        #[arg(long, short = 'm', default_value = "forward")]
        mode: String,
        /// Treat NODE as the previous word and derive the node from it.
        #[arg(long)]
        after: bool,
        /// Initial-sound-law alternative node.
        #[arg(long)]
        sub: Option<String>,
        #[arg(long)]
        mission: Option<char>,
        /// Rows to print.
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: usize,
    },
    /// Manage node sets.
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Run the consistency jobs and print their report.
    Check,
}

#[derive(Debug, Subcommand)]
enum NodeAction {
    /// Add a node; words ending in it are reclassified.
    Add { role: String, axis: String, node: String },
    /// Remove a node; words ending in it are reclassified.
    Remove { role: String, axis: String, node: String },
    /// List the nodes of one set.
    List { role: String, axis: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    wordchain::observability::init_logging();
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                let error_json = serde_json::json!({ "error": true, "message": e.to_string() });
                println!("{error_json}");
            } else {
                eprintln!("{} {e}", style("error:").red().bold());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.database.path = Some(db.clone());
    }
    let engine = Engine::open(config, Arc::new(InMemoryExclusions::new()))?;

    match &cli.command {
        Commands::Init => {
            let stats = engine.store().stats()?;
            if cli.json {
                let sets: serde_json::Map<String, serde_json::Value> = stats
                    .node_sets
                    .iter()
                    .map(|(category, n)| (category.to_string(), (*n).into()))
                    .collect();
                println!("{}", serde_json::json!({ "words": stats.words, "node_sets": sets }));
            } else {
                println!("{} {} words", style("ready:").green().bold(), stats.words);
                for (category, n) in &stats.node_sets {
                    println!("  {category:<20} {n}");
                }
            }
        }
        Commands::Add { words, flags } => {
            let requested = parse_flags(flags)?;
            let added = engine
                .store()
                .add_words(words.iter().map(|w| (w.as_str(), requested)))?;
            report_count(cli.json, "added", added);
        }
        Commands::Delete { words } => {
            let mut deleted = 0;
            for word in words {
                deleted += engine.delete_word(word)?;
            }
            report_count(cli.json, "deleted", deleted);
        }
        Commands::Find {
            node,
            mode,
            after,
            sub,
            mission,
            limit,
        } => {
            let mode = parse_mode(mode)?;
            let condition = if *after {
                WordCondition::from_previous_word(mode, node, *mission)?
            } else {
                let mut condition = WordCondition::new(node.as_str());
                condition.sub_node = sub.clone();
                condition.mission_char = *mission;
                condition
            };
            let update = engine.find_path_with_defaults(mode, condition).await?;
            print_update(cli.json, &update, *limit);
        }
        Commands::Node { action } => match action {
            NodeAction::Add { role, axis, node } => {
                let added = engine.add_node(parse_category(role, axis)?, node)?;
                report_count(cli.json, "added", usize::from(added));
            }
            NodeAction::Remove { role, axis, node } => {
                let removed = engine.remove_node(parse_category(role, axis)?, node)?;
                report_count(cli.json, "removed", removed);
            }
            NodeAction::List { role, axis } => {
                let nodes = engine.store().nodes().snapshot(parse_category(role, axis)?);
                if cli.json {
                    println!("{}", serde_json::json!(nodes));
                } else {
                    println!("{}", nodes.join(" "));
                }
            }
        },
        Commands::Check => {
            let summary = engine.run_consistency_check().await?;
            if cli.json {
                println!("{}", serde_json::to_string(&summary)?);
            } else {
                for job in &summary.jobs {
                    let status = match &job.error {
                        Some(e) => style(format!("failed: {e}")).red().to_string(),
                        None => style(job.affected.to_string()).cyan().to_string(),
                    };
                    println!("  {:<28} {status}", job.name);
                }
                println!(
                    "{} {} fixes in {} ms",
                    style("done:").green().bold(),
                    summary.fix_count(),
                    summary.elapsed_ms
                );
            }
        }
    }
    Ok(())
}

fn report_count(json: bool, label: &str, count: usize) {
    if json {
        println!("{}", serde_json::json!({ label: count }));
    } else {
        println!("{} {count}", style(format!("{label}:")).green().bold());
    }
}

fn print_update(json: bool, update: &PathUpdated, limit: usize) {
    if json {
        match serde_json::to_string(update) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("{e}"),
        }
        return;
    }
    let header = match update.result {
        PathFindResultType::Found => style(format!(
            "{} candidates ({} before filtering)",
            update.filtered.len(),
            update.found.len()
        ))
        .green(),
        PathFindResultType::NotFound => style("no candidates".to_string()).yellow(),
        PathFindResultType::EndWord => style("dead end".to_string()).red(),
        PathFindResultType::Error => style("search failed".to_string()).red().bold(),
    };
    println!("{header} [{} ms]", update.elapsed_ms);
    for object in update.filtered.iter().take(limit) {
        println!("  {:<24} {}", object.content, style(object.categories).dim());
    }
}

fn parse_mode(s: &str) -> Result<GameMode> {
    GameMode::from_str_loose(s).ok_or_else(|| Error::invalid(format!("unknown game mode `{s}`")))
}

fn parse_category(role: &str, axis: &str) -> Result<NodeCategory> {
    let role = match role.trim().to_lowercase().as_str() {
        "end" => NodeRole::End,
        "attack" => NodeRole::Attack,
        other => return Err(Error::invalid(format!("unknown node role `{other}`"))),
    };
    let axis = NodeAxis::from_str_loose(axis)
        .ok_or_else(|| Error::invalid(format!("unknown node axis `{axis}`")))?;
    Ok(NodeCategory::new(role, axis))
}

fn parse_flags(names: &[String]) -> Result<WordFlags> {
    names.iter().try_fold(WordFlags::NONE, |acc, name| {
        WordFlags::from_name(name)
            .map(|flag| acc | flag)
            .ok_or_else(|| Error::invalid(format!("unknown word flag `{name}`")))
    })
}
