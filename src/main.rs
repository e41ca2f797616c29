use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use nl_sql_agent::agent::transcript::ProgressSink;
use nl_sql_agent::config::{AppConfig, CliArgs};
use nl_sql_agent::llm::LlmManager;
use nl_sql_agent::util::logging::init_tracing;
use nl_sql_agent::{DatabaseManager, SessionContext, SqlAgent};

/// Streams agent progress to stderr while the answer builds up.
struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn on_thought(&self, iteration: usize, thought: &str) {
        if !thought.is_empty() {
            eprintln!("[{}] thought: {}", iteration + 1, thought);
        }
    }

    fn on_action(&self, iteration: usize, action: &str, input: &str) {
        eprintln!("[{}] action: {} ({})", iteration + 1, action, input);
    }

    fn on_observation(&self, iteration: usize, observation: &str) {
        let first_line = observation.lines().next().unwrap_or("");
        eprintln!("[{}] observation: {}", iteration + 1, first_line);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = CliArgs::parse();

    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("Connecting to {}:{}", config.database.server, config.database.port);
    let (db, banner) = DatabaseManager::connect(&config.database).await?;
    let db = Arc::new(db);
    println!("{}", banner);

    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm_manager = LlmManager::new(&config.llm)?;

    let agent = SqlAgent::new(llm_manager.model(), Arc::clone(&db), &config.agent);

    let mut session = SessionContext::new();
    session.set_connection_banner(banner);

    println!("Ask a question about the database. Commands: :schema :clear :quit");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        match question {
            ":quit" | ":exit" => break,
            ":schema" => {
                println!("{}", db.get_table_info());
                continue;
            }
            ":clear" => {
                session.clear_history();
                println!("History cleared.");
                continue;
            }
            _ => {}
        }

        session.record_question(question);
        let resolution = agent.ask(question, &ConsoleSink).await;
        session.record_resolution(&resolution);

        println!("\n{}", resolution.answer);
        if let Some(sql) = &resolution.sql {
            println!("\nSQL:\n{}", sql);
        }
        if let Some(rows) = &resolution.rows {
            println!("\n{}", rows.render(config.agent.max_observation_rows));
        }
        println!();
    }

    info!("Session finished with {} chat entries", session.history().len());
    Ok(())
}
