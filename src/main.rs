use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use kanban_gateway::config::Config;
use kanban_gateway::kanban::{BoardDescriptor, BoardGateway, BoardList, TaskBoard};
use kanban_gateway::logging;

#[derive(Parser, Debug)]
#[command(name = "kanban")]
#[command(about = "Command-line client for a kanban board service")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/kanban/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Board service base URL, overriding the config file
  #[arg(long, global = true)]
  base_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List all boards
  Boards,
  /// Create a board
  Create {
    name: String,
    /// Initial collection (column); repeat for several
    #[arg(short = 'l', long = "collection")]
    collections: Vec<String>,
  },
  /// Delete a board
  Delete { name: String },
  /// Show the tasks of a board
  Tasks { board: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override base URL if specified on command line
  if let Some(base_url) = args.base_url {
    config.api.base_url = base_url;
  }

  let _log_guard = logging::init(&config.log)?;

  let gateway = BoardGateway::from_config(&config)?;

  match args.command {
    Command::Boards => {
      let boards = gateway.fetch_all_boards().await?;
      print_boards(&boards);
    }
    Command::Create { name, collections } => {
      // Keep the list subscribed so the invalidation refetches it
      let mut boards = gateway.get_all_boards();
      boards.settled().await;

      let board = BoardDescriptor::named(name).with_collections(collections);
      let ack = gateway.create_new_board(&board).await?;
      println!("{}", ack.message.as_deref().unwrap_or("Board created"));

      let refreshed = boards.settled().await.state.into_result();
      if let Some(list) = refreshed.transpose()? {
        print_boards(&list);
      }
    }
    Command::Delete { name } => {
      let mut boards = gateway.get_all_boards();
      boards.settled().await;

      let ack = gateway.delete_board(&BoardDescriptor::named(name)).await?;
      println!("{}", ack.message.as_deref().unwrap_or("Board deleted"));

      let refreshed = boards.settled().await.state.into_result();
      if let Some(list) = refreshed.transpose()? {
        print_boards(&list);
      }
    }
    Command::Tasks { board } => {
      let tasks = gateway.fetch_tasks_by_collection(&board).await?;
      print_tasks(&board, &tasks);
    }
  }

  Ok(())
}

fn print_boards(boards: &BoardList) {
  println!("ALL BOARDS ({})", boards.len());
  for name in &boards.names {
    println!("  {}", name);
  }
}

fn print_tasks(board: &str, tasks: &TaskBoard) {
  println!("{}", board);
  for collection in &tasks.collections {
    println!();
    println!("{} ({})", collection.name.to_uppercase(), collection.tasks.len());
    for task in &collection.tasks {
      if task.subtasks.is_empty() {
        println!("  {}", task.title);
      } else {
        println!(
          "  {} [{} of {} subtasks]",
          task.title,
          task.completed_subtasks(),
          task.subtasks.len()
        );
      }
    }
  }
}
