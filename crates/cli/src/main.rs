//! Balancer CLI
//!
//! A command-line tool for inspecting node scores and utilization
//! categories held by the balancer engine.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{nodes, status};

/// Balancer engine CLI
#[derive(Parser)]
#[command(name = "rbctl")]
#[command(author, version, about = "CLI for the balancer node scoring engine", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via RBCTL_API_URL env var)
    #[arg(long, env = "RBCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List scored nodes
    Nodes {
        /// Filter by utilization category (INIT, LU, MU, HU, SUNDOWN)
        #[arg(long, short)]
        category: Option<String>,
    },

    /// Show the full record of one node
    Node {
        /// Node ID
        id: String,
    },

    /// List nodes in the container view
    Containers,

    /// Show recent category transitions
    Transitions {
        /// Only transitions of this node
        #[arg(long, short)]
        node: Option<String>,

        /// Maximum number of transitions to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Register a node before its first sample
    Register {
        /// Node ID
        id: String,

        /// Display name (defaults to the ID)
        #[arg(long)]
        name: Option<String>,

        /// Container image running on the node
        #[arg(long)]
        image: Option<String>,
    },

    /// Move a node to SUNDOWN
    Decommission {
        /// Node ID
        id: String,
    },

    /// Show engine health and counters
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let api_url = config.api_url(cli.api_url);
    let format = config.format(cli.format);

    if cli.verbose {
        output::print_info(&format!("Using API at {}", api_url));
    }

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Nodes { category } => {
            nodes::list_nodes(&client, category.as_deref(), format).await?;
        }
        Commands::Node { id } => {
            nodes::show_node(&client, &id, format).await?;
        }
        Commands::Containers => {
            nodes::list_containers(&client, format).await?;
        }
        Commands::Transitions { node, limit } => {
            nodes::list_transitions(&client, node.as_deref(), limit, format).await?;
        }
        Commands::Register { id, name, image } => {
            nodes::register_node(&client, id, name, image, format).await?;
        }
        Commands::Decommission { id } => {
            nodes::decommission_node(&client, &id, format).await?;
        }
        Commands::Status => {
            status::show_status(&client, format).await?;
        }
    }

    Ok(())
}
