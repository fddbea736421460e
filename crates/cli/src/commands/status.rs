//! Engine status command

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_category, color_status, print_json, print_table, print_warning, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Nodes")]
    count: usize,
}

/// Show engine health, node counts and ingest counters
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let stats = client.stats().await?;

    match format {
        OutputFormat::Json => print_json(&json!({ "health": health, "stats": stats }))?,
        OutputFormat::Table => {
            println!("{}", "Engine Status".bold());
            println!("{}", "=".repeat(60));
            println!("Health: {}", color_status(&health.status));
            println!();

            let components: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&c.status),
                    message: c.message.clone().unwrap_or_default(),
                })
                .collect();
            print_table(components);
            println!();

            let capacity = stats
                .capacity
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unbounded".to_string());
            println!("Nodes tracked:    {} / {}", stats.nodes_tracked, capacity);
            println!("Stale nodes:      {}", stats.stale_nodes);
            println!("Samples accepted: {}", stats.samples_accepted);
            for (reason, count) in &stats.samples_rejected {
                println!("Rejected {:<16} {}", format!("{}:", reason), count);
            }
            println!("Transitions:      {}", stats.transitions);
            println!("Nodes collected:  {}", stats.nodes_collected);
            println!();

            let counts: Vec<CountRow> = stats
                .nodes_by_category
                .iter()
                .map(|(category, count)| CountRow {
                    category: color_category(category),
                    count: *count,
                })
                .collect();
            print_table(counts);

            if stats.stale_nodes > 0 {
                print_warning(&format!("{} nodes have stopped reporting", stats.stale_nodes));
            }
        }
    }

    Ok(())
}
