//! Node inspection and lifecycle commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ContainerMeta, RegisterRequest};
use crate::output::{
    color_category, color_status, format_percent, format_score, format_timestamp, print_info,
    print_json, print_success, print_table, print_warning, OutputFormat,
};

/// Row for the nodes table
#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    id: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Network")]
    network: String,
    #[tabled(rename = "Avail")]
    availability: String,
    #[tabled(rename = "Overall")]
    overall: String,
    #[tabled(rename = "Category")]
    category: String,
}

/// Row for the containers table
#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Node")]
    id: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Ports")]
    ports: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
}

/// Row for the transitions table
#[derive(Tabled)]
struct TransitionRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
    #[tabled(rename = "Score")]
    score: String,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn field(field: &'static str, value: impl Into<String>) -> FieldRow {
    FieldRow {
        field,
        value: value.into(),
    }
}

/// List scored nodes, optionally filtered by category
pub async fn list_nodes(
    client: &ApiClient,
    category: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let nodes = client.list_nodes(category).await?;

    match format {
        OutputFormat::Json => print_json(&nodes)?,
        OutputFormat::Table => {
            if nodes.is_empty() {
                print_warning("No nodes found");
                return Ok(());
            }

            let total = nodes.len();
            let rows: Vec<NodeRow> = nodes
                .into_iter()
                .map(|n| NodeRow {
                    id: n.id,
                    cpu: format_score(n.cpu_score),
                    memory: format_score(n.memory_score),
                    network: format_score(n.network_score),
                    availability: format_score(n.availability_score),
                    overall: format_score(n.overall_score),
                    category: color_category(&n.utilization_category),
                })
                .collect();

            print_table(rows);
            println!("\nTotal: {} nodes", total);
        }
    }

    Ok(())
}

/// Show the full record of one node
pub async fn show_node(client: &ApiClient, node_id: &str, format: OutputFormat) -> Result<()> {
    let node = client.get_node(node_id).await?;

    match format {
        OutputFormat::Json => print_json(&node)?,
        OutputFormat::Table => {
            println!("{}", "Node".bold());
            println!("{}", "=".repeat(60));
            println!("ID:   {}", node.node_id.cyan());
            println!("Name: {}", node.name.cyan());
            println!();

            let mut rows = vec![
                field("Category", color_category(&node.category)),
                field("Lifecycle", color_status(&node.lifecycle)),
                field("Overall score", format_score(node.scores.overall_score)),
                field("CPU score", format_score(node.scores.cpu_score)),
                field("Memory score", format_score(node.scores.memory_score)),
                field("Network score", format_score(node.scores.network_score)),
                field("Availability score", format_score(node.scores.availability_score)),
                field("CPU usage", format_percent(node.usage.cpu_percent)),
                field("Memory usage", format_percent(node.usage.memory_percent)),
                field("Samples", node.sample_count.to_string()),
                field("Created", format_timestamp(node.created_at)),
                field("Last updated", format_timestamp(node.last_updated)),
                field(
                    "Last sample",
                    node.last_sample_at
                        .map(format_timestamp)
                        .unwrap_or_else(|| "-".to_string()),
                ),
            ];
            if let Some(container) = &node.container {
                rows.push(field("Image", container.image.clone()));
                rows.push(field("State", color_status(&container.state)));
            }
            print_table(rows);

            if node.stale {
                print_warning("Node has stopped reporting samples");
            }
        }
    }

    Ok(())
}

/// List nodes in the container view
pub async fn list_containers(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let containers = client.list_containers().await?;

    match format {
        OutputFormat::Json => print_json(&containers)?,
        OutputFormat::Table => {
            if containers.is_empty() {
                print_warning("No containers found");
                return Ok(());
            }

            let rows: Vec<ContainerRow> = containers
                .into_iter()
                .map(|c| ContainerRow {
                    id: c.id,
                    image: if c.image.is_empty() { "-".to_string() } else { c.image },
                    state: color_status(&c.state),
                    ports: c
                        .ports
                        .iter()
                        .map(|(port, bindings)| {
                            if bindings.is_empty() {
                                port.clone()
                            } else {
                                format!("{}->{}", bindings.join(","), port)
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(" "),
                    cpu: format_percent(c.cpu_usage),
                    memory: format_percent(c.memory_usage),
                    uptime: c.uptime,
                })
                .collect();

            print_table(rows);
        }
    }

    Ok(())
}

/// Show recent category transitions
pub async fn list_transitions(
    client: &ApiClient,
    node: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let transitions = client.transitions(node, limit).await?;

    match format {
        OutputFormat::Json => print_json(&transitions)?,
        OutputFormat::Table => {
            if transitions.is_empty() {
                print_info("No transitions recorded");
                return Ok(());
            }

            let rows: Vec<TransitionRow> = transitions
                .into_iter()
                .map(|t| TransitionRow {
                    time: format_timestamp(t.timestamp),
                    node: t.node_id,
                    from: color_category(&t.from),
                    to: color_category(&t.to),
                    score: t
                        .triggering_score
                        .map(format_score)
                        .unwrap_or_else(|| "-".to_string()),
                })
                .collect();

            print_table(rows);
        }
    }

    Ok(())
}

/// Register a node ahead of its first sample
pub async fn register_node(
    client: &ApiClient,
    node_id: String,
    name: Option<String>,
    image: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = RegisterRequest {
        node_id,
        name,
        container: image.map(|image| ContainerMeta {
            image,
            ..Default::default()
        }),
    };
    let node = client.register(&request).await?;

    match format {
        OutputFormat::Json => print_json(&node)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Node {} registered ({})",
                node.node_id.cyan(),
                color_category(&node.category)
            ));
        }
    }

    Ok(())
}

/// Move a node to SUNDOWN
pub async fn decommission_node(
    client: &ApiClient,
    node_id: &str,
    format: OutputFormat,
) -> Result<()> {
    let response = client.decommission(node_id).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => match &response.transition {
            Some(transition) => print_success(&format!(
                "Node {} moved {} -> {}",
                response.node_id.cyan(),
                color_category(&transition.from),
                color_category(&transition.to)
            )),
            None => print_info(&format!(
                "Node {} is already {}",
                response.node_id.cyan(),
                color_category(&response.category)
            )),
        },
    }

    Ok(())
}
