use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "item-cli")]
#[command(about = "Management CLI for the item gateway", long_about = None)]
struct Cli {
    #[arg(short, long, env = "ITEM_GATEWAY_URL", default_value = "http://localhost:5000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an item
    Add { id: i64, name: String },
    /// Fetch an item by id
    Get { id: i64 },
    /// Find items whose name contains NAME
    Find {
        name: String,
        /// Number of results to pull from the wrap-around stream
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Rename an item
    Update { id: i64, name: String },
    /// Delete an item
    Delete { id: i64 },
    /// Check the outcome of a queued request
    Ticket { ticket: String },
    /// Show breaker state, dependency flags and queue depth
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Add { id, name } => {
            client
                .post(format!("{base}/items"))
                .json(&json!({ "id": id, "name": name }))
                .send()
                .await?
        }
        Commands::Get { id } => client.get(format!("{base}/items/{id}")).send().await?,
        Commands::Find { name, limit } => {
            let mut request = client.get(format!("{base}/items")).query(&[("name", name)]);
            if let Some(limit) = limit {
                request = request.query(&[("limit", limit)]);
            }
            request.send().await?
        }
        Commands::Update { id, name } => {
            client
                .put(format!("{base}/items/{id}"))
                .json(&json!({ "name": name }))
                .send()
                .await?
        }
        Commands::Delete { id } => client.delete(format!("{base}/items/{id}")).send().await?,
        Commands::Ticket { ticket } => {
            client
                .get(format!("{base}/requests/{ticket}"))
                .send()
                .await?
        }
        Commands::Status => client.get(format!("{base}/status")).send().await?,
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Some(retry_after) = res.headers().get(reqwest::header::RETRY_AFTER) {
            eprintln!("Retry after: {}s", retry_after.to_str().unwrap_or("?"));
        }
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    if status == reqwest::StatusCode::ACCEPTED {
        eprintln!("Request queued; poll the ticket for its outcome");
    }
    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
