//! chatforge-cli: operator CLI for a running Chatforge server
//!
//! Talks to the HTTP API; it never touches the database or providers directly.
//!
//! # Subcommands
//! - `ingest <tenant>`                 : rebuild a tenant's knowledge index
//! - `chat <tenant> <message> [--json]`: send one chat message
//! - `status [--tenant <id>]`          : show server health

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "chatforge-cli", version, about = "Chatforge operator CLI")]
struct Cli {
    /// Chatforge HTTP server URL (overrides CHATFORGE_HTTP_URL env var)
    #[arg(long, env = "CHATFORGE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Re-ingest a tenant's knowledge text into its vector index
    Ingest {
        /// Tenant (chatbot) id
        tenant: String,
    },

    /// Send a single message as a customer would
    Chat {
        /// Tenant (chatbot) id, or `preview`
        tenant: String,

        /// Message text
        message: String,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show Chatforge server status
    Status {
        /// Also report the size of this tenant's live index
        #[arg(long)]
        tenant: Option<String>,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

/// Body of a successful or failed `POST /ingest`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub inserted_count: Option<usize>,
    pub generation: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub stage: Option<String>,
}

/// Body of `POST /chat`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ChatResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Formatting (pure)
// ============================================================================

pub fn chat_request_body(tenant: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "tenantId": tenant,
        "message": message,
        "conversationHistory": [],
    })
}

pub fn format_ingest(tenant: &str, resp: &IngestResponse) -> String {
    if let Some(error) = &resp.error {
        let stage = resp.stage.as_deref().unwrap_or("unknown");
        return format!("Ingestion of {} failed at {}: {}", tenant, stage, error);
    }
    match (&resp.generation, resp.inserted_count) {
        (Some(generation), Some(n)) => format!(
            "Ingested {} chunk{} for {} (generation {})",
            n,
            if n == 1 { "" } else { "s" },
            tenant,
            generation
        ),
        _ => format!(
            "Nothing ingested for {}: {}",
            tenant,
            resp.message.as_deref().unwrap_or("no knowledge text")
        ),
    }
}

pub fn format_status(body: &serde_json::Value) -> String {
    let field = |k: &str| match &body[k] {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => if *b { "enabled" } else { "disabled" }.to_string(),
        serde_json::Value::Null => "-".to_string(),
        other => other.to_string(),
    };

    let mut lines = vec![
        format!("Chatforge server: {}", field("status")),
        format!("Version:          {}", field("version")),
        format!("Store:            {}", field("store")),
        format!("Embedding:        {}", field("embedding")),
        format!("Notifications:    {}", field("notifications")),
    ];
    if !body["postgresql"].is_null() {
        lines.push(format!("PostgreSQL:       {}", field("postgresql")));
        lines.push(format!("pgvector:         {}", field("pgvector")));
    }
    if !body["indexedChunks"].is_null() {
        lines.push(format!(
            "Indexed chunks:   {} (tenant {})",
            field("indexedChunks"),
            field("tenantId")
        ));
    }
    lines.join("\n")
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn do_ingest(server: &str, tenant: &str) -> anyhow::Result<()> {
    let url = format!("{}/ingest", server);
    let resp = match client(300)?
        .post(&url)
        .json(&serde_json::json!({ "tenantId": tenant }))
        .send()
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("chatforge-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let success = resp.status().is_success();
    let body: IngestResponse = resp.json().unwrap_or_default();
    let summary = format_ingest(tenant, &body);
    if success {
        println!("{}", summary);
        Ok(())
    } else {
        eprintln!("chatforge-cli: {}", summary);
        std::process::exit(1);
    }
}

fn do_chat(server: &str, tenant: &str, message: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/chat", server);
    let resp = match client(90)?
        .post(&url)
        .json(&chat_request_body(tenant, message))
        .send()
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("chatforge-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body: ChatResponse = resp.json().unwrap_or_default();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else if let Some(reply) = &body.response {
        println!("{}", reply);
    }

    if !status.is_success() {
        if !json_output {
            eprintln!(
                "chatforge-cli: server returned {}: {}",
                status,
                body.error.as_deref().unwrap_or("unknown error")
            );
        }
        std::process::exit(1);
    }

    Ok(())
}

pub fn health_url(server: &str, tenant: Option<&str>) -> String {
    match tenant {
        Some(t) => format!("{}/health?tenantId={}", server, t.trim()),
        None => format!("{}/health", server),
    }
}

/// Show the server status by calling GET /health.
fn do_status(server: &str, tenant: Option<&str>) -> anyhow::Result<()> {
    let url = health_url(server, tenant);
    let resp = client(10)?.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("{}", format_status(&body));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("chatforge-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("chatforge-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Ingest { tenant } => do_ingest(&server, &tenant),
        Commands::Chat {
            tenant,
            message,
            json,
        } => do_chat(&server, &tenant, &message, json),
        Commands::Status { tenant } => do_status(&server, tenant.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("chatforge-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
