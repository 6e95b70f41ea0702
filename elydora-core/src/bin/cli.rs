//! Elydora CLI - agent enrollment, operation submission, and audit queries.
//!
//! The generated `hook.js`/`guard.js` artifacts shell out to this binary,
//! so it is also the runtime half of the host-tool integration.

use clap::{Parser, Subcommand};
use elydora_core::config::{self, AgentConfig};
use elydora_core::transport::{
    AuditQuery, LoginRequest, RegisterAgentRequest, Transport, TransportConfig,
};
use elydora_core::{BuilderConfig, OperationBuilder, OperationRequest, SigningKey};
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "elydora")]
#[command(about = "Tamper-evident audit trail for AI coding agents", long_about = None)]
struct Cli {
    /// Agent id; selects ~/.elydora/<agent_id>/
    #[arg(short, long, global = true)]
    agent: Option<String>,

    /// Override the platform base URL from config
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Emit machine-readable JSON instead of human output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register this machine as a new agent and install its artifacts
    Register {
        /// Human-readable agent name
        #[arg(long)]
        name: String,

        /// Bearer token authorizing the registration
        #[arg(long)]
        token: String,

        /// Platform base URL
        #[arg(long, default_value = elydora_core::DEFAULT_BASE_URL)]
        url: String,
    },

    /// Log in and store the bearer token in the agent's config
    Login {
        /// Account email; the password is read from stdin
        #[arg(long)]
        email: String,
    },

    /// Build, sign, and submit one operation record
    Submit {
        /// Caller-defined operation type (e.g. file.edit, tool.exec)
        #[arg(short = 't', long = "type")]
        operation_type: String,

        /// Subject JSON (what was acted on)
        #[arg(long, default_value = "{}")]
        subject: String,

        /// Action JSON (what was done)
        #[arg(long, default_value = "{}")]
        action: String,

        /// Payload JSON. Use - to read from stdin; omit for null.
        #[arg(long)]
        payload: Option<String>,
    },

    /// Exit 0 when the agent may act, 1 when frozen or revoked
    GuardCheck,

    /// Fetch a stored operation and its receipt
    Show {
        /// Operation id
        operation_id: String,
    },

    /// Ask the platform to re-verify a stored operation
    Verify {
        /// Operation id
        operation_id: String,
    },

    /// Query the audit log
    Log {
        /// Filter by operation type
        #[arg(short = 't', long = "type")]
        operation_type: Option<String>,

        /// Maximum number of records
        #[arg(long, default_value = "50")]
        limit: u32,

        /// Resume from a cursor returned by a previous page
        #[arg(long)]
        cursor: Option<String>,
    },

    /// List anchoring epochs, or show one
    Epochs {
        /// Epoch id to show in detail
        id: Option<String>,
    },

    /// Manage audit exports
    Exports {
        /// Create a new export job for this agent's records
        #[arg(long)]
        create: bool,

        /// Show one export job (prints the download URL when ready)
        #[arg(long)]
        id: Option<String>,
    },

    /// Print agent identity and the derived public key
    Whoami,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("error: {}", e);
        std::process::exit(2);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let json = cli.json;
    let agent = cli.agent.clone();
    let base_url = cli.base_url.clone();

    match cli.command {
        Commands::Register { name, token, url } => {
            register(&name, &token, &url, base_url.as_deref(), json).await
        }
        Commands::Login { email } => {
            let ctx = Context::load(agent.as_deref(), base_url.as_deref())?;
            login(ctx, &email).await
        }
        Commands::Submit {
            operation_type,
            subject,
            action,
            payload,
        } => {
            let ctx = Context::load(agent.as_deref(), base_url.as_deref())?;
            submit(ctx, &operation_type, &subject, &action, payload.as_deref(), json).await
        }
        Commands::GuardCheck => {
            let ctx = Context::load(agent.as_deref(), base_url.as_deref())?;
            guard_check(ctx).await
        }
        Commands::Show { operation_id } => {
            let ctx = Context::load(agent.as_deref(), base_url.as_deref())?;
            let detail = ctx.transport.get_operation(&operation_id).await?;
            print_json(&detail.operation, json);
            if let Some(receipt) = detail.receipt {
                print_json(&serde_json::to_value(&receipt)?, json);
            }
            Ok(())
        }
        Commands::Verify { operation_id } => {
            let ctx = Context::load(agent.as_deref(), base_url.as_deref())?;
            let verdict = ctx.transport.verify_operation(&operation_id).await?;
            print_json(&verdict, json);
            Ok(())
        }
        Commands::Log {
            operation_type,
            limit,
            cursor,
        } => {
            let ctx = Context::load(agent.as_deref(), base_url.as_deref())?;
            log_query(ctx, operation_type, limit, cursor, json).await
        }
        Commands::Epochs { id } => {
            let ctx = Context::load(agent.as_deref(), base_url.as_deref())?;
            match id {
                Some(id) => {
                    let detail = ctx.transport.get_epoch(&id).await?;
                    print_json(&detail.epoch, json);
                    if let Some(anchor) = detail.anchor {
                        print_json(&anchor, json);
                    }
                }
                None => {
                    for epoch in ctx.transport.list_epochs().await? {
                        print_json(&epoch, json);
                    }
                }
            }
            Ok(())
        }
        Commands::Exports { create, id } => {
            let ctx = Context::load(agent.as_deref(), base_url.as_deref())?;
            exports(ctx, create, id, json).await
        }
        Commands::Whoami => {
            let ctx = Context::load(agent.as_deref(), base_url.as_deref())?;
            whoami(ctx, json)
        }
    }
}

/// Loaded agent context shared by authenticated commands.
struct Context {
    dir: PathBuf,
    config: AgentConfig,
    seed: String,
    transport: Transport,
}

impl Context {
    fn load(agent: Option<&str>, base_url: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let agent_id = agent
            .map(|s| s.to_string())
            .ok_or("missing --agent (no agent id given)")?;
        let dir = config::agent_dir(&agent_id)?;
        let config = AgentConfig::load(&dir)?;
        let seed = config::load_private_key(&dir)?;
        let base_url = base_url
            .map(|s| s.to_string())
            .unwrap_or_else(|| config.base_url.clone());
        let transport = Transport::new(TransportConfig {
            base_url: Some(base_url),
            token: config.token.clone(),
            ..Default::default()
        })?;
        Ok(Self {
            dir,
            config,
            seed,
            transport,
        })
    }

    fn builder(&self) -> Result<OperationBuilder, Box<dyn std::error::Error>> {
        Ok(OperationBuilder::new(BuilderConfig {
            org_id: self.config.org_id.clone(),
            agent_id: self.config.agent_id.clone(),
            private_seed: self.seed.clone(),
            kid: Some(self.config.kid.clone()),
            ttl_ms: None,
        })?)
    }
}

async fn register(
    name: &str,
    token: &str,
    url: &str,
    url_override: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let base_url = url_override.unwrap_or(url);
    let transport = Transport::new(TransportConfig {
        base_url: Some(base_url.to_string()),
        token: Some(token.to_string()),
        ..Default::default()
    })?;

    let detail = transport
        .register_agent(&RegisterAgentRequest {
            agent_name: name.to_string(),
            metadata: None,
        })
        .await?;

    let agent_id = string_field(&detail.agent, &["agent_id", "id"])
        .ok_or("registration response lacks an agent id")?;
    let org_id = string_field(&detail.agent, &["org_id"]).unwrap_or_default();
    // keys may be a single object or a list; a fresh registration has one.
    let key_entry = detail
        .keys
        .as_array()
        .and_then(|a| a.first())
        .unwrap_or(&detail.keys);
    let kid = string_field(key_entry, &["kid"])
        .ok_or("registration response lacks a key id")?;
    let seed = string_field(key_entry, &["private_seed", "seed"])
        .ok_or("registration response lacks the private seed")?;

    // Prove the seed works before persisting anything.
    let public_key = SigningKey::from_b64u(&seed)?.public_key();

    let dir = config::agent_dir(&agent_id)?;
    let agent_config = AgentConfig {
        org_id,
        agent_id: agent_id.clone(),
        kid,
        base_url: base_url.to_string(),
        agent_name: name.to_string(),
        token: Some(token.to_string()),
    };
    agent_config.save(&dir)?;
    config::save_private_key(&dir, &seed)?;
    config::write_hook_scripts(&dir, &agent_id)?;

    if json {
        print_json(
            &serde_json::json!({
                "agent_id": agent_id,
                "public_key": public_key.to_b64u(),
                "dir": dir.display().to_string(),
            }),
            true,
        );
    } else {
        println!("✓ Registered agent {}", agent_id);
        println!("  Public key: {}", public_key.to_b64u());
        println!("  Artifacts:  {}", dir.display());
    }
    Ok(())
}

async fn login(mut ctx: Context, email: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut password = String::new();
    std::io::stdin().read_line(&mut password)?;
    let response = ctx
        .transport
        .login(&LoginRequest {
            email: email.to_string(),
            password: password.trim_end().to_string(),
        })
        .await?;

    ctx.config.token = Some(response.token);
    ctx.config.save(&ctx.dir)?;
    println!("✓ Token stored for agent {}", ctx.config.agent_id);
    Ok(())
}

async fn submit(
    ctx: Context,
    operation_type: &str,
    subject: &str,
    action: &str,
    payload: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = match payload {
        None => None,
        Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            if buf.trim().is_empty() {
                None
            } else {
                Some(serde_json::from_str(&buf)?)
            }
        }
        Some(text) => Some(serde_json::from_str(text)?),
    };

    let builder = ctx.builder()?;
    let record = builder.build(OperationRequest {
        operation_type: operation_type.to_string(),
        subject: serde_json::from_str(subject)?,
        action: serde_json::from_str(action)?,
        payload,
    })?;

    let receipt = ctx.transport.submit_operation(&record).await?;
    if json {
        print_json(&serde_json::to_value(&receipt)?, true);
    } else {
        println!("✓ Recorded operation {}", record.operation_id);
        println!("  Receipt:  {}", receipt.receipt_id);
        println!("  Sequence: {}", receipt.seq_no);
    }
    Ok(())
}

async fn guard_check(ctx: Context) -> Result<(), Box<dyn std::error::Error>> {
    let detail = ctx.transport.get_agent(&ctx.config.agent_id).await?;

    if string_field(&detail.agent, &["status"]).as_deref() == Some("frozen") {
        eprintln!("✗ Agent {} is frozen", ctx.config.agent_id);
        std::process::exit(1);
    }
    if key_revoked(&detail.keys, &ctx.config.kid) {
        eprintln!("✗ Key {} has been revoked", ctx.config.kid);
        std::process::exit(1);
    }
    println!("✓ Agent {} may act", ctx.config.agent_id);
    Ok(())
}

async fn log_query(
    ctx: Context,
    operation_type: Option<String>,
    limit: u32,
    cursor: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let page = ctx
        .transport
        .query_audit_log(&AuditQuery {
            agent_id: Some(ctx.config.agent_id.clone()),
            operation_type,
            limit: Some(limit),
            cursor,
            ..Default::default()
        })
        .await?;

    for operation in &page.operations {
        print_json(operation, json);
    }
    if !json {
        println!("-- {} total", page.total_count);
        if let Some(cursor) = page.cursor {
            println!("-- next: --cursor {}", cursor);
        }
    }
    Ok(())
}

async fn exports(
    ctx: Context,
    create: bool,
    id: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if create {
        let export = ctx
            .transport
            .create_export(&AuditQuery {
                agent_id: Some(ctx.config.agent_id.clone()),
                ..Default::default()
            })
            .await?;
        print_json(&export, json);
        return Ok(());
    }
    if let Some(id) = id {
        let detail = ctx.transport.get_export(&id).await?;
        print_json(&detail.export, json);
        match detail.download_url {
            Some(url) if !json => println!("-- download: {}", url),
            _ => {}
        }
        return Ok(());
    }
    for export in ctx.transport.list_exports().await? {
        print_json(&export, json);
    }
    Ok(())
}

fn whoami(ctx: Context, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let builder = ctx.builder()?;
    if json {
        print_json(
            &serde_json::json!({
                "org_id": ctx.config.org_id,
                "agent_id": ctx.config.agent_id,
                "agent_name": ctx.config.agent_name,
                "kid": ctx.config.kid,
                "base_url": ctx.config.base_url,
                "public_key": builder.public_key().to_b64u(),
                "chain_head": builder.prev_chain_hash(),
            }),
            true,
        );
    } else {
        println!("Agent:      {} ({})", ctx.config.agent_id, ctx.config.agent_name);
        println!("Org:        {}", ctx.config.org_id);
        println!("Key id:     {}", ctx.config.kid);
        println!("Public key: {}", builder.public_key().to_b64u());
        println!("Endpoint:   {}", ctx.config.base_url);
    }
    Ok(())
}

/// First present string field among candidate names.
fn string_field(value: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|n| value.get(n).and_then(Value::as_str).map(str::to_string))
}

/// True when the key list marks the given kid revoked.
fn key_revoked(keys: &Value, kid: &str) -> bool {
    let Some(entries) = keys.as_array() else {
        return false;
    };
    entries.iter().any(|k| {
        k.get("kid").and_then(Value::as_str) == Some(kid)
            && (k.get("revoked").and_then(Value::as_bool) == Some(true)
                || k.get("status").and_then(Value::as_str) == Some("revoked"))
    })
}

fn print_json(value: &Value, machine: bool) {
    if machine {
        println!("{}", value);
    } else {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
}
