//! Skill Tree Server
//!
//! Axum server exposing per-conversation skill progress and its layout.
//! Identity comes from a bearer JWT; storage is SQLite unless `--ephemeral`.

mod api;
mod auth;

use axum::{
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use skilltree_core::config::{SkillTreeConfig, DEFAULT_CONFIG_PATH};
use serde_json::Value;
use skilltree_core::layout::{Layout, LayoutEngine};
use skilltree_core::service::ReconciliationService;
use skilltree_core::skills::DefinitionStore;
use skilltree_core::state::{
    InMemoryProgressRepository, ProgressRepository, SkillTreeDb, SqliteProgressRepository,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use auth::JwtValidator;

/// Lifetime of tokens issued by `skilltree token`
const TOKEN_EXPIRY_SECS: u64 = 3600;

/// Application state shared by every handler
#[derive(Clone)]
struct AppState {
    service: ReconciliationService,
    layout: LayoutEngine,
    /// Node the layout grows from; the first node is used when absent
    root_id: Arc<str>,
    jwt: JwtValidator,
}

#[derive(Parser, Clone)]
#[command(author, version, about = "Skill Tree - conversation skill progress server")]
struct Args {
    /// Log level for this service when RUST_LOG is unset
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the HTTP server (default)
    Serve(ServeArgs),
    /// Lay out a skill tree file and print the positioned nodes as JSON
    Layout {
        /// JSON file: a flat node list, or an object with `skillTreeData`
        file: PathBuf,
        /// Root node id (defaults to the configured root)
        #[arg(short, long)]
        root: Option<String>,
        /// Config file providing spacing and root
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Issue a bearer token for a user id
    Token {
        user_id: String,
        #[command(flatten)]
        secret: SecretArgs,
    },
}

#[derive(clap::Args, Clone)]
struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,
    /// Config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// SQLite database path (overrides config)
    #[arg(long)]
    db: Option<PathBuf>,
    /// Default skill tree JSON (overrides config)
    #[arg(long)]
    tree: Option<PathBuf>,
    /// Root node id for layouts (overrides config)
    #[arg(long)]
    root: Option<String>,
    /// Keep progress in memory only
    #[arg(long)]
    ephemeral: bool,
    #[command(flatten)]
    secret: SecretArgs,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            config: PathBuf::from(DEFAULT_CONFIG_PATH),
            db: None,
            tree: None,
            root: None,
            ephemeral: false,
            secret: SecretArgs {
                jwt_secret: std::env::var("JWT_SECRET").ok(),
                dev: false,
            },
        }
    }
}

#[derive(clap::Args, Clone, Default)]
struct SecretArgs {
    /// HS256 secret for bearer tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,
    /// Fall back to a fixed development secret when JWT_SECRET is unset
    #[arg(long)]
    dev: bool,
}

impl SecretArgs {
    fn validator(&self) -> anyhow::Result<JwtValidator> {
        match (&self.jwt_secret, self.dev) {
            (Some(secret), _) => JwtValidator::new(secret.clone(), TOKEN_EXPIRY_SECS),
            (None, true) => {
                tracing::warn!("Using the development JWT secret - do not expose this server");
                Ok(JwtValidator::new_dev())
            }
            (None, false) => anyhow::bail!("JWT_SECRET is required (or pass --dev)"),
        }
    }
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Skill Tree API",
        version = "1.0.0",
        description = "Per-conversation skill progress with default-tree fallback"
    ),
    paths(
        api::skills::get_progress,
        api::skills::update_progress,
        api::skills::get_layout
    ),
    components(
        schemas(
            api::ErrorResponse,
            api::skills::UpdateProgressRequest,
            api::skills::ProgressResponse,
            api::skills::LayoutResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "skills", description = "Skill progress and layout")
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn serve_openapi() -> impl IntoResponse {
    let spec = ApiDoc::openapi().to_json().unwrap_or_default();
    ([(header::CONTENT_TYPE, "application/json")], spec)
}

/// Build the router for `state`
fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api/skills", api::skills::skill_routes())
        .route("/api/openapi.json", get(serve_openapi))
        .with_state(state)
}

// === Server Entry ===

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = SkillTreeConfig::load(&args.config)?;
    if let Some(db) = args.db {
        config.database_path = db;
    }
    if let Some(tree) = args.tree {
        config.default_tree_path = Some(tree);
    }
    if let Some(root) = args.root {
        config.root_id = root;
    }

    let jwt = args.secret.validator()?;
    let definitions = DefinitionStore::load(config.default_tree_path.as_deref())?;

    let repository: Arc<dyn ProgressRepository> = if args.ephemeral {
        tracing::warn!("Ephemeral mode: progress is kept in memory only");
        Arc::new(InMemoryProgressRepository::new())
    } else {
        let db = SkillTreeDb::open_at(&config.database_path)?;
        Arc::new(SqliteProgressRepository::new(&db))
    };

    let state = AppState {
        service: ReconciliationService::new(repository, definitions.clone()),
        layout: LayoutEngine::new(config.layout),
        root_id: Arc::from(config.root_id.as_str()),
        jwt,
    };

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    tracing::info!("======================================");
    tracing::info!("  Skill Tree Server");
    tracing::info!("======================================");
    tracing::info!("Listen: http://{}", addr);
    if args.ephemeral {
        tracing::info!("Storage: in-memory");
    } else {
        tracing::info!("Storage: {}", config.database_path.display());
    }
    tracing::info!(
        "Default tree: {} nodes from '{}', layout root '{}'",
        definitions.len(),
        definitions.root_id().unwrap_or_default(),
        config.root_id
    );
    tracing::info!("Routes: /api/skills (GET, POST), /api/skills/layout, /api/openapi.json");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Accept either a bare node list or a saved progress response
fn tree_from_document(document: Value) -> Value {
    match document {
        Value::Object(mut fields) => match fields.remove("skillTreeData") {
            Some(tree) => tree,
            None => Value::Object(fields),
        },
        other => other,
    }
}

fn layout_document(content: &str, root: &str, engine: LayoutEngine) -> anyhow::Result<Layout> {
    let document: Value = serde_json::from_str(content)?;
    Ok(engine.layout_tree(&tree_from_document(document), root))
}

fn run_layout(file: PathBuf, root: Option<String>, config: PathBuf) -> anyhow::Result<()> {
    let config = SkillTreeConfig::load(config)?;
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let root = root.unwrap_or(config.root_id);
    let layout = layout_document(&content, &root, LayoutEngine::new(config.layout))?;

    if layout.nodes.is_empty() {
        tracing::warn!(file = %file.display(), "Nothing to lay out");
    }
    if !layout.diagnostics.is_clean() {
        tracing::warn!(
            unreachable = ?layout.diagnostics.unreachable,
            dangling = layout.diagnostics.dangling.len(),
            repeated = layout.diagnostics.repeated.len(),
            "Dropped parts of the tree"
        );
    }

    println!("{}", serde_json::to_string_pretty(&layout)?);
    Ok(())
}

fn issue_token(secret: &SecretArgs, user_id: &str) -> anyhow::Result<String> {
    secret.validator()?.generate_token(user_id)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "skilltree={level},skilltree_core={level},info",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match args.command {
        Some(CliCommand::Serve(serve)) => run_server(serve).await,
        Some(CliCommand::Layout { file, root, config }) => run_layout(file, root, config),
        Some(CliCommand::Token { user_id, secret }) => {
            println!("{}", issue_token(&secret, &user_id)?);
            Ok(())
        }
        None => run_server(ServeArgs::default()).await,
    }
}
