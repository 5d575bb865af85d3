//! Dry-run layout report.
//!
//! Builds every entity's collection in a throwaway in-process store and prints the resulting
//! collections, ruleset flags and index names. Nothing is written anywhere else; the store is
//! dropped on exit.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tenant_docstore::entities::{self, users::DEFAULT_HASH_ROUNDS};
use tenant_docstore::tenant::{ContextTenantResolver, SHARED_NAMESPACE, SharedNamespace, validate_namespace};
use tenant_docstore::{
    ConnectionConfig, DataSource, EntityDefinition, PersistenceService, Record, RequestContext, TenantResolver,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tenant-docstore-layout")]
#[command(about = "Dry run: report the collections, rulesets and indexes every entity declares")]
struct Cli {
    /// Store URI naming the database and pool sizes; falls back to STORE_URI
    #[arg(long)]
    uri: Option<String>,

    /// bcrypt cost for user passwords; falls back to PASSWORD_HASH_ROUNDS
    #[arg(long)]
    hash_rounds: Option<u32>,

    /// Print each collection's $jsonSchema as well
    #[arg(long)]
    rulesets: bool,

    /// Tenant namespaces to lay out in addition to the shared one
    tenants: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.uri {
        Some(uri) => ConnectionConfig::from_url(uri).map_err(anyhow::Error::msg),
        None => ConnectionConfig::from_env().map_err(anyhow::Error::msg),
    }
    .context("failed to load store configuration")?;
    let hash_rounds = match cli.hash_rounds {
        Some(rounds) => rounds,
        None => hash_rounds_from_env()?,
    };
    for tenant in &cli.tenants {
        validate_namespace(tenant).with_context(|| format!("invalid tenant '{tenant}'"))?;
    }

    // private to this run
    let source = Arc::new(DataSource::in_memory());
    let database = source
        .connect_with_config(config)
        .await
        .context("failed to open the dry-run store")?;
    info!(database = %database.name(), "dry run against an in-process store");

    let shared = RequestContext::new();
    lay_out(&source, &shared, entities::shared_definitions(hash_rounds), cli.rulesets)
        .await
        .with_context(|| format!("failed to lay out namespace '{SHARED_NAMESPACE}'"))?;

    for tenant in &cli.tenants {
        let ctx = RequestContext::for_tenant(tenant.as_str());
        lay_out(&source, &ctx, entities::tenant_definitions(), cli.rulesets)
            .await
            .with_context(|| format!("failed to lay out tenant '{tenant}'"))?;
    }

    let conn = database.connection().await.context("failed to check out a connection")?;
    for info in conn
        .store()
        .list_collections(database.name())
        .await
        .context("failed to list collections")?
    {
        let indexes = conn
            .store()
            .list_indexes(&conn.namespace(&info.name))
            .await
            .with_context(|| format!("failed to list indexes of '{}'", info.name))?;
        let names: Vec<String> = indexes.iter().map(|spec| spec.name()).collect();
        println!("{:<24} ruleset={:<5} indexes={}", info.name, info.has_validator, names.join(", "));
    }
    drop(conn);

    source.disconnect().await;
    info!(tenants = cli.tenants.len(), "dry run complete");
    Ok(())
}

async fn lay_out(
    source: &Arc<DataSource>,
    ctx: &RequestContext,
    definitions: Vec<EntityDefinition>,
    print_rulesets: bool,
) -> Result<()> {
    for definition in definitions {
        let name = definition.base_name.clone();
        let ruleset = definition.validator.as_ref().map(|v| v.schema().clone());
        let service: PersistenceService<Record> =
            PersistenceService::new(definition, resolver_for(ctx), Arc::clone(source));
        service
            .init(ctx)
            .await
            .with_context(|| format!("failed to initialize '{name}'"))?;

        if print_rulesets && let Some(schema) = ruleset {
            let collection = service.collection_name(ctx)?;
            println!("# {collection}\n{}", serde_json::to_string_pretty(&schema)?);
        }
    }
    Ok(())
}

fn resolver_for(ctx: &RequestContext) -> Arc<dyn TenantResolver> {
    match ctx.tenant() {
        Some(_) => Arc::new(ContextTenantResolver),
        None => Arc::new(SharedNamespace::default()),
    }
}

fn hash_rounds_from_env() -> Result<u32> {
    match std::env::var("PASSWORD_HASH_ROUNDS") {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("PASSWORD_HASH_ROUNDS must be a number, got '{raw}'")),
        Err(_) => Ok(DEFAULT_HASH_ROUNDS),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tenant_docstore=debug")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
