use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use depot_fetch::ReqwestClient;
use depot_registry::{JsonFileStore, ResourceRegistry, Settings, load_config};
use depot_resource::ResourceVersion;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{App, Command};

type Registry = ResourceRegistry<ReqwestClient>;

fn init_tracing(app: &App) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(app.default_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// `prepare` provisions the storage directories and purges scratch first.
fn open_registry(settings: Settings, prepare: bool) -> Result<Registry> {
    let policy = settings.retry_policy()?;
    let client = ReqwestClient::with_options(&settings.client_options()).context("failed to build HTTP client")?;
    let scratch = settings.registry.layout().scratch_dir().to_path_buf();

    let mut builder = ResourceRegistry::builder(Arc::new(settings.registry), client).policy(policy);
    if let Some(concurrency) = settings.concurrency {
        builder = builder.concurrency(concurrency);
    }
    if let Some(state_file) = settings.state_file {
        builder = builder.store(JsonFileStore::new(state_file, scratch));
    }
    if prepare {
        Ok(builder.open()?)
    } else {
        Ok(builder.build())
    }
}

async fn run(app: App) -> Result<()> {
    let settings = load_config(app.config.as_deref())?;
    let registry = open_registry(settings, !matches!(app.cmd, Command::Clean))?;

    match app.cmd {
        Command::Fetch { identifier, version } => {
            let resource = ResourceVersion::new(identifier, version)?;
            let record = registry.install(&resource).await?;
            println!("{}", record.path.display());
        }
        Command::Data { path } => {
            let data = registry.fetch_data(&path).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
        Command::Index { path } => {
            let index = registry.fetch_index(&path).await?;
            for (identifier, version) in index.iter() {
                println!("{identifier} {version}");
            }
        }
        Command::Update { index } => {
            let mut failed = 0;
            for (resource, result) in registry.update(&index).await? {
                match result {
                    Ok(record) => println!("{resource} {}", record.path.display()),
                    Err(e) => {
                        failed += 1;
                        eprintln!("{:?}", anyhow::Error::from(e));
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} resource(s) failed to install");
            }
        }
        Command::List => {
            for resource in registry.scan_storage()? {
                println!("{resource}");
            }
        }
        Command::Clean => {
            let removed = registry.clean_scratch()?;
            println!("removed {removed} file(s)");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let app = App::parse();
    init_tracing(&app);
    run(app).await
}
