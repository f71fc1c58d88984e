use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use qr_hub::{config, db, handlers, render, upload};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/qr-hub.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;
    let removed = db::delete_expired_sessions(&pool).await?;
    if removed > 0 {
        info!(removed, "pruned expired sessions");
    }

    let render_base: Url = cfg
        .renderer
        .base_url
        .parse()
        .context("invalid renderer.base_url")?;
    let upload_base: Url = cfg
        .uploads
        .base_url
        .parse()
        .context("invalid uploads.base_url")?;

    let state = handlers::AppState {
        pool,
        renderer: Arc::new(render::RenderClient::new(render_base.clone())),
        uploader: Arc::new(upload::UploadClient::new(
            upload_base,
            cfg.uploads.token.clone(),
        )),
        render_base,
        background: cfg.renderer.background.clone(),
        session_ttl_hours: cfg.app.session_ttl_hours,
    };

    let listener = tokio::net::TcpListener::bind(&cfg.app.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.app.bind_addr))?;
    info!(addr = %cfg.app.bind_addr, "starting http server");
    axum::serve(listener, handlers::router(state)).await?;

    Ok(())
}
