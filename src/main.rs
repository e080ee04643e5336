// src/main.rs

use anyhow::Context;
use log::info;

use contact_service::config::Config;
use contact_service::{build_state, transport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Логгер: уровень через RUST_LOG, по умолчанию info
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        "starting contact service: addr={}, cache_capacity={}, max_page_size={}",
        config.listen_addr, config.cache_capacity, config.max_page_size
    );

    let state = build_state(&config);
    transport::serve(state, config.listen_addr)
        .await
        .context("http server failed")?;

    Ok(())
}
