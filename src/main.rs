use std::sync::Arc;

use anyhow::Result;
use log::info;

use tasksync::config::Config;
use tasksync::logger;
use tasksync::remote::todoist::TodoistSyncClient;
use tasksync::scheduler::Scheduler;
use tasksync::storage::LocalStorage;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    logger::init(&config.logging)?;

    let storage = Arc::new(LocalStorage::new(&config.database.url).await?);
    let client = Arc::new(TodoistSyncClient::new());
    let scheduler = Scheduler::new(storage, client, config.sync.clone());

    let started = scheduler.start_all().await?;
    info!("tasksync running with {started} job(s)");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, stopping jobs");
    scheduler.stop_all().await;

    Ok(())
}
