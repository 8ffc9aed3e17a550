use listening::{service, store, Config};

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    // try sourcing a .env if one exists
    dotenv::dotenv().ok();
    let config = Config::load()?;
    config.initialize();
    config.validate(config.sync_interval_seconds > 0)?;

    let store = store::connect(&config.store_target()?).await?;
    service::start(&config, store).await?;
    Ok(())
}
