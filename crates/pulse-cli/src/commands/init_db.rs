//! `pulse init-db` - create warehouse and load-state schemas

use anyhow::Result;
use pulse_loader::{Loader, LoaderConfig};

pub async fn run() -> Result<()> {
    let config = LoaderConfig::from_env()?;
    let pool = config.connect().await?;

    Loader::new(pool, &config).ensure_schema().await?;

    println!("Warehouse schemas ready (raw.channel_posts, etl.load_state)");
    Ok(())
}
