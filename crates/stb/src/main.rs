use std::sync::Arc;

use stb_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), stb_core::Error> {
    stb_core::logging::init("stb")?;

    let cfg = Arc::new(Config::load()?);

    stb_telegram::router::run_polling(cfg).await?;

    Ok(())
}
