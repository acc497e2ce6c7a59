//! Adds the read groups of one BAM to the matching reads of another.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;

mod app;
pub mod catalog;
pub mod header;
pub mod index;
pub mod io;
pub mod metrics;
pub mod progress;
pub mod qname;
pub mod record;
pub mod transform;

use app::{App, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // recorded in the @PG line
    let invocation = std::env::args().collect::<Vec<_>>().join(" ");
    let config = Config::parse();

    let app = App::new(config, invocation);
    app.run().await?;

    Ok(())
}
