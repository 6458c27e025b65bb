use anyhow::Result;
use catalogd_mgmt::cli::Cli;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    tracing::debug!(command = ?cli.command, user = %cli.user, "catd-admin starting");

    for line in cli.run()? {
        println!("{}", line);
    }
    Ok(())
}
