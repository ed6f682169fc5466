use anyhow::Result;
use tracing::info;

use korppi_uci::UciSession;

fn main() -> Result<()> {
    // UCI talks on stdout; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    info!("korppi starting");

    let session = UciSession::new()?;
    session.run()?;
    Ok(())
}
