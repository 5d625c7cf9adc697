//! Reference capability server speaking MCP over stdio.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use toolbridge::logging::init_tracing;
use toolbridge::mcp::server::serve;
use toolbridge::mcp::server::tools::{demo_registry, DemoServerOptions};
use tracing::info;

#[derive(Parser)]
#[command(name = "toolbridge-server", version)]
#[command(about = "Serve the demo tools (BMI, greetings, sums, screenshots) over MCP stdio")]
struct ServerArgs {
    /// Image file returned by take_screenshot; without it the tool reports
    /// that no camera was found
    #[arg(long, value_name = "FILE")]
    capture_source: Option<PathBuf>,

    /// Directory where take_screenshot keeps a copy of each capture
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,

    /// Maximum tools per tools/list page
    #[arg(long, value_name = "N")]
    page_size: Option<usize>,

    /// Print debug diagnostics to stderr
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = ServerArgs::parse();
    init_tracing(args.verbose);

    let registry = demo_registry(DemoServerOptions {
        capture_source: args.capture_source,
        save_dir: args.save_dir,
        page_size: args.page_size,
    })?;

    tokio::runtime::Runtime::new()?.block_on(async {
        info!(
            name = registry.server_name(),
            tools = registry.capabilities().len(),
            "Serving MCP on stdio"
        );
        serve(Arc::new(registry), tokio::io::stdin(), tokio::io::stdout()).await
    })?;
    Ok(())
}
