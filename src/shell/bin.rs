//! Binary entry point. Thin wrapper that delegates to the library: parse
//! the CLI, run the server, and map configuration failures to exit code 1
//! (clap itself exits 2 on a usage error before we ever get here).

use clap::Parser;

use airflow_mcp_server::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = airflow_mcp_server::run(cli).await {
        eprintln!("airflow-mcp-server: {err:#}");
        std::process::exit(1);
    }
}
