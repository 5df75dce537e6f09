use anyhow::Result;
use clap::Parser;

use ticketctl::cli::Cli;
use ticketctl::output;
use ticketctl::rpc_client::RpcClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let request = cli.to_request();

    let mut client = RpcClient::connect(cli.socket.as_deref()).await?;
    let response = client.call(&request).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        if !response.is_success() {
            std::process::exit(1);
        }
        return Ok(());
    }

    if !output::display(&request, &response) {
        std::process::exit(1);
    }
    Ok(())
}
