use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    p2pcall_lib::run(p2pcall_lib::Cli::parse()).await
}
