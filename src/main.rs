#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::Parser;
use pgw_core::config::CliArgs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    simple_logger::init_with_level(args.log_level.as_level())?;

    pgw_core::startup(args).await
}
