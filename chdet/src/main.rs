mod compare;
mod options;

use anyhow::Result;
use clap::Parser;
use options::Cli;
#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() -> Result<()> {
    env_logger::init();
    match Cli::parse() {
        Cli::Dems(dems) => dems.run(),
        Cli::Clouds(clouds) => clouds.run(),
    }
}
