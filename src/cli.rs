use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cinnabar", about = "Cinnabar, a UCI chess engine", version)]
pub struct Cli {
    #[command(subcommand)]
    pub subcommand: Option<Subcommands>,
}

#[derive(Subcommand)]
pub enum Subcommands {
    /// Search a fixed set of positions and report nodes and speed.
    Bench {
        /// Depth to search each position to.
        #[arg(long, default_value_t = 10)]
        depth: i32,
        /// Hash size in megabytes.
        #[arg(long, default_value_t = 16)]
        hash: usize,
    },
}
