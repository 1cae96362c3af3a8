use cinnabar::cli::{Cli, Subcommands};

fn main() -> anyhow::Result<()> {
    if std::env::args_os().len() == 1 {
        // fast path to UCI:
        return cinnabar::uci::main_loop();
    }

    let cli = <Cli as clap::Parser>::parse();

    match cli.subcommand {
        Some(Subcommands::Bench { depth, hash }) => cinnabar::bench::run(depth, hash),
        None => cinnabar::uci::main_loop(),
    }
}
