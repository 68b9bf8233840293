use clap::Parser;
use nachos::cli::Cli;

fn main() {
    let cli = Cli::parse();
    std::process::exit(nachos::cli::run(cli));
}
