use clap::Parser;

fn main() {
    let cli = aw_cli::Cli::parse();
    std::process::exit(aw_cli::run(cli));
}
