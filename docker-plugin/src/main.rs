use clap::Parser;
use docker_plugin::{cli::Cli, Resolver};

fn main() {
    let cli = Cli::parse();
    let resolver = Resolver::from_env();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.log_filter(&resolver)),
    )
    .init();

    if let Err(error) = cli.run(&resolver) {
        const BOLD_RED: &str = "\x1b[1;31m";
        const BOLD: &str = "\x1b[1m";
        const RESET: &str = "\x1b[0m";
        eprintln!("{BOLD_RED}error{RESET}{BOLD}:{RESET} {error}");
        std::process::exit(1);
    }
}
