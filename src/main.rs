#![deny(unsafe_code)]

//! bcq — command-line client entry point.

use clap::Parser;

use bcq::cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("[BCQ] {e}");
        std::process::exit(e.exit_code());
    }
}
