// Tue Jan 13 2026 - Alex

use bounded_pipeline::ui::{Args, CommandHandler};
use clap::Parser;
use colored::Colorize;

fn main() {
    let args = Args::parse();

    match CommandHandler::new().execute(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {}", "[!]".red(), e);
            std::process::exit(1);
        }
    }
}
