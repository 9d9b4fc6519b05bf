use colored::*;
use std::net::SocketAddr;
use std::path::Path;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.len()).bright_cyan());
}

/// Where viewers should point their websocket clients.
pub fn print_gateways(responder: SocketAddr, initiator: SocketAddr) {
    print_header("Duologue");
    println!("  {} ws://{}/", "alice".magenta().bold(), responder);
    println!("  {}   ws://{}/", "bob".yellow().bold(), initiator);
    println!("{}", "Seed the conversation through bob. Ctrl+C stops.".dimmed());
}

pub fn print_clip(path: &Path) {
    println!("{} {}", "Audio written to".green(), path.display().to_string().bold());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}
