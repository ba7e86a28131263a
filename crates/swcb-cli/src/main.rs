//! SW & Cache Blocker CLI
//!
//! Developer tool for generating the blocking shim and inspecting how
//! domain entries normalize, compile and match.

#[cfg(feature = "e2e")]
mod e2e;

use std::fs;

use clap::{Parser, Subcommand};

use swcb_core::domain::{normalize_domain, DomainEntry};
use swcb_core::pattern::compile_patterns;
use swcb_core::shim::{blocked_entry_points, render_shim, ShimOptions};

#[derive(Parser)]
#[command(name = "swcb-cli")]
#[command(about = "SW & Cache Blocker developer tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the page-world blocking script
    Shim {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Global marker property guarding double install
        #[arg(long)]
        marker: Option<String>,
    },

    /// Print the match patterns compiled from domain entries
    Patterns {
        /// Domain entries (`example.com`, `*.feishu.cn`)
        #[arg(required = true)]
        entries: Vec<String>,

        /// Print as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Show which entry, if any, blocks a hostname
    Check {
        /// Hostname to test
        #[arg(long)]
        host: String,

        /// Domain entries
        #[arg(required = true)]
        entries: Vec<String>,
    },

    /// Normalize and validate user input
    Normalize {
        /// Raw inputs as typed in the popup
        #[arg(required = true)]
        inputs: Vec<String>,
    },

    /// Run end-to-end checks against Chrome via chromedriver
    #[cfg(feature = "e2e")]
    E2e {
        /// Chromedriver URL
        #[arg(long, default_value = "http://localhost:9515")]
        chromedriver_url: String,

        /// Path to the unpacked extension directory
        #[arg(long)]
        extension_path: String,

        /// Page to load with its host blocklisted
        #[arg(long, default_value = "https://example.com/")]
        target_url: String,

        /// Extension page used to seed the store
        #[arg(long, default_value = "popup.html")]
        popup_path: String,

        /// Run Chrome headless
        #[arg(long)]
        headless: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Shim { output, marker } => cmd_shim(output.as_deref(), marker),
        Commands::Patterns { entries, json } => cmd_patterns(&entries, json),
        Commands::Check { host, entries } => cmd_check(&host, &entries),
        Commands::Normalize { inputs } => cmd_normalize(&inputs),
        #[cfg(feature = "e2e")]
        Commands::E2e {
            chromedriver_url,
            extension_path,
            target_url,
            popup_path,
            headless,
        } => e2e::run_e2e(e2e::E2eOptions {
            chromedriver_url,
            extension_path,
            target_url,
            popup_path,
            headless,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn parse_entries(raw: &[String]) -> Result<Vec<DomainEntry>, String> {
    raw.iter()
        .map(|r| DomainEntry::parse(r).map_err(|e| format!("'{}': {}", r, e)))
        .collect()
}

fn cmd_shim(output: Option<&str>, marker: Option<String>) -> Result<(), String> {
    let mut opts = ShimOptions::default();
    if let Some(marker) = marker {
        opts.marker = marker;
    }
    let js = render_shim(&opts);

    match output {
        Some(path) => {
            fs::write(path, &js).map_err(|e| format!("Failed to write '{}': {}", path, e))?;
            println!("Wrote blocking shim to '{}' ({} bytes)", path, js.len());
            println!("Replaced entry points:");
            for point in blocked_entry_points() {
                println!("  {}", point);
            }
        }
        None => print!("{}", js),
    }
    Ok(())
}

fn cmd_patterns(raw: &[String], json: bool) -> Result<(), String> {
    let entries = parse_entries(raw)?;
    let patterns = compile_patterns(&entries);
    if json {
        let text = serde_json::to_string_pretty(&patterns)
            .map_err(|e| format!("Failed to serialize JSON: {}", e))?;
        println!("{}", text);
    } else {
        for pattern in &patterns {
            println!("{}", pattern);
        }
    }
    Ok(())
}

fn check_line(host: &str, entries: &[DomainEntry]) -> String {
    match entries.iter().find(|e| e.matches(host)) {
        Some(entry) => format!("{} is blocked by {}", host, entry),
        None => format!("{} is not blocked", host),
    }
}

fn cmd_check(host: &str, raw: &[String]) -> Result<(), String> {
    let entries = parse_entries(raw)?;
    println!("{}", check_line(&host.to_ascii_lowercase(), &entries));
    Ok(())
}

fn normalize_line(input: &str) -> String {
    match DomainEntry::parse(input) {
        Ok(entry) => format!("{:<32} -> {}", input, entry),
        Err(e) => format!("{:<32} -> invalid ({}; normalized: '{}')", input, e, normalize_domain(input)),
    }
}

fn cmd_normalize(inputs: &[String]) -> Result<(), String> {
    for input in inputs {
        println!("{}", normalize_line(input));
    }
    Ok(())
}
