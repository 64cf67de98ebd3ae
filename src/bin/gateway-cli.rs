use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use api_gateway::config::load_config;
use api_gateway::routing::RouteTable;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Offline inspection of an API gateway configuration", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, env = "GATEWAY_CONFIG", default_value = "gateway.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the route table in evaluation order
    Routes,
    /// Show which route a request path resolves to
    Resolve {
        /// Request path, optionally with a query string
        path: String,
    },
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let table = RouteTable::from_config(&config.routes)?;

    match cli.command {
        Commands::Routes => {
            print_routes(&table);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Resolve { path } => Ok(resolve(&table, &path)?),
    }
}

fn print_routes(table: &RouteTable) {
    if table.is_empty() {
        println!("No routes configured; every request is answered with 404.");
        return;
    }

    for (i, route) in table.routes().iter().enumerate() {
        let patterns: Vec<&str> = route.patterns.iter().map(|p| p.as_str()).collect();
        println!("{:>3}. {} [{}]", i + 1, route.id, route.auth);
        println!("     paths:    {}", patterns.join(", "));
        println!("     upstream: {}", route.upstream);
        if !route.filters.is_empty() {
            println!("     filters:  {}", route.filters.names().join(", "));
        }
        if let Some(timeout) = route.timeout {
            println!("     timeout:  {}ms", timeout.as_millis());
        }
    }

    for shadowed in table.shadowed() {
        println!(
            "warning: {} ({}) is unreachable, {} ({}) is declared first and matches every path it does",
            shadowed.route, shadowed.pattern, shadowed.by_route, shadowed.by_pattern
        );
    }
}

fn resolve(table: &RouteTable, raw: &str) -> Result<ExitCode, axum::http::Error> {
    let (path, query) = match raw.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (raw, None),
    };

    let Some(route) = table.find(path) else {
        println!("{path} → no route (404)");
        return Ok(ExitCode::FAILURE);
    };

    let delta = route.filters.apply(&route.id, path, None);
    let target = route
        .upstream
        .target(delta.path.as_deref().unwrap_or(path), query)?;

    println!("{path} → route '{}' [{}]", route.id, route.auth);
    println!("upstream request: {target}");
    for (name, value) in delta.headers.iter() {
        println!("header: {}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    if route.filters.names().contains(&"AddUserDetails") {
        println!("identity headers: X-User-* from the verified token");
    }
    Ok(ExitCode::SUCCESS)
}
