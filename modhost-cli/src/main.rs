//! modhost-query - inspect plugins discoverable on the search path

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use modhost_core::{Manager, ManagerConfig, Plugin, PluginState};

/// Environment variable holding extra search paths (platform path-list
/// syntax), folded in after the default paths.
const PLUGIN_PATH_ENV: &str = "MODHOST_PLUGIN_PATH";

const DEFAULT_PREFIX: &str = "/usr";

#[derive(Parser)]
#[command(name = "modhost-query", about = "Query plugins discoverable on the modhost search path")]
#[command(version)]
struct Cli {
    /// Plugin ids to inspect; every known plugin when omitted
    #[arg(value_name = "PLUGIN-ID")]
    ids: Vec<String>,

    /// Include internal plugins in listings
    #[arg(long)]
    internal: bool,

    /// Print the search paths and exit
    #[arg(long)]
    list: bool,

    /// Additional directories to search, appended after the defaults
    #[arg(short = 'p', long = "path", value_name = "DIR")]
    paths: Vec<PathBuf>,

    /// Emit machine-readable JSON
    #[arg(long)]
    json: bool,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("modhost-query: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let mut manager = Manager::new(ManagerConfig::default());
    manager.add_default_paths(DEFAULT_PREFIX);
    manager.append_paths_from_env(PLUGIN_PATH_ENV);
    for path in cli.paths {
        manager.append_path(path);
    }

    if cli.list {
        for path in manager.paths() {
            println!("{}", path.display());
        }
        return Ok(true);
    }

    manager.refresh();
    tracing::debug!(plugins = manager.plugin_count(), "Refresh complete");

    if cli.ids.is_empty() {
        print_all(&manager, cli.internal, cli.json);
        return Ok(true);
    }

    let mut all_found = true;
    for id in &cli.ids {
        match manager.find_plugin(id) {
            Some(plugin) => {
                if cli.json {
                    println!("{}", plugin_json(&plugin));
                } else {
                    print_plugin(&plugin);
                    println!();
                }
            }
            None => {
                eprintln!("Plugin '{id}' not found");
                all_found = false;
            }
        }
    }
    Ok(all_found)
}

fn print_all(manager: &Manager, include_internal: bool, json: bool) {
    let mut plugins: Vec<Arc<Plugin>> = manager
        .list_plugins()
        .iter()
        .filter_map(|id| manager.find_plugin(id))
        .filter(|p| include_internal || !p.info().internal())
        .collect();
    plugins.sort_by(|a, b| a.info().id().cmp(b.info().id()));

    if json {
        let entries: Vec<serde_json::Value> =
            plugins.iter().map(|p| plugin_value(p)).collect();
        println!(
            "{}",
            serde_json::Value::Array(entries)
        );
        return;
    }

    if plugins.is_empty() {
        println!("No plugins found");
        println!();
        println!("Search paths:");
        for path in manager.paths() {
            println!("  {}", path.display());
        }
        println!();
        println!("Add directories with --path or the {PLUGIN_PATH_ENV} environment variable.");
        return;
    }

    for plugin in plugins {
        let info = plugin.info();
        let summary = if info.summary().is_empty() {
            "No summary"
        } else {
            info.summary()
        };
        let status = match plugin.state() {
            PluginState::Loaded => "*",
            PluginState::LoadFailed | PluginState::UnloadFailed => "!",
            _ => " ",
        };
        println!("{} {}    {}", status, info.id(), summary);
    }
}

fn print_plugin(plugin: &Arc<Plugin>) {
    let info = plugin.info();
    let or_unset = |s: &str| if s.is_empty() { "(unset)".to_string() } else { s.to_string() };

    println!("Id:           {}", info.id());
    println!("Name:         {}", or_unset(info.name()));
    println!("Version:      {}", or_unset(info.version()));
    println!("Summary:      {}", or_unset(info.summary()));
    println!("Category:     {}", or_unset(info.category()));
    println!("Website:      {}", or_unset(info.website()));
    println!("ABI version:  {:#010x}", info.abi_version());
    println!("File:         {}", plugin.filename().display());
    println!("State:        {}", plugin.state());
    println!("Internal:     {}", info.internal());
    println!("Auto-load:    {}", info.auto_load());
    println!("Priority:     {}", info.priority());

    if !info.authors().is_empty() {
        println!("Authors:      {}", info.authors().join(", "));
    }
    if !info.dependencies().is_empty() {
        println!("Dependencies: {}", info.dependencies().join(", "));
    }
    if !info.provides().is_empty() {
        println!("Provides:     {}", info.provides().join(", "));
    }
    if let Some(error) = plugin.error() {
        println!("Error:        {error}");
    }
}

fn plugin_value(plugin: &Arc<Plugin>) -> serde_json::Value {
    let mut value = serde_json::json!({
        "filename": plugin.filename(),
        "state": plugin.state(),
        "info": plugin.info(),
    });
    if let Some(error) = plugin.error() {
        value["error"] = serde_json::Value::String(error.to_string());
    }
    value
}

fn plugin_json(plugin: &Arc<Plugin>) -> String {
    plugin_value(plugin).to_string()
}
