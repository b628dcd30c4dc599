//! Runbox CLI: register, run, and inspect local script plugins.

use std::{path::PathBuf, process::ExitCode};

use {
    clap::{Parser, Subcommand},
    tokio::sync::mpsc,
    tracing_subscriber::EnvFilter,
};

use {
    runbox_manager::{Dashboard, PluginInfo, PluginService},
    runbox_runner::{OutputChunk, RunMode},
};

#[derive(Parser)]
#[command(name = "runbox", about = "Runbox — local script plugin manager", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level filter (e.g. warn, info, runbox_runner=debug).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Base data directory (defaults to ~/.runbox).
    #[arg(long, global = true, env = "RUNBOX_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the base layout and detect runtimes.
    Init,
    /// Install a plugin from a local directory.
    Add { source: String },
    /// Remove a plugin.
    Del {
        name: String,
        /// Also remove installed dependencies.
        #[arg(long)]
        deps: bool,
    },
    /// Run a plugin.
    Run {
        name: String,
        /// Raw argument string passed to the plugin.
        #[arg(default_value = "")]
        args: String,
        /// Attach the plugin directly to this terminal instead of
        /// streaming captured output.
        #[arg(long, short)]
        interactive: bool,
    },
    /// Show plugin metadata, state, and recent history.
    Info {
        name: String,
        /// History entries to show.
        #[arg(long, default_value_t = 10)]
        history: usize,
    },
    /// List installed plugins.
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 0)]
        page_size: usize,
    },
    /// Install a plugin's dependencies.
    Load { name: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(base_dir) = cli
        .data_dir
        .or_else(|| dirs_next::home_dir().map(|home| home.join(".runbox")))
    else {
        eprintln!("error: cannot determine data directory");
        return ExitCode::FAILURE;
    };

    let service = PluginService::with_base_dir(base_dir);
    match dispatch(&service, cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

async fn dispatch(service: &PluginService, command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Init => {
            service.init_layout().await?;
            println!("initialised {}", service.base_dir().display());
            Ok(ExitCode::SUCCESS)
        },
        Commands::Add { source } => {
            let plugin = service.add_plugin(&source).await?;
            println!("added {} ({})", plugin.name, plugin.interpreter);
            // Provision dependencies right away so the first run works.
            if let Err(e) = service.install_deps(&plugin.name).await {
                eprintln!("warning: dependency install failed: {e:#}");
            }
            Ok(ExitCode::SUCCESS)
        },
        Commands::Del { name, deps } => {
            service.delete_plugin(&name, deps).await?;
            println!("deleted {name}");
            Ok(ExitCode::SUCCESS)
        },
        Commands::Run {
            name,
            args,
            interactive,
        } => run_command(service, &name, &args, interactive).await,
        Commands::Info { name, history } => {
            let info = service.plugin_info(&name, history).await?;
            print_info(&info);
            Ok(ExitCode::SUCCESS)
        },
        Commands::List { page, page_size } => {
            let dashboard = service.list_plugins(page, page_size).await?;
            print_dashboard(&dashboard);
            Ok(ExitCode::SUCCESS)
        },
        Commands::Load { name } => {
            service.install_deps(&name).await?;
            println!("dependencies installed for {name}");
            Ok(ExitCode::SUCCESS)
        },
    }
}

async fn run_command(
    service: &PluginService,
    name: &str,
    args: &str,
    interactive: bool,
) -> anyhow::Result<ExitCode> {
    let result = if interactive {
        service.run_plugin(name, args, RunMode::Interactive, None).await?
    } else {
        let (tx, mut rx) = mpsc::channel::<OutputChunk>(64);
        let printer = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                if chunk.is_err {
                    eprintln!("{}", chunk.data);
                } else {
                    println!("{}", chunk.data);
                }
            }
        });
        let result = service.run_plugin(name, args, RunMode::Streaming, Some(tx)).await;
        // Queue close and run result are independent completions; wait
        // for both before reporting.
        let _ = printer.await;
        result?
    };

    if !result.success {
        eprintln!("{}", result.message);
    }
    Ok(match u8::try_from(result.exit_code) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    })
}

fn print_info(info: &PluginInfo) {
    println!("{} ({})", info.plugin.name, info.plugin.interpreter);
    if !info.plugin.description.is_empty() {
        println!("  {}", info.plugin.description);
    }
    if !info.plugin.usage.is_empty() {
        println!("  usage: {}", info.plugin.usage);
    }
    println!("  source: {}", info.plugin.source.display());
    println!("  runs: {}", info.run_count);
    if let Some(args) = &info.most_recent_args {
        let shown = if args.is_empty() { "(none)" } else { args };
        println!("  last args: {shown}");
    }
    if !info.recent_history.is_empty() {
        println!("  history:");
        for record in &info.recent_history {
            println!(
                "    {} exit={} {}ms args={:?}",
                record.status.as_str(),
                record.exit_code,
                record.duration_ms,
                record.args
            );
        }
    }
}

fn print_dashboard(dashboard: &Dashboard) {
    if dashboard.show_top_list && !dashboard.top.is_empty() {
        println!("recent:");
        for item in &dashboard.top {
            println!("  {:<20} {:<10} runs={}", item.name, item.interpreter, item.run_count);
        }
        println!();
    }
    for item in &dashboard.main {
        println!("  {:<20} {:<10} {}", item.name, item.interpreter, item.description);
    }
    if dashboard.total_pages > 1 {
        println!("page {}/{} ({} plugins)", dashboard.page, dashboard.total_pages, dashboard.total_count);
    }
}
