//! hx-signalr CLI: run the demonstration page against the in-process hub.

use std::env;
use std::path::Path;
use std::process;
use std::time::Duration;

use colored::Colorize;
use hx_signalr::config::Config;
use hx_signalr::demo::{self, DemoOptions};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Run the demo page
    Demo {
        ticks: u32,
        interval: u64,
        echo: Option<String>,
        config: Option<String>,
        queue_sends: bool,
    },
    /// Print usage
    Help,
}

fn print_usage() {
    eprintln!("hx-signalr {} - SignalR bindings for htmx pages", VERSION);
    eprintln!();
    eprintln!("Usage: hx-signalr [demo] [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --ticks <n>          Number of hub broadcasts (default: 3)");
    eprintln!("  --interval <ms>      Milliseconds between broadcasts (default: 5000)");
    eprintln!("  --echo <message>     Submit the echo form once after the broadcasts");
    eprintln!("  --config <file>      Load engine configuration from a JSON file");
    eprintln!("  --queue-sends        Queue sends made before the connection is active");
    eprintln!("  -h, --help           Show this help message");
    eprintln!();
    eprintln!("Logging is controlled with RUST_LOG (default: info).");
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> T {
    let Some(value) = value else {
        eprintln!("{} requires a number", flag);
        print_usage();
        process::exit(64);
    };
    value.parse().unwrap_or_else(|_| {
        eprintln!("Invalid value for {}: {}", flag, value);
        process::exit(64);
    })
}

fn parse_args() -> Command {
    let args: Vec<String> = env::args().collect();
    let mut ticks = 3u32;
    let mut interval = 5000u64;
    let mut echo = None;
    let mut config = None;
    let mut queue_sends = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "help" | "-h" | "--help" => return Command::Help,
            "demo" => {}
            "--ticks" => {
                i += 1;
                ticks = parse_number("--ticks", args.get(i));
            }
            "--interval" => {
                i += 1;
                interval = parse_number("--interval", args.get(i));
                if interval == 0 {
                    eprintln!("--interval must be greater than zero");
                    print_usage();
                    process::exit(64);
                }
            }
            "--echo" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("--echo requires a message");
                    print_usage();
                    process::exit(64);
                }
                echo = Some(args[i].clone());
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("--config requires a file path");
                    print_usage();
                    process::exit(64);
                }
                config = Some(args[i].clone());
            }
            "--queue-sends" => queue_sends = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                print_usage();
                process::exit(64);
            }
        }
        i += 1;
    }

    Command::Demo {
        ticks,
        interval,
        echo,
        config,
        queue_sends,
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    match parse_args() {
        Command::Help => print_usage(),
        Command::Demo {
            ticks,
            interval,
            echo,
            config,
            queue_sends,
        } => {
            let mut config = match config {
                Some(path) => Config::from_file(Path::new(&path)).unwrap_or_else(|e| {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                    process::exit(1);
                }),
                None => Config::default(),
            };
            if queue_sends {
                config.queue_sends_until_connected = true;
            }

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap_or_else(|e| {
                    eprintln!("{} failed to start runtime: {}", "Error:".red().bold(), e);
                    process::exit(1);
                });

            let options = DemoOptions {
                ticks,
                interval: Duration::from_millis(interval),
                echo,
                config,
            };
            if let Err(e) = runtime.block_on(demo::run(options)) {
                eprintln!("{} {}", "Error:".red().bold(), e);
                process::exit(1);
            }
        }
    }
}
