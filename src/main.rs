use clap::Parser;
use rwhttpd::{limits::ServerLimits, Error, Server};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    process::ExitCode,
    sync::{atomic::AtomicBool, Arc},
};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Serves GET and PUT on the files of the current directory.
#[derive(Parser, Debug)]
#[command(name = "rwhttpd", version, about)]
struct Cli {
    /// Number of worker threads
    #[arg(short = 't', long = "threads", default_value_t = 4, value_parser = parse_threads)]
    threads: usize,

    /// Port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
}

fn parse_threads(src: &str) -> Result<usize, String> {
    match src.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_owned()),
        Ok(n) => Ok(n),
        Err(err) => Err(err.to_string()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "server stopped");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, shutdown.clone()).map_err(Error::Signal)?;
    }

    let listener = rwhttpd::bind(cli.port).map_err(|source| Error::Bind {
        port: cli.port,
        source,
    })?;

    Server::builder()
        .listener(listener)
        .shutdown_flag(shutdown)
        .server_limits(ServerLimits {
            workers: cli.threads,
            ..ServerLimits::default()
        })
        .build()
        .launch()
}
