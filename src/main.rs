#[macro_use]
extern crate slog;
extern crate slog_async;
extern crate slog_term;

use clap::Parser;
use rusty_ipamd::config;
use rusty_ipamd::server;
use slog::Drain;
use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// IP address management service
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overrides the configuration file
    #[arg(short, long)]
    bind: Option<SocketAddrV4>,
}

fn build_logger(level: slog::Level) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = slog::LevelFilter::new(drain, level).fuse();
    return slog::Logger::root(drain, o!());
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => match config::Config::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{}", err);
                return ExitCode::FAILURE;
            }
        },
        None => config::Config::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    let level = match config.log.level() {
        Ok(level) => level,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    let logger = build_logger(level);

    let srv = server::Server::create(&config, logger.clone());
    let shutdown_notify = Arc::new(tokio::sync::Notify::new());

    let shutdown_bg = shutdown_notify.clone();
    let ctrl_c_logger = logger.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(ctrl_c_logger, "Failed to listen for ctrl-c: {}", err);
            return;
        }
        shutdown_bg.notify_one();
    });

    match srv.serve(shutdown_notify).await {
        Ok(()) => return ExitCode::SUCCESS,
        Err(err) => {
            crit!(logger, "{}", err);
            return ExitCode::FAILURE;
        }
    }
}
