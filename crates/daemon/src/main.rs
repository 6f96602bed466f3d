// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! `ocred`: the Ocre supervisor daemon.

use anyhow::Context as _;
use clap::Parser;
use ocre_daemon::env;
use ocre_daemon::listener::{ListenCtx, Listener};
use ocre_daemon::pidfile::PidFile;
use ocre_engine::{workdir, Ocre, OcreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ocred", about = "Ocre container supervisor daemon", version)]
struct Args {
    /// Listen address (unix socket path)
    #[arg(short = 'H', long = "host")]
    listen: Option<PathBuf>,

    /// Working directory for the managed context
    #[arg(short = 'w', long = "workdir")]
    workdir: Option<PathBuf>,

    /// PID file path
    #[arg(long = "pid-file")]
    pid_file: Option<PathBuf>,

    /// Log to this file instead of stderr
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,
}

fn init_tracing(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_env("OCRE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    match &args.log_file {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("ocred.log"));
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_tracing(&args);

    let workdir = args.workdir.clone().unwrap_or_else(workdir::default_workdir);
    std::fs::create_dir_all(&workdir)
        .with_context(|| format!("creating workdir '{}'", workdir.display()))?;

    let pid_path = args.pid_file.clone().unwrap_or_else(|| env::default_pid_path(&workdir));
    let _pid_file = PidFile::acquire(&pid_path)
        .with_context(|| format!("acquiring pid file '{}'", pid_path.display()))?;

    let library = Ocre::initialize(OcreConfig {
        default_workdir: Some(workdir.clone()),
        ..Default::default()
    })
    .map_err(|e| anyhow::anyhow!("library initialization failed: {e}"))?;

    let context = match library.create_context(Some(&workdir)) {
        Ok(context) => context,
        Err(e) => {
            library.deinitialize();
            return Err(anyhow::anyhow!("context creation failed: {e}"));
        }
    };

    let socket_path = args.listen.clone().unwrap_or_else(|| env::default_socket_path(&workdir));
    // A previous unclean shutdown may have left the socket file behind; the
    // pid lock already proved no daemon is using it.
    let _ = std::fs::remove_file(&socket_path);
    let unix = UnixListener::bind(&socket_path)
        .with_context(|| format!("binding '{}'", socket_path.display()))?;

    info!(
        socket = %socket_path.display(),
        workdir = %workdir.display(),
        version = env::PROTOCOL_VERSION,
        "ocred listening"
    );

    let shutdown = Arc::new(Notify::new());
    let listener = Listener::new(unix, Arc::new(ListenCtx {
        context,
        shutdown: Arc::clone(&shutdown),
    }));

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = listener.run() => {
            info!("shutdown requested over the wire");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT received");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received");
        }
    }

    let _ = std::fs::remove_file(&socket_path);
    library.deinitialize();
    info!("ocred stopped");
    Ok(())
}
