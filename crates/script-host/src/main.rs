use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use resilient_alloc::ResilientAllocator;
use script_host::{EXIT_FATAL, HostConfig, Reactor, config, lifecycle, log};
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

/// Every allocation of the process, tokio's and Lua's alike, goes through here.
#[global_allocator]
static ALLOCATOR: ResilientAllocator = ResilientAllocator::system();

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

#[derive(Parser)]
#[command(name = "script-host", version)]
struct Cli {
    /// Deployment directory containing script/, lualib/ and luaclib/
    #[arg(short = 'C', long, env = "SCRIPT_HOST_DIR")]
    dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    // stderr is unbuffered, so lines logged right before an immediate exit survive.
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();

    if let Err(e) = config::enter_workdir(cli.dir.as_deref()) {
        error!("cannot enter deployment directory: {e}");
        return ExitCode::from(EXIT_FATAL);
    }

    let mut reactor = match Reactor::new() {
        Ok(reactor) => reactor,
        Err(e) => {
            error!("cannot start reactor: {e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };
    reactor.set_error_callback(log::reactor_error);

    let config = HostConfig::default();
    match reactor.block_on(lifecycle::run(&config, reactor.error_callback())) {
        Ok(never) => match never {},
        Err(e) => {
            error!("{e}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
