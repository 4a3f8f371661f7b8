//! usdt-run: execute a script with the USDT bridge installed.

mod cli;

use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use cli::{Cli, EXIT_FAILURE, EXIT_SUCCESS};
use usdt_bridge::Script;
use usdt_bridge::config::ENV_METRICS;

const DEFAULT_DIRECTIVES: &str = "usdt_bridge=warn,usdt_run=warn";

fn main() {
    let cli = Cli::parse_script_args(std::env::args_os()).unwrap_or_else(|e| e.exit());

    let metrics_handle = if metrics_enabled() {
        usdt_bridge::metrics::CliRecorder::new().install()
    } else {
        None
    };
    usdt_bridge::metrics::init();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let bridge = usdt_bridge::install();
    debug!(state = %bridge.state(), "bridge installed");

    let exit_code = match Script::load(&cli.script).and_then(|script| script.run(&cli.args)) {
        Ok(code) => code,
        Err(e) => {
            error!(path = %cli.script.display(), "{e}");
            EXIT_FAILURE
        }
    };

    bridge.shutdown();
    if let Some(handle) = metrics_handle {
        usdt_bridge::metrics::record_emitter(bridge.stats());
        handle.print_summary();
    }

    debug!(exit_code, success = exit_code == EXIT_SUCCESS, "script finished");
    std::process::exit(exit_code);
}

fn metrics_enabled() -> bool {
    std::env::var_os(ENV_METRICS).is_some_and(|v| !v.is_empty() && v != "0")
}
