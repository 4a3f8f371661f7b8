//! CLI definitions for the run wrapper.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

/// The wrapper has no flags of its own: everything after the script path
/// belongs to the script, `--` and `--help` included.
#[derive(Parser, Debug)]
#[command(name = "usdt-run")]
#[command(about = "Run a script with the USDT bridge installed")]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Script shared library exporting `usdt_script_main`
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Arguments passed to the script
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<OsString>,
}

impl Cli {
    /// Parse `argv`, then take the script arguments verbatim from it.
    ///
    /// clap validates the script path but consumes a literal `--`, so the
    /// trailing values are re-read from the raw argument vector.
    ///
    /// # Errors
    /// Returns clap's usage error when the script path is missing.
    pub fn parse_script_args<I, T>(argv: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
        let mut cli = Self::try_parse_from(&argv)?;

        let mut rest = argv.get(1..).unwrap_or_default();
        if rest.first().is_some_and(|arg| arg == "--") {
            rest = &rest[1..];
        }
        cli.args = rest.get(1..).map(<[OsString]>::to_vec).unwrap_or_default();
        Ok(cli)
    }
}
