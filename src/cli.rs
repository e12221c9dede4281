//! Command-line interface for qkernel.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// A subcommand and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a kernel in the background.
    Start { kernel: Option<String> },
    /// Stop the running kernel.
    Stop,
    /// Stop, then start fresh.
    Restart { kernel: Option<String> },
    /// Show the running kernel.
    Status,
    /// Execute cells from a document.
    Run(RunArgs),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stop => "stop",
            Self::Restart { .. } => "restart",
            Self::Status => "status",
            Self::Run(_) => "run",
        }
    }
}

/// Arguments of `qkernel run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    /// Document to execute.
    pub file: PathBuf,
    /// Comma-separated indices or labels.
    pub cells: Option<String>,
    /// Per-message timeout in seconds.
    pub timeout: Option<u64>,
    /// Kernel to start when none is running.
    pub kernel: Option<String>,
}

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Subcommand to run.
    pub command: Option<Command>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    let mut subcommand: Option<String> = None;
    let mut file: Option<PathBuf> = None;
    let mut kernel: Option<String> = None;
    let mut cells: Option<String> = None;
    let mut timeout: Option<u64> = None;

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Short('k') | Long("kernel") => {
                kernel = Some(parser.value()?.parse()?);
            }
            Short('c') | Long("cells") => {
                cells = Some(parser.value()?.parse()?);
            }
            Short('t') | Long("timeout") => {
                let value: String = parser.value()?.parse()?;
                timeout = Some(
                    value
                        .parse()
                        .ok()
                        .filter(|secs| *secs > 0)
                        .ok_or(ArgsError::InvalidValue("timeout", value))?,
                );
            }
            Value(val) if subcommand.is_none() => {
                subcommand = Some(val.string()?);
            }
            Value(val) if subcommand.as_deref() == Some("run") && file.is_none() => {
                file = Some(PathBuf::from(val));
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    if result.help || result.version {
        return Ok(result);
    }

    let command = match subcommand.as_deref() {
        None => return Err(ArgsError::MissingCommand),
        Some("start") => Command::Start { kernel: kernel.take() },
        Some("stop") => Command::Stop,
        Some("restart") => Command::Restart { kernel: kernel.take() },
        Some("status") => Command::Status,
        Some("run") => Command::Run(RunArgs {
            file: file.ok_or(ArgsError::MissingArgument("FILE"))?,
            cells: cells.take(),
            timeout: timeout.take(),
            kernel: kernel.take(),
        }),
        Some(other) => return Err(ArgsError::UnknownCommand(other.to_string())),
    };

    // Options left over were given to a subcommand that does not take them.
    let leftover = [
        kernel.map(|_| "--kernel"),
        cells.map(|_| "--cells"),
        timeout.map(|_| "--timeout"),
    ];
    if let Some(option) = leftover.into_iter().flatten().next() {
        return Err(ArgsError::OptionNotAllowed {
            option,
            command: command.name(),
        });
    }

    result.command = Some(command);
    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"qkernel {version}
Execute Quarto cells through a persistent Jupyter kernel

USAGE:
    qkernel [OPTIONS] <COMMAND>

COMMANDS:
    start [-k KERNEL]       Start a kernel session in the background
    stop                    Stop the current kernel session
    restart [-k KERNEL]     Stop the current kernel (if any) and start fresh
    status                  Show whether a kernel is running
    run FILE [OPTIONS]      Run cells from a .qmd file

RUN OPTIONS:
    -c, --cells <LIST>      Comma-separated cell indices (0-based) or labels
    -t, --timeout <SECS>    Timeout in seconds for each kernel message
    -k, --kernel <NAME>     Kernel to start if none is running [default: python3]

OPTIONS:
        --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    QKERNEL_KERNEL          Kernel name (overrides config)
    QKERNEL_TIMEOUT         Per-message timeout in seconds (overrides config)
    QKERNEL_STATE_DIR       Session state directory
    QKERNEL_CACHE_DIR       Output cache directory
    QKERNEL_LOG_LEVEL       Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # Keep a kernel alive between runs
    qkernel start

    # Run every cell, then only some by index or label
    qkernel run notebook.qmd
    qkernel run notebook.qmd --cells 0,setup,2

    # Give slow cells ten minutes
    qkernel run notebook.qmd --timeout 600
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("qkernel {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
    /// No subcommand given.
    MissingCommand,
    /// Subcommand not recognised.
    UnknownCommand(String),
    /// Required positional argument absent.
    MissingArgument(&'static str),
    /// Option given to a subcommand that does not accept it.
    OptionNotAllowed {
        option: &'static str,
        command: &'static str,
    },
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
            Self::MissingCommand => write!(f, "missing command"),
            Self::UnknownCommand(name) => write!(f, "unknown command: '{}'", name),
            Self::MissingArgument(name) => write!(f, "missing required argument {}", name),
            Self::OptionNotAllowed { option, command } => {
                write!(f, "'{}' does not accept {}", command, option)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<OsString> {
        std::iter::once("qkernel")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn test_simple_commands() {
        let result = parse_args_from(args(&["stop"])).unwrap();
        assert_eq!(result.command, Some(Command::Stop));

        let result = parse_args_from(args(&["status"])).unwrap();
        assert_eq!(result.command, Some(Command::Status));
    }

    #[test]
    fn test_start_with_kernel() {
        let result = parse_args_from(args(&["start", "-k", "ir"])).unwrap();
        assert_eq!(
            result.command,
            Some(Command::Start {
                kernel: Some("ir".into())
            })
        );

        let result = parse_args_from(args(&["restart", "--kernel", "julia"])).unwrap();
        assert_eq!(
            result.command,
            Some(Command::Restart {
                kernel: Some("julia".into())
            })
        );
    }

    #[test]
    fn test_run_full() {
        let result =
            parse_args_from(args(&["run", "doc.qmd", "-c", "0,setup", "-t", "60", "-k", "python3"]))
                .unwrap();
        assert_eq!(
            result.command,
            Some(Command::Run(RunArgs {
                file: PathBuf::from("doc.qmd"),
                cells: Some("0,setup".into()),
                timeout: Some(60),
                kernel: Some("python3".into()),
            }))
        );
    }

    #[test]
    fn test_options_before_file() {
        let result = parse_args_from(args(&["run", "--cells", "plot", "doc.qmd"])).unwrap();
        match result.command {
            Some(Command::Run(run)) => {
                assert_eq!(run.file, PathBuf::from("doc.qmd"));
                assert_eq!(run.cells.as_deref(), Some("plot"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_global_options() {
        let result =
            parse_args_from(args(&["--config", "/etc/qkernel.json", "-l", "debug", "status"])).unwrap();
        assert_eq!(result.config, Some(PathBuf::from("/etc/qkernel.json")));
        assert_eq!(result.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_run_requires_file() {
        let err = parse_args_from(args(&["run"])).unwrap_err();
        assert!(matches!(err, ArgsError::MissingArgument("FILE")));
    }

    #[test]
    fn test_missing_and_unknown_command() {
        assert!(matches!(
            parse_args_from(args(&[])).unwrap_err(),
            ArgsError::MissingCommand
        ));
        assert!(matches!(
            parse_args_from(args(&["launch"])).unwrap_err(),
            ArgsError::UnknownCommand(_)
        ));
    }

    #[test]
    fn test_option_not_allowed() {
        let err = parse_args_from(args(&["stop", "-k", "python3"])).unwrap_err();
        assert_eq!(err.to_string(), "'stop' does not accept --kernel");

        let err = parse_args_from(args(&["start", "-c", "0"])).unwrap_err();
        assert!(matches!(
            err,
            ArgsError::OptionNotAllowed {
                option: "--cells",
                command: "start"
            }
        ));
    }

    #[test]
    fn test_invalid_timeout() {
        assert!(parse_args_from(args(&["run", "doc.qmd", "-t", "soon"])).is_err());
        assert!(parse_args_from(args(&["run", "doc.qmd", "-t", "0"])).is_err());
    }

    #[test]
    fn test_extra_positional() {
        let err = parse_args_from(args(&["run", "a.qmd", "b.qmd"])).unwrap_err();
        assert!(matches!(err, ArgsError::UnexpectedArgument(_)));

        let err = parse_args_from(args(&["status", "now"])).unwrap_err();
        assert!(matches!(err, ArgsError::UnexpectedArgument(_)));
    }

    #[test]
    fn test_help_and_version_need_no_command() {
        let result = parse_args_from(args(&["-h"])).unwrap();
        assert!(result.help);
        assert!(result.command.is_none());

        let result = parse_args_from(args(&["run", "--help"])).unwrap();
        assert!(result.help);

        let result = parse_args_from(args(&["--version"])).unwrap();
        assert!(result.version);
    }

    #[test]
    fn test_unknown_option() {
        assert!(matches!(
            parse_args_from(args(&["status", "--verbose"])).unwrap_err(),
            ArgsError::Lexopt(_)
        ));
    }
}
