mod args;
mod common;
mod consolidate;
mod init;
mod ls;
mod parse;
mod prompt;
mod storage;
mod upload;


use clap::{
    builder::{styling::AnsiColor, Styles},
    ColorChoice, Parser, Subcommand,
};
use env_logger::WriteStyle;
use log::{error, LevelFilter};
use serde::Serialize;

use crate::{error::Result, logger};

use self::args::{ConsolidateArgs, GlobalArgs, InitArgs, LoggerArgs, LsArgs, UploadArgs};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None, propagate_version = true, styles = cli_styles())]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty repository in a local store
    Init(InitArgs),

    /// Upload files, directories or zip archives to a repository
    Upload(UploadArgs),

    /// Copy files from other repositories into one repository
    Consolidate(ConsolidateArgs),

    /// List the files of a repository
    Ls(LsArgs),
}

impl Command {
    fn global(&self) -> &GlobalArgs {
        match self {
            Command::Init(args) => &args.global,
            Command::Upload(args) => &args.global,
            Command::Consolidate(args) => &args.global,
            Command::Ls(args) => &args.global,
        }
    }
}

pub async fn main() {
    let cli = Cli::parse();
    init_logger(&cli.command.global().logger);

    let result = match cli.command {
        Command::Init(args) => init::main(args).await,
        Command::Upload(args) => upload::main(args).await,
        Command::Consolidate(args) => consolidate::main(args).await,
        Command::Ls(args) => ls::main(args).await,
    };

    if let Err(err) = result {
        error!("{err}");
        std::process::exit(1);
    }
}

fn init_logger(args: &LoggerArgs) {
    let level = log_level_from_args(args.verbose, args.quiet);
    let style = match args.color {
        ColorChoice::Auto => WriteStyle::Auto,
        ColorChoice::Always => WriteStyle::Always,
        ColorChoice::Never => WriteStyle::Never,
    };
    logger::init(level, style);
}

fn log_level_from_args(verbose: u8, quiet: u8) -> LevelFilter {
    let verbosity = i16::from(verbose) - i16::from(quiet);
    match verbosity {
        i16::MIN..=-3 => LevelFilter::Off,
        -2 => LevelFilter::Error,
        -1 => LevelFilter::Warn,
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightMagenta.on_default())
        .usage(AnsiColor::BrightMagenta.on_default())
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightCyan.on_default())
}

fn print_stat<T: ToString>(name: &str, value: T) {
    let style = AnsiColor::BrightWhite.on_default().bold();
    let value = value.to_string();
    println!("{style}{name}:{style:#} {value}");
}

fn print_stats_json<T: Serialize>(stats: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(stats)?;
    println!("{json}");
    Ok(())
}
