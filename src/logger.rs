use std::io::{self, Write};

use clap::builder::styling::AnsiColor;
use env_logger::{fmt::Formatter, WriteStyle};
use log::{Level, LevelFilter, Record};

/// HTTP and TLS crates that only get to log warnings, unless everything is
/// quieter than that.
const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls"];

pub fn init(level: LevelFilter, style: WriteStyle) {
    let mut builder = env_logger::Builder::new();
    builder
        .format(format)
        .filter_level(level)
        .write_style(style);

    for module in NOISY_MODULES {
        builder.filter_module(module, level.min(LevelFilter::Warn));
    }

    builder.init();
}

fn format(f: &mut Formatter, record: &Record) -> io::Result<()> {
    let args = record.args();
    match record.level() {
        level @ (Level::Warn | Level::Error) => {
            let style = f.default_level_style(level);
            let prefix = if level == Level::Warn { "warning" } else { "error" };
            writeln!(f, "{style}{prefix}:{style:#} {args}")
        }
        Level::Trace => {
            let style = AnsiColor::BrightBlack.on_default();
            writeln!(f, "{style}{}:{style:#} {args}", record.target())
        }
        Level::Info | Level::Debug => writeln!(f, "{args}"),
    }
}
