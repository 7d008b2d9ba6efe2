//! Tracing subscriber setup for GSLAS services.
//!
//! Configured from the environment:
//!
//! * `LOG_LEVEL` - default filter when `RUST_LOG` is unset (`info`)
//! * `LOG_OUTPUT` - `console`, `file` or `both` (`console`)
//! * `LOG_FORMAT` - `human` or `json` (`human`)
//! * `LOG_FILE_PATH` - log file, rotated daily (`~/.gslas/logs/gslas.log`)

use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, registry, EnvFilter};

/// Crates that log every query or connection at `info`.
const QUIET_TARGETS: &str = "sqlx=warn,hyper=warn,tokio=warn";

// --- Custom "Tee" Writer ---
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A, B> Write for Tee<A, B>
where
    A: Write,
    B: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write(buf);
        let res_b = self.b.write(buf);
        res_a.or(res_b)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B, W1, W2> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a, Writer = W1>,
    B: MakeWriter<'a, Writer = W2>,
    W1: Write + 'a,
    W2: Write + 'a,
{
    type Writer = Tee<W1, W2>;
    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
}

impl LogOutput {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "file" => Self::File,
            "both" => Self::Both,
            _ => Self::Console,
        }
    }

    fn console(self) -> bool {
        matches!(self, Self::Console | Self::Both)
    }

    fn file(self) -> bool {
        matches!(self, Self::File | Self::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub output: LogOutput,
    pub format: LogFormat,
    pub file_path: PathBuf,
}

fn default_log_path() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".gslas")
        .join("logs")
        .join("gslas.log")
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup; unknown values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Human,
        };

        Self {
            level: lookup("LOG_LEVEL")
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| "info".to_string()),
            output: lookup("LOG_OUTPUT")
                .map(|o| LogOutput::parse(&o))
                .unwrap_or(LogOutput::Console),
            format,
            file_path: lookup("LOG_FILE_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_log_path),
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{},{}", self.level, QUIET_TARGETS)))
    }
}

/// Initializes the global tracing subscriber based on environment variables.
///
/// The returned guard flushes file output when dropped; keep it alive for the
/// lifetime of the process.
pub fn init_subscriber() -> Option<WorkerGuard> {
    init_with(&LogSettings::from_env())
}

pub fn init_with(settings: &LogSettings) -> Option<WorkerGuard> {
    let subscriber = registry().with(settings.filter());
    let is_json = settings.format == LogFormat::Json;

    let log_dir = settings
        .file_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let log_filename = settings
        .file_path
        .file_name()
        .unwrap_or("gslas.log".as_ref());

    if settings.output.file() {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!("Cannot create log directory {}: {}", log_dir.display(), e);
        }
    }

    match (settings.output.console(), settings.output.file()) {
        (true, true) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let tee_writer = MakeTee {
                make_a: std::io::stdout,
                make_b: non_blocking,
            };

            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(tee_writer);
            if is_json {
                subscriber.with(fmt_layer.json()).init();
            } else {
                subscriber.with(fmt_layer).init();
            }
            Some(guard)
        }
        (false, true) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            if is_json {
                subscriber.with(fmt_layer.json()).init();
            } else {
                subscriber.with(fmt_layer).init();
            }
            Some(guard)
        }
        _ => {
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);
            if is_json {
                subscriber.with(fmt_layer.json()).init();
            } else {
                subscriber.with(fmt_layer).init();
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]);
        assert_eq!(s.level, "info");
        assert_eq!(s.output, LogOutput::Console);
        assert_eq!(s.format, LogFormat::Human);
        assert!(s.file_path.ends_with(".gslas/logs/gslas.log"));
    }

    #[test]
    fn test_values_from_environment() {
        let s = settings(&[
            ("LOG_LEVEL", "debug"),
            ("LOG_OUTPUT", "Both"),
            ("LOG_FORMAT", "JSON"),
            ("LOG_FILE_PATH", "/var/log/gslas/api.log"),
        ]);
        assert_eq!(s.level, "debug");
        assert_eq!(s.output, LogOutput::Both);
        assert_eq!(s.format, LogFormat::Json);
        assert_eq!(s.file_path, PathBuf::from("/var/log/gslas/api.log"));
    }

    #[test]
    fn test_unknown_output_falls_back_to_console() {
        let s = settings(&[("LOG_OUTPUT", "syslog")]);
        assert!(s.output.console());
        assert!(!s.output.file());
    }

    #[test]
    fn test_tee_writes_both() {
        let mut tee = Tee {
            a: Vec::new(),
            b: Vec::new(),
        };
        tee.write_all(b"allocation run").unwrap();
        assert_eq!(tee.a, b"allocation run");
        assert_eq!(tee.b, b"allocation run");
    }
}
