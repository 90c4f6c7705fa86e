//! Logger setup: `<timestamp> [<thread, 12 wide>] [<LEVEL, 5 wide>]  <message>` on stderr,
//! optionally mirrored into a log file

use env_logger::{Builder, Env, Target};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Writes every line to stderr and to a file
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// One log line; thread name cut or padded to 12 columns, level to 5
fn format_line(timestamp: &str, thread: &str, level: log::Level, message: &std::fmt::Arguments<'_>) -> String {
    format!("{} [{:<12.12}] [{:<5.5}]  {}", timestamp, thread, level, message)
}

fn builder() -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        let thread = std::thread::current();
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        writeln!(
            buf,
            "{}",
            format_line(&timestamp, thread.name().unwrap_or("unnamed"), record.level(), record.args())
        )
    });
    builder
}

/// Initialise logging; with `log_file` every record is appended there as well.
///
/// Safe to call more than once, later calls are ignored.
pub fn init(log_file: Option<&Path>) -> io::Result<()> {
    let mut builder = builder();
    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(TeeWriter { file })));
    }
    if builder.try_init().is_err() {
        log::debug!("Logger already initialised");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_are_fixed_width() {
        let line = format_line("2017-03-01 10:00:00.000", "MainThread", log::Level::Info, &format_args!("Clip done"));
        assert_eq!(line, "2017-03-01 10:00:00.000 [MainThread  ] [INFO ]  Clip done");

        let line = format_line("t", "rayon-worker-thread-11", log::Level::Debug, &format_args!("x"));
        assert_eq!(line, "t [rayon-worker] [DEBUG]  x");
    }
}
