use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::debug;

/// Where the monitor reads log lines from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    /// Follow the stdout of a command (`dmesg --follow` by default)
    Command(Vec<String>),
    /// Replay a captured log file
    File(PathBuf),
}

impl LogSource {
    /// Split a command line on whitespace
    pub fn command(command_line: &str) -> Result<Self> {
        let argv: Vec<String> = command_line.split_whitespace().map(str::to_string).collect();
        if argv.is_empty() {
            return Err(anyhow!("Log source command cannot be empty"));
        }
        Ok(LogSource::Command(argv))
    }
}

impl std::fmt::Display for LogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogSource::Command(argv) => write!(f, "`{}`", argv.join(" ")),
            LogSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Line stream produced by a child process
///
/// The child is killed and reaped when this is dropped, whichever way the
/// monitor exits.
pub struct CommandStream {
    child: Child,
    reader: BufReader<ChildStdout>,
}

impl CommandStream {
    pub fn spawn(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("Log source command cannot be empty"))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to start log source `{}`", argv.join(" ")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Log source `{}` has no stdout", program))?;
        debug!("Started log source `{}` (pid {})", argv.join(" "), child.id());

        Ok(Self {
            child,
            reader: BufReader::new(stdout),
        })
    }
}

impl Drop for CommandStream {
    fn drop(&mut self) {
        // Fails harmlessly when the child already exited.
        let _ = self.child.kill();
        match self.child.wait() {
            Ok(status) => debug!("Log source exited: {}", status),
            Err(e) => debug!("Failed to reap log source: {}", e),
        }
    }
}

/// An opened [`LogSource`]
pub enum LogInput {
    Command(CommandStream),
    File(BufReader<File>),
}

impl LogInput {
    pub fn open(source: &LogSource) -> Result<Self> {
        match source {
            LogSource::Command(argv) => Ok(LogInput::Command(CommandStream::spawn(argv)?)),
            LogSource::File(path) => Ok(LogInput::File(open_file(path)?)),
        }
    }
}

fn open_file(path: &Path) -> Result<BufReader<File>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open log file {}", path.display()))?;
    Ok(BufReader::new(file))
}

impl Read for LogInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            LogInput::Command(stream) => stream.reader.read(buf),
            LogInput::File(reader) => reader.read(buf),
        }
    }
}

impl BufRead for LogInput {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            LogInput::Command(stream) => stream.reader.fill_buf(),
            LogInput::File(reader) => reader.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            LogInput::Command(stream) => stream.reader.consume(amt),
            LogInput::File(reader) => reader.consume(amt),
        }
    }
}
