//! Colored stage output for the build pipeline.
//!
//! Everything user-facing goes through one manager so the `--quiet` flag
//! and color handling live in a single place. Detailed tool output stays
//! on the `log` facade; these messages are the step's own narration.

use std::io::Write;

use termcolor::{Buffer, BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

/// Writes pipeline narration to the terminal, honoring `--quiet`.
#[derive(Debug)]
pub struct OutputManager {
    stdout: BufferWriter,
    quiet: bool,
}

impl OutputManager {
    /// Manager for the process's stdout, suppressed when `quiet` is set
    pub fn new(quiet: bool) -> Self {
        Self {
            stdout: BufferWriter::stdout(ColorChoice::Auto),
            quiet,
        }
    }

    /// Informational progress line
    pub fn info(&self, message: &str) -> std::io::Result<()> {
        self.stamped(Color::Cyan, false, "ℹ", message)
    }

    /// Stage completion line
    pub fn success(&self, message: &str) -> std::io::Result<()> {
        self.stamped(Color::Green, true, "✓", message)
    }

    /// Non-fatal problem the run continues past
    pub fn warn(&self, message: &str) -> std::io::Result<()> {
        self.stamped(Color::Yellow, true, "⚠", message)
    }

    /// Line announcing work that is about to start
    pub fn progress(&self, message: &str) -> std::io::Result<()> {
        self.stamped(Color::Magenta, false, "⋯", message)
    }

    /// Header separating the pipeline stages
    pub fn section(&self, title: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut buffer = self.stdout.buffer();
        let _ = writeln!(&mut buffer);
        let _ = buffer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
        let _ = writeln!(&mut buffer, "═══ {title} ═══");
        let _ = buffer.reset();
        self.stdout.print(&buffer)
    }

    /// Indented sub-item under the previous line
    pub fn indent(&self, message: &str) -> std::io::Result<()> {
        self.plain(&format!("    {message}"))
    }

    /// Unadorned line, still suppressed by `--quiet`
    pub fn println(&self, message: &str) -> std::io::Result<()> {
        self.plain(message)
    }

    /// Fatal error to stderr, shown even under `--quiet`
    pub fn error(&self, message: &str) {
        let stderr = BufferWriter::stderr(ColorChoice::Auto);
        let mut buffer = stderr.buffer();
        stamp(&mut buffer, Color::Red, true, "✗", message);
        if stderr.print(&buffer).is_err() {
            // stderr is gone, stdout is the last place left
            println!("✗ {message}");
        }
    }

    fn stamped(&self, color: Color, bold: bool, glyph: &str, message: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut buffer = self.stdout.buffer();
        stamp(&mut buffer, color, bold, glyph, message);
        self.stdout.print(&buffer)
    }

    fn plain(&self, message: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut buffer = self.stdout.buffer();
        let _ = writeln!(&mut buffer, "{message}");
        self.stdout.print(&buffer)
    }
}

fn stamp(buffer: &mut Buffer, color: Color, bold: bool, glyph: &str, message: &str) {
    let _ = buffer.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(bold));
    let _ = write!(buffer, "{glyph}");
    let _ = buffer.reset();
    let _ = writeln!(buffer, " {message}");
}
