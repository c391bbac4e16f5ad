//! Decoded text and turn printer

use std::io::{self, Write};

use log::debug;

use cwrx::{CwEventType, CwReceiver, CwReceiverEvent};

use crate::cli::Args;

/// Full-scale value of an `i16` sample
const FULL_SCALE: f32 = 32768.0;

/// Run the application
///
/// Runs the `cwdec` receiver with the given command-line `args`,
/// a fully-initialized `receiver`, and an `input` iterator which
/// returns each `i16` sample from some input source until it is
/// exhausted. Decoded text is written to `out` as it arrives.
/// With `--turns`, each conversation turn is written on its own
/// line when it closes.
///
/// Once the input is exhausted, the receiver is flushed.
pub fn run<I, W>(args: &Args, receiver: &mut CwReceiver, input: I, out: &mut W) -> io::Result<()>
where
    I: Iterator<Item = i16>,
    W: Write,
{
    let mut printer = Printer::new(args, out);

    for evt in receiver.iter(input.map(|sa| sa as f32 / FULL_SCALE)) {
        printer.print(&evt)?;
    }

    for evt in receiver.flush() {
        printer.print(&evt)?;
    }

    printer.finish()
}

// writes events, keeping track of the cursor
struct Printer<'o, W> {
    out: &'o mut W,
    quiet: bool,
    turns: bool,
    line_open: bool,
}

impl<'o, W> Printer<'o, W>
where
    W: Write,
{
    fn new(args: &Args, out: &'o mut W) -> Self {
        Self {
            out,
            quiet: args.quiet,
            turns: args.turns,
            line_open: false,
        }
    }

    fn print(&mut self, evt: &CwReceiverEvent) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        match evt.what() {
            CwEventType::Decoded(text) if text.is_text() => {
                write!(self.out, "{}", text)?;
                self.line_open = true;
                self.out.flush()
            }
            CwEventType::Turn(turn) if self.turns => {
                self.end_line()?;
                writeln!(self.out, "{}", turn)?;
                self.out.flush()
            }
            CwEventType::Signal(_) => {
                debug!("{}", evt);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.line_open {
            writeln!(self.out)?;
            self.line_open = false;
        }
        Ok(())
    }

    fn finish(mut self) -> io::Result<()> {
        self.end_line()?;
        self.out.flush()
    }
}
