//! Interactive questions asked during provider resolution and deep-link
//! confirmation.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use crate::error::PromptError;

pub trait Prompter: Send + Sync {
    /// Returns the index of the chosen entry.
    fn select(&self, message: &str, choices: &[String]) -> Result<usize, PromptError>;

    fn confirm(&self, message: &str) -> Result<bool, PromptError>;

    fn input(&self, message: &str) -> Result<String, PromptError>;

    /// Shows an artifact the user acts on: a code, a link.
    fn show(&self, text: &str) -> Result<(), PromptError>;
}

/// Line-oriented prompter over any reader/writer pair.
pub struct LinePrompter<R, W> {
    io: Mutex<(R, W)>,
}

/// Prompter bound to the process terminal.
pub type TerminalPrompter = LinePrompter<io::BufReader<io::Stdin>, io::Stdout>;

impl TerminalPrompter {
    #[must_use]
    pub fn terminal() -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub const fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    fn ask(&self, question: &str) -> Result<String, PromptError> {
        let mut guard = self
            .io
            .lock()
            .map_err(|_| PromptError::Io(io::Error::other("prompt lock poisoned")))?;
        let (reader, writer) = &mut *guard;

        write!(writer, "{question}")?;
        writer.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(PromptError::Closed);
        }
        Ok(line.trim().to_string())
    }

    fn say(&self, text: &str) -> Result<(), PromptError> {
        let mut guard = self
            .io
            .lock()
            .map_err(|_| PromptError::Io(io::Error::other("prompt lock poisoned")))?;
        writeln!(guard.1, "{text}")?;
        Ok(())
    }
}

impl<R, W> Prompter for LinePrompter<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn select(&self, message: &str, choices: &[String]) -> Result<usize, PromptError> {
        if choices.is_empty() {
            return Err(PromptError::NoChoices(message.to_string()));
        }

        let mut menu = message.to_string();
        for (index, choice) in choices.iter().enumerate() {
            menu.push_str(&format!("\n  {}) {choice}", index + 1));
        }
        self.say(&menu)?;

        loop {
            let answer = self.ask(&format!("choose 1-{}: ", choices.len()))?;
            match answer.parse::<usize>() {
                Ok(n) if (1..=choices.len()).contains(&n) => return Ok(n - 1),
                _ => {
                    if let Some(index) = choices
                        .iter()
                        .position(|choice| choice.eq_ignore_ascii_case(&answer))
                    {
                        return Ok(index);
                    }
                    self.say(&format!("'{answer}' is not one of the choices"))?;
                }
            }
        }
    }

    fn confirm(&self, message: &str) -> Result<bool, PromptError> {
        loop {
            let answer = self.ask(&format!("{message} [y/n]: "))?;
            match answer.to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say("please answer y or n")?,
            }
        }
    }

    fn input(&self, message: &str) -> Result<String, PromptError> {
        self.ask(&format!("{message}: "))
    }

    fn show(&self, text: &str) -> Result<(), PromptError> {
        self.say(text)
    }
}
