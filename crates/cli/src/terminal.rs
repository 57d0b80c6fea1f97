//! Terminal implementation of the chat display.
//!
//! Update targets append when the new text extends what is already on screen and
//! otherwise redraw their region in place. Thinking text lives inside the progress
//! indicator and is hidden unless `show_thinking` is set. The answer streams as raw text
//! and is redrawn as markdown once the turn finishes.

use std::cell::RefCell;
use std::io::{IsTerminal, Write};
use std::rc::Rc;

use crossterm::cursor::{MoveToColumn, MoveUp};
use crossterm::style::Stylize;
use crossterm::terminal::{self, Clear, ClearType};
use lib::display::{ChatDisplay, UpdateTarget};
use lib::session::Role;

use crate::markdown;

/// Cursor bookkeeping shared between the display and its targets.
#[derive(Debug)]
struct Screen {
    at_line_start: bool,
    tty: bool,
    /// Raw text of the answer target when it is the last thing on screen.
    answer: Option<String>,
}

impl Screen {
    fn write(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        let mut out = std::io::stdout();
        let _ = out.write_all(s.as_bytes());
        let _ = out.flush();
        self.at_line_start = s.ends_with('\n');
        self.answer = None;
    }

    /// Replace `previous`, printed from column 0 and ending at the cursor, with `text`.
    /// Returns false when `previous` no longer fits on screen and was left alone.
    fn redraw(&mut self, previous: &str, text: &str) -> bool {
        let (width, height) = terminal::size().unwrap_or((80, 24));
        let rows = rows_for(previous, width);
        if rows > usize::from(height) {
            return false;
        }
        let mut out = std::io::stdout();
        if rows > 1 {
            let _ = crossterm::execute!(out, MoveUp((rows - 1) as u16));
        }
        let _ = crossterm::execute!(out, MoveToColumn(0), Clear(ClearType::FromCursorDown));
        self.at_line_start = true;
        self.write(text);
        true
    }

    fn ensure_line_start(&mut self) {
        if !self.at_line_start {
            self.write("\n");
        }
    }
}

pub struct TerminalDisplay {
    screen: Rc<RefCell<Screen>>,
    show_thinking: bool,
    echo_user: bool,
    role: Option<Role>,
    /// Set by `show_progress(.., false)`: the next target holds thinking text.
    thinking_pending: bool,
}

impl TerminalDisplay {
    /// `echo_user`: print user messages (off for interactive chat, where the user just typed it).
    pub fn new(show_thinking: bool, echo_user: bool) -> Self {
        Self {
            screen: Rc::new(RefCell::new(Screen {
                at_line_start: true,
                tty: std::io::stdout().is_terminal(),
                answer: None,
            })),
            show_thinking,
            echo_user,
            role: None,
            thinking_pending: false,
        }
    }

    /// End the turn's output: redraw a streamed answer as markdown and move to a fresh line.
    pub fn finish_line(&mut self) {
        self.thinking_pending = false;
        let mut screen = self.screen.borrow_mut();
        if let Some(answer) = screen.answer.take() {
            if screen.tty {
                let formatted = markdown::render(&answer);
                if formatted != answer {
                    screen.redraw(&answer, &formatted);
                }
            }
        }
        screen.ensure_line_start();
    }

    /// A reply whose stream ended before `</think>` is all thinking. When thinking is
    /// hidden, print it as the answer. Returns whether anything was printed.
    pub fn show_unclosed_reply(&mut self, thinking: &str) -> bool {
        self.thinking_pending = false;
        let text = thinking.trim();
        if self.show_thinking || text.is_empty() {
            return false;
        }
        self.render_markdown(text);
        true
    }

    fn hides_user_text(&self) -> bool {
        self.role == Some(Role::User) && !self.echo_user
    }
}

impl ChatDisplay for TerminalDisplay {
    type Target = TerminalTarget;

    fn begin_message(&mut self, role: Role) {
        self.role = Some(role);
        self.thinking_pending = false;
        if self.hides_user_text() {
            return;
        }
        let header = match role {
            Role::User => "you".bold().cyan().to_string(),
            Role::Assistant => "assistant".bold().green().to_string(),
            Role::System => "system".bold().dark_grey().to_string(),
        };
        let mut screen = self.screen.borrow_mut();
        screen.ensure_line_start();
        screen.write(&format!("{}\n", header));
    }

    fn render_markdown(&mut self, text: &str) {
        if self.hides_user_text() {
            return;
        }
        let mut screen = self.screen.borrow_mut();
        let rendered = if screen.tty {
            markdown::render(text)
        } else {
            markdown::render_plain(text)
        };
        screen.ensure_line_start();
        screen.write(&format!("{}\n", rendered));
    }

    fn create_update_target(&mut self) -> Self::Target {
        let thinking = std::mem::take(&mut self.thinking_pending);
        TerminalTarget {
            screen: Rc::clone(&self.screen),
            visible: !thinking || self.show_thinking,
            dim: thinking,
            shown: String::new(),
        }
    }

    fn show_progress(&mut self, label: &str, complete: bool) {
        let mut screen = self.screen.borrow_mut();
        screen.ensure_line_start();
        if complete {
            screen.write(&format!("{} {}\n", "✔".green(), label.dark_grey()));
        } else {
            screen.write(&format!("{} {}\n", "…".dark_grey(), label.dark_grey()));
        }
        self.thinking_pending = !complete;
    }

    fn show_collapsible(&mut self, label: &str, body: &str) {
        let mut screen = self.screen.borrow_mut();
        screen.ensure_line_start();
        screen.write(&format!("{} {}\n", "▸".dark_grey(), label.dark_grey()));
        if self.show_thinking {
            let trimmed = body.trim_matches('\n');
            for line in trimmed.lines() {
                screen.write(&format!("  {} {}\n", "│".dark_grey(), line.dim()));
            }
        }
    }
}

/// A region of terminal output that can be re-rendered.
pub struct TerminalTarget {
    screen: Rc<RefCell<Screen>>,
    visible: bool,
    dim: bool,
    shown: String,
}

impl TerminalTarget {
    fn styled(&self, s: &str) -> String {
        if self.dim {
            s.dim().to_string()
        } else {
            s.to_string()
        }
    }
}

impl UpdateTarget for TerminalTarget {
    fn render(&mut self, text: &str) {
        if !self.visible || text == self.shown {
            return;
        }
        let mut screen = self.screen.borrow_mut();
        if self.shown.is_empty() {
            screen.ensure_line_start();
        }
        if let Some(suffix) = text.strip_prefix(self.shown.as_str()) {
            let s = self.styled(suffix);
            screen.write(&s);
        } else {
            let s = self.styled(text);
            if !(screen.tty && screen.redraw(&self.shown, &s)) {
                screen.ensure_line_start();
                screen.write(&s);
            }
        }
        self.shown = text.to_string();
        if !self.dim {
            screen.answer = Some(text.to_string());
        }
    }
}

/// Terminal rows `text` occupies when printed from column 0 at the given width.
fn rows_for(text: &str, width: u16) -> usize {
    let width = usize::from(width.max(1));
    text.split('\n')
        .map(|line| line.chars().count().div_ceil(width).max(1))
        .sum()
}
