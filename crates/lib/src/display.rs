//! Display collaborator: what a front-end must provide for a chat turn to render into.
//!
//! The splitter and the history renderer only talk to these traits. The CLI implements
//! them over the terminal, the desktop app over a channel to the egui thread, and
//! [`RecordingDisplay`] records calls as [`DisplayEvent`]s.

use std::cell::RefCell;
use std::rc::Rc;

use crate::session::Role;

/// Handle to a region that can be re-rendered in place.
pub trait UpdateTarget {
    /// Replace the region's content with `text`.
    fn render(&mut self, text: &str);
}

pub trait ChatDisplay {
    type Target: UpdateTarget;

    /// Start a new message block authored by `role`.
    fn begin_message(&mut self, role: Role);

    fn render_markdown(&mut self, text: &str);

    /// Create an empty region that is placed after everything rendered so far.
    fn create_update_target(&mut self) -> Self::Target;

    /// Show or update the progress indicator of the current message.
    fn show_progress(&mut self, label: &str, complete: bool);

    /// A region showing `label`, collapsed by default, that expands to `body`.
    fn show_collapsible(&mut self, label: &str, body: &str);
}

/// One call made on a display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    BeginMessage(Role),
    Markdown(String),
    Progress { label: String, complete: bool },
    /// Targets are numbered from 0 in creation order.
    TargetCreated(usize),
    Update { target: usize, text: String },
    Collapsible { label: String, body: String },
}

/// Display that records every call in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingDisplay {
    events: Rc<RefCell<Vec<DisplayEvent>>>,
    next_target: usize,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events.borrow().clone()
    }

    /// Last text rendered into `target`, if any.
    pub fn last_update(&self, target: usize) -> Option<String> {
        self.events.borrow().iter().rev().find_map(|e| match e {
            DisplayEvent::Update { target: t, text } if *t == target => Some(text.clone()),
            _ => None,
        })
    }

    /// Number of updates rendered into `target`.
    pub fn update_count(&self, target: usize) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, DisplayEvent::Update { target: t, .. } if *t == target))
            .count()
    }

    fn push(&self, event: DisplayEvent) {
        self.events.borrow_mut().push(event);
    }
}

pub struct RecordingTarget {
    id: usize,
    events: Rc<RefCell<Vec<DisplayEvent>>>,
}

impl UpdateTarget for RecordingTarget {
    fn render(&mut self, text: &str) {
        self.events.borrow_mut().push(DisplayEvent::Update {
            target: self.id,
            text: text.to_string(),
        });
    }
}

impl ChatDisplay for RecordingDisplay {
    type Target = RecordingTarget;

    fn begin_message(&mut self, role: Role) {
        self.push(DisplayEvent::BeginMessage(role));
    }

    fn render_markdown(&mut self, text: &str) {
        self.push(DisplayEvent::Markdown(text.to_string()));
    }

    fn create_update_target(&mut self) -> Self::Target {
        let id = self.next_target;
        self.next_target += 1;
        self.push(DisplayEvent::TargetCreated(id));
        RecordingTarget {
            id,
            events: Rc::clone(&self.events),
        }
    }

    fn show_progress(&mut self, label: &str, complete: bool) {
        self.push(DisplayEvent::Progress {
            label: label.to_string(),
            complete,
        });
    }

    fn show_collapsible(&mut self, label: &str, body: &str) {
        self.push(DisplayEvent::Collapsible {
            label: label.to_string(),
            body: body.to_string(),
        });
    }
}
