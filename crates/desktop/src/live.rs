//! Live turn plumbing: a display that forwards calls from the worker thread to the UI,
//! and the view model the UI folds them into.

use std::collections::HashMap;
use std::sync::mpsc;

use eframe::egui;
use lib::display::{ChatDisplay, DisplayEvent, UpdateTarget};
use lib::session::{Conversation, Role};
use lib::turn::TurnOutcome;

/// Message from the turn worker to the UI thread.
pub enum TurnEvent {
    Display(DisplayEvent),
    /// The worker is done and hands the conversation back.
    Finished {
        conversation: Conversation,
        result: Result<TurnOutcome, String>,
    },
}

/// [`ChatDisplay`] that sends every call to the UI thread and asks egui to repaint.
pub struct ChannelDisplay {
    tx: mpsc::Sender<TurnEvent>,
    ctx: egui::Context,
    next_target: usize,
}

impl ChannelDisplay {
    pub fn new(tx: mpsc::Sender<TurnEvent>, ctx: egui::Context) -> Self {
        Self {
            tx,
            ctx,
            next_target: 0,
        }
    }

    fn send(&self, event: DisplayEvent) {
        // UI gone means the window closed; nothing left to show.
        let _ = self.tx.send(TurnEvent::Display(event));
        self.ctx.request_repaint();
    }
}

pub struct ChannelTarget {
    id: usize,
    tx: mpsc::Sender<TurnEvent>,
    ctx: egui::Context,
}

impl UpdateTarget for ChannelTarget {
    fn render(&mut self, text: &str) {
        let _ = self.tx.send(TurnEvent::Display(DisplayEvent::Update {
            target: self.id,
            text: text.to_string(),
        }));
        self.ctx.request_repaint();
    }
}

impl ChatDisplay for ChannelDisplay {
    type Target = ChannelTarget;

    fn begin_message(&mut self, role: Role) {
        self.send(DisplayEvent::BeginMessage(role));
    }

    fn render_markdown(&mut self, text: &str) {
        self.send(DisplayEvent::Markdown(text.to_string()));
    }

    fn create_update_target(&mut self) -> Self::Target {
        let id = self.next_target;
        self.next_target += 1;
        self.send(DisplayEvent::TargetCreated(id));
        ChannelTarget {
            id,
            tx: self.tx.clone(),
            ctx: self.ctx.clone(),
        }
    }

    fn show_progress(&mut self, label: &str, complete: bool) {
        self.send(DisplayEvent::Progress {
            label: label.to_string(),
            complete,
        });
    }

    fn show_collapsible(&mut self, label: &str, body: &str) {
        self.send(DisplayEvent::Collapsible {
            label: label.to_string(),
            body: body.to_string(),
        });
    }
}

/// One element of the live transcript, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveBlock {
    Message(Role),
    Markdown(String),
    /// Progress indicator; `body` is the target rendered inside it.
    Progress {
        label: String,
        complete: bool,
        body: Option<usize>,
    },
    Target(usize),
    Collapsible { label: String, body: String },
}

/// What the UI shows for the turn in flight.
#[derive(Debug, Default)]
pub struct LiveTurn {
    blocks: Vec<LiveBlock>,
    targets: HashMap<usize, String>,
}

impl LiveTurn {
    pub fn blocks(&self) -> &[LiveBlock] {
        &self.blocks
    }

    pub fn target_text(&self, id: usize) -> &str {
        self.targets.get(&id).map(String::as_str).unwrap_or("")
    }

    pub fn apply(&mut self, event: DisplayEvent) {
        match event {
            DisplayEvent::BeginMessage(role) => self.blocks.push(LiveBlock::Message(role)),
            DisplayEvent::Markdown(text) => self.blocks.push(LiveBlock::Markdown(text)),
            DisplayEvent::Progress { label, complete } => {
                // A message has at most one progress indicator; later calls update it.
                let current = self
                    .blocks
                    .iter_mut()
                    .rev()
                    .take_while(|b| !matches!(b, LiveBlock::Message(_)))
                    .find_map(|b| match b {
                        LiveBlock::Progress {
                            label: l,
                            complete: c,
                            ..
                        } => Some((l, c)),
                        _ => None,
                    });
                match current {
                    Some((l, c)) => {
                        *l = label;
                        *c = complete;
                    }
                    None => self.blocks.push(LiveBlock::Progress {
                        label,
                        complete,
                        body: None,
                    }),
                }
            }
            DisplayEvent::TargetCreated(id) => {
                self.targets.insert(id, String::new());
                match self.blocks.last_mut() {
                    Some(LiveBlock::Progress {
                        complete: false,
                        body: body @ None,
                        ..
                    }) => *body = Some(id),
                    _ => self.blocks.push(LiveBlock::Target(id)),
                }
            }
            DisplayEvent::Update { target, text } => {
                self.targets.insert(target, text);
            }
            DisplayEvent::Collapsible { label, body } => {
                self.blocks.push(LiveBlock::Collapsible { label, body })
            }
        }
    }
}
