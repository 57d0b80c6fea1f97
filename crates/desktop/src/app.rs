//! ThinkChat Desktop: egui app state and UI.

use eframe::egui;
use lib::llm::{ChatBackend, OllamaBackend};
use lib::reparse::split_stored;
use lib::session::{Conversation, ConversationMessage, Role};
use lib::splitter::THINKING_COMPLETE_LABEL;
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Mutex, OnceLock};

use crate::live::{ChannelDisplay, LiveBlock, LiveTurn, TurnEvent};

const CHAT_INPUT_HEIGHT: f32 = 90.0;
const CHAT_MESSAGES_MIN_HEIGHT: f32 = 80.0;
const LOG_BUFFER_MAX_LINES: usize = 2000;

/// Ring buffer of log lines for the Logs screen. Written by DesktopLogger.
static LOG_LINES: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();

fn log_buffer() -> &'static Mutex<VecDeque<String>> {
    LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn push_log_line(line: String) {
    if let Ok(mut buf) = log_buffer().lock() {
        buf.push_back(line);
        while buf.len() > LOG_BUFFER_MAX_LINES {
            buf.pop_front();
        }
    }
}

/// Logger that appends to LOG_LINES for display in the Logs screen.
struct DesktopLogger;

impl log::Log for DesktopLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        // egui/winit are chatty at debug level; keep their warnings only.
        metadata.level() <= log::Level::Warn
            || metadata.target().starts_with("lib")
            || metadata.target().starts_with("desktop")
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{} [{}] {}",
            clock_time(),
            record.level(),
            record.args()
        );
        push_log_line(line);
    }

    fn flush(&self) {}
}

/// UTC wall-clock time of day, `HH:MM:SS.mmm`.
fn clock_time() -> String {
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = t.as_secs();
    let millis = t.subsec_millis();
    let h = (secs / 3600) % 24;
    let m = (secs / 60) % 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, millis)
}

static LOGGER: DesktopLogger = DesktopLogger;

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Chat,
    Logs,
}

pub struct ThinkChatApp {
    // Streams are spawned on this runtime; it must outlive the backend.
    _runtime: tokio::runtime::Runtime,
    backend: OllamaBackend,
    system_prompt: String,
    /// None while a turn's worker thread owns it.
    conversation: Option<Conversation>,
    /// Stored messages shown in the transcript (snapshot taken when a turn starts).
    transcript: Vec<ConversationMessage>,
    /// Display events of the turn in flight.
    live: Option<LiveTurn>,
    turn_receiver: Option<mpsc::Receiver<TurnEvent>>,
    chat_input: String,
    chat_error: Option<String>,
    current_screen: Screen,
}

impl ThinkChatApp {
    /// Space between the main screen title (Chat, Logs) and the content below.
    const SCREEN_TITLE_BOTTOM_SPACING: f32 = 18.0;
    /// Space between the bottom of the content and the window edge.
    const SCREEN_FOOTER_SPACING: f32 = 48.0;

    pub fn new(_cc: &eframe::CreationContext<'_>, runtime: tokio::runtime::Runtime) -> Self {
        let _ = log_buffer();
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Debug);

        let (config, path) = match lib::config::load_config(None) {
            Ok(loaded) => loaded,
            Err(e) => {
                log::warn!("could not load config, using defaults: {:#}", e);
                (lib::config::Config::default(), lib::config::default_config_path())
            }
        };
        let model = lib::config::resolve_model(&config, None);
        let backend = OllamaBackend::new(
            lib::config::ollama_client(&config),
            model,
            runtime.handle().clone(),
        );
        log::info!(
            "desktop started: config {}, model {} at {}",
            path.display(),
            backend.model(),
            backend.client().base_url()
        );

        let system_prompt = config.chat.system_prompt;
        let conversation = Conversation::new(system_prompt.clone());
        Self {
            _runtime: runtime,
            backend,
            system_prompt,
            transcript: conversation.messages().to_vec(),
            conversation: Some(conversation),
            live: None,
            turn_receiver: None,
            chat_input: String::new(),
            chat_error: None,
            current_screen: Screen::default(),
        }
    }

    fn turn_running(&self) -> bool {
        self.turn_receiver.is_some()
    }

    fn start_new_conversation(&mut self) {
        if self.turn_running() {
            return;
        }
        let conversation = Conversation::new(self.system_prompt.clone());
        log::info!("new conversation {}", conversation.id());
        self.transcript = conversation.messages().to_vec();
        self.conversation = Some(conversation);
        self.chat_error = None;
    }

    fn start_chat_turn(&mut self, ctx: &egui::Context) {
        if self.turn_running() {
            return;
        }
        let message = self.chat_input.trim().to_string();
        if message.is_empty() {
            return;
        }
        let Some(mut conversation) = self.conversation.take() else {
            return;
        };
        self.chat_error = None;
        self.chat_input.clear();
        self.transcript = conversation.messages().to_vec();
        self.live = Some(LiveTurn::default());

        let backend = self.backend.clone();
        let ctx = ctx.clone();
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut display = ChannelDisplay::new(tx.clone(), ctx.clone());
            let result = lib::turn::run_turn(&mut conversation, &backend, &mut display, &message)
                .map_err(|e| e.to_string());
            let _ = tx.send(TurnEvent::Finished {
                conversation,
                result,
            });
            ctx.request_repaint();
        });
        self.turn_receiver = Some(rx);
    }

    /// Drain display events of the running turn and take the conversation back when it ends. Call each frame.
    fn poll_chat_turn(&mut self) {
        let Some(rx) = &self.turn_receiver else {
            return;
        };
        let mut finished = None;
        loop {
            match rx.try_recv() {
                Ok(TurnEvent::Display(event)) => {
                    if let Some(live) = self.live.as_mut() {
                        live.apply(event);
                    }
                }
                Ok(TurnEvent::Finished {
                    conversation,
                    result,
                }) => {
                    finished = Some((conversation, result));
                    break;
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    // Worker panicked; the conversation went with it.
                    log::error!("chat worker exited without returning the conversation");
                    self.chat_error = Some("chat worker stopped unexpectedly".to_string());
                    self.turn_receiver = None;
                    self.live = None;
                    self.start_new_conversation();
                    return;
                }
            }
        }
        if let Some((conversation, result)) = finished {
            self.turn_receiver = None;
            self.live = None;
            if let Err(e) = result {
                log::warn!("turn failed: {}", e);
                self.chat_error = Some(e);
            }
            self.transcript = conversation.messages().to_vec();
            self.conversation = Some(conversation);
        }
    }

    fn message_frame(ui: &egui::Ui, role: Role) -> egui::Frame {
        egui::Frame::none()
            .fill(if role == Role::User {
                ui.style().visuals.extreme_bg_color
            } else {
                ui.style().visuals.panel_fill
            })
            .stroke(egui::Stroke::new(
                1.0,
                ui.style()
                    .visuals
                    .widgets
                    .noninteractive
                    .bg_stroke
                    .color,
            ))
            .rounding(egui::Rounding::same(8.0))
            .inner_margin(egui::Margin::same(8.0))
    }

    fn role_label(ui: &mut egui::Ui, role: Role) {
        let name = match role {
            Role::User => "You",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        ui.label(egui::RichText::new(name).small().weak());
    }

    /// A stored message; assistant replies go through the re-parser so thinking is collapsed.
    fn render_stored_message(ui: &mut egui::Ui, index: usize, m: &ConversationMessage) {
        Self::message_frame(ui, m.role).show(ui, |ui| {
            ui.set_width(ui.available_width());
            Self::role_label(ui, m.role);
            if m.role == Role::Assistant {
                let reply = split_stored(&m.content);
                if let Some(thinking) = reply.thinking {
                    egui::CollapsingHeader::new(THINKING_COMPLETE_LABEL)
                        .id_source(("stored_thinking", index))
                        .default_open(false)
                        .show(ui, |ui| {
                            ui.label(egui::RichText::new(thinking.trim()).weak());
                        });
                }
                ui.label(reply.response.trim());
            } else {
                ui.label(egui::RichText::new(&m.content).strong());
            }
        });
    }

    /// The turn in flight, one frame per message the display opened.
    fn render_live_turn(ui: &mut egui::Ui, live: &LiveTurn) {
        let mut groups: Vec<(Role, Vec<&LiveBlock>)> = Vec::new();
        for block in live.blocks() {
            match block {
                LiveBlock::Message(role) => groups.push((*role, Vec::new())),
                other => match groups.last_mut() {
                    Some((_, blocks)) => blocks.push(other),
                    None => groups.push((Role::Assistant, vec![other])),
                },
            }
        }

        for (group_index, (role, blocks)) in groups.iter().enumerate() {
            Self::message_frame(ui, *role).show(ui, |ui| {
                ui.set_width(ui.available_width());
                Self::role_label(ui, *role);
                for (block_index, block) in blocks.iter().enumerate() {
                    match block {
                        LiveBlock::Message(_) => {}
                        LiveBlock::Markdown(text) => {
                            if *role == Role::User {
                                ui.label(egui::RichText::new(text.as_str()).strong());
                            } else {
                                ui.label(text.as_str());
                            }
                        }
                        LiveBlock::Progress {
                            label,
                            complete,
                            body,
                        } => {
                            ui.horizontal(|ui| {
                                if !complete {
                                    ui.spinner();
                                }
                                egui::CollapsingHeader::new(label.as_str())
                                    // Stable id so the header keeps its state when the label changes.
                                    .id_source(("live_progress", group_index, block_index))
                                    .default_open(false)
                                    .show(ui, |ui| {
                                        if let Some(id) = body {
                                            ui.label(
                                                egui::RichText::new(live.target_text(*id).trim())
                                                    .weak(),
                                            );
                                        }
                                    });
                            });
                        }
                        LiveBlock::Target(id) => {
                            ui.label(live.target_text(*id));
                        }
                        LiveBlock::Collapsible { label, body } => {
                            egui::CollapsingHeader::new(label.as_str())
                                .id_source(("live_collapsible", group_index, block_index))
                                .default_open(false)
                                .show(ui, |ui| {
                                    ui.label(egui::RichText::new(body.trim()).weak());
                                });
                        }
                    }
                }
            });
            ui.add_space(8.0);
        }
    }

    /// Render the chat UI (messages + input). Messages area is flexible (fills space) with stick-to-bottom; input and controls are fixed at bottom.
    fn ui_chat(&mut self, ui: &mut egui::Ui) {
        let can_send = !self.turn_running();

        let row_height = ui.spacing().interact_size.y + 8.0;
        let bottom_section_height =
            CHAT_INPUT_HEIGHT + 8.0 + row_height + Self::SCREEN_FOOTER_SPACING;
        let available = ui.available_height();
        let messages_height = (available - bottom_section_height).max(CHAT_MESSAGES_MIN_HEIGHT);

        let messages_width = ui.available_width();
        let messages_rect = ui
            .allocate_exact_size(
                egui::vec2(messages_width, messages_height),
                egui::Sense::hover(),
            )
            .0;
        let mut messages_ui =
            ui.child_ui(messages_rect, egui::Layout::top_down(egui::Align::Min));
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .show(&mut messages_ui, |ui| {
                // Force scroll content to be at least viewport width so the scrollbar stays on the right
                let content_width = ui.available_width();
                ui.allocate_exact_size(egui::vec2(content_width, 0.0), egui::Sense::hover());
                for (index, m) in self
                    .transcript
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.role != Role::System)
                {
                    Self::render_stored_message(ui, index, m);
                    ui.add_space(8.0);
                }
                if let Some(live) = &self.live {
                    Self::render_live_turn(ui, live);
                }
            });

        ui.add_space(8.0);

        let text_response = ui.add_enabled_ui(can_send, |ui| {
            ui.add_sized(
                [ui.available_width(), CHAT_INPUT_HEIGHT],
                egui::TextEdit::multiline(&mut self.chat_input).hint_text("Ask me anything!"),
            )
        });
        let response = text_response.inner;
        ui.add_space(8.0);

        let row_width = ui.available_width();
        let (rect, _) =
            ui.allocate_exact_size(egui::vec2(row_width, row_height), egui::Sense::hover());
        let mut row_ui = ui.child_ui(rect, egui::Layout::right_to_left(egui::Align::Center));
        let mut send_now = false;
        let mut new_conversation = false;
        egui::Frame::none()
            .inner_margin(egui::Margin {
                left: 0.0,
                right: 8.0,
                top: 4.0,
                bottom: 4.0,
            })
            .show(&mut row_ui, |ui| {
                // Right-to-left layout: first added = rightmost.
                if ui.add_enabled(can_send, egui::Button::new("Send")).clicked() {
                    send_now = true;
                }
                ui.add_space(8.0);
                if ui
                    .add_enabled(can_send, egui::Button::new("New chat"))
                    .clicked()
                {
                    new_conversation = true;
                }
                if !can_send {
                    ui.add_space(8.0);
                    ui.label(egui::RichText::new("Waiting for the model...").weak());
                }
            });

        if can_send && response.has_focus() {
            let modifiers = ui.input(|i| i.modifiers);
            if (modifiers.command || modifiers.ctrl) && ui.input(|i| i.key_pressed(egui::Key::Enter))
            {
                send_now = true;
            }
        }
        if new_conversation {
            self.start_new_conversation();
        }
        if send_now {
            let ctx = ui.ctx().clone();
            self.start_chat_turn(&ctx);
        }

        if let Some(ref err) = self.chat_error {
            ui.add_space(8.0);
            ui.colored_label(egui::Color32::RED, err);
        }
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    fn ui_logs_screen(&self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Logs");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        let lines: Vec<String> = log_buffer()
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();

        let available = ui.available_height();
        let scroll_height = (available - Self::SCREEN_FOOTER_SPACING).max(0.0);
        egui::ScrollArea::vertical()
            .max_height(scroll_height)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &lines {
                    ui.label(
                        egui::RichText::new(line.as_str()).family(egui::FontFamily::Monospace),
                    );
                }
                if lines.is_empty() {
                    ui.label("No log output yet.");
                }
            });
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }
}

impl eframe::App for ThinkChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_chat_turn();

        let model = self.backend.model().to_string();
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| {
                    ui.add_space(16.0);
                    ui.horizontal(|ui| {
                        ui.heading("ThinkChat");
                        ui.label(egui::RichText::new("With thinking UI! 💡").weak());
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            ui.label(egui::RichText::new(model).monospace());
                        });
                    });
                    ui.add_space(16.0);
                });
        });

        let current_screen = &mut self.current_screen;
        egui::SidePanel::left("sidebar")
            .resizable(false)
            .exact_width(140.0)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                    .show(ui, |ui| {
                        ui.add_space(24.0);
                        if ui.selectable_label(*current_screen == Screen::Chat, "Chat").clicked() {
                            *current_screen = Screen::Chat;
                        }
                        ui.add_space(12.0);
                        if ui.selectable_label(*current_screen == Screen::Logs, "Logs").clicked() {
                            *current_screen = Screen::Logs;
                        }
                    });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| match self.current_screen {
                    Screen::Chat => {
                        ui.add_space(24.0);
                        ui.heading("Chat");
                        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
                        self.ui_chat(ui);
                    }
                    // Logs screen has its own scroll area for the log lines; avoid double scrollbars
                    Screen::Logs => self.ui_logs_screen(ui),
                });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_buffer_keeps_the_newest_lines() {
        for i in 0..(LOG_BUFFER_MAX_LINES + 5) {
            push_log_line(format!("line {}", i));
        }
        let buf = log_buffer().lock().unwrap();
        let newest = format!("line {}", LOG_BUFFER_MAX_LINES + 4);
        assert_eq!(buf.len(), LOG_BUFFER_MAX_LINES);
        assert_eq!(buf.back(), Some(&newest));
    }

    #[test]
    fn clock_time_is_fixed_width() {
        let t = clock_time();
        assert_eq!(t.len(), 12);
        assert_eq!(&t[2..3], ":");
        assert_eq!(&t[8..9], ".");
    }
}
