//! Renders engine-semantic `OutboundEvent`s into the bytes/text a transport
//! writes to its socket (spec.md §4.2 "the renderer boundary": coalescing
//! prompts, plain-text fallback when ANSI is off). Wire-level ANSI theming
//! beyond on/off and telnet/WebSocket byte framing are explicitly out of
//! scope (spec.md §1); this only proves the renderer contract exists.

use ambonmud_shared::events::OutboundEvent;

const ANSI_RESET: &str = "\u{1b}[0m";
const ANSI_RED: &str = "\u{1b}[31m";
const ANSI_CYAN: &str = "\u{1b}[36m";
const ANSI_CLEAR: &str = "\u{1b}[2J\u{1b}[H";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Telnet,
    WebSocket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Line(String),
    Close(String),
}

/// Collapses consecutive `SendPrompt`s into one (spec.md §4.1).
#[derive(Debug, Default)]
pub struct PromptCoalescer {
    last_was_prompt: bool,
}

impl PromptCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when this event should be dropped rather than rendered.
    pub fn should_emit(&mut self, event: &OutboundEvent) -> bool {
        if event.is_prompt() {
            if self.last_was_prompt {
                return false;
            }
            self.last_was_prompt = true;
        } else {
            self.last_was_prompt = false;
        }
        true
    }
}

/// Renders one event for `kind`, given the session's current ANSI setting.
/// `ansi_enabled` is updated in place on `SetAnsi`.
pub fn render(event: &OutboundEvent, ansi_enabled: &mut bool, kind: TransportKind) -> Option<Rendered> {
    match event {
        OutboundEvent::SendText { text, .. } => Some(Rendered::Line(text.clone())),
        OutboundEvent::SendInfo { text, .. } => Some(Rendered::Line(colorize(text, ANSI_CYAN, *ansi_enabled))),
        OutboundEvent::SendError { text, .. } => Some(Rendered::Line(colorize(text, ANSI_RED, *ansi_enabled))),
        OutboundEvent::SendPrompt { .. } => Some(Rendered::Line("> ".to_string())),
        OutboundEvent::ShowLoginScreen { .. } => {
            Some(Rendered::Line("Welcome to AmbonMUD. Enter your name:".to_string()))
        }
        OutboundEvent::SetAnsi { enabled, .. } => {
            *ansi_enabled = *enabled;
            None
        }
        OutboundEvent::ClearScreen { .. } => {
            if *ansi_enabled {
                Some(Rendered::Line(ANSI_CLEAR.to_string()))
            } else {
                None
            }
        }
        OutboundEvent::Close { reason, .. } => Some(Rendered::Close(reason.clone())),
        OutboundEvent::SessionRedirect { .. } => None,
        OutboundEvent::GmcpData { package, json, .. } => match kind {
            TransportKind::WebSocket => {
                let payload = serde_json::json!({"gmcp": package, "data": json});
                Some(Rendered::Line(payload.to_string()))
            }
            TransportKind::Telnet => None,
        },
    }
}

fn colorize(text: &str, color: &str, ansi_enabled: bool) -> String {
    if ansi_enabled {
        format!("{color}{text}{ANSI_RESET}")
    } else {
        text.to_string()
    }
}
