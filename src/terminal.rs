//! Terminal front end
//!
//! Drives a [`ConversationController`] from stdin. The loop below is the
//! interactive context: it only ever awaits stdin or the event channel, and
//! all provider work happens in the controller's background tasks.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::conversation::{
    ConversationController, ConversationEvent, ConversationState, SubmitOutcome,
};
use crate::db::{Message, Sender};
use crate::providers::GatewayStatus;

/// Commands that end the chat loop
const QUIT_COMMANDS: [&str; 2] = ["/quit", "/exit"];

/// Format a turn for display
#[must_use]
pub fn format_turn(assistant_name: &str, message: &Message) -> String {
    let label = match message.sender {
        Sender::User => "you",
        Sender::Assistant => assistant_name,
    };
    format!("{label}: {}", message.content)
}

fn prompt() {
    print!("> ");
    std::io::stdout().flush().ok();
}

/// Print an event; returns true once the conversation is idle again
fn render_event(assistant_name: &str, event: &ConversationEvent) -> bool {
    match event {
        // The user's own turns are already on screen
        ConversationEvent::Turn(message) if message.sender == Sender::User => false,
        ConversationEvent::Turn(message) => {
            println!("\r{}", format_turn(assistant_name, message));
            false
        }
        ConversationEvent::StateChanged(ConversationState::AwaitingResponse) => {
            println!("{assistant_name} is typing...");
            false
        }
        ConversationEvent::StateChanged(ConversationState::Idle) => true,
        ConversationEvent::PersistenceFailed { reason } => {
            eprintln!("could not save the conversation: {reason}");
            true
        }
    }
}

/// Drain events until the pending reply has been handled
async fn wait_idle(assistant_name: &str, events: &mut UnboundedReceiver<ConversationEvent>) {
    while let Some(event) = events.recv().await {
        if render_event(assistant_name, &event) {
            break;
        }
    }
}

/// Run the interactive chat loop until `/quit` or end of input
///
/// # Errors
///
/// Returns error if stdin cannot be read or the message store is unavailable
pub async fn run_chat(controller: ConversationController) -> anyhow::Result<()> {
    let mut events = controller.subscribe();
    let name = controller.persona().name.clone();

    for message in controller.open_transcript()? {
        println!("{}", format_turn(&name, &message));
    }

    if let GatewayStatus::Unconfigured { reason } = controller.gateway().status() {
        match reason {
            Some(reason) => println!("(provider unavailable: {reason})"),
            None => println!("(no api key yet, run `companion key set`)"),
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if QUIT_COMMANDS.contains(&line) {
                    return Ok(());
                }
                match controller.submit(line) {
                    SubmitOutcome::Accepted(_) => {}
                    SubmitOutcome::Ignored => prompt(),
                    SubmitOutcome::Busy => {
                        println!("(still waiting for {name}, message not sent)");
                    }
                    SubmitOutcome::NotSaved { reason } => {
                        tracing::debug!(%reason, "submission not saved");
                    }
                }
            }
            Some(event) = events.recv() => {
                if render_event(&name, &event) {
                    prompt();
                }
            }
        }
    }

    // End of input: let a pending reply land before exiting
    if controller.state() == ConversationState::AwaitingResponse {
        wait_idle(&name, &mut events).await;
    }
    println!();
    Ok(())
}

/// Submit one message and print the reply
///
/// # Errors
///
/// Returns error if the input is empty or the turn could not be saved
pub async fn send_once(controller: &ConversationController, text: &str) -> anyhow::Result<()> {
    let mut events = controller.subscribe();
    let name = controller.persona().name.clone();

    match controller.submit(text) {
        SubmitOutcome::Accepted(_) => {}
        SubmitOutcome::Ignored => anyhow::bail!("nothing to send"),
        SubmitOutcome::Busy => anyhow::bail!("a reply is already pending"),
        SubmitOutcome::NotSaved { reason } => anyhow::bail!("could not save message: {reason}"),
    }

    while let Some(event) = events.recv().await {
        match event {
            ConversationEvent::Turn(message) if message.sender == Sender::Assistant => {
                println!("{}", format_turn(&name, &message));
            }
            ConversationEvent::PersistenceFailed { reason } => {
                anyhow::bail!("could not save reply: {reason}");
            }
            ConversationEvent::StateChanged(ConversationState::Idle) => break,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::MessageKind;

    fn message(sender: Sender, content: &str) -> Message {
        Message {
            id: 1,
            sender,
            content: content.to_string(),
            created_at: Utc::now(),
            kind: MessageKind::Text,
        }
    }

    #[test]
    fn test_format_turn() {
        assert_eq!(
            format_turn("Mimi", &message(Sender::User, "salut")),
            "you: salut"
        );
        assert_eq!(
            format_turn("Mimi", &message(Sender::Assistant, "coucou")),
            "Mimi: coucou"
        );
    }

    #[test]
    fn test_render_event_idle_detection() {
        assert!(!render_event(
            "Mimi",
            &ConversationEvent::Turn(message(Sender::Assistant, "hey"))
        ));
        assert!(!render_event(
            "Mimi",
            &ConversationEvent::StateChanged(ConversationState::AwaitingResponse)
        ));
        assert!(render_event(
            "Mimi",
            &ConversationEvent::StateChanged(ConversationState::Idle)
        ));
        assert!(render_event(
            "Mimi",
            &ConversationEvent::PersistenceFailed {
                reason: "disk full".to_string()
            }
        ));
    }
}
