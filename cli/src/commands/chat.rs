use clap::{Args, ValueEnum};
use scribo_client::MessagingController;
use scribo_core::assist::AssistAction;
use scribo_core::models::{AgentMessage, Role};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::util::{Context, print_error, print_json};

#[derive(Args)]
pub struct ChatArgs {
    #[arg(long)]
    document_id: String,
    #[arg(long)]
    section_id: String,
    /// Send one message, print the conversation as JSON and exit
    #[arg(long, conflicts_with = "assist")]
    message: Option<String>,
    /// Run a quick action on --selection, print the conversation and exit
    #[arg(long, value_enum, requires = "selection")]
    assist: Option<AssistArg>,
    /// Text the quick action applies to
    #[arg(long)]
    selection: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum AssistArg {
    Edit,
    Summarize,
    Enhance,
}

impl From<AssistArg> for AssistAction {
    fn from(arg: AssistArg) -> Self {
        match arg {
            AssistArg::Edit => AssistAction::Edit,
            AssistArg::Summarize => AssistAction::Summarize,
            AssistArg::Enhance => AssistAction::Enhance,
        }
    }
}

pub async fn run(ctx: &Context, args: ChatArgs) -> i32 {
    let chat = MessagingController::new(ctx.client.clone());
    chat.initialize(&args.document_id, &args.section_id).await;

    if let Some(message) = args.message {
        chat.send(&message).await;
        return print_json(&chat.snapshot());
    }
    if let Some(action) = args.assist {
        chat.request_assist(action.into(), args.selection.as_deref().unwrap_or_default())
            .await;
        return print_json(&chat.snapshot());
    }

    interactive(&chat).await
}

enum Line {
    Quit,
    Assist(AssistAction, String),
    Say(String),
    Unknown(String),
}

fn parse_line(line: &str) -> Line {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Line::Say(trimmed.to_string());
    };
    let (command, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    match command {
        "quit" | "exit" => Line::Quit,
        "edit" => Line::Assist(AssistAction::Edit, arg.to_string()),
        "summarize" => Line::Assist(AssistAction::Summarize, arg.to_string()),
        "enhance" => Line::Assist(AssistAction::Enhance, arg.to_string()),
        other => Line::Unknown(other.to_string()),
    }
}

async fn interactive(chat: &MessagingController) -> i32 {
    let mut shown = print_messages(&chat.messages(), 0);
    eprintln!("Type a message, /edit|/summarize|/enhance <text>, or /quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return 0,
            Err(e) => {
                return print_error(1, "cli_error", &format!("Failed to read input: {e}"), None);
            }
        };

        let from_greeting = chat.snapshot().shows_greeting();
        match parse_line(&line) {
            Line::Quit => return 0,
            Line::Unknown(command) => {
                eprintln!("unknown command /{command}");
                continue;
            }
            Line::Assist(action, selection) => chat.request_assist(action, &selection).await,
            Line::Say(text) => {
                chat.set_input(text);
                chat.send_input().await;
            }
        }

        // the first message replaces the greeting
        if from_greeting && !chat.snapshot().shows_greeting() {
            shown = 0;
        }
        shown = print_messages(&chat.messages(), shown);
    }
}

/// Print `messages[from..]` and return the new count shown.
fn print_messages(messages: &[AgentMessage], from: usize) -> usize {
    for message in messages.iter().skip(from) {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        println!("{who}> {}", message.content);
    }
    messages.len()
}
