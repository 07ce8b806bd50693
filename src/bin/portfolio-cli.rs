use anyhow::{Context, Result};
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use portfolio_chat::client::HttpChatBackend;
use portfolio_chat::compiler::{PresetEntry, PresetReplies};
use portfolio_chat::models::InvocationState;
use portfolio_chat::router::{EntryPoint, RecoveryAction, ResponseRouter, Routed, RouterState};

const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let server = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PORTFOLIO_SERVER").ok())
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());

    let backend = HttpChatBackend::new(&server, Duration::from_secs(120))?;
    let presets = backend
        .presets()
        .await
        .with_context(|| format!("Failed to fetch presets from {server}"))?;
    let mut router = ResponseRouter::new(Arc::new(backend), PresetReplies::from(presets));

    println!("{} {}", "Connected to".dimmed(), server.bold());
    print_presets(router.presets());
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut renderer = Renderer::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&mut router, &mut renderer, line.trim()) {
                    break;
                }
            }
            applied = async { router.next_event().await.is_some() }, if router.is_loading() => {
                if applied {
                    renderer.render(&router);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if router.stop() {
                    println!("\n{}", "(stopped)".dimmed());
                } else {
                    break;
                }
            }
        }
    }

    println!("{}", "Bye!".dimmed());
    Ok(())
}

/// Returns false when the user wants to leave.
fn handle_line(router: &mut ResponseRouter, renderer: &mut Renderer, line: &str) -> bool {
    let outcome = match line {
        "" => return true,
        "/quit" | "/exit" => return false,
        "/help" => {
            print_help();
            return true;
        }
        "/presets" => {
            let _ = router.recover(RecoveryAction::UsePresets);
            print_presets(router.presets());
            return true;
        }
        "/stop" => {
            if router.stop() {
                println!("{}", "(stopped)".dimmed());
            }
            return true;
        }
        "/retry" => router.recover(RecoveryAction::Retry).map(|_| Routed::Dispatched),
        "/contact" => router.recover(RecoveryAction::ContactPreset).map(|_| Routed::Preset),
        "/ai" => router.escalate(),
        _ => {
            if let Some(question) = line.strip_prefix("/ai ") {
                router.submit(question.trim(), EntryPoint::Escalate)
            } else if let Some(n) = line.strip_prefix('/').and_then(|n| n.parse::<usize>().ok()) {
                match n.checked_sub(1).and_then(|i| router.presets().entries().get(i)) {
                    Some(preset) => {
                        let question = preset.question.clone();
                        println!("{} {}", ">".cyan(), question);
                        router.submit(&question, EntryPoint::QuickQuestion)
                    }
                    None => {
                        println!("{}", format!("No quick question #{n}").yellow());
                        return true;
                    }
                }
            } else if line.starts_with('/') {
                println!("{}", format!("Unknown command {line} (try /help)").yellow());
                return true;
            } else {
                router.submit(line, EntryPoint::FreeText)
            }
        }
    };

    match outcome {
        Ok(Routed::Preset) => {
            if let RouterState::PresetShown(preset) = router.state() {
                print_preset_reply(preset);
            }
        }
        Ok(Routed::Dispatched) => {
            renderer.reset();
            println!("{}", "...".dimmed());
        }
        Ok(Routed::Ignored) => {}
        Err(e) => println!("{}", e.to_string().yellow()),
    }
    true
}

fn print_presets(presets: &PresetReplies) {
    println!("{}", "Quick questions:".bold());
    for (i, preset) in presets.entries().iter().enumerate() {
        println!("  {} {}", format!("/{}", i + 1).cyan(), preset.question);
    }
}

fn print_help() {
    println!(
        "{}",
        "Type a question, /1../6 for quick questions, /ai [question] for a live answer, \
         /stop, /retry, /contact, /presets, /quit"
            .dimmed()
    );
}

fn print_preset_reply(preset: &PresetEntry) {
    println!("{}", preset.reply);
    println!(
        "{}",
        format!("[{}] /ai for a live answer", preset.tool).dimmed()
    );
}

/// Prints only what is new since the last call.
#[derive(Default)]
struct Renderer {
    message_id: Option<String>,
    printed: usize,
    tools_shown: usize,
}

impl Renderer {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn render(&mut self, router: &ResponseRouter) {
        if let Some(message) = router.view().latest_assistant {
            if self.message_id.as_deref() != Some(message.id.as_str()) {
                self.message_id = Some(message.id.clone());
                self.printed = 0;
                self.tools_shown = 0;
            }

            let results: Vec<_> = message
                .tool_invocations()
                .filter(|inv| inv.state == InvocationState::Result)
                .collect();
            for inv in results.iter().skip(self.tools_shown) {
                let pretty = inv
                    .result
                    .as_ref()
                    .and_then(|r| serde_json::to_string_pretty(r).ok())
                    .unwrap_or_default();
                println!("{}\n{}", format!("[{}]", inv.tool_name).green(), pretty.dimmed());
            }
            self.tools_shown = results.len();

            if let Some(fresh) = message.content.get(self.printed..) {
                print!("{fresh}");
                let _ = std::io::stdout().flush();
                self.printed = message.content.len();
            }
        }

        if router.is_loading() {
            return;
        }
        println!();
        if let RouterState::ErrorShown { message, actions, .. } = router.state() {
            println!("{}", message.red());
            let hints: Vec<&str> = actions
                .iter()
                .map(|action| match action {
                    RecoveryAction::Retry => "/retry",
                    RecoveryAction::ContactPreset => "/contact",
                    RecoveryAction::UsePresets => "/presets",
                })
                .collect();
            println!("{}", format!("Try: {}", hints.join("  ")).yellow());
        }
    }
}
