use std::future::Future;
use std::io::{self, Write};

use anyhow::{bail, Result};
use chainchat_client::ChatController;
use chainchat_core::{AppState, ChainChatConfig, ChatEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::debug;

use crate::render::{self, View};

/// Long-running controller operations, run under [`drive`]
enum Op {
    Load,
    Refresh,
    Ram(String),
    UseCase(String),
    Submit,
    Pull(String),
}

pub async fn run(config: &ChainChatConfig) -> Result<()> {
    let (tx, mut events) = mpsc::unbounded_channel();
    let mut controller = ChatController::from_config(config).with_events(tx);
    let mut view = View::new();

    display_welcome(config);
    drive(&mut controller, &mut events, &mut view, Op::Load).await;
    println!(
        "  {} models installed on the server",
        controller.state().available().len()
    );
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (cmd, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
            None => (trimmed.to_lowercase(), ""),
        };
        debug!(command = %cmd, "REPL command");

        match cmd.as_str() {
            "help" | "h" | "?" => display_help(),
            "status" | "s" => display_status(config, controller.state()),
            "ram" | "r" => {
                if rest.is_empty() {
                    let state = controller.state();
                    display_options("RAM tiers", &state.ram_options(), state.selection().ram.as_deref());
                    continue;
                }
                let checked = check_option(&controller.state().ram_options(), rest);
                match checked {
                    Ok(()) => {
                        drive(&mut controller, &mut events, &mut view, Op::Ram(filter_value(rest))).await;
                        display_models(controller.state());
                    }
                    Err(e) => println!("  {}", e),
                }
            }
            "usecase" | "uc" | "u" => {
                if rest.is_empty() {
                    let state = controller.state();
                    display_options("Use cases", &state.use_case_options(), state.selection().use_case.as_deref());
                    continue;
                }
                let checked = check_option(&controller.state().use_case_options(), rest);
                match checked {
                    Ok(()) => {
                        drive(&mut controller, &mut events, &mut view, Op::UseCase(filter_value(rest))).await;
                        display_models(controller.state());
                    }
                    Err(e) => println!("  {}", e),
                }
            }
            "models" | "m" => display_models(controller.state()),
            "select" | "sel" | "unselect" | "unsel" => {
                let checked = cmd.starts_with("sel");
                if rest.is_empty() {
                    println!("  Usage: {} <#|name> [<#|name>...]", cmd);
                    continue;
                }
                for arg in rest.split_whitespace() {
                    match resolve_model(controller.state(), arg) {
                        Ok(name) => {
                            if !controller.toggle_model(&name, checked) {
                                println!("  {} unchanged", name);
                            }
                        }
                        Err(e) => println!("  {}", e),
                    }
                }
                display_selection(controller.state());
            }
            "reasoning" => match rest.to_lowercase().as_str() {
                "on" | "true" | "yes" => controller.set_need_reasoning(true),
                "off" | "false" | "no" => controller.set_need_reasoning(false),
                _ => println!(
                    "  Reasoning is {}. Usage: reasoning on|off",
                    on_off(controller.state().session().need_reasoning)
                ),
            },
            "ask" | "a" => {
                if rest.is_empty() {
                    println!("  Usage: ask <prompt>");
                    continue;
                }
                controller.set_prompt(rest);
                drive(&mut controller, &mut events, &mut view, Op::Submit).await;
                println!();
            }
            "pull" | "p" => {
                if rest.is_empty() {
                    println!("  Usage: pull <#|name>");
                    continue;
                }
                match resolve_model(controller.state(), rest) {
                    Ok(name) => {
                        drive(&mut controller, &mut events, &mut view, Op::Pull(name)).await;
                        println!();
                    }
                    Err(e) => println!("  {}", e),
                }
            }
            "show" => {
                let response = controller.state().response();
                if response.is_empty() {
                    println!("  No response yet");
                } else {
                    println!();
                    println!("{}", render::markdown(response));
                    println!();
                }
            }
            "refresh" => {
                drive(&mut controller, &mut events, &mut view, Op::Refresh).await;
                println!(
                    "  {} models installed on the server",
                    controller.state().available().len()
                );
            }
            "clear" | "cls" => {
                print!("\x1B[2J\x1B[1;1H");
                stdout.flush()?;
            }
            "exit" | "quit" | "q" => {
                println!("  Goodbye!");
                break;
            }
            _ => {
                controller.set_prompt(trimmed);
                drive(&mut controller, &mut events, &mut view, Op::Submit).await;
                println!();
            }
        }
    }

    Ok(())
}

/// Run `op` to completion while rendering its events. Ctrl-C drops the
/// operation and settles the controller.
async fn drive(
    controller: &mut ChatController,
    events: &mut UnboundedReceiver<ChatEvent>,
    view: &mut View,
    op: Op,
) {
    let operation = async {
        match op {
            Op::Load => controller.load().await,
            Op::Refresh => controller.refresh_available_models().await,
            Op::Ram(value) => controller.change_ram_filter(&value).await,
            Op::UseCase(value) => controller.change_use_case_filter(&value).await,
            Op::Submit => controller.submit_prompt().await,
            Op::Pull(name) => controller.pull_model(&name).await,
        }
    };
    let interrupted = render_until(operation, events, view, tokio::signal::ctrl_c()).await;

    if interrupted {
        controller.interrupt().await;
    }
    while let Ok(event) = events.try_recv() {
        view.render(&event);
    }
    if interrupted {
        println!();
        println!("  Interrupted");
    }
}

/// Render events until `operation` finishes or `interrupt` fires first.
/// Returns whether it was interrupted.
async fn render_until<F, I>(
    operation: F,
    events: &mut UnboundedReceiver<ChatEvent>,
    view: &mut View,
    interrupt: I,
) -> bool
where
    F: Future<Output = ()>,
    I: Future,
{
    tokio::pin!(operation);
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = &mut operation => return false,
            Some(event) = events.recv() => view.render(&event),
            _ = &mut interrupt => return true,
        }
    }
}

/// `none` or `-` clears a filter
fn filter_value(arg: &str) -> String {
    match arg {
        "none" | "-" => String::new(),
        other => other.to_string(),
    }
}

fn check_option(options: &[&str], arg: &str) -> Result<()> {
    if filter_value(arg).is_empty() || options.contains(&arg) {
        return Ok(());
    }
    bail!("Unknown option: {}. Options: {}", arg, options.join(", "))
}

/// Index into the listed models, or a model name as typed
fn resolve_model(state: &AppState, input: &str) -> Result<String> {
    let Ok(index) = input.parse::<usize>() else {
        return Ok(input.to_string());
    };

    let models = state.filtered_models();
    if models.is_empty() {
        bail!("No models listed. Set `ram` and `usecase` first.");
    }
    if index == 0 || index > models.len() {
        bail!("Invalid model index: {}. Use 1-{}", index, models.len());
    }
    Ok(models[index - 1].clone())
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn display_welcome(config: &ChainChatConfig) {
    println!();
    println!("  ChainChat");
    println!("  Chain a prompt through local Ollama models");
    println!();
    println!("  Gateway: {}", config.server.base_url());
    println!();
    println!("  ram <tier>             # Pick a RAM tier (e.g. `ram 16GB`)");
    println!("  usecase <name>         # Pick a use case (e.g. `usecase chat`)");
    println!("  select <#|name>        # Add a model to the chain");
    println!("  ask <prompt>           # Or just type the prompt");
    println!("  help                   # Show all command options");
    println!();
}

fn display_help() {
    println!();
    println!("Available Commands:");
    println!("  ram, r [<tier>|none]       Show or set the RAM tier");
    println!("  usecase, uc [<name>|none]  Show or set the use case");
    println!("  models, m                  List recommended models for the filters");
    println!("  select <#|name>...         Add models to the chain, in order");
    println!("  unselect <#|name>...       Remove models from the chain");
    println!("  reasoning on|off           Ask models to show their reasoning");
    println!("  ask, a <prompt>            Stream a response (bare text works too)");
    println!("  pull, p <#|name>           Download a model on the server");
    println!("  show                       Render the last response as markdown");
    println!("  refresh                    Re-check installed models");
    println!("  status, s                  Show session status");
    println!("  clear, cls                 Clear screen");
    println!("  help, h                    Show this help message");
    println!("  exit, quit, q              Leave ChainChat");
    println!();
    println!("Tip: Ctrl+C stops a running request");
    println!();
}

fn display_status(config: &ChainChatConfig, state: &AppState) {
    let selection = state.selection();
    println!();
    println!("Session Status:");
    println!("{:-<40}", "");
    println!("  Gateway:    {}", config.server.base_url());
    println!("  Installed:  {} models", state.available().len());
    println!("  RAM tier:   {}", selection.ram.as_deref().unwrap_or("-"));
    println!("  Use case:   {}", selection.use_case.as_deref().unwrap_or("-"));
    println!("  Chain:      {}", chain_label(state));
    println!("  Reasoning:  {}", on_off(state.session().need_reasoning));
    println!("  Last pull:  {}", state.pull_phase().label());
    if let Some(error) = state.error() {
        println!("  Last error: {}", error);
    }
    println!();
}

fn display_options(title: &str, options: &[&str], current: Option<&str>) {
    println!("  {}: {}", title, options.join(", "));
    println!("  Current: {}", current.unwrap_or("-"));
}

fn display_models(state: &AppState) {
    let rows = state.model_rows();
    println!();
    if rows.is_empty() {
        match (&state.selection().ram, &state.selection().use_case) {
            (Some(_), Some(_)) => println!("  No models found for these filters."),
            _ => println!("  Set `ram` and `usecase` to see recommended models."),
        }
        println!();
        return;
    }
    print!("{}", render::model_table(&rows));
    println!();
}

fn display_selection(state: &AppState) {
    println!("  Chain: {}", chain_label(state));
}

fn chain_label(state: &AppState) -> String {
    let models = &state.selection().models;
    if models.is_empty() {
        return "-".to_string();
    }
    models.join(" -> ")
}
