use std::borrow::Cow::{self, Borrowed, Owned};
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use rustyline::Editor;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::FileHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use tracing_subscriber::EnvFilter;

use bazhi_application::{GuruController, HashSurface, MemoryHash, SessionCard, UiEvent, ViewMachine, channel};
use bazhi_core::profile::{BirthProfile, Gender};
use bazhi_core::session::{Language, MessageKind, RenderedMessage};
use bazhi_core::view::ViewState;
use bazhi_infrastructure::{AppConfig, JsonFileUserStore, MemoryAuthGateway};
use bazhi_interaction::RelayClient;

/// Slash commands with their `/help` blurbs, in display order.
const COMMANDS: &[(&str, &str)] = &[
    ("/register", "create an account"),
    ("/login", "sign in"),
    ("/logout", "sign out"),
    ("/reset", "send a password reset email"),
    ("/birth", "enter or update your birth information"),
    ("/sessions", "list your consultation sessions"),
    ("/open", "open a session, e.g. /open chat1"),
    ("/new", "start a new consultation session"),
    ("/lang", "toggle between English and Chinese"),
    ("/profile", "show your elemental profile"),
    ("/analysis", "show the full birth chart analysis"),
    ("/home", "return to the home screen"),
    ("/hash", "simulate an address-bar edit, e.g. /hash #chat"),
    ("/help", "list commands"),
    ("/quit", "exit"),
];

/// CLI helper for rustyline that provides completion, highlighting, and hints.
#[derive(Clone)]
struct CliHelper {
    commands: Vec<String>,
}

impl CliHelper {
    fn new() -> Self {
        Self {
            commands: COMMANDS.iter().map(|(name, _)| (*name).to_string()).collect(),
        }
    }
}

impl Helper for CliHelper {}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];

        if line.starts_with('/') {
            let candidates: Vec<Pair> = self
                .commands
                .iter()
                .filter(|cmd| cmd.starts_with(line))
                .map(|cmd| Pair {
                    display: cmd.clone(),
                    replacement: cmd.clone(),
                })
                .collect();
            Ok((0, candidates))
        } else {
            Ok((0, vec![]))
        }
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];

        if line.starts_with('/') && !line.contains(' ') {
            self.commands
                .iter()
                .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
                .map(|cmd| cmd[line.len()..].to_string())
        } else {
            None
        }
    }
}

impl Validator for CliHelper {}

/// The main entry point for the BaZhi Guru terminal client.
///
/// This async function sets up a rustyline-based REPL that:
/// 1. Initializes the backend (config, auth gateway, user store, relay client)
/// 2. Wires the view machine and controller to an unbounded UI event channel
/// 3. Provides command completion for the slash commands
/// 4. Renders UI events from a background drain task with colored output
/// 5. Sends free text to the guru without blocking the prompt
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    // ===== Backend Initialization =====
    let config = AppConfig::load()?;
    let auth = Arc::new(MemoryAuthGateway::new());
    let store = Arc::new(JsonFileUserStore::default_location()?);
    let relay = Arc::new(RelayClient::new(&config)?);
    let hash = MemoryHash::new();
    let machine = ViewMachine::new(hash.clone(), config.hash_guard_ttl());

    let (events_tx, mut events) = channel();
    let controller = GuruController::new(auth, store, relay, config, machine.clone(), events_tx);
    controller.spawn_auth_listener();

    // Point the address surface at the sign-in view, then deliver the
    // write's echo by hand, as the renderer does for later transitions.
    machine.sync_hash();
    if let Some(raw) = hash.read() {
        controller.on_hash_changed(&raw).await?;
    }

    // Spawn UI event renderer task
    let renderer_controller = Arc::clone(&controller);
    let renderer_hash = Arc::clone(&hash);
    let renderer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                UiEvent::ViewChanged(view) => {
                    println!("{}", format!("=== {} ===", view_banner(&view)).bright_magenta());

                    // A browser fires hashchange right after a programmatic
                    // write; the REPL plays that part so the machine's echo
                    // guard is consumed instead of timing out.
                    if let Some(raw) = renderer_hash.read() {
                        let _ = renderer_controller.on_hash_changed(&raw).await;
                    }
                }
                UiEvent::TranscriptReset(messages) => {
                    println!();
                    for message in &messages {
                        print_message(message);
                    }
                }
                UiEvent::MessageRendered(message) => print_message(&message),
                UiEvent::LoadingChanged(Some(text)) => println!("{}", text.bright_black()),
                UiEvent::LoadingChanged(None) => {}
                // rustyline owns the prompt; busy sends are refused upstream.
                UiEvent::InputEnabled(_) => {}
                UiEvent::SessionListChanged(cards) => print_session_cards(&cards),
                UiEvent::LanguageChanged(language) => {
                    println!("{}", format!("Language: {}", language.label()).bright_yellow());
                }
                UiEvent::ElementalProfileReady => {
                    println!(
                        "{}",
                        "Your elemental profile is ready. Type '/profile' to view it."
                            .bright_green()
                    );
                }
                UiEvent::Notice(text) => println!("{}", text.yellow()),
            }
        }
    });

    // ===== REPL Setup =====
    let helper = CliHelper::new();
    let mut rl = Editor::new()?;
    rl.set_helper(Some(helper));

    println!("{}", "=== BaZhi Guru ===".bright_magenta().bold());
    println!(
        "{}",
        "Ask the guru about your destiny. Type '/help' for commands, 'quit' to exit.".bright_black()
    );
    println!();
    println!("{}", format!("=== {} ===", view_banner(&machine.current())).bright_magenta());

    // ===== Main REPL Loop =====
    loop {
        let readline = rl.readline(">> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();

                // Handle quit command
                if trimmed == "quit" || trimmed == "exit" || trimmed == "/quit" {
                    println!("{}", "Goodbye!".bright_green());
                    break;
                }

                // Skip empty lines
                if trimmed.is_empty() {
                    continue;
                }

                // Add to history
                let _ = rl.add_history_entry(&line);

                if let Some(command) = trimmed.strip_prefix('/') {
                    if let Err(e) = run_command(command, &controller, &hash, &mut rl).await {
                        eprintln!("{}", format!("{e}").red());
                    }
                    continue;
                }

                // Free text goes to the guru. The pipeline takes a while;
                // run it off the prompt and let the renderer stream events.
                let sender = Arc::clone(&controller);
                let question = trimmed.to_string();
                tokio::spawn(async move {
                    if let Err(e) = sender.send_message(&question).await {
                        eprintln!("{}", format!("{e}").red());
                    }
                });
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'quit' to exit.".yellow());
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        }
    }

    // The auth listener holds an event sender, so the channel never
    // closes; stop the renderer directly.
    renderer.abort();

    Ok(())
}

/// Dispatches one slash command (already stripped of the leading `/`).
async fn run_command(
    command: &str,
    controller: &GuruController,
    hash: &MemoryHash,
    rl: &mut Editor<CliHelper, FileHistory>,
) -> Result<()> {
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name {
        "register" => {
            let Some(email) = prompt(rl, "Email: ")? else { return Ok(()) };
            let Some(password) = prompt(rl, "Password: ")? else { return Ok(()) };
            let Some(confirm) = prompt(rl, "Confirm password: ")? else { return Ok(()) };
            if password != confirm {
                println!("{}", "Passwords do not match!".red());
                return Ok(());
            }
            controller.sign_up(email.trim(), &password).await?;
            println!("{}", "Account created!".green());
        }
        "login" => {
            let Some(email) = prompt(rl, "Email: ")? else { return Ok(()) };
            let Some(password) = prompt(rl, "Password: ")? else { return Ok(()) };
            controller.sign_in(email.trim(), &password).await?;
        }
        "logout" => controller.sign_out().await?,
        "reset" => {
            let email = if arg.is_empty() {
                match prompt(rl, "Email: ")? {
                    Some(email) => email,
                    None => return Ok(()),
                }
            } else {
                arg.to_string()
            };
            controller.send_password_reset(email.trim()).await?;
            println!("{}", "Password reset email sent! Check your inbox.".green());
        }
        "birth" => {
            if let Some(profile) = prompt_birth_profile(rl, controller.birth_profile())? {
                controller.save_birth_profile(profile).await?;
                println!("{}", "Birth information saved.".green());
            }
        }
        "sessions" => {
            let cards = controller.session_cards().await?;
            print_session_cards(&cards);
        }
        "open" => {
            if arg.is_empty() {
                println!("{}", "Usage: /open <chat-id>, e.g. /open chat1".yellow());
            } else {
                controller.open_session(arg).await?;
            }
        }
        "new" => {
            let Some(answer) = prompt(rl, "Start a new consultation session? [y/N] ")? else {
                return Ok(());
            };
            if matches!(answer.trim(), "y" | "Y" | "yes") {
                controller.create_session().await?;
            }
        }
        "lang" => {
            controller.toggle_language();
        }
        "profile" => print_elemental_profile(controller).await?,
        "analysis" => print_full_analysis(controller).await?,
        "home" => {
            hash.navigate("#home");
            controller.on_hash_changed("#home").await?;
        }
        "hash" => {
            if arg.is_empty() {
                println!("{}", "Usage: /hash <fragment>, e.g. /hash #chat".yellow());
            } else {
                hash.navigate(arg);
                controller.on_hash_changed(arg).await?;
            }
        }
        "help" => print_help(),
        _ => println!("{}", "Unknown command".bright_black()),
    }

    Ok(())
}

/// Reads one sub-prompt line; `None` means the user backed out with
/// CTRL-C or CTRL-D.
fn prompt(rl: &mut Editor<CliHelper, FileHistory>, text: &str) -> Result<Option<String>> {
    match rl.readline(text) {
        Ok(line) => Ok(Some(line)),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Walks the user through the birth form, pre-filling nothing but showing
/// the stored values when they exist.
fn prompt_birth_profile(
    rl: &mut Editor<CliHelper, FileHistory>,
    current: Option<BirthProfile>,
) -> Result<Option<BirthProfile>> {
    if let Some(existing) = current {
        println!(
            "{}",
            format!(
                "Current: {:04}-{:02}-{:02} {:02}:00, {:?}, {}",
                existing.year,
                existing.month,
                existing.day,
                existing.hour,
                existing.gender,
                existing.birthplace
            )
            .bright_black()
        );
    }

    let Some(date) = prompt(rl, "Birth date (YYYY-MM-DD): ")? else { return Ok(None) };
    let Some((year, month, day)) = parse_birth_date(date.trim()) else {
        println!("{}", "Please enter the date as YYYY-MM-DD, e.g. 1992-04-17.".yellow());
        return Ok(None);
    };

    let Some(hour_raw) = prompt(rl, "Birth hour (0-23): ")? else { return Ok(None) };
    let Ok(hour) = hour_raw.trim().parse::<u8>() else {
        println!("{}", "Please enter the hour as a number from 0 to 23.".yellow());
        return Ok(None);
    };

    let Some(gender_raw) = prompt(rl, "Gender (male/female): ")? else { return Ok(None) };
    let gender = match gender_raw.trim().to_lowercase().as_str() {
        "male" | "m" => Gender::Male,
        "female" | "f" => Gender::Female,
        _ => {
            println!("{}", "Please answer 'male' or 'female'.".yellow());
            return Ok(None);
        }
    };

    let Some(birthplace) = prompt(rl, "Birthplace: ")? else { return Ok(None) };

    Ok(Some(BirthProfile {
        year,
        month,
        day,
        hour,
        gender,
        birthplace: birthplace.trim().to_string(),
    }))
}

fn parse_birth_date(raw: &str) -> Option<(u16, u8, u8)> {
    let mut parts = raw.splitn(3, '-');
    let year = parts.next()?.trim().parse().ok()?;
    let month = parts.next()?.trim().parse().ok()?;
    let day = parts.next()?.trim().parse().ok()?;
    Some((year, month, day))
}

fn print_help() {
    println!("{}", "Commands:".bright_yellow());
    for (name, description) in COMMANDS {
        println!(
            "  {} {}",
            format!("{name:<10}").bright_cyan(),
            description.bright_black()
        );
    }
}

fn view_banner(view: &ViewState) -> String {
    match view {
        ViewState::Unauthenticated => "Sign in or register (#login)".to_string(),
        ViewState::ProfileSetup => "Birth information (#setup)".to_string(),
        ViewState::Home => "Home (#home)".to_string(),
        ViewState::ActiveSession { chat_id } => format!("Consultation {chat_id} (#chat)"),
    }
}

fn print_message(message: &RenderedMessage) {
    match message.kind {
        MessageKind::User => println!("{}", format!("> {}", message.text).green()),
        MessageKind::Reply => {
            for line in message.text.lines() {
                println!("{}", line.bright_blue());
            }
        }
        MessageKind::System => println!("{}", message.text.bright_black()),
    }
}

fn print_session_cards(cards: &[SessionCard]) {
    println!("{}", "Your consultations:".bright_yellow());
    for card in cards {
        match card {
            SessionCard::Existing(summary) => {
                let date = summary.created_at.get(..10).unwrap_or(&summary.created_at);
                let marker = if summary.has_messages { "" } else { " (empty)" };
                println!(
                    "  {} {}{}",
                    format!("[{}]", summary.chat_id).bright_cyan(),
                    date,
                    marker.bright_black(),
                );
            }
            SessionCard::NewSession => {
                println!(
                    "  {} {}",
                    "[new]".bright_cyan(),
                    "Start a new consultation".bright_black()
                );
            }
        }
    }
}

async fn print_elemental_profile(controller: &GuruController) -> Result<()> {
    let Some(profile) = controller.elemental_profile().await? else {
        println!("{}", "Your elemental profile is not ready yet.".yellow());
        return Ok(());
    };

    let counts = profile.elements;
    println!("{}", "=== Five Elements ===".bright_magenta());
    println!(
        "  {} {}   {} {}   {} {}   {} {}   {} {}",
        "木 Wood".bright_cyan(),
        counts.wood,
        "火 Fire".bright_cyan(),
        counts.fire,
        "土 Earth".bright_cyan(),
        counts.earth,
        "金 Metal".bright_cyan(),
        counts.metal,
        "水 Water".bright_cyan(),
        counts.water,
    );

    let (summary, description) = match controller.language() {
        Language::Chinese => (&profile.summary_zh, &profile.description_zh),
        Language::English => (&profile.summary_en, &profile.description_en),
    };
    println!("{}", summary.bright_blue());
    println!();
    for line in description.lines() {
        println!("{}", line.bright_blue());
    }

    Ok(())
}

async fn print_full_analysis(controller: &GuruController) -> Result<()> {
    let Some(analysis) = controller.full_analysis().await? else {
        println!("{}", "Your elemental profile is not ready yet.".yellow());
        return Ok(());
    };

    println!("{}", "=== Full Birth Chart Analysis ===".bright_magenta());
    for line in analysis.lines() {
        println!("{}", line.bright_blue());
    }

    Ok(())
}
