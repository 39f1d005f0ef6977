use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use prodviz_contracts::events::EventWriter;
use prodviz_contracts::images::OriginalImage;
use prodviz_engine::chat::{ChatSession, OpenRouterChat, Reconciliation};
use prodviz_engine::speech::{Narrator, OpenAiSpeech, DEFAULT_VOICE};
use prodviz_engine::tasks::FreepikTaskBackend;
use prodviz_engine::{EngineConfig, StudioState, VisualizationOrchestrator, VisualizerStudio};
use serde_json::json;
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "prodviz", version, about = "Product visualization and chat client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render the product into the canned scenes, optionally editing one result.
    Visualize(VisualizeArgs),
    /// Run a single edit round trip on a local image.
    Edit(EditArgs),
    /// Interactive chat with the assistant.
    Chat(ChatArgs),
    /// Synthesize speech to an mp3 file.
    Speak(SpeakArgs),
}

#[derive(Debug, Parser)]
struct VisualizeArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, requires = "edit_prompt")]
    edit_index: Option<usize>,
    #[arg(long, requires = "edit_index")]
    edit_prompt: Option<String>,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_VOICE)]
    voice: String,
    #[arg(long, default_value = ".")]
    audio_out: PathBuf,
}

#[derive(Debug, Parser)]
struct SpeakArgs {
    #[arg(long)]
    text: String,
    #[arg(long, default_value = DEFAULT_VOICE)]
    voice: String,
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

const MANIFEST_FILE: &str = "visualizations.json";

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("prodviz error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    match cli.command {
        Command::Visualize(args) => run_visualize(&config, args),
        Command::Edit(args) => run_edit(&config, args),
        Command::Chat(args) => {
            run_chat(&config, args)?;
            Ok(0)
        }
        Command::Speak(args) => run_speak(&config, args),
    }
}

fn session_id(kind: &str) -> String {
    format!("{kind}-{}", std::process::id())
}

fn orchestrator(
    config: &EngineConfig,
    events: EventWriter,
) -> VisualizationOrchestrator<FreepikTaskBackend> {
    VisualizationOrchestrator::new(FreepikTaskBackend::from_config(config))
        .with_policy(config.poll.clone())
        .with_events(events)
}

fn run_visualize(config: &EngineConfig, args: VisualizeArgs) -> Result<i32> {
    let events = EventWriter::optional(args.events.clone(), session_id("visualize"));
    let studio = VisualizerStudio::new(orchestrator(config, events));
    studio
        .upload_path(&args.image)
        .with_context(|| format!("failed to load {}", args.image.display()))?;

    let outcome = studio.generate()?;
    for failure in &outcome.failures {
        eprintln!("scene '{}' dropped: {}", failure.scene, failure.error);
    }
    let state = studio.snapshot();
    if let Some(message) = &state.error {
        eprintln!("{message}");
    }
    for (index, image) in state.images.iter().enumerate() {
        println!("[{index}] {} {}", image.id, image.src);
    }

    if let (Some(index), Some(prompt)) = (args.edit_index, args.edit_prompt.as_deref()) {
        let id = state
            .images
            .get(index)
            .map(|image| image.id.clone())
            .ok_or_else(|| anyhow!("no generated image at index {index}"))?;
        studio.select(&id);
        match studio.edit_selected(prompt) {
            Ok(edited) => println!("[{index}] edited {} {}", edited.id, edited.src),
            Err(err) => eprintln!("edit failed: {err}"),
        }
    }

    let state = studio.snapshot();
    if let Some(out) = &args.out {
        let path = write_manifest(out, &state)?;
        println!("manifest: {}", path.display());
    }
    Ok(if state.images.is_empty() { 1 } else { 0 })
}

fn write_manifest(out_dir: &Path, state: &StudioState) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let manifest = json!({
        "source": state.original.as_ref().map(|image| image.file_name()),
        "source_mime": state.original.as_ref().map(|image| image.mime().as_str()),
        "images": state.images,
        "error": state.error,
    });
    let path = out_dir.join(MANIFEST_FILE);
    fs::write(&path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn run_edit(config: &EngineConfig, args: EditArgs) -> Result<i32> {
    let image = OriginalImage::from_path(&args.image)
        .with_context(|| format!("failed to load {}", args.image.display()))?;
    let events = EventWriter::optional(args.events.clone(), session_id("edit"));
    let result = orchestrator(config, events).edit_image(image.base64(), &args.prompt)?;
    println!("{result}");
    Ok(0)
}

fn run_speak(config: &EngineConfig, args: SpeakArgs) -> Result<i32> {
    let narrator = Narrator::new(OpenAiSpeech::from_config(config));
    let clip = narrator.speak(&args.text, &args.voice)?;
    let path = clip
        .write_to(&args.out)
        .with_context(|| format!("failed to write audio under {}", args.out.display()))?;
    println!("{}", path.display());
    Ok(0)
}

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Empty,
    Quit,
    Attach(PathBuf),
    Speak(Option<String>),
    Send(String),
}

fn parse_repl_line(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplCommand::Empty;
    }
    if matches!(trimmed, "/quit" | "/exit") {
        return ReplCommand::Quit;
    }
    if let Some(rest) = trimmed.strip_prefix("/attach") {
        let path = rest.trim();
        if !path.is_empty() && (rest.starts_with(' ') || rest.starts_with('\t')) {
            return ReplCommand::Attach(PathBuf::from(path));
        }
    }
    if trimmed == "/speak" {
        return ReplCommand::Speak(None);
    }
    if let Some(voice) = trimmed.strip_prefix("/speak ") {
        let voice = voice.trim();
        return ReplCommand::Speak((!voice.is_empty()).then(|| voice.to_string()));
    }
    ReplCommand::Send(trimmed.to_string())
}

fn run_chat(config: &EngineConfig, args: ChatArgs) -> Result<()> {
    let events = EventWriter::optional(args.events.clone(), session_id("chat"));
    let session = ChatSession::new(OpenRouterChat::from_config(config)).with_events(events.clone());
    let narrator = Narrator::new(OpenAiSpeech::from_config(config)).with_events(events);

    if let Some(greeting) = session.last_assistant_text() {
        println!("assistant> {greeting}");
    }

    let stdin = io::stdin();
    let mut line = String::new();
    let mut attachment: Option<PathBuf> = None;
    loop {
        print!("you> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match parse_repl_line(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => break,
            ReplCommand::Attach(path) => {
                println!("attached {}", path.display());
                attachment = Some(path);
            }
            ReplCommand::Speak(voice) => {
                let Some(text) = session.last_assistant_text() else {
                    continue;
                };
                let voice = voice.unwrap_or_else(|| args.voice.clone());
                match narrator
                    .speak(&text, &voice)
                    .map_err(anyhow::Error::from)
                    .and_then(|clip| {
                        clip.write_to(&args.audio_out).map_err(anyhow::Error::from)
                    })
                {
                    Ok(path) => println!("audio: {}", path.display()),
                    Err(err) => eprintln!("speech failed: {err:#}"),
                }
            }
            ReplCommand::Send(text) => {
                let outcome = match session.send_message(&text, attachment.as_deref()) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        eprintln!("{err}");
                        continue;
                    }
                };
                attachment = None;
                if let Reconciliation::Fallback { reason } = &outcome.reconciliation {
                    tracing::debug!("fallback reply used: {reason}");
                }
                println!("assistant> {}", outcome.assistant.text());
            }
        }
    }
    Ok(())
}
