//! CLI for GemEdit - prompt-driven image editing.

use clap::{Args, Parser, Subcommand};
use gemedit::image::providers::{GeminiEditor, GeminiModel, API_KEY_ENV_VARS};
use gemedit::{view, GenerateOutcome, ImageEditor, Session};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "gemedit")]
#[command(about = "Edit images with a text prompt via Gemini image models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    editor: EditorArgs,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Edit one image and save the result
    Edit(EditArgs),

    /// Interactive editing session
    Session,

    /// Check that the credential and model are accepted
    Check,

    /// List known model identifiers
    Models,
}

#[derive(Args)]
struct EditorArgs {
    /// Model identifier (or "flash" / "pro")
    #[arg(short, long, global = true, default_value = "gemini-2.5-flash-image")]
    model: GeminiModel,

    /// API key (defaults to API_KEY, GEMINI_API_KEY or GOOGLE_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// API base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Request timeout in seconds (no timeout when omitted)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
}

#[derive(Args)]
struct EditArgs {
    /// Image file to edit
    input: PathBuf,

    /// Instruction describing the edit
    prompt: String,

    /// Output file path (defaults to edited-image.<ext>)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; variables may come from the shell.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gemedit=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Edit(args) => {
            let editor = build_editor(&cli.editor)?;
            edit_once(editor, args, cli.json).await?;
        }
        Commands::Session => {
            let editor = build_editor(&cli.editor)?;
            run_session(editor).await?;
        }
        Commands::Check => {
            let editor = build_editor(&cli.editor)?;
            check(editor, cli.json).await?;
        }
        Commands::Models => {
            list_models(cli.json)?;
        }
    }

    Ok(())
}

fn build_editor(args: &EditorArgs) -> anyhow::Result<GeminiEditor> {
    let mut builder = GeminiEditor::builder().model(args.model.clone());
    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref url) = args.base_url {
        builder = builder.base_url(url);
    }
    if let Some(secs) = args.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    let editor = builder.build()?;
    if !editor.has_credential() {
        tracing::warn!(
            "no API key found in {}; generation will fail",
            API_KEY_ENV_VARS.join(", ")
        );
    }
    Ok(editor)
}

async fn edit_once(editor: GeminiEditor, args: EditArgs, json_output: bool) -> anyhow::Result<()> {
    let session = Session::new(editor);
    session.upload_path(&args.input).await?;
    session.edit_prompt(&args.prompt);

    match session.generate().await {
        GenerateOutcome::Succeeded => {}
        GenerateOutcome::Failed(message) => anyhow::bail!(message),
        GenerateOutcome::Rejected(reason) => anyhow::bail!("cannot generate: {reason}"),
        GenerateOutcome::Superseded => anyhow::bail!("generation was superseded"),
    }

    let Some(output) = session.save_edited(args.output.as_deref()).await? else {
        anyhow::bail!("no edited image to save");
    };
    let Some(image) = session.edited() else {
        anyhow::bail!("no edited image to save");
    };

    if json_output {
        let result = serde_json::json!({
            "success": true,
            "input": args.input.display().to_string(),
            "output": output.display().to_string(),
            "media_type": image.media_type(),
            "size_bytes": image.size(),
            "model": session.editor().model().as_str(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Edited image: {} ({}, {} bytes) via {}",
            output.display(),
            image.media_type(),
            image.size(),
            session.editor().name()
        );
    }

    Ok(())
}

/// A line typed at the session prompt.
#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Upload(PathBuf),
    Prompt(String),
    Generate,
    Status,
    Save(Option<PathBuf>),
    Help,
    Quit,
    Unknown(String),
}

impl ReplCommand {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (cmd, rest) = match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };
        Some(match cmd {
            "upload" | "u" if !rest.is_empty() => Self::Upload(PathBuf::from(rest)),
            "prompt" | "p" => Self::Prompt(rest.to_string()),
            "generate" | "g" => Self::Generate,
            "status" | "s" => Self::Status,
            "save" => Self::Save((!rest.is_empty()).then(|| PathBuf::from(rest))),
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        })
    }
}

const SESSION_HELP: &str = "\
Commands:
  upload <path>   select the image to edit
  prompt <text>   describe the edit
  generate        send the image and prompt to the model
  status          show both panels
  save [path]     save the edited image (default edited-image.<ext>)
  quit            leave the session";

async fn run_session(editor: GeminiEditor) -> anyhow::Result<()> {
    let session = Arc::new(Session::new(editor));
    println!("{SESSION_HELP}\n");
    print!("{}", view::render(&session.snapshot()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command) = ReplCommand::parse(&line) else {
            continue;
        };
        match command {
            ReplCommand::Upload(path) => match session.upload_path(path).await {
                Ok(()) => print!("{}", view::render(&session.snapshot())),
                Err(e) => println!("{e}"),
            },
            ReplCommand::Prompt(text) => session.edit_prompt(text),
            ReplCommand::Generate => {
                if let Some(reason) = session.snapshot().reject_reason() {
                    println!("Cannot generate: {reason}");
                    continue;
                }
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    match session.generate().await {
                        GenerateOutcome::Succeeded | GenerateOutcome::Failed(_) => {
                            print!("\n{}", view::render(&session.snapshot()));
                        }
                        GenerateOutcome::Rejected(reason) => println!("Cannot generate: {reason}"),
                        GenerateOutcome::Superseded => {}
                    }
                });
                println!("{}", view::LOADING_TEXT);
            }
            ReplCommand::Status => print!("{}", view::render(&session.snapshot())),
            ReplCommand::Save(path) => match session.save_edited(path.as_deref()).await {
                Ok(Some(saved)) => println!("Saved {}", saved.display()),
                Ok(None) => println!("Nothing to save yet."),
                Err(e) => println!("{e}"),
            },
            ReplCommand::Help => println!("{SESSION_HELP}"),
            ReplCommand::Quit => break,
            ReplCommand::Unknown(input) => println!("Unknown command: {input} (try 'help')"),
        }
    }

    Ok(())
}

async fn check(editor: GeminiEditor, json_output: bool) -> anyhow::Result<()> {
    let result = editor.health_check().await;

    if json_output {
        let value = serde_json::json!({
            "model": editor.model().as_str(),
            "ok": result.is_ok(),
            "error": result.as_ref().err().map(|e| e.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        match &result {
            Ok(()) => println!("✓ {} ({})", editor.name(), editor.model()),
            Err(e) => println!("✗ {} ({}): {e}", editor.name(), editor.model()),
        }
    }

    result.map_err(Into::into)
}

fn list_models(json_output: bool) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct ModelInfo {
        id: String,
        default: bool,
    }

    let models: Vec<ModelInfo> = GeminiModel::known()
        .into_iter()
        .map(|m| ModelInfo {
            default: m == GeminiModel::default(),
            id: m.as_str().to_string(),
        })
        .collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else {
        println!("Known models:\n");
        for m in &models {
            let marker = if m.default { " (default)" } else { "" };
            println!("  {}{}", m.id, marker);
        }
        println!("\nAPI key: {}", API_KEY_ENV_VARS.join(" | "));
    }

    Ok(())
}
