use anyhow::Result;
use clap::Parser;
use duologue::audio::gemini::GeminiSpeech;
use duologue::audio::{RetryingSynthesizer, SpeechSynthesizer};
use duologue::cli::{Cli, Commands};
use duologue::{utils, Orchestrator, Settings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level)),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => handle_serve(settings).await,
        Commands::Config => handle_config(&settings),
        Commands::Speak { text, voice } => handle_speak(&settings, text, voice).await,
    }
}

async fn handle_serve(settings: Settings) -> Result<()> {
    tracing::info!(
        responder_port = settings.gateway.responder_port,
        initiator_port = settings.gateway.initiator_port,
        channel_buffer = settings.system.channel_buffer_size,
        "Starting duologue"
    );
    let running = Orchestrator::new(settings).start().await?;
    utils::print_gateways(running.responder_addr(), running.initiator_addr());

    running.shutdown_on_signal().await?;

    utils::print_success("Stopped");
    Ok(())
}

fn handle_config(settings: &Settings) -> Result<()> {
    utils::print_header("Resolved configuration");
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

async fn handle_speak(settings: &Settings, text: String, voice: Option<String>) -> Result<()> {
    let api_key = Settings::speech_api_key()?;
    let voice = voice.unwrap_or_else(|| settings.audio.responder_voice.clone());

    utils::print_info(&format!("Generating audio for: {:?}", text));

    let speech = RetryingSynthesizer::new(
        GeminiSpeech::new(api_key, &settings.audio, voice, "speak"),
        settings.audio.max_attempts,
    );

    match speech.synthesize(&text).await {
        Ok(path) => {
            utils::print_clip(&path);
            Ok(())
        }
        Err(e) => {
            utils::print_error(&format!("Speech synthesis failed: {}", e));
            Err(e)
        }
    }
}
