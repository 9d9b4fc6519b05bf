use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "duologue")]
#[command(author, version, about = "Relay a live conversation between two LLM personas", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start both agents and their websocket gateways (default)
    Serve,

    /// Print the resolved configuration as JSON
    Config,

    /// Synthesize one utterance to a WAV file
    Speak {
        text: String,

        /// Prebuilt voice name (defaults to the responder's voice)
        #[arg(short, long)]
        voice: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_is_default() {
        let cli = Cli::try_parse_from(["duologue"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_speak_args() {
        let cli = Cli::try_parse_from(["duologue", "speak", "Hello World!", "--voice", "Puck"]).unwrap();
        match cli.command {
            Some(Commands::Speak { text, voice }) => {
                assert_eq!(text, "Hello World!");
                assert_eq!(voice.as_deref(), Some("Puck"));
            }
            _ => panic!("expected speak"),
        }
    }
}
