use clap::{Parser, Subcommand};

/// wordtail: follow a wordcast event stream from the terminal
#[derive(Parser, Debug)]
#[command(name = "wordtail")]
#[command(version)]
#[command(about = "Print a wordcast event stream, or check it against the full text")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print every event as `[name] data` until the stream ends
    Listen {
        /// Event-stream endpoint to connect to
        #[arg(long, env = "WORDCAST_URL", default_value = "http://127.0.0.1:8787/sse")]
        url: String,
    },

    /// Check that the stream reproduces /text word for word
    Parity {
        /// Base URL of the wordcast server
        #[arg(long, env = "WORDCAST_BASE_URL", default_value = "http://127.0.0.1:8787")]
        base_url: String,

        /// Give up if the stream has not finished after this many seconds
        #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u64).range(1..))]
        timeout_secs: u64,
    },
}

impl Cli {
    /// Parse CLI arguments from the environment
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
