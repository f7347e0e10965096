use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::emitter::DEFAULT_WORD_INTERVAL;

/// Default for `--word-ms`
const DEFAULT_WORD_MS: u64 = DEFAULT_WORD_INTERVAL.as_millis() as u64;

/// wordcast: paced word-by-word event-stream server
#[derive(Parser, Debug)]
#[command(name = "wordcast")]
#[command(version)]
#[command(
    about = "Serve a text file in full and as a paced word-by-word event stream",
    long_about = "wordcast serves one text file two ways: in full on /text, and one word at a\ntime on /sse as an event stream paced at a fixed interval.\n\nUsage:\n  wordcast                           Start with defaults (port: 8787, 50ms per word)\n  wordcast --port 9000 --word-ms 20  Custom port and pacing\n  PORT=9000 WORD_MS=20 wordcast      Same, from the environment"
)]
pub struct Cli {
    /// Address to bind the HTTP server to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP server to
    #[arg(long, env = "PORT", default_value_t = 8787)]
    pub port: u16,

    /// Delay between successive words on /sse, in milliseconds
    #[arg(
        long,
        env = "WORD_MS",
        default_value_t = DEFAULT_WORD_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub word_ms: u64,

    /// Text file served on /text and streamed on /sse
    #[arg(long = "text", env = "TEXT_PATH", default_value = "text.txt")]
    pub text_path: PathBuf,
}

impl Cli {
    /// Parse CLI arguments from the environment
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Pacing interval between `word` frames
    pub fn word_interval(&self) -> Duration {
        Duration::from_millis(self.word_ms)
    }

    /// `host:port` to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
