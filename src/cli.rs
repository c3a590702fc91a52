use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ev-quote", version, about = "EV charging installation price estimator")]
pub struct Cli {
    /// Directory holding saved assumptions and contact details
    #[arg(long, env = "EV_QUOTE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory quote documents are exported to
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Simulated latency of the lead intake, in milliseconds
    #[arg(long, default_value_t = 1500)]
    pub submit_delay_ms: u64,
}

impl Cli {
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|d| d.join("ev-quote"))
            .unwrap_or_else(|| PathBuf::from(".ev-quote"))
    }
}
