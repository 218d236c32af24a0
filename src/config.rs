use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::share::{ClipboardChannel, DeepLinkChannel, PrintChannel, ShareChannel, SharePolicy};

pub const DEFAULT_FEED_URL: &str = "http://localhost:5173/data/jobs.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ShareMode {
    /// Copy the message to the system clipboard
    Clipboard,
    /// Open a messaging deep link carrying the message
    DeepLink,
    /// Print the message to stdout
    Print,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub feed_url: String,
    pub data_dir: PathBuf,
    pub share_mode: ShareMode,
    pub deep_link_base: String,
    pub timeout: Duration,
}

impl Config {
    pub fn resolve(
        feed_url: String,
        data_dir: Option<PathBuf>,
        share_mode: ShareMode,
        deep_link_base: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        if timeout_secs == 0 {
            return Err(anyhow!("--timeout-secs must be at least 1"));
        }
        let data_dir = match data_dir {
            Some(dir) => expand_home(dir),
            None => default_data_dir(),
        };
        Ok(Self {
            feed_url,
            data_dir,
            share_mode,
            deep_link_base,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn share_policy(&self) -> SharePolicy {
        match self.share_mode {
            ShareMode::DeepLink => SharePolicy::DeepLink {
                base: self.deep_link_base.clone(),
            },
            ShareMode::Clipboard | ShareMode::Print => SharePolicy::Clipboard,
        }
    }

    pub fn share_channel(&self) -> Box<dyn ShareChannel> {
        match self.share_mode {
            ShareMode::Clipboard => Box::new(ClipboardChannel::system()),
            ShareMode::DeepLink => Box::new(DeepLinkChannel::default()),
            ShareMode::Print => Box::new(PrintChannel),
        }
    }
}

fn default_data_dir() -> PathBuf {
    // XDG data directory, or the current directory as a fallback
    directories::ProjectDirs::from("", "", "jobfeed")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn expand_home(path: PathBuf) -> PathBuf {
    let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) else {
        return path;
    };
    match directories::BaseDirs::new() {
        Some(base) => base.home_dir().join(rest),
        None => path,
    }
}
