use anyhow::{anyhow, Context, Result};
use std::cell::RefCell;
use tracing::{debug, info};

use crate::models::JobRecord;

pub const DEFAULT_DEEP_LINK_BASE: &str = "https://wa.me/?text=";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharePolicy {
    /// Text only; the caller copies it somewhere.
    Clipboard,
    /// Text is URL-encoded and appended to `base`.
    DeepLink { base: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePayload {
    pub text: String,
    pub target_url: Option<String>,
}

pub fn share_text(job: &JobRecord) -> String {
    format!(
        "Check out this {} at {}\nLink: {}",
        job.title, job.company, job.job_url
    )
}

pub fn compose_share(job: &JobRecord, policy: &SharePolicy) -> SharePayload {
    let text = share_text(job);
    let target_url = match policy {
        SharePolicy::Clipboard => None,
        SharePolicy::DeepLink { base } => Some(format!("{}{}", base, encode_component(&text))),
    };
    SharePayload { text, target_url }
}

/// Percent-encodes like a URI component: spaces become `%20`, not `+`.
fn encode_component(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

// --- Delivery channels ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareReceipt {
    Copied,
    Opened(String),
    Printed,
}

impl ShareReceipt {
    pub fn confirmation(&self) -> String {
        match self {
            ShareReceipt::Copied => "Job link & message copied! Send it to your friend.".to_string(),
            ShareReceipt::Opened(url) => format!("Opened share link: {}", url),
            ShareReceipt::Printed => "Share message printed.".to_string(),
        }
    }
}

pub trait ShareChannel {
    fn deliver(&self, payload: &SharePayload) -> Result<ShareReceipt>;
}

pub fn share_job(
    job: &JobRecord,
    policy: &SharePolicy,
    channel: &dyn ShareChannel,
) -> Result<ShareReceipt> {
    let payload = compose_share(job, policy);
    let receipt = channel
        .deliver(&payload)
        .with_context(|| format!("Failed to share job {}", job.id))?;
    info!(id = %job.id, ?receipt, "job shared");
    Ok(receipt)
}

/// Write access to a system clipboard.
pub trait Clipboard {
    fn set_text(&mut self, text: &str) -> Result<()>;
}

/// System clipboard using arboard, opened on first use and kept for the
/// session so the copied text outlives the call.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        let mut clipboard = match self.inner.take() {
            Some(clipboard) => clipboard,
            None => arboard::Clipboard::new()
                .context("Clipboard is unavailable, try --share print")?,
        };
        let result = clipboard
            .set_text(text.to_string())
            .context("Failed to copy to clipboard");
        self.inner = Some(clipboard);
        result
    }
}

pub struct ClipboardChannel<C: Clipboard = SystemClipboard> {
    clipboard: RefCell<C>,
}

impl ClipboardChannel<SystemClipboard> {
    pub fn system() -> Self {
        Self::new(SystemClipboard::default())
    }
}

impl<C: Clipboard> ClipboardChannel<C> {
    pub fn new(clipboard: C) -> Self {
        Self {
            clipboard: RefCell::new(clipboard),
        }
    }
}

impl<C: Clipboard> ShareChannel for ClipboardChannel<C> {
    fn deliver(&self, payload: &SharePayload) -> Result<ShareReceipt> {
        self.clipboard.borrow_mut().set_text(&payload.text)?;
        Ok(ShareReceipt::Copied)
    }
}

/// Opens `target_url` with the default browser or URL handler.
pub struct DeepLinkChannel {
    open: fn(&str) -> Result<()>,
}

impl Default for DeepLinkChannel {
    fn default() -> Self {
        Self {
            open: open_external,
        }
    }
}

impl ShareChannel for DeepLinkChannel {
    fn deliver(&self, payload: &SharePayload) -> Result<ShareReceipt> {
        let url = payload
            .target_url
            .as_deref()
            .ok_or_else(|| anyhow!("Share payload has no deep link"))?;
        (self.open)(url)?;
        Ok(ShareReceipt::Opened(url.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct PrintChannel;

impl ShareChannel for PrintChannel {
    fn deliver(&self, payload: &SharePayload) -> Result<ShareReceipt> {
        println!("{}", payload.text);
        if let Some(url) = &payload.target_url {
            println!("\nShare link: {}", url);
        }
        Ok(ShareReceipt::Printed)
    }
}

/// Opens a URL (share deep link or apply link) unmodified.
pub fn open_external(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(anyhow!("No link to open"));
    }
    webbrowser::open(url).with_context(|| format!("Failed to open {}", url))?;
    debug!(url, "opened link");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobAnalysis;

    fn sample_job() -> JobRecord {
        JobRecord {
            id: "9".to_string(),
            title: "React Developer".to_string(),
            company: "Initech & Co".to_string(),
            location: "Pune".to_string(),
            site: "indeed".to_string(),
            found_at: None,
            date_posted: None,
            job_url: "https://example.com/jobs?id=9".to_string(),
            analysis: JobAnalysis {
                share_message: "ignored by the template".to_string(),
                ..JobAnalysis::default()
            },
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        delivered: RefCell<Vec<SharePayload>>,
    }

    impl ShareChannel for RecordingChannel {
        fn deliver(&self, payload: &SharePayload) -> Result<ShareReceipt> {
            self.delivered.borrow_mut().push(payload.clone());
            Ok(ShareReceipt::Copied)
        }
    }

    struct FailingChannel;

    impl ShareChannel for FailingChannel {
        fn deliver(&self, _payload: &SharePayload) -> Result<ShareReceipt> {
            Err(anyhow!("no clipboard"))
        }
    }

    #[test]
    fn test_compose_clipboard_has_no_target() {
        let payload = compose_share(&sample_job(), &SharePolicy::Clipboard);
        assert_eq!(
            payload.text,
            "Check out this React Developer at Initech & Co\nLink: https://example.com/jobs?id=9"
        );
        assert_eq!(payload.target_url, None);
    }

    #[test]
    fn test_compose_deep_link_encodes_text() {
        let policy = SharePolicy::DeepLink {
            base: DEFAULT_DEEP_LINK_BASE.to_string(),
        };
        let payload = compose_share(&sample_job(), &policy);
        assert_eq!(
            payload.target_url.as_deref(),
            Some(
                "https://wa.me/?text=Check%20out%20this%20React%20Developer%20at%20Initech%20%26%20Co%0ALink%3A%20https%3A%2F%2Fexample.com%2Fjobs%3Fid%3D9"
            )
        );
    }

    #[test]
    fn test_compose_is_deterministic() {
        let policy = SharePolicy::DeepLink {
            base: "sms:?body=".to_string(),
        };
        assert_eq!(
            compose_share(&sample_job(), &policy),
            compose_share(&sample_job(), &policy)
        );
    }

    #[test]
    fn test_compose_with_empty_fields() {
        let job: JobRecord = serde_json::from_str(r#"{"id": "e"}"#).unwrap();
        let payload = compose_share(&job, &SharePolicy::Clipboard);
        assert_eq!(payload.text, "Check out this  at \nLink: ");
    }

    #[test]
    fn test_encode_component_keeps_literal_plus() {
        assert_eq!(encode_component("C++ dev"), "C%2B%2B%20dev");
    }

    #[test]
    fn test_share_job_hands_payload_to_channel() {
        let channel = RecordingChannel::default();
        let receipt = share_job(&sample_job(), &SharePolicy::Clipboard, &channel).unwrap();
        assert_eq!(receipt, ShareReceipt::Copied);
        assert_eq!(channel.delivered.borrow().len(), 1);
        assert!(channel.delivered.borrow()[0].text.contains("React Developer"));
    }

    #[test]
    fn test_share_job_surfaces_channel_error() {
        let err = share_job(&sample_job(), &SharePolicy::Clipboard, &FailingChannel).unwrap_err();
        assert!(err.to_string().contains("Failed to share job 9"));
    }

    #[derive(Default)]
    struct FakeClipboard {
        contents: Option<String>,
        broken: bool,
    }

    impl Clipboard for FakeClipboard {
        fn set_text(&mut self, text: &str) -> Result<()> {
            if self.broken {
                return Err(anyhow!("no display"));
            }
            self.contents = Some(text.to_string());
            Ok(())
        }
    }

    fn open_ok(_url: &str) -> Result<()> {
        Ok(())
    }

    fn open_fails(url: &str) -> Result<()> {
        Err(anyhow!("no handler for {}", url))
    }

    #[test]
    fn test_clipboard_channel_copies_text() {
        let channel = ClipboardChannel::new(FakeClipboard::default());
        let payload = compose_share(&sample_job(), &SharePolicy::Clipboard);

        assert_eq!(channel.deliver(&payload).unwrap(), ShareReceipt::Copied);
        assert_eq!(
            channel.clipboard.borrow().contents.as_deref(),
            Some(payload.text.as_str())
        );
    }

    #[test]
    fn test_clipboard_failure_reaches_caller() {
        let channel = ClipboardChannel::new(FakeClipboard {
            broken: true,
            ..FakeClipboard::default()
        });
        let err = share_job(&sample_job(), &SharePolicy::Clipboard, &channel).unwrap_err();
        assert!(format!("{:#}", err).contains("no display"));
    }

    #[test]
    fn test_deep_link_channel_requires_target() {
        let payload = compose_share(&sample_job(), &SharePolicy::Clipboard);
        assert!(DeepLinkChannel { open: open_ok }.deliver(&payload).is_err());
    }

    #[test]
    fn test_deep_link_channel_opens_target() {
        let policy = SharePolicy::DeepLink {
            base: DEFAULT_DEEP_LINK_BASE.to_string(),
        };
        let payload = compose_share(&sample_job(), &policy);
        let receipt = DeepLinkChannel { open: open_ok }.deliver(&payload).unwrap();
        assert_eq!(receipt, ShareReceipt::Opened(payload.target_url.clone().unwrap()));

        assert!(DeepLinkChannel { open: open_fails }.deliver(&payload).is_err());
    }

    #[test]
    fn test_open_external_rejects_empty_link() {
        assert!(open_external("").is_err());
        assert!(open_external("   ").is_err());
    }

    #[test]
    fn test_confirmation_messages() {
        assert_eq!(
            ShareReceipt::Copied.confirmation(),
            "Job link & message copied! Send it to your friend."
        );
        assert!(ShareReceipt::Opened("x".to_string()).confirmation().contains("x"));
    }
}
