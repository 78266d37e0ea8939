//! Bounded diagnostics collected during a build.

/// How much the pipeline reports to a [`BuildLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageDetail {
    /// Nothing is recorded.
    None,
    /// Errors and warnings.
    #[default]
    Brief,
    /// Errors, warnings and a summary of the build.
    Summary,
    /// Everything, including the state after each stage.
    Trace,
}

/// The category of a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// Informational message about the progress of a build.
    Progress,
    /// Something unexpected happened, but the build continued.
    Warning,
    /// The build failed.
    Error,
}

/// A single recorded message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct LogMessage {
    /// The category of the message.
    pub severity: Severity,
    /// The message text, possibly truncated to fit the text pool.
    pub text: String,
}

/// A caller-owned, append-only message recorder with a fixed capacity.
///
/// The log holds at most [`BuildLog::MAX_MESSAGES`] messages and [`BuildLog::MESSAGE_POOL_SIZE`] bytes of text,
/// where every message also occupies one byte for its terminator. Messages that arrive after either limit
/// is reached are dropped. A message that only partially fits is truncated.
///
/// Every message is also forwarded to [`tracing`], whether or not it fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLog {
    detail: MessageDetail,
    messages: Vec<LogMessage>,
    pool_len: usize,
}

impl Default for BuildLog {
    fn default() -> Self {
        Self::new(MessageDetail::default())
    }
}

impl BuildLog {
    /// The maximum number of messages the log holds.
    pub const MAX_MESSAGES: usize = 1000;
    /// The number of bytes of text the log holds, terminators included.
    pub const MESSAGE_POOL_SIZE: usize = 12000;

    /// Creates an empty log that records messages up to the given detail.
    pub fn new(detail: MessageDetail) -> Self {
        Self {
            detail,
            messages: Vec::new(),
            pool_len: 0,
        }
    }

    /// Creates a log that records nothing.
    pub fn disabled() -> Self {
        Self::new(MessageDetail::None)
    }

    /// The detail requested for this log.
    pub fn detail(&self) -> MessageDetail {
        self.detail
    }

    /// Whether messages are recorded at all.
    pub fn is_enabled(&self) -> bool {
        self.detail > MessageDetail::None
    }

    /// Whether the caller asked for messages of the given detail.
    pub fn wants(&self, detail: MessageDetail) -> bool {
        self.is_enabled() && self.detail >= detail
    }

    /// Records a message. Does nothing when the log is disabled.
    pub fn log(&mut self, severity: Severity, message: impl Into<String>) {
        if !self.is_enabled() {
            return;
        }
        let mut text = message.into();
        match severity {
            Severity::Progress => tracing::debug!("{text}"),
            Severity::Warning => tracing::warn!("{text}"),
            Severity::Error => tracing::error!("{text}"),
        }

        if self.messages.len() >= Self::MAX_MESSAGES {
            return;
        }
        // At least one byte of text plus the terminator has to fit.
        let remaining = Self::MESSAGE_POOL_SIZE - self.pool_len;
        if remaining < 2 || text.is_empty() {
            return;
        }
        if text.len() + 1 > remaining {
            let mut end = remaining - 1;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            if end == 0 {
                return;
            }
            text.truncate(end);
        }
        self.pool_len += text.len() + 1;
        self.messages.push(LogMessage { severity, text });
    }

    /// Records a [`Severity::Progress`] message.
    pub fn progress(&mut self, message: impl Into<String>) {
        self.log(Severity::Progress, message);
    }

    /// Records a [`Severity::Warning`] message.
    pub fn warning(&mut self, message: impl Into<String>) {
        self.log(Severity::Warning, message);
    }

    /// Records a [`Severity::Error`] message.
    pub fn error(&mut self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    /// Removes every message. The detail is kept.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.pool_len = 0;
    }

    /// The recorded messages in the order they were logged.
    pub fn messages(&self) -> &[LogMessage] {
        &self.messages
    }

    /// The number of recorded messages.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// The number of bytes of the text pool in use, terminators included.
    pub fn pool_len(&self) -> usize {
        self.pool_len
    }

    /// Iterates over the text of every message of the given severity.
    pub fn texts(&self, severity: Severity) -> impl Iterator<Item = &str> + '_ {
        self.messages
            .iter()
            .filter(move |message| message.severity == severity)
            .map(|message| message.text.as_str())
    }
}
