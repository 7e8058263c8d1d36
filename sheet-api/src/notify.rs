//! Non-blocking user notifications (toasts on the page, log lines elsewhere).

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

pub trait Notifier {
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Sends notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Error => tracing::error!(notice = message),
            NoticeLevel::Warning => tracing::warn!(notice = message),
            NoticeLevel::Info | NoticeLevel::Success => tracing::info!(?level, notice = message),
        }
    }
}

/// Keeps notices in memory, for tests and for callers that render them later.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: RefCell<Vec<Notice>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices.borrow().last().cloned()
    }

    pub fn take(&self) -> Vec<Notice> {
        self.notices.take()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notices.borrow_mut().push(Notice {
            level,
            message: message.to_string(),
        });
    }
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn notify(&self, level: NoticeLevel, message: &str) {
        (**self).notify(level, message);
    }
}
