//! REST client for the monitoring-sheet backend.
//!
//! [`Gateway`] speaks HTTP through a [`Transport`]; [`SheetClient`] runs the
//! page workflows on top of it and reports outcomes through a [`Notifier`].

mod error;
mod gateway;
mod notify;
mod transport;
mod workflow;

pub use error::{humanize_field, ApiError, ErrorBody, GENERIC_FAILURE};
pub use gateway::{csrf_token_from_cookie, FormQuery, Gateway, PatientQuery, PrintTarget};
pub use notify::{MemoryNotifier, Notice, NoticeLevel, Notifier, TracingNotifier};
pub use transport::{HttpRequest, HttpResponse, MemoryTransport, Method, ReqwestTransport, Transport};
pub use workflow::{LookupOutcome, LookupReport, SaveReport, SheetClient, WorkflowError};
