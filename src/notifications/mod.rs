//! Order notifications: email rendering, transports and the outbox dispatcher.

pub mod dispatcher;
pub mod mailer;
pub mod templates;

pub use dispatcher::{DispatchReport, Dispatcher};
pub use mailer::{HttpMailer, LogMailer, MailError, Mailer};
pub use templates::{EmailMessage, Recipient};
