pub mod email;
pub mod matcher;
pub mod notification_worker;
pub mod notifier;

pub use email::{EmailSender, LogEmailSender};
pub use notifier::{DispatchReport, NotificationDispatcher};
