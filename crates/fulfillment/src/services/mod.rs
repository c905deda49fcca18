//! External collaborator traits and their local implementations.

pub mod mailer;
pub mod object_storage;
pub mod smtp;

pub use mailer::{DecisionMessage, InMemoryMailer, Mailer, SendReport, SkipReason};
pub use object_storage::{FilesystemStorage, InMemoryStorage, ObjectStorage, StoredObject};
pub use smtp::{SmtpMailer, SmtpSettings};
