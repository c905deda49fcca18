//! Background work of the order pipeline.
//!
//! Nothing here runs inside a request. The crate provides:
//! 1. [`UploadThrottler`]: at most N concurrent object-storage uploads, FIFO beyond that
//! 2. [`Uploader`]: records upload results on orders and catalog records
//! 3. [`DecisionDispatcher`]: claims and sends decision emails on a timer
//! 4. [`Reconciler`]: fails uploads lost to a restart
//!
//! External collaborators sit behind the [`ObjectStorage`] and [`Mailer`] traits;
//! [`SmtpMailer`] is the production mailer.

pub mod dispatcher;
pub mod error;
pub mod reconciler;
pub mod services;
pub mod throttler;
pub mod uploader;

pub use dispatcher::{DecisionDispatcher, DispatchConfig, SweepReport};
pub use error::{FulfillmentError, MailError, UploadError};
pub use reconciler::{ReconcileConfig, ReconcileReport, Reconciler, UPLOAD_INTERRUPTED};
pub use services::{
    DecisionMessage, FilesystemStorage, InMemoryMailer, InMemoryStorage, Mailer, ObjectStorage,
    SendReport, SkipReason, SmtpMailer, SmtpSettings, StoredObject,
};
pub use throttler::UploadThrottler;
pub use uploader::{CatalogChanged, UploadFolders, Uploader};
