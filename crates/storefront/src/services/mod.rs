//! Business logic services for storefront.
//!
//! # Services
//!
//! - `catalog` - Cached product reads
//! - `email` - Transactional email rendering and delivery
//! - `mail_queue` - Background email delivery with retries

pub mod catalog;
pub mod email;
pub mod mail_queue;

pub use catalog::CatalogService;
pub use email::{EmailMessage, LogMailer, MailError, Mailer, SmtpMailer, order_confirmation};
pub use mail_queue::{DeliveryHandle, DeliveryReport, MailQueue};
