pub mod authz;
pub mod cascade;
pub mod console;
pub mod effects;
pub mod error;
pub mod finance;
pub mod invoice;
pub mod notify;
pub mod onboarding;
pub mod outbox;
pub mod project;
pub mod provider;
pub mod service;
pub mod settings;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use console::Console;
pub use error::{CascadeError, LifecycleError};
pub use invoice::{Invoice, InvoiceStatus};
pub use service::{InvoiceService, TransitionContext};
