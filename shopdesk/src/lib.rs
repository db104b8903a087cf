pub mod client;
pub mod conversation;
pub mod dashboard;
pub mod error;
pub mod identifiers;
pub mod models;
pub mod notify;
pub mod ops;
pub mod render;
pub mod store;
pub mod supplier;

pub use client::{AuthScheme, Endpoint, RequestMethod, SessionClient};
pub use conversation::{ChargeStep, ConversationStore, LoginStep, PendingAuth, PendingState};
pub use dashboard::{DashboardRange, DateSpan};
pub use error::ApiError;
pub use identifiers::Identity;
pub use models::{Page, TokenPair};
pub use notify::{deliver_all, fan_out, FanOutReport, Notifier, TelegramNotifier};
pub use render::Notification;
pub use store::CredentialStore;
pub use supplier::ExtraCharge;
