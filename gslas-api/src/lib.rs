pub mod api_docs;
pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod mail_relay;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use extract::ApiJson;
pub use mail_relay::{start_mail_relay_task, MailTransport, SpoolTransport};
pub use routes::create_app;
pub use state::AppState;
