//! Configuration, filesystem paths, and logging for the auth session workspace.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    AuthSessionConfig, Config, DEFAULT_LOGIN_PATH, DEFAULT_LOG_LEVEL, DEFAULT_POST_LOGIN_PATH,
    DEFAULT_SESSION_NAME,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
