pub mod server;

use crate::api::handlers::auth::AuthConfig;
use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        signing_secret: SecretString,
        config: AuthConfig,
    },
}
