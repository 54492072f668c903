use crate::api;
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub session_key: SecretString,
    pub session_ttl_seconds: i64,
    pub frontend_url: String,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = api::handlers::auth::AuthConfig::new(args.frontend_url)
        .with_session_ttl_seconds(args.session_ttl_seconds);

    api::serve(args.port, args.dsn, args.session_key, auth_config).await
}
