//! Server configuration.
//!
//! Everything comes from environment variables. Optional services degrade
//! instead of aborting startup: a missing `DATABASE_URL` disables database
//! features, missing storage/mail/push variables disable those subsystems,
//! and the affected endpoints answer 503.

use sqlx::PgPool;

/// Database configuration result: the pool when configured, `None`
/// otherwise.
pub type DatabaseConfig = Option<PgPool>;

/// Connect to PostgreSQL and run migrations.
///
/// Errors are logged but never abort startup; the server runs without
/// database features when connecting fails.
pub async fn load_database() -> DatabaseConfig {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, database features disabled");
            return None;
        }
    };

    tracing::info!("connecting to database");
    let pool = match PgPool::connect(&database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("failed to create database pool: {:?}", e);
            tracing::warn!("database features disabled");
            return None;
        }
    };

    tracing::info!("running database migrations");
    match sqlx::migrate!().run(&pool).await {
        Ok(()) => tracing::info!("database migrations complete"),
        Err(e) => {
            // Migrations may have been applied out-of-band already.
            tracing::error!("failed to run migrations: {:?}", e);
            tracing::warn!("continuing without migrations");
        }
    }

    Some(pool)
}

/// Object storage settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// CDN base URL for public links; bucket URL is used when unset
    pub cdn_base: Option<String>,
}

impl StorageConfig {
    pub fn from_env() -> Option<Self> {
        let bucket = std::env::var("AWS_BUCKET_NAME").ok()?;
        let region = std::env::var("AWS_REGION").ok()?;
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        Some(Self {
            bucket,
            region,
            access_key,
            secret_key,
            cdn_base: std::env::var("CLOUDFRONT_URL").ok().filter(|v| !v.is_empty()),
        })
    }
}

/// SMTP settings for outbound mail
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// `From` mailbox, e.g. `Branchtalk <no-reply@example.com>`
    pub from: String,
}

impl MailConfig {
    pub fn from_env() -> Option<Self> {
        let username = std::env::var("MAIL_USER").ok()?;
        let password = std::env::var("MAIL_PASS").ok()?;
        let host = std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string());
        let port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(465);
        let from = std::env::var("MAIL_FROM")
            .unwrap_or_else(|_| format!("Branchtalk <{}>", username));
        Some(Self {
            host,
            port,
            username,
            password,
            from,
        })
    }
}

/// FCM service-account settings
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Path to the service account key JSON
    pub key_path: String,
    /// Google Cloud project id
    pub project_id: String,
}

impl PushConfig {
    pub fn from_env() -> Option<Self> {
        let key_path = std::env::var("SERVICE_ACCOUNT_KEY_PATH").ok()?;
        let project_id = std::env::var("GOOGLE_PROJECT_ID").ok()?;
        Some(Self {
            key_path,
            project_id,
        })
    }
}

/// Listen port (`SERVER_PORT`, default 8000).
pub fn server_port() -> u16 {
    std::env::var("SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000)
}
