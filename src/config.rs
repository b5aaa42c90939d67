use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub token_expiry_hours: i64,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
            database_url: "sqlite://materials_hub.db".to_string(),
            jwt_secret: "change-me-in-production".to_string(),
            token_expiry_hours: 24 * 7,
            upload_dir: "./uploads".to_string(),
            max_upload_bytes: 50 * 1024 * 1024,
            db_max_connections: 20,
            db_min_connections: 1,
            request_timeout_secs: 30,
        }
    }
}

fn parsed_var<T>(name: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Config::default();

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("⚠️ JWT_SECRET not set, using the built-in development secret");
            defaults.jwt_secret.clone()
        });
        if jwt_secret.is_empty() {
            return Err(AppError::Config("JWT_SECRET must not be empty".to_string()));
        }

        let config = Config {
            server_host: std::env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parsed_var("SERVER_PORT", defaults.server_port)?,
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            jwt_secret,
            token_expiry_hours: parsed_var("TOKEN_EXPIRY_HOURS", defaults.token_expiry_hours)?,
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or(defaults.upload_dir),
            max_upload_bytes: parsed_var("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            db_max_connections: parsed_var("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            db_min_connections: parsed_var("DB_MIN_CONNECTIONS", defaults.db_min_connections)?,
            request_timeout_secs: parsed_var(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
        };

        if config.token_expiry_hours <= 0 {
            return Err(AppError::Config(
                "TOKEN_EXPIRY_HOURS must be positive".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
