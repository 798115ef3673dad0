use crate::schema::is_valid_identifier;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub schema: String,
    pub migrations_table: String,
    pub max_connections: u32,
    pub host: String,
    pub port: u16,
    pub admin_token: Option<String>,
    pub log_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // Build database_url from individual fields or use DATABASE_URL if provided
        let database_url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None => {
                let db_host = var("DB_HOST", "localhost");
                let db_port = var("DB_PORT", "5432");
                let db_name = var("DB_NAME", "postgres");
                let db_user = var("DB_USER", "postgres");
                let db_password = var("DB_PASSWORD", "password");

                // URL-encode password to handle special characters
                let encoded_password = urlencoding::encode(&db_password);

                format!(
                    "postgres://{}:{}@{}:{}/{}",
                    db_user, encoded_password, db_host, db_port, db_name
                )
            }
        };

        let schema = var("DB_SCHEMA", "public");
        if !is_valid_identifier(&schema) {
            anyhow::bail!("Invalid DB_SCHEMA: {:?}", schema);
        }

        let migrations_table = var("MIGRATIONS_TABLE", "_schema_migrations");
        if !is_valid_identifier(&migrations_table) {
            anyhow::bail!("Invalid MIGRATIONS_TABLE: {:?}", migrations_table);
        }

        let max_connections = var("MAX_CONNECTIONS", "4").parse().unwrap_or(4);
        let host = var("MIGRATOR_HOST", "127.0.0.1");
        let port = var("MIGRATOR_PORT", "9100").parse().unwrap_or(9100);

        let admin_token = lookup("ADMIN_TOKEN").filter(|t| !t.is_empty());

        let log_dir = PathBuf::from(var("LOG_DIR", "./logs"));

        Ok(Config {
            database_url,
            schema,
            migrations_table,
            max_connections,
            host,
            port,
            admin_token,
            log_dir,
        })
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("Invalid socket address: {}", e))
    }

    /// Database name taken from the last path segment of the URL, for log and error context.
    pub fn database_name(&self) -> String {
        let tail = self
            .database_url
            .rsplit('/')
            .next()
            .unwrap_or(&self.database_url);
        tail.split('?').next().unwrap_or(tail).to_string()
    }
}
