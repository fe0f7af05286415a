use std::env;

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let db_max_connections = match env::var("SITEWATCH_DB_MAX_CONNECTIONS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| "SITEWATCH_DB_MAX_CONNECTIONS must be a positive integer".to_string())?,
            Err(_) => 10,
        };

        Ok(AppConfig {
            database_url,
            db_max_connections,
        })
    }
}
