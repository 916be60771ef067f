use seedroll::TextClient;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::future::Future;
use tokio_postgres::{Client, NoTls};

/// Connection parameters for one configured database.
///
/// Either a `url` or discrete fields; discrete fields override the URL's.
#[derive(Clone, Default, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "port_from_number_or_string")]
    pub port: Option<u16>,
    #[serde(default, alias = "dbname")]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ConnectionConfig {
    pub fn to_pg_config(&self) -> anyhow::Result<tokio_postgres::Config> {
        let mut cfg = match &self.url {
            Some(url) => url
                .parse::<tokio_postgres::Config>()
                .map_err(|e| anyhow::anyhow!("invalid database url: {e}"))?,
            None => tokio_postgres::Config::new(),
        };

        if let Some(host) = &self.host {
            cfg.host(host);
        }
        if let Some(port) = self.port {
            cfg.port(port);
        }
        if let Some(database) = &self.database {
            cfg.dbname(database);
        }
        if let Some(user) = &self.user {
            cfg.user(user);
        }
        if let Some(password) = &self.password {
            cfg.password(password);
        }
        cfg.application_name("seedroll");

        Ok(cfg)
    }

    /// Database name used to label output scripts.
    ///
    /// The explicit `database` field, else the URL's dbname, else `fallback`.
    pub fn database_name(&self, fallback: &str) -> String {
        if let Some(database) = &self.database {
            return database.clone();
        }
        self.url
            .as_deref()
            .and_then(|url| url.parse::<tokio_postgres::Config>().ok())
            .and_then(|cfg| cfg.get_dbname().map(str::to_string))
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn validate(&self, name: &str) -> anyhow::Result<()> {
        let has_url = self.url.as_deref().is_some_and(|u| !u.trim().is_empty());
        let has_host = self.host.as_deref().is_some_and(|h| !h.trim().is_empty());
        if !has_url && !has_host {
            anyhow::bail!("databases.{name} needs either url or host");
        }
        self.to_pg_config()
            .map_err(|e| anyhow::anyhow!("databases.{name}: {e}"))?;
        Ok(())
    }
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(n)) => Ok(Some(n)),
        Some(Port::Text(s)) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {s}"))),
    }
}

/// Opens one session per configured database.
pub trait Connector {
    type Client: TextClient;

    fn connect(
        &self,
        name: &str,
        conn: &ConnectionConfig,
    ) -> impl Future<Output = anyhow::Result<Self::Client>>;
}

/// Plain-TCP PostgreSQL sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

impl Connector for PgConnector {
    type Client = Client;

    async fn connect(&self, name: &str, conn: &ConnectionConfig) -> anyhow::Result<Client> {
        connect_db(name, conn).await
    }
}

/// Open a session; the connection future runs on its own task until the
/// returned client is dropped.
pub async fn connect_db(name: &str, conn: &ConnectionConfig) -> anyhow::Result<Client> {
    let cfg = conn.to_pg_config()?;
    let (client, connection) = cfg
        .connect(NoTls)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to database {name}: {e}"))?;

    let database = name.to_string();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(database = %database, error = %e, "postgres connection error");
        }
    });

    tracing::debug!(database = name, "connected");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ConnectionConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn discrete_fields_and_string_port() {
        let conn = parse(
            r#"{"host": "db.local", "port": "6543", "dbname": "forms", "user": "app", "password": "pw"}"#,
        );
        assert_eq!(conn.port, Some(6543));
        assert_eq!(conn.database_name("forms_key"), "forms");

        let cfg = conn.to_pg_config().unwrap();
        assert_eq!(cfg.get_dbname(), Some("forms"));
        assert_eq!(cfg.get_user(), Some("app"));
        assert_eq!(cfg.get_ports(), &[6543]);
    }

    #[test]
    fn database_name_from_url_or_fallback() {
        let conn = parse(r#"{"url": "postgres://app@localhost:5432/config_db"}"#);
        assert_eq!(conn.database_name("config"), "config_db");

        let conn = parse(r#"{"url": "postgres://app@localhost:5432"}"#);
        assert_eq!(conn.database_name("config"), "config");
    }

    #[test]
    fn validate_requires_url_or_host() {
        assert!(parse(r#"{"database": "forms"}"#).validate("forms").is_err());
        assert!(parse(r#"{"url": "not a url ::"}"#).validate("forms").is_err());
        assert!(parse(r#"{"host": "localhost"}"#).validate("forms").is_ok());
    }

    #[test]
    fn debug_redacts_secrets() {
        let conn = parse(r#"{"url": "postgres://u:secret@h/db", "password": "secret"}"#);
        assert!(!format!("{conn:?}").contains("secret"));
    }
}
