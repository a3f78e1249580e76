//! Relational audit provider
//!
//! Stores one row per event: the event id in the key column, the serialized
//! event in the data column, and optional custom columns filled from the
//! event time and caller context. Runs over `sqlx::AnyPool`, so the same code
//! serves PostgreSQL and SQLite; all values are bound as text.

use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use super::AuditProvider;
use crate::context::{attributes, AuditContext, SharedContext};
use crate::error::{Error, Result};
use crate::event::AuditEvent;

fn default_table() -> String {
    "audit_events".to_string()
}

fn default_key_column() -> String {
    "Id".to_string()
}

fn default_data_column() -> String {
    "Data".to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// Table layout and connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct AuditTableConfig {
    /// `postgres://...` or `sqlite://...` URL
    pub connection_string: String,

    /// Schema qualifying the table, if any
    #[serde(default)]
    pub schema: Option<String>,

    /// Table name
    #[serde(default = "default_table")]
    pub table: String,

    /// Primary key column, receives the event id
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Column holding the event as JSON
    #[serde(default = "default_data_column")]
    pub data_column: String,

    /// Column receiving the write time
    #[serde(default)]
    pub last_update_column: Option<String>,

    /// Column receiving the `IpAddress` attribute
    #[serde(default)]
    pub ip_address_column: Option<String>,

    /// Column receiving the `RoutePath` attribute
    #[serde(default)]
    pub route_data_column: Option<String>,

    /// Column receiving the `UserName` attribute
    #[serde(default)]
    pub user_name_column: Option<String>,

    /// Column receiving the `Role` attribute
    #[serde(default)]
    pub user_role_column: Option<String>,

    /// Column receiving the `RealAccount` attribute
    #[serde(default)]
    pub user_admin_column: Option<String>,

    /// Pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Run `CREATE TABLE IF NOT EXISTS` on connect
    #[serde(default)]
    pub create_table: bool,
}

impl AuditTableConfig {
    /// Defaults for everything but the connection string
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            schema: None,
            table: default_table(),
            key_column: default_key_column(),
            data_column: default_data_column(),
            last_update_column: None,
            ip_address_column: None,
            route_data_column: None,
            user_name_column: None,
            user_role_column: None,
            user_admin_column: None,
            max_connections: default_max_connections(),
            create_table: false,
        }
    }
}

impl fmt::Debug for AuditTableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = self
            .connection_string
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .unwrap_or("?");
        f.debug_struct("AuditTableConfig")
            .field("connection_string", &format!("{}://[REDACTED]", scheme))
            .field("schema", &self.schema)
            .field("table", &self.table)
            .field("key_column", &self.key_column)
            .field("data_column", &self.data_column)
            .field("max_connections", &self.max_connections)
            .field("create_table", &self.create_table)
            .finish_non_exhaustive()
    }
}

/// Source of a custom column value
#[derive(Debug, Clone, Copy)]
enum ColumnSource {
    LastUpdate,
    Attribute(&'static str),
}

/// Statements rendered once from the table config
#[derive(Debug, Clone)]
struct Statements {
    create: String,
    insert: String,
    update: String,
    select: String,
}

/// Row-per-event provider over PostgreSQL or SQLite
pub struct SqlProvider {
    pool: AnyPool,
    config: AuditTableConfig,
    custom: Vec<ColumnSource>,
    statements: Statements,
}

impl fmt::Debug for SqlProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqlProvider {
    /// Open a pool and, if configured, create the table
    pub async fn connect(config: AuditTableConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect(&config.connection_string)
            .await?;

        let provider = Self::new(pool, config)?;
        if provider.config.create_table {
            provider.initialize().await?;
        }

        tracing::info!(
            table = %provider.config.table,
            custom_columns = provider.custom.len(),
            "SQL audit provider connected"
        );
        Ok(provider)
    }

    /// Wrap an existing pool
    pub fn new(pool: AnyPool, config: AuditTableConfig) -> Result<Self> {
        let table = match config.schema.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(schema) => format!("{}.{}", quote_ident(schema)?, quote_ident(&config.table)?),
            None => quote_ident(&config.table)?,
        };
        let key = quote_ident(&config.key_column)?;
        let data = quote_ident(&config.data_column)?;

        let mut custom = Vec::new();
        let mut custom_names = Vec::new();
        for (column, source) in [
            (&config.last_update_column, ColumnSource::LastUpdate),
            (&config.ip_address_column, ColumnSource::Attribute(attributes::IP_ADDRESS)),
            (&config.route_data_column, ColumnSource::Attribute(attributes::ROUTE_PATH)),
            (&config.user_name_column, ColumnSource::Attribute(attributes::USER_NAME)),
            (&config.user_role_column, ColumnSource::Attribute(attributes::ROLE)),
            (&config.user_admin_column, ColumnSource::Attribute(attributes::REAL_ACCOUNT)),
        ] {
            if let Some(name) = column.as_deref().filter(|c| !c.is_empty()) {
                custom_names.push(quote_ident(name)?);
                custom.push(source);
            }
        }

        let mut columns = vec![key.clone(), data.clone()];
        columns.extend(custom_names.iter().cloned());

        let create = format!(
            "CREATE TABLE IF NOT EXISTS {} ({} TEXT PRIMARY KEY, {} TEXT NOT NULL{})",
            table,
            key,
            data,
            custom_names
                .iter()
                .map(|c| format!(", {} TEXT", c))
                .collect::<String>()
        );

        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            (1..=columns.len())
                .map(|i| format!("${}", i))
                .collect::<Vec<_>>()
                .join(", ")
        );

        // data and custom columns take $1..$n, the key comes last
        let assignments = std::iter::once(&data)
            .chain(custom_names.iter())
            .enumerate()
            .map(|(i, c)| format!("{} = ${}", c, i + 1))
            .collect::<Vec<_>>();
        let update = format!(
            "UPDATE {} SET {} WHERE {} = ${}",
            table,
            assignments.join(", "),
            key,
            assignments.len() + 1
        );

        let select = format!("SELECT {} FROM {} WHERE {} = $1", data, table, key);

        Ok(Self {
            pool,
            config,
            custom,
            statements: Statements {
                create,
                insert,
                update,
                select,
            },
        })
    }

    /// Create the audit table if it does not exist
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(&self.statements.create)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Underlying pool
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    fn custom_values(&self, ctx: &dyn AuditContext) -> Vec<String> {
        self.custom
            .iter()
            .map(|source| match source {
                ColumnSource::LastUpdate => Utc::now().to_rfc3339(),
                ColumnSource::Attribute(name) => ctx.attribute(name),
            })
            .collect()
    }
}

#[async_trait]
impl AuditProvider for SqlProvider {
    async fn insert(&self, event: &AuditEvent, ctx: &SharedContext) -> Result<()> {
        let data = serde_json::to_string(event)?;

        let mut query = sqlx::query(&self.statements.insert)
            .bind(event.id.to_string())
            .bind(data);
        for value in self.custom_values(ctx.as_ref()) {
            query = query.bind(value);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn replace(&self, id: Uuid, event: &AuditEvent, ctx: &SharedContext) -> Result<()> {
        let stored = AuditEvent {
            id,
            ..event.clone()
        };
        let data = serde_json::to_string(&stored)?;

        let mut query = sqlx::query(&self.statements.update).bind(data);
        for value in self.custom_values(ctx.as_ref()) {
            query = query.bind(value);
        }
        let result = query.bind(id.to_string()).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "audit event {} in {}",
                id, self.config.table
            )));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AuditEvent>> {
        let row = sqlx::query(&self.statements.select)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.try_get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }
}

/// Double-quote an identifier, doubling embedded quotes
fn quote_ident(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Configuration(
            "SQL identifier must not be empty".to_string(),
        ));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}
