//! `sqlx` backed client for MariaDB members
//!
//! Members are addressed through the headless internal Service, so each pod
//! has a stable DNS name: `<pod>.<name>-internal.<namespace>.svc.<cluster>`.
//! Every client owns a single-connection pool that is closed on drop.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, ResourceExt};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use tracing::debug;

use super::{
    SqlClient, SqlClientFactory, SqlError, SqlResult, parse_enabled, validate_variable_name,
};
use crate::crd::MariaDB;
use crate::resources::common::{ROOT_PASSWORD_KEY, member_host, root_password_secret_name};

const ROOT_USER: &str = "root";

/// Client bound to one member
pub struct MySqlClient {
    pool: MySqlPool,
}

impl MySqlClient {
    pub async fn connect(options: MySqlConnectOptions, timeout: Duration) -> SqlResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await
            .map_err(|e| SqlError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SqlClient for MySqlClient {
    async fn is_system_variable_enabled(&self, name: &str) -> SqlResult<bool> {
        validate_variable_name(name)?;
        let sql = format!("SELECT CAST(@@global.{name} AS CHAR)");
        let value: Option<String> = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SqlError::Query(e.to_string()))?;
        parse_enabled(name, value.as_deref().unwrap_or_default())
    }

    async fn galera_cluster_size(&self) -> SqlResult<i32> {
        let row: Option<(String, String)> =
            sqlx::query_as("SHOW GLOBAL STATUS LIKE 'wsrep_cluster_size'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| SqlError::Query(e.to_string()))?;

        // A server without the Galera provider loaded does not report the variable
        let Some((_, value)) = row else {
            return Ok(0);
        };
        value
            .trim()
            .parse::<i32>()
            .map_err(|_| SqlError::UnexpectedValue {
                name: "wsrep_cluster_size".to_string(),
                value,
            })
    }
}

impl Drop for MySqlClient {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { pool.close().await });
        }
    }
}

/// Opens root connections to members, reading the password from the cluster Secret
#[derive(Clone)]
pub struct MySqlClientFactory {
    client: Client,
    cluster_name: String,
    connect_timeout: Duration,
}

impl MySqlClientFactory {
    pub fn new(client: Client, cluster_name: impl Into<String>) -> Self {
        Self {
            client,
            cluster_name: cluster_name.into(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn root_password(&self, mariadb: &MariaDB) -> SqlResult<String> {
        let namespace = mariadb.namespace().unwrap_or_default();
        let secret_name = root_password_secret_name(&mariadb.name_any());
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);

        let secret = secrets
            .get_opt(&secret_name)
            .await?
            .ok_or_else(|| SqlError::SecretNotFound(format!("{namespace}/{secret_name}")))?;
        let bytes = secret
            .data
            .as_ref()
            .and_then(|data| data.get(ROOT_PASSWORD_KEY))
            .ok_or_else(|| SqlError::SecretMissingKey(ROOT_PASSWORD_KEY.to_string()))?;

        String::from_utf8(bytes.0.clone()).map_err(|_| SqlError::InvalidUtf8)
    }
}

#[async_trait]
impl SqlClientFactory for MySqlClientFactory {
    async fn connect(&self, mariadb: &MariaDB, pod_name: &str) -> SqlResult<Box<dyn SqlClient>> {
        let password = self.root_password(mariadb).await?;
        let host = member_host(mariadb, pod_name, &self.cluster_name);
        debug!(host = %host, "connecting to MariaDB member");

        let port = u16::try_from(mariadb.spec.port)
            .map_err(|_| SqlError::InvalidPort(mariadb.spec.port))?;
        let options = MySqlConnectOptions::new()
            .host(&host)
            .port(port)
            .username(ROOT_USER)
            .password(&password);

        let client = MySqlClient::connect(options, self.connect_timeout).await?;
        Ok(Box::new(client))
    }
}
