//! Short-lived transactional access to the harness's default database.
//!
//! [`QueryHelper::run`] opens one connection per call, hands the operation a
//! transaction, commits if the operation succeeds and always releases the
//! connection before returning. Anything that needs one ad hoc query against
//! the harness goes through it.

use std::path::Path;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_postgres::{Client, NoTls, Transaction};
use tracing::{debug, error, instrument, warn};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone)]
pub struct QueryHelper {
    user: String,
    host: String,
    port: u16,
}

impl QueryHelper {
    /// Resolve the connecting identity now, so a missing user surfaces as a
    /// configuration error before any query is attempted.
    pub fn new(config: &HarnessConfig, user: Option<&str>) -> HarnessResult<Self> {
        Ok(Self {
            user: config.resolve_owner(user)?,
            host: config.host.clone(),
            port: config.port,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Connection parameters: `dbname` and `user` are both the identity.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(&self.user)
            .application_name("pgtap-harness");
        config
    }

    /// Run `op` inside a transaction on a fresh connection.
    ///
    /// On success the transaction is committed and `op`'s value returned. On
    /// failure nothing is committed; the transaction is rolled back when it
    /// is dropped, and the connection is closed before the error propagates.
    ///
    /// ```no_run
    /// # use pgtap_harness::{HarnessConfig, QueryHelper};
    /// # async fn example() -> pgtap_harness::HarnessResult<()> {
    /// let helper = QueryHelper::new(&HarnessConfig::default(), None)?;
    /// let count: i64 = helper
    ///     .run(|tx| Box::pin(async move {
    ///         let row = tx.query_one("SELECT count(*) FROM pg_proc", &[]).await?;
    ///         Ok::<_, pgtap_harness::HarnessError>(row.get::<_, i64>(0))
    ///     }))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, op), fields(user = %self.user))]
    pub async fn run<T, F>(&self, op: F) -> HarnessResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t Transaction<'t>) -> BoxFuture<'t, HarnessResult<T>> + Send,
    {
        debug!("opening harness connection");
        let (mut client, connection) = self.pg_config().connect(NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!(%err, "harness connection closed with an error");
            }
        });

        let result = in_transaction(&mut client, op).await;

        // Dropping the client lets the connection future finish.
        drop(client);
        if let Err(err) = driver.await {
            warn!(%err, "harness connection task did not shut down cleanly");
        }

        match &result {
            Ok(_) => debug!("committed"),
            Err(err) => error!(%err, "harness query failed, transaction rolled back"),
        }
        result
    }
}

async fn in_transaction<T, F>(client: &mut Client, op: F) -> HarnessResult<T>
where
    F: for<'t> FnOnce(&'t Transaction<'t>) -> BoxFuture<'t, HarnessResult<T>>,
{
    let transaction = client.transaction().await?;
    let value = op(&transaction).await?;
    transaction.commit().await?;
    Ok(value)
}

/// Harness-resident state the test manager records for in-engine scripts.
#[async_trait]
pub trait ProjectState: Send + Sync {
    async fn set_project_path(&self, path: &Path) -> HarnessResult<()>;

    async fn set_virtual_env_dir(&self, path: &Path) -> HarnessResult<()>;

    /// Raw rows of `get_project_path()`, including empty ones.
    async fn project_paths(&self) -> HarnessResult<Vec<Option<String>>>;
}

/// [`ProjectState`] stored through the functions installed by `base.sql`.
#[derive(Debug, Clone)]
pub struct HarnessStateStore {
    helper: QueryHelper,
}

impl HarnessStateStore {
    pub fn new(helper: QueryHelper) -> Self {
        Self { helper }
    }

    pub fn helper(&self) -> &QueryHelper {
        &self.helper
    }

    async fn call_setter(&self, function: &'static str, value: &Path) -> HarnessResult<()> {
        let value = value.display().to_string();
        self.helper
            .run(move |tx| {
                Box::pin(async move {
                    let statement = format!("SELECT {function}($1::text)");
                    tx.execute(statement.as_str(), &[&value]).await?;
                    Ok::<_, HarnessError>(())
                })
            })
            .await
    }
}

#[async_trait]
impl ProjectState for HarnessStateStore {
    async fn set_project_path(&self, path: &Path) -> HarnessResult<()> {
        self.call_setter("set_project_path", path).await
    }

    async fn set_virtual_env_dir(&self, path: &Path) -> HarnessResult<()> {
        self.call_setter("set_virtual_env_dir", path).await
    }

    async fn project_paths(&self) -> HarnessResult<Vec<Option<String>>> {
        self.helper
            .run(|tx| {
                Box::pin(async move {
                    let rows = tx.query("SELECT get_project_path()", &[]).await?;
                    Ok::<_, HarnessError>(
                        rows.iter()
                            .map(|row| row.get::<_, Option<String>>(0))
                            .collect::<Vec<_>>(),
                    )
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_connection_uses_identity_for_user_and_dbname() {
        let config = HarnessConfig {
            port: 55432,
            ..Default::default()
        };
        let helper = QueryHelper::new(&config, Some("alice")).unwrap();
        let pg = helper.pg_config();

        assert_eq!(helper.user(), "alice");
        assert_eq!(pg.get_user(), Some("alice"));
        assert_eq!(pg.get_dbname(), Some("alice"));
        assert_eq!(pg.get_ports(), &[55432]);
    }

    #[test]
    fn test_explicit_identity_resolves_eagerly() {
        let config = HarnessConfig {
            owner_user: Some("configured".into()),
            ..Default::default()
        };
        let helper = QueryHelper::new(&config, None).unwrap();
        assert_eq!(helper.user(), "configured");
    }
}
