use core::fmt::Debug;
use core::time::Duration;
use std::sync::OnceLock;

use anyhow::Context;
use bb8_postgres::{bb8, PostgresConnectionManager};
use tokio_postgres::{
    types::{to_sql_checked, IsNull, Kind, ToSql, Type},
    NoTls,
};

use crate::config::DbConfig;

pub type ConnectionManager = PostgresConnectionManager<NoTls>;
pub type Pool = bb8::Pool<ConnectionManager>;
pub type PooledConnection = bb8::PooledConnection<'static, ConnectionManager>;
pub type DBError = tokio_postgres::Error;
pub type BB8Error = bb8::RunError<DBError>;
pub type DBResult<T> = Result<T, DBError>;

static POOL: OnceLock<Pool> = OnceLock::new();

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the process-global connection pool from the credentials the
/// pointer file names. Startup is the only place this can fail, and failure
/// there is fatal.
pub async fn init_db(config: &DbConfig) -> anyhow::Result<()> {
    let mut pg = config.pg_config()?;
    pg.connect_timeout(CONNECTION_TIMEOUT);

    let manager = PostgresConnectionManager::new(pg, NoTls);
    let pool = Pool::builder()
        .connection_timeout(CONNECTION_TIMEOUT)
        .build(manager)
        .await
        .context("cannot build database pool")?;

    POOL.set(pool)
        .map_err(|_| anyhow::anyhow!("database pool initialised twice"))
}

pub fn get_connection() -> impl std::future::Future<Output = Result<PooledConnection, BB8Error>> {
    POOL.get().expect("database pool not initialised").get()
}

/// Adapts an iterator into a Postgres array parameter, so a whole batch can
/// be appended with a single `unnest(...)` insert.
#[derive(Debug)]
#[repr(transparent)]
pub struct ToSqlIter<T>(pub T);

impl<T, U> ToSql for ToSqlIter<T>
where
    T: ExactSizeIterator<Item = U> + Clone + Debug,
    U: ToSql,
{
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        let Kind::Array(member_type) = ty.kind() else {
            return Err("expected array type".into());
        };

        let dimension = postgres_protocol::types::ArrayDimension {
            len: self.0.len().try_into()?,
            lower_bound: 1,
        };

        postgres_protocol::types::array_to_sql(
            Some(dimension),
            member_type.oid(),
            self.0.clone(),
            |e, w| match e.to_sql(member_type, w)? {
                IsNull::No => Ok(postgres_protocol::IsNull::No),
                IsNull::Yes => Ok(postgres_protocol::IsNull::Yes),
            },
            out,
        )?;
        Ok(IsNull::No)
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
