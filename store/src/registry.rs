//! Cluster registry: one JSON blob per cluster plus a set tracking which
//! ids are active, the way the teacher's `db.rs` opens a connection and
//! issues plain redis commands rather than going through an ORM.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use scalectl_core::model::Cluster;
use scalectl_core::ports::StoreError;

fn cluster_key(id: &str) -> String {
    format!("scalectl:cluster:{id}")
}

const ACTIVE_SET_KEY: &str = "scalectl:clusters:active";
const ALL_SET_KEY: &str = "scalectl:clusters:all";

pub async fn active_cluster_ids(conn: &mut ConnectionManager) -> Result<Vec<String>, StoreError> {
    conn.smembers(ACTIVE_SET_KEY)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))
}

pub async fn all_cluster_ids(conn: &mut ConnectionManager) -> Result<Vec<String>, StoreError> {
    conn.smembers(ALL_SET_KEY)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))
}

pub async fn get_cluster(conn: &mut ConnectionManager, id: &str) -> Result<Option<Cluster>, StoreError> {
    let raw: Option<String> = conn
        .get(cluster_key(id))
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
    match raw {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| StoreError::Database(e.to_string())),
        None => Ok(None),
    }
}

/// Upserts the cluster record and keeps the active-set membership in sync
/// with `cluster.active`.
pub async fn save_cluster(conn: &mut ConnectionManager, cluster: &Cluster) -> Result<(), StoreError> {
    let json = serde_json::to_string(cluster).map_err(|e| StoreError::Database(e.to_string()))?;
    conn.set(cluster_key(&cluster.id), json)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
    conn.sadd(ALL_SET_KEY, &cluster.id)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

    if cluster.active {
        conn.sadd(ACTIVE_SET_KEY, &cluster.id)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
    } else {
        conn.srem(ACTIVE_SET_KEY, &cluster.id)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
    }
    Ok(())
}

/// Removes a cluster record and its active-set membership entirely. Used by
/// the `delete-cluster` CLI command; time-series data for the cluster is
/// left for the next retention sweep rather than deleted inline.
pub async fn delete_cluster(conn: &mut ConnectionManager, id: &str) -> Result<(), StoreError> {
    conn.del(cluster_key(id))
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
    conn.srem(ACTIVE_SET_KEY, id)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
    conn.srem(ALL_SET_KEY, id)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
    Ok(())
}
