use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::record::{JournalRecord, JournalStatus};

/// Opens (creating if necessary) the journal's sqlite file and applies the
/// schema from §4.5: an append-only `transfers` table plus a `manifests`
/// table holding each transfer's manifest JSON.
pub async fn open(path: &std::path::Path) -> anyhow::Result<SqlitePool> {
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await?;
    apply_schema(&pool).await?;
    Ok(pool)
}

pub async fn open_in_memory() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    apply_schema(&pool).await?;
    Ok(pool)
}

async fn apply_schema(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transfers (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            destination TEXT NOT NULL,
            orcid TEXT NOT NULL,
            start_time TEXT NOT NULL,
            stop_time TEXT NOT NULL,
            status TEXT NOT NULL,
            payload_size_bytes INTEGER NOT NULL,
            num_files INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS manifests (
            id TEXT PRIMARY KEY REFERENCES transfers(id),
            manifest TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Appends `record`. The journal guarantees at most one row per transfer
/// ID; a duplicate insert is an error rather than a silent overwrite.
pub async fn record(pool: &SqlitePool, record: &JournalRecord) -> anyhow::Result<()> {
    let mut txn = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO transfers
            (id, source, destination, orcid, start_time, stop_time, status, payload_size_bytes, num_files)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(&record.source)
    .bind(&record.destination)
    .bind(&record.orcid)
    .bind(record.start_time.to_rfc3339())
    .bind(record.stop_time.to_rfc3339())
    .bind(record.status.as_str())
    .bind(record.payload_size_bytes as i64)
    .bind(record.num_files as i64)
    .execute(&mut *txn)
    .await?;

    sqlx::query("INSERT INTO manifests (id, manifest) VALUES (?, ?)")
        .bind(record.id.to_string())
        .bind(serde_json::to_string(&record.manifest)?)
        .execute(&mut *txn)
        .await?;

    txn.commit().await?;
    Ok(())
}

pub async fn lookup(
    pool: &SqlitePool,
    id: dts_model::TransferId,
) -> anyhow::Result<Option<JournalRecord>> {
    let row = sqlx::query(
        r#"
        SELECT t.source, t.destination, t.orcid, t.start_time, t.stop_time,
               t.status, t.payload_size_bytes, t.num_files, m.manifest
        FROM transfers t
        JOIN manifests m ON m.id = t.id
        WHERE t.id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(row_to_record(id, &row)?))
}

fn row_to_record(id: dts_model::TransferId, row: &SqliteRow) -> anyhow::Result<JournalRecord> {
    Ok(JournalRecord {
        id,
        source: row.try_get("source")?,
        destination: row.try_get("destination")?,
        orcid: row.try_get("orcid")?,
        start_time: chrono::DateTime::parse_from_rfc3339(row.try_get("start_time")?)?
            .with_timezone(&chrono::Utc),
        stop_time: chrono::DateTime::parse_from_rfc3339(row.try_get("stop_time")?)?
            .with_timezone(&chrono::Utc),
        status: JournalStatus::parse(row.try_get("status")?)?,
        payload_size_bytes: row.try_get::<i64, _>("payload_size_bytes")? as u64,
        num_files: row.try_get::<i64, _>("num_files")? as u64,
        manifest: serde_json::from_str(row.try_get("manifest")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_record() -> JournalRecord {
        JournalRecord {
            id: dts_model::TransferId::new(),
            source: "jdp".to_string(),
            destination: "kbase".to_string(),
            orcid: "0000-0001-2345-6789".to_string(),
            start_time: Utc::now(),
            stop_time: Utc::now(),
            status: JournalStatus::Succeeded,
            payload_size_bytes: 12,
            num_files: 3,
            manifest: serde_json::json!({"name": "manifest"}),
        }
    }

    #[tokio::test]
    async fn records_and_looks_up() {
        let pool = open_in_memory().await.unwrap();
        let rec = sample_record();
        record(&pool, &rec).await.unwrap();

        let found = lookup(&pool, rec.id).await.unwrap().unwrap();
        assert_eq!(found.source, "jdp");
        assert_eq!(found.num_files, 3);
        assert_eq!(found.status, JournalStatus::Succeeded);
    }

    #[tokio::test]
    async fn lookup_of_unknown_id_is_none() {
        let pool = open_in_memory().await.unwrap();
        assert!(lookup(&pool, dts_model::TransferId::new())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_record_is_rejected() {
        let pool = open_in_memory().await.unwrap();
        let rec = sample_record();
        record(&pool, &rec).await.unwrap();
        assert!(record(&pool, &rec).await.is_err());
    }
}
