use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{QueryBuilder, Row};

use common::key::{KeyRange, StateKey};
use common::state::{
    check_block_order, CursorRegistry, Height, Page, Selector, StateDatabase, StateError,
    UpdateBatch, VersionedValue,
};

use super::Database;

/// Rows pulled per round trip while evaluating a rich query
const QUERY_CHUNK_SIZE: usize = 256;

fn provider(e: sqlx::Error) -> StateError {
    StateError::Provider(e.to_string())
}

fn decode_row(row: &SqliteRow) -> Result<(StateKey, VersionedValue), StateError> {
    let key: Vec<u8> = row.get("state_key");
    let key = String::from_utf8(key)
        .map_err(|e| StateError::Provider(format!("stored key is not utf-8: {}", e)))?;
    let value: Vec<u8> = row.get("value");
    let block_num: i64 = row.get("block_num");
    let tx_num: i64 = row.get("tx_num");

    Ok((
        StateKey::from_raw(key),
        VersionedValue {
            value: Bytes::from(value),
            version: Height::new(block_num as u64, tx_num as u64),
        },
    ))
}

/// JSON path for a dotted field name, if it can be written
///  without quoting
fn json_path(field: &str) -> Option<String> {
    let plain = field.split('.').all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
    plain.then(|| format!("$.{}", field))
}

/// Narrow candidate rows in SQL on the string-valued conditions;
///  the selector itself is still applied to every row returned.
fn push_prefilter(builder: &mut QueryBuilder<'_, Sqlite>, selector: &Selector) {
    for (field, value) in selector.conditions() {
        let (Some(path), Value::String(expected)) = (json_path(field), value) else {
            continue;
        };
        builder
            .push(" AND (CASE WHEN json_valid(CAST(value AS TEXT)) THEN json_extract(CAST(value AS TEXT), ")
            .push_bind(path)
            .push(") END) = ")
            .push_bind(expected.clone());
    }
}

#[async_trait]
impl StateDatabase for Database {
    async fn get(&self, key: &StateKey) -> Result<Option<VersionedValue>, StateError> {
        let row = sqlx::query(
            "SELECT state_key, value, block_num, tx_num FROM world_state WHERE state_key = ?",
        )
        .bind(key.as_bytes())
        .fetch_optional(&**self)
        .await
        .map_err(provider)?;

        row.as_ref()
            .map(decode_row)
            .transpose()
            .map(|entry| entry.map(|(_, value)| value))
    }

    async fn scan_page(
        &self,
        range: &KeyRange,
        after: Option<&StateKey>,
        limit: usize,
    ) -> Result<Page, StateError> {
        if limit == 0 || range.is_empty() {
            return Ok(Page::default());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT state_key, value, block_num, tx_num FROM world_state WHERE state_key >= ",
        );
        builder.push_bind(range.start.as_bytes().to_vec());
        builder.push(" AND state_key < ");
        builder.push_bind(range.end.as_bytes().to_vec());
        if let Some(after) = after {
            builder.push(" AND state_key > ");
            builder.push_bind(after.as_bytes().to_vec());
        }
        builder.push(" ORDER BY state_key LIMIT ");
        builder.push_bind((limit + 1) as i64);

        let rows = builder
            .build()
            .fetch_all(&**self)
            .await
            .map_err(provider)?;

        let mut entries = rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;
        let next = if entries.len() > limit {
            entries.truncate(limit);
            entries.last().map(|(key, _)| key.clone())
        } else {
            None
        };
        Ok(Page { entries, next })
    }

    async fn query_page(
        &self,
        selector: &Selector,
        after: Option<&StateKey>,
        limit: usize,
    ) -> Result<Page, StateError> {
        if limit == 0 {
            return Ok(Page::default());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT state_key, value, block_num, tx_num FROM world_state WHERE 1 = 1",
        );
        if let Some(after) = after {
            builder.push(" AND state_key > ");
            builder.push_bind(after.as_bytes().to_vec());
        }
        push_prefilter(&mut builder, selector);
        builder.push(" ORDER BY state_key LIMIT ");
        builder.push_bind(QUERY_CHUNK_SIZE as i64);

        let rows = builder
            .build()
            .fetch_all(&**self)
            .await
            .map_err(provider)?;

        let mut entries: Vec<(StateKey, VersionedValue)> = Vec::new();
        let mut last_examined = None;
        let mut stopped_early = false;
        for row in &rows {
            if entries.len() == limit {
                stopped_early = true;
                break;
            }
            let (key, value) = decode_row(row)?;
            last_examined = Some(key.clone());
            if selector.matches_bytes(&value.value) {
                entries.push((key, value));
            }
        }

        let next = if stopped_early || rows.len() == QUERY_CHUNK_SIZE {
            last_examined
        } else {
            None
        };
        Ok(Page { entries, next })
    }

    async fn apply_updates(&self, batch: UpdateBatch) -> Result<(), StateError> {
        let mut tx = self.begin().await.map_err(provider)?;

        let savepoint: Option<i64> =
            sqlx::query_scalar("SELECT block_num FROM savepoint WHERE id = 0")
                .fetch_optional(&mut *tx)
                .await
                .map_err(provider)?;
        check_block_order(savepoint.map(|s| s as u64), &batch)?;

        let block_num = batch.block_num();
        for (key, update) in batch.into_updates() {
            sqlx::query(
                r#"
                INSERT INTO world_state (state_key, value, block_num, tx_num)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(state_key) DO UPDATE SET
                    value = excluded.value,
                    block_num = excluded.block_num,
                    tx_num = excluded.tx_num
                "#,
            )
            .bind(key.as_bytes())
            .bind(update.value.as_ref())
            .bind(update.version.block_num as i64)
            .bind(update.version.tx_num as i64)
            .execute(&mut *tx)
            .await
            .map_err(provider)?;
        }

        sqlx::query(
            r#"
            INSERT INTO savepoint (id, block_num) VALUES (0, ?)
            ON CONFLICT(id) DO UPDATE SET block_num = excluded.block_num
            "#,
        )
        .bind(block_num as i64)
        .execute(&mut *tx)
        .await
        .map_err(provider)?;

        tx.commit().await.map_err(provider)
    }

    async fn savepoint(&self) -> Result<Option<u64>, StateError> {
        let savepoint: Option<i64> =
            sqlx::query_scalar("SELECT block_num FROM savepoint WHERE id = 0")
                .fetch_optional(&**self)
                .await
                .map_err(provider)?;
        Ok(savepoint.map(|s| s as u64))
    }

    fn cursors(&self) -> &CursorRegistry {
        &self.cursors
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::key::{encode_key, range_bounds};
    use futures::TryStreamExt;

    use super::*;
    use common::state::TxStub;

    async fn memory_db() -> Database {
        let url = url::Url::parse("sqlite::memory:").unwrap();
        Database::connect(&url).await.unwrap()
    }

    fn record(owner: &str, cid: &str) -> Bytes {
        Bytes::from(
            serde_json::json!({"docType": "cidRecord", "owner": owner, "cid": cid}).to_string(),
        )
    }

    async fn seeded() -> Database {
        let db = memory_db().await;
        let mut batch = UpdateBatch::new(0);
        let entries = [
            ("user1", "Qm1"),
            ("user1", "Qm2"),
            ("user1", "Qm3"),
            ("user2", "Qm1"),
            ("user10", "Qm1"),
        ];
        for (i, (owner, cid)) in entries.iter().enumerate() {
            batch.put(encode_key(owner, cid), record(owner, cid), Height::new(0, i as u64));
        }
        // a value that is not JSON must not break rich queries
        batch.put(encode_key("user1", "Qm4"), Bytes::from("not json"), Height::new(0, 5));
        db.apply_updates(batch).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_get_and_savepoint() {
        let db = memory_db().await;
        assert_eq!(db.savepoint().await.unwrap(), None);

        let db = seeded().await;
        assert_eq!(db.savepoint().await.unwrap(), Some(0));
        let value = db.get(&encode_key("user1", "Qm2")).await.unwrap().unwrap();
        assert_eq!(value.version, Height::new(0, 1));
        assert_eq!(value.value, record("user1", "Qm2"));
        assert!(db.get(&encode_key("user3", "Qm1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_updates_is_ordered_and_overwrites() {
        let db = seeded().await;
        assert!(matches!(
            db.apply_updates(UpdateBatch::new(3)).await,
            Err(StateError::BlockOutOfOrder {
                expected: 1,
                actual: 3
            })
        ));

        let mut batch = UpdateBatch::new(1);
        batch.put(encode_key("user1", "Qm1"), record("user1", "Qm1"), Height::new(1, 2));
        db.apply_updates(batch).await.unwrap();

        let value = db.get(&encode_key("user1", "Qm1")).await.unwrap().unwrap();
        assert_eq!(value.version, Height::new(1, 2));
        assert_eq!(db.savepoint().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_scan_pages_stay_inside_owner_range() {
        let db = seeded().await;
        let range = range_bounds("user1");

        let first = db.scan_page(&range, None, 2).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.next, Some(encode_key("user1", "Qm2")));

        let rest = db.scan_page(&range, first.next.as_ref(), 10).await.unwrap();
        assert_eq!(rest.entries.len(), 2);
        assert!(rest.next.is_none());
        assert!(rest.entries.iter().all(|(key, _)| range.contains(key)));
    }

    #[tokio::test]
    async fn test_query_matches_selector_and_skips_bad_json() {
        let db = seeded().await;
        let selector = Selector::new()
            .where_eq("docType", "cidRecord")
            .where_eq("owner", "user1");

        let first = db.query_page(&selector, None, 2).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert!(first.next.is_some());

        let rest = db
            .query_page(&selector, first.next.as_ref(), 2)
            .await
            .unwrap();
        assert_eq!(rest.entries.len(), 1);
        assert_eq!(rest.entries[0].0, encode_key("user1", "Qm3"));
        assert!(rest.next.is_none());
    }

    #[tokio::test]
    async fn test_cursors_over_sqlite_release() {
        let db: Arc<dyn StateDatabase> = Arc::new(seeded().await);
        let stub = TxStub::new(db.clone()).with_page_size(1);

        let mut cursor = stub.get_state_by_range(range_bounds("user1"));
        assert!(cursor.try_next().await.unwrap().is_some());
        assert_eq!(db.open_cursors(), 1);
        drop(cursor);
        assert_eq!(db.open_cursors(), 0);

        let owned: Vec<_> = stub
            .get_query_result(r#"{"selector":{"owner":"user10"}}"#)
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(db.open_cursors(), 0);
    }

    #[test]
    fn test_json_path_only_for_plain_fields() {
        assert_eq!(json_path("owner").as_deref(), Some("$.owner"));
        assert_eq!(json_path("meta.size").as_deref(), Some("$.meta.size"));
        assert!(json_path("a b").is_none());
        assert!(json_path("a..b").is_none());
    }
}
