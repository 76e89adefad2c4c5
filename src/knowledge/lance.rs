//! LanceDB Vector Index - ANN 벡터 검색
//!
//! 코사인 거리로 검색하고, 소유자 필터는 prefilter(`only_if`)로 스캔 중에 적용합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array, UInt64Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::table::Table;
use lancedb::DistanceType;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::vector::{EmbeddingRecord, IndexHit, VectorIndex};
use crate::embedding::Embedding;
use crate::error::{RagError, Result};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "embeddings";

/// 기본 디렉토리 이름
pub const LANCE_DIR_NAME: &str = "embeddings.lance";

// ============================================================================
// LanceVectorIndex
// ============================================================================

/// LanceDB 벡터 인덱스 구현
///
/// Apache Arrow 기반 columnar 저장소입니다.
/// 동점 순서는 LanceDB가 보장하지 않습니다.
///
/// 테이블은 `open`에서 한 번 만들어 두고, 삽입마다 단조 증가하는
/// `batch_seq`를 기록해 저장 순서를 벽시계와 무관하게 유지합니다.
pub struct LanceVectorIndex {
    table: Table,
    dimension: usize,
    /// 다음 삽입에 부여할 batch_seq (삽입 직렬화 겸용)
    next_batch: Mutex<u64>,
}

impl LanceVectorIndex {
    /// LanceDB 인덱스 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 벡터 차원 (기존 테이블과 다르면 `DimensionMismatch`)
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::Config("dimension must be positive".to_string()));
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    RagError::storage(format!("Failed to create LanceDB directory: {}", e))
                })?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| RagError::storage("Invalid path encoding"))?;

        let db = lancedb::connect(path_str).execute().await?;
        let table = Self::open_or_create_table(&db, dimension).await?;

        let stored = vector_dimension(table.schema().await?.as_ref())?;
        if stored != dimension {
            return Err(RagError::DimensionMismatch {
                expected: stored,
                actual: dimension,
            });
        }

        let next_batch = Self::max_batch_seq(&table).await?.map_or(0, |max| max + 1);

        Ok(Self {
            table,
            dimension,
            next_batch: Mutex::new(next_batch),
        })
    }

    /// 테이블 열기 (없으면 빈 테이블 생성)
    async fn open_or_create_table(db: &Connection, dimension: usize) -> Result<Table> {
        let names = db.table_names().execute().await?;
        if names.iter().any(|n| n == TABLE_NAME) {
            return Ok(db.open_table(TABLE_NAME).execute().await?);
        }

        let schema = Arc::new(Self::create_schema(dimension));
        match db.create_empty_table(TABLE_NAME, schema).execute().await {
            Ok(table) => {
                tracing::debug!("Created LanceDB table '{}' (dimension={})", TABLE_NAME, dimension);
                Ok(table)
            }
            // 다른 프로세스가 먼저 생성한 경우
            Err(lancedb::Error::TableAlreadyExists { .. }) => {
                Ok(db.open_table(TABLE_NAME).execute().await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 저장된 batch_seq 최댓값
    async fn max_batch_seq(table: &Table) -> Result<Option<u64>> {
        let batches: Vec<RecordBatch> = table
            .query()
            .select(Select::columns(&["batch_seq"]))
            .execute()
            .await?
            .try_collect()
            .await?;

        let mut max = None;
        for batch in &batches {
            let seqs = u64_column(batch, "batch_seq")?;
            for i in 0..batch.num_rows() {
                let value = seqs.value(i);
                max = Some(max.map_or(value, |m: u64| m.max(value)));
            }
        }
        Ok(max)
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(dimension: usize) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("owner_id", DataType::Utf8, false),
            Field::new("sequence_index", DataType::UInt32, false),
            Field::new("chunk_text", DataType::Utf8, false),
            Field::new("created_at", DataType::Int64, false),
            Field::new("batch_seq", DataType::UInt64, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
        ])
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(&self, records: &[EmbeddingRecord], batch_seq: u64) -> Result<RecordBatch> {
        let ids: Vec<String> = records.iter().map(|r| r.id.to_string()).collect();
        let owners: Vec<String> = records.iter().map(|r| r.owner_id.to_string()).collect();
        let sequence: Vec<u32> = records.iter().map(|r| r.sequence_index).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.chunk_text.as_str()).collect();
        let created: Vec<i64> = records
            .iter()
            .map(|r| r.created_at.timestamp_micros())
            .collect();
        let batch_seqs = vec![batch_seq; records.len()];

        let flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.vector.as_slice().iter().copied())
            .collect();

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vectors = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(flat)) as Arc<dyn Array>,
            None,
        )?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema(self.dimension)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(owners)),
                Arc::new(UInt32Array::from(sequence)),
                Arc::new(StringArray::from(texts)),
                Arc::new(Int64Array::from(created)),
                Arc::new(UInt64Array::from(batch_seqs)),
                Arc::new(vectors),
            ],
        )?;

        Ok(batch)
    }
}

/// 소유자 필터 식 (UUID 문자열만 들어가므로 인젝션 불가)
fn owner_filter(owner_id: Uuid) -> String {
    format!("owner_id = '{}'", owner_id)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RagError::storage(format!("Missing {} column", name)))
}

fn vector_dimension(schema: &Schema) -> Result<usize> {
    schema
        .field_with_name("vector")
        .ok()
        .and_then(|f| match f.data_type() {
            DataType::FixedSizeList(_, size) => Some(*size as usize),
            _ => None,
        })
        .ok_or_else(|| RagError::storage("Missing vector column"))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
        .ok_or_else(|| RagError::storage(format!("Missing {} column", name)))
}

fn u64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
        .ok_or_else(|| RagError::storage(format!("Missing {} column", name)))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| RagError::storage(format!("invalid uuid '{}': {}", s, e)))
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn insert(&self, records: &[EmbeddingRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        for record in records {
            if record.vector.dimension() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: record.vector.dimension(),
                });
            }
        }

        // batch_seq 부여와 기록을 한 번에 하나씩
        let mut next_batch = self.next_batch.lock().await;

        let batch = self.records_to_batch(records, *next_batch)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.table.add(batches).execute().await?;
        *next_batch += 1;

        Ok(records.len())
    }

    async fn scan(
        &self,
        query: &Embedding,
        owner_id: Option<Uuid>,
        candidates: usize,
    ) -> Result<Vec<IndexHit>> {
        if query.dimension() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.dimension(),
            });
        }
        if self.table.count_rows(None).await? == 0 {
            return Ok(vec![]);
        }

        let mut search = self
            .table
            .vector_search(query.as_slice().to_vec())?
            .distance_type(DistanceType::Cosine)
            .limit(candidates);
        if let Some(owner) = owner_id {
            search = search.only_if(owner_filter(owner));
        }

        let batches: Vec<RecordBatch> = search.execute().await?.try_collect().await?;

        let mut hits = Vec::new();
        for batch in batches {
            let ids = string_column(&batch, "id")?;
            let owners = string_column(&batch, "owner_id")?;
            let texts = string_column(&batch, "chunk_text")?;
            let sequence = u32_column(&batch, "sequence_index")?;
            // _distance 컬럼 (LanceDB가 자동 추가, cosine = 1 - 유사도)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| RagError::storage("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                hits.push(IndexHit {
                    id: parse_uuid(ids.value(i))?,
                    owner_id: parse_uuid(owners.value(i))?,
                    sequence_index: sequence.value(i),
                    chunk_text: texts.value(i).to_string(),
                    distance: distances.value(i),
                });
            }
        }

        tracing::debug!("Lance scan: {} candidates (owner={:?})", hits.len(), owner_id);
        Ok(hits)
    }

    async fn list_chunks(&self, owner_id: Uuid) -> Result<Vec<String>> {
        let batches: Vec<RecordBatch> = self
            .table
            .query()
            .only_if(owner_filter(owner_id))
            .execute()
            .await?
            .try_collect()
            .await?;

        // (batch_seq, sequence_index)로 저장 순서 복원
        let mut rows: Vec<(u64, u32, String)> = Vec::new();
        for batch in batches {
            let texts = string_column(&batch, "chunk_text")?;
            let batch_seqs = u64_column(&batch, "batch_seq")?;
            let sequence = u32_column(&batch, "sequence_index")?;

            for i in 0..batch.num_rows() {
                rows.push((batch_seqs.value(i), sequence.value(i), texts.value(i).to_string()));
            }
        }

        rows.sort_by_key(|(batch_seq, seq, _)| (*batch_seq, *seq));
        Ok(rows.into_iter().map(|(_, _, text)| text).collect())
    }

    async fn delete_owner(&self, owner_id: Uuid) -> Result<usize> {
        let filter = owner_filter(owner_id);

        let existing = self.table.count_rows(Some(filter.clone())).await?;
        if existing == 0 {
            return Ok(0);
        }

        self.table.delete(&filter).await?;
        Ok(existing)
    }

    async fn count(&self, owner_id: Option<Uuid>) -> Result<usize> {
        Ok(self.table.count_rows(owner_id.map(owner_filter)).await?)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "lancedb"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn create_test_record(owner_id: Uuid, sequence_index: u32, vector: [f32; DIM]) -> EmbeddingRecord {
        EmbeddingRecord {
            id: Uuid::new_v4(),
            owner_id,
            sequence_index,
            chunk_text: format!("Test chunk {} for {}", sequence_index, owner_id),
            vector: Embedding::new(vector.to_vec(), DIM).unwrap(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_lance_index_basic() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorIndex::open(&temp_dir.path().join("test.lance"), DIM)
            .await
            .unwrap();

        assert_eq!(store.count(None).await.unwrap(), 0);

        let owner = Uuid::new_v4();
        let records = vec![
            create_test_record(owner, 0, [1.0, 0.0, 0.0, 0.0]),
            create_test_record(owner, 1, [0.0, 1.0, 0.0, 0.0]),
        ];
        assert_eq!(store.insert(&records).await.unwrap(), 2);
        assert_eq!(store.count(None).await.unwrap(), 2);
        assert_eq!(store.count(Some(owner)).await.unwrap(), 2);
        assert_eq!(store.count(Some(Uuid::new_v4())).await.unwrap(), 0);

        let chunks = store.list_chunks(owner).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("Test chunk 0"));
    }

    #[tokio::test]
    async fn test_lance_scan_scoped() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorIndex::open(&temp_dir.path().join("search.lance"), DIM)
            .await
            .unwrap();

        let owner_a = Uuid::new_v4();
        let owner_b = Uuid::new_v4();
        store
            .insert(&[
                create_test_record(owner_a, 0, [1.0, 0.0, 0.0, 0.0]),
                create_test_record(owner_b, 0, [1.0, 0.1, 0.0, 0.0]),
                create_test_record(owner_b, 1, [0.0, 0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        let query = Embedding::new(vec![1.0, 0.0, 0.0, 0.0], DIM).unwrap();
        let hits = store.scan(&query, Some(owner_b), 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.owner_id == owner_b));

        let all = store.scan(&query, None, 2).await.unwrap();
        assert!(all.len() <= 2);
        assert!(all[0].distance < 0.01);
    }

    #[tokio::test]
    async fn test_lance_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorIndex::open(&temp_dir.path().join("delete.lance"), DIM)
            .await
            .unwrap();

        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        store
            .insert(&[
                create_test_record(owner, 0, [1.0, 0.0, 0.0, 0.0]),
                create_test_record(owner, 1, [0.0, 1.0, 0.0, 0.0]),
                create_test_record(other, 0, [0.0, 0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_owner(owner).await.unwrap(), 2);
        assert_eq!(store.count(None).await.unwrap(), 1);
        assert_eq!(store.delete_owner(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lance_concurrent_first_inserts() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorIndex::open(&temp_dir.path().join("concurrent.lance"), DIM)
            .await
            .unwrap();

        let owner_a = Uuid::new_v4();
        let owner_b = Uuid::new_v4();
        let records_a: Vec<_> = (0..5)
            .map(|i| create_test_record(owner_a, i, [1.0, i as f32, 0.0, 0.0]))
            .collect();
        let records_b: Vec<_> = (0..3)
            .map(|i| create_test_record(owner_b, i, [0.0, 0.0, 1.0, i as f32]))
            .collect();

        let (ra, rb) = tokio::join!(store.insert(&records_a), store.insert(&records_b));
        assert_eq!(ra.unwrap(), 5);
        assert_eq!(rb.unwrap(), 3);

        assert_eq!(store.count(Some(owner_a)).await.unwrap(), 5);
        assert_eq!(store.count(Some(owner_b)).await.unwrap(), 3);
        assert_eq!(store.count(None).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_lance_list_order_survives_clock_step_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("order.lance");
        let owner = Uuid::new_v4();

        let mut later = create_test_record(owner, 0, [1.0, 0.0, 0.0, 0.0]);
        later.chunk_text = "Pasal 1".to_string();
        let mut earlier = create_test_record(owner, 0, [0.0, 1.0, 0.0, 0.0]);
        earlier.chunk_text = "Pasal 2".to_string();
        earlier.created_at = later.created_at - chrono::Duration::hours(1);

        {
            let store = LanceVectorIndex::open(&path, DIM).await.unwrap();
            store.insert(&[later]).await.unwrap();
            store.insert(&[earlier]).await.unwrap();
        }

        // 다시 열어도 batch_seq가 이어짐
        let store = LanceVectorIndex::open(&path, DIM).await.unwrap();
        let mut oldest = create_test_record(owner, 0, [0.0, 0.0, 1.0, 0.0]);
        oldest.chunk_text = "Pasal 3".to_string();
        oldest.created_at = Utc::now() - chrono::Duration::days(1);
        store.insert(&[oldest]).await.unwrap();

        assert_eq!(
            store.list_chunks(owner).await.unwrap(),
            vec!["Pasal 1", "Pasal 2", "Pasal 3"]
        );
    }

    #[tokio::test]
    async fn test_lance_dimension_checked_on_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dim.lance");
        {
            let store = LanceVectorIndex::open(&path, DIM).await.unwrap();
            store
                .insert(&[create_test_record(Uuid::new_v4(), 0, [1.0, 0.0, 0.0, 0.0])])
                .await
                .unwrap();
        }

        let result = LanceVectorIndex::open(&path, 8).await;
        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch {
                expected: 4,
                actual: 8
            })
        ));
    }
}
