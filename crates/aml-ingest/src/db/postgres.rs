//! PostgreSQL implementation of the storage seam.

use aml_common::{LocalizedText, MediaFile};
use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{Database, UnitOfWork};
use crate::config::DatabaseConfig;
use crate::error::{IngestError, Result};
use crate::models::{
    BusinessKey, EntityBatch, EntryKind, Failure, Fields, NewStagedRow, Process, ProcessStatus,
    QuestionBody, ReferenceData, ReferenceItem, ReferenceTable, RowStatus, StageFilter, StagedRow,
};

/// Rows per multi-value INSERT, well under the bind-parameter limit.
const INSERT_CHUNK: usize = 500;

const PROCESS_COLUMNS: &str = "id, process_id, file_name, description, status, error_status, \
     error_message, is_active, created_by, updated_by, created_at, updated_at";

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    info!(max_connections = config.max_connections, "Database connection pool established");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| IngestError::Database(e.into()))?;
    info!("Database migrations completed");
    Ok(())
}

#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx: Some(tx) }))
    }

    #[instrument(skip(self))]
    async fn open_processes(&self) -> Result<Vec<Process>> {
        let sql = format!(
            "SELECT {PROCESS_COLUMNS} FROM process WHERE status = $1 AND is_active ORDER BY created_at, id"
        );
        let rows = sqlx::query(&sql)
            .bind(ProcessStatus::Open.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(process_from_row).collect()
    }

    async fn find_process(&self, process_id: &str) -> Result<Option<Process>> {
        let sql = format!("SELECT {PROCESS_COLUMNS} FROM process WHERE process_id = $1");
        let row = sqlx::query(&sql)
            .bind(process_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(process_from_row).transpose()
    }

    #[instrument(skip(self, from, failure))]
    async fn transition_process(
        &self,
        process_id: &str,
        from: &[ProcessStatus],
        to: ProcessStatus,
        failure: Option<&Failure>,
    ) -> Result<bool> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();

        let result = sqlx::query(
            r#"
            UPDATE process
            SET status = $1,
                error_status = COALESCE($2, error_status),
                error_message = COALESCE($3, error_message),
                updated_by = 'system',
                updated_at = NOW()
            WHERE process_id = $4 AND status = ANY($5)
            "#,
        )
        .bind(to.as_str())
        .bind(failure.map(|f| f.status.as_str()))
        .bind(failure.map(|f| f.message.as_str()))
        .bind(process_id)
        .bind(from)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reference_data(&self) -> Result<ReferenceData> {
        let mut data = ReferenceData::default();

        for table in ReferenceTable::ALL {
            let sql = format!(
                "SELECT identifier, name FROM {} WHERE is_active ORDER BY identifier",
                table.table_name()
            );
            let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

            let items = data.table_mut(table);
            for row in &rows {
                items.push(ReferenceItem {
                    identifier: row.try_get("identifier")?,
                    name: row.try_get::<Json<LocalizedText>, _>("name")?.0,
                });
            }
        }

        Ok(data)
    }
}

/// One open transaction. Dropped without commit, sqlx rolls it back.
pub struct PgUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnitOfWork {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(IngestError::TransactionClosed)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn insert_staged(&mut self, kind: EntryKind, rows: &[NewStagedRow]) -> Result<Vec<StagedRow>> {
        if let Some(row) = rows.iter().find(|row| row.kind() != kind) {
            return Err(IngestError::Decode(format!(
                "row {} is a {} row, not {}",
                row.row_index,
                row.kind(),
                kind
            )));
        }

        let mut staged = Vec::with_capacity(rows.len());

        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} ({}, process_id, row_index, l1_skill, fields, body, media_names, status) ",
                kind.stage_table(),
                key_columns(kind)
            ));

            builder.push_values(chunk, |mut values, row| {
                match &row.key {
                    BusinessKey::Question {
                        question_id,
                        question_set_id,
                    } => {
                        values.push_bind(question_id.clone());
                        values.push_bind(question_set_id.clone());
                    },
                    BusinessKey::QuestionSet { question_set_id } => {
                        values.push_bind(question_set_id.clone());
                    },
                    BusinessKey::Content { content_id } => {
                        values.push_bind(content_id.clone());
                    },
                }
                values
                    .push_bind(row.process_id.clone())
                    .push_bind(row.row_index)
                    .push_bind(row.l1_skill.clone())
                    .push_bind(Json(row.fields.clone()))
                    .push_bind(Json(row.body.clone()))
                    .push_bind(Json(row.media_names.clone()))
                    .push_bind(RowStatus::Pending.as_str());
            });
            builder.push(" RETURNING id");

            let ids: Vec<i64> = builder.build_query_scalar().fetch_all(self.conn()?).await?;
            staged.extend(chunk.iter().cloned().zip(ids).map(|(row, id)| row.into_staged(id)));
        }

        debug!(table = kind.stage_table(), count = staged.len(), "Inserted staged rows");
        Ok(staged)
    }

    async fn staged_rows(&mut self, kind: EntryKind, filter: &StageFilter) -> Result<Vec<StagedRow>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT * FROM {} WHERE process_id = ", kind.stage_table()));
        builder.push_bind(filter.process_id.clone());

        if let Some(skill) = &filter.l1_skill {
            builder.push(" AND l1_skill = ").push_bind(skill.clone());
        }
        builder.push(" ORDER BY row_index, id");

        let rows = builder.build().fetch_all(self.conn()?).await?;
        rows.iter().map(|row| staged_from_row(kind, row)).collect()
    }

    async fn mark_staged(
        &mut self,
        kind: EntryKind,
        ids: &[i64],
        status: RowStatus,
        error_info: Option<&str>,
    ) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE {} SET status = $1, error_info = $2, updated_at = NOW() WHERE id = ANY($3)",
            kind.stage_table()
        );
        let result = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(error_info)
            .bind(ids.to_vec())
            .execute(self.conn()?)
            .await?;

        Ok(result.rows_affected())
    }

    async fn set_staged_media(&mut self, kind: EntryKind, id: i64, media: &[MediaFile]) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET media_files = $1, updated_at = NOW() WHERE id = $2",
            kind.stage_table()
        );
        sqlx::query(&sql)
            .bind(Json(media.to_vec()))
            .bind(id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn delete_staged(&mut self, kind: EntryKind, process_id: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE process_id = $1", kind.stage_table());
        let result = sqlx::query(&sql).bind(process_id).execute(self.conn()?).await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, batch), fields(kind = %batch.kind(), rows = batch.len()))]
    async fn insert_entities(&mut self, batch: &EntityBatch) -> Result<u64> {
        let mut inserted = 0;

        match batch {
            EntityBatch::QuestionSets(sets) => {
                for chunk in sets.chunks(INSERT_CHUNK) {
                    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                        "INSERT INTO question_sets (identifier, question_set_id, title, description, \
                         instruction_text, purpose, sequence, tenant, repository, taxonomy, sub_skills, \
                         gradient, status, is_active, created_by) ",
                    );
                    builder.push_values(chunk, |mut values, set| {
                        values
                            .push_bind(set.header.identifier)
                            .push_bind(set.question_set_id.clone())
                            .push_bind(Json(set.title.clone()))
                            .push_bind(set.description.clone().map(Json))
                            .push_bind(set.instruction_text.clone())
                            .push_bind(set.purpose.clone())
                            .push_bind(set.sequence)
                            .push_bind(set.header.tenant.clone().map(Json))
                            .push_bind(set.header.repository.clone().map(Json))
                            .push_bind(Json(set.header.taxonomy.clone()))
                            .push_bind(Json(set.header.sub_skills.clone()))
                            .push_bind(set.header.gradient.clone())
                            .push_bind(set.header.status.as_str())
                            .push_bind(set.header.is_active)
                            .push_bind(set.header.created_by.clone());
                    });
                    inserted += builder.build().execute(self.conn()?).await?.rows_affected();
                }
            },
            EntityBatch::Questions(questions) => {
                for chunk in questions.chunks(INSERT_CHUNK) {
                    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                        "INSERT INTO questions (identifier, question_id, question_set_id, question_type, \
                         name, description, hints, benchmark_time, sequence, body, derived, media, \
                         tenant, repository, taxonomy, sub_skills, gradient, status, is_active, created_by) ",
                    );
                    builder.push_values(chunk, |mut values, question| {
                        values
                            .push_bind(question.header.identifier)
                            .push_bind(question.question_id.clone())
                            .push_bind(question.question_set_id.clone())
                            .push_bind(question.question_type.clone())
                            .push_bind(Json(question.name.clone()))
                            .push_bind(question.description.clone().map(Json))
                            .push_bind(question.hints.clone().map(Json))
                            .push_bind(question.benchmark_time)
                            .push_bind(question.sequence)
                            .push_bind(Json(question.body.clone()))
                            .push_bind(question.derived.clone().map(Json))
                            .push_bind(Json(question.media.clone()))
                            .push_bind(question.header.tenant.clone().map(Json))
                            .push_bind(question.header.repository.clone().map(Json))
                            .push_bind(Json(question.header.taxonomy.clone()))
                            .push_bind(Json(question.header.sub_skills.clone()))
                            .push_bind(question.header.gradient.clone())
                            .push_bind(question.header.status.as_str())
                            .push_bind(question.header.is_active)
                            .push_bind(question.header.created_by.clone());
                    });
                    inserted += builder.build().execute(self.conn()?).await?.rows_affected();
                }
            },
            EntityBatch::Contents(contents) => {
                for chunk in contents.chunks(INSERT_CHUNK) {
                    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                        "INSERT INTO contents (identifier, content_id, name, description, media, \
                         tenant, repository, taxonomy, sub_skills, gradient, status, is_active, created_by) ",
                    );
                    builder.push_values(chunk, |mut values, content| {
                        values
                            .push_bind(content.header.identifier)
                            .push_bind(content.content_id.clone())
                            .push_bind(Json(content.name.clone()))
                            .push_bind(content.description.clone().map(Json))
                            .push_bind(Json(content.media.clone()))
                            .push_bind(content.header.tenant.clone().map(Json))
                            .push_bind(content.header.repository.clone().map(Json))
                            .push_bind(Json(content.header.taxonomy.clone()))
                            .push_bind(Json(content.header.sub_skills.clone()))
                            .push_bind(content.header.gradient.clone())
                            .push_bind(content.header.status.as_str())
                            .push_bind(content.header.is_active)
                            .push_bind(content.header.created_by.clone());
                    });
                    inserted += builder.build().execute(self.conn()?).await?.rows_affected();
                }
            },
        }

        Ok(inserted)
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(IngestError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(IngestError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}

fn key_columns(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Question => "question_id, question_set_id",
        EntryKind::QuestionSet => "question_set_id",
        EntryKind::Content => "content_id",
    }
}

fn process_from_row(row: &PgRow) -> Result<Process> {
    let status: String = row.try_get("status")?;

    Ok(Process {
        id: row.try_get("id")?,
        process_id: row.try_get("process_id")?,
        file_name: row.try_get("file_name")?,
        description: row.try_get("description")?,
        status: status.parse()?,
        error_status: row.try_get("error_status")?,
        error_message: row.try_get("error_message")?,
        is_active: row.try_get("is_active")?,
        created_by: row.try_get("created_by")?,
        updated_by: row.try_get("updated_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn staged_from_row(kind: EntryKind, row: &PgRow) -> Result<StagedRow> {
    let key = match kind {
        EntryKind::Question => BusinessKey::Question {
            question_id: row.try_get("question_id")?,
            question_set_id: row.try_get("question_set_id")?,
        },
        EntryKind::QuestionSet => BusinessKey::QuestionSet {
            question_set_id: row.try_get("question_set_id")?,
        },
        EntryKind::Content => BusinessKey::Content {
            content_id: row.try_get("content_id")?,
        },
    };
    let status: String = row.try_get("status")?;

    Ok(StagedRow {
        id: row.try_get("id")?,
        process_id: row.try_get("process_id")?,
        row_index: row.try_get("row_index")?,
        key,
        l1_skill: row.try_get("l1_skill")?,
        fields: row.try_get::<Json<Fields>, _>("fields")?.0,
        body: row.try_get::<Json<QuestionBody>, _>("body")?.0,
        media_names: row.try_get::<Json<Vec<String>>, _>("media_names")?.0,
        media_files: row.try_get::<Json<Vec<MediaFile>>, _>("media_files")?.0,
        status: status.parse()?,
        error_info: row.try_get("error_info")?,
    })
}
