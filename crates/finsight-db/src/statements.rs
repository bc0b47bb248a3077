//! Statement repository implementation.
//!
//! All status transitions are single guarded UPDATEs on the persisted
//! status column; the row count tells the caller whether the compare-and-set
//! won. There is no in-memory status state anywhere.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use finsight_core::{
    CreateStatement, Error, ListStatementsRequest, Result, Statement, StatementMetadata,
    StatementRepository, StatementStats, UpdateStatement,
};

const STATEMENT_COLUMNS: &str = "id, user_id, filename, original_filename, file_size, file_type, \
     storage_public_id, storage_url, status, processing_started_at, processing_completed_at, \
     error_message, category, bank_name, account_type, account_number_masked, \
     statement_period_start, statement_period_end, notes, is_active, created_at, updated_at";

/// PostgreSQL implementation of [`StatementRepository`].
pub struct PgStatementRepository {
    pool: Pool<Postgres>,
}

impl PgStatementRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Result<Statement> {
        let status: String = row.get("status");
        let category: String = row.get("category");
        Ok(Statement {
            id: row.get("id"),
            user_id: row.get("user_id"),
            filename: row.get("filename"),
            original_filename: row.get("original_filename"),
            file_size: row.get("file_size"),
            file_type: row.get("file_type"),
            storage_public_id: row.get("storage_public_id"),
            storage_url: row.get("storage_url"),
            status: status.parse()?,
            processing_started_at: row.get("processing_started_at"),
            processing_completed_at: row.get("processing_completed_at"),
            error_message: row.get("error_message"),
            category: category.parse()?,
            bank_name: row.get("bank_name"),
            account_type: row.get("account_type"),
            account_number_masked: row.get("account_number_masked"),
            statement_period_start: row.get("statement_period_start"),
            statement_period_end: row.get("statement_period_end"),
            notes: row.get("notes"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Escape LIKE wildcards in user-supplied search input.
    fn escape_like(input: &str) -> String {
        input
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_")
    }
}

#[async_trait]
impl StatementRepository for PgStatementRepository {
    async fn insert(&self, req: CreateStatement) -> Result<Statement> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO statements (id, user_id, filename, original_filename, file_size, \
                 file_type, storage_public_id, storage_url, status, category, bank_name, \
                 account_type, notes, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'uploaded', $9, $10, $11, $12, TRUE, $13, $13)
             RETURNING {STATEMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(req.user_id)
        .bind(&req.filename)
        .bind(&req.original_filename)
        .bind(req.file_size)
        .bind(&req.file_type)
        .bind(&req.storage_public_id)
        .bind(&req.storage_url)
        .bind(req.category.as_str())
        .bind(&req.bank_name)
        .bind(&req.account_type)
        .bind(&req.notes)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(statement_id = %id, user_id = %req.user_id, "statements: inserted");
        Self::parse_row(row)
    }

    async fn get(&self, id: Uuid, user_id: Uuid) -> Result<Option<Statement>> {
        let row = sqlx::query(&format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements
             WHERE id = $1 AND user_id = $2 AND is_active"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_row).transpose()
    }

    async fn list(
        &self,
        user_id: Uuid,
        req: ListStatementsRequest,
    ) -> Result<(Vec<Statement>, i64)> {
        let category = req.category.map(|c| c.as_str().to_string());
        let status = req.status.map(|s| s.as_str().to_string());
        let bank = req
            .bank_name
            .as_deref()
            .map(|b| format!("%{}%", Self::escape_like(b)));
        let search = req
            .search
            .as_deref()
            .map(|s| format!("%{}%", Self::escape_like(s)));

        let filter = "user_id = $1 AND is_active
               AND ($2::text IS NULL OR category = $2)
               AND ($3::text IS NULL OR status = $3)
               AND ($4::text IS NULL OR bank_name ILIKE $4)
               AND ($5::text IS NULL OR original_filename ILIKE $5
                    OR bank_name ILIKE $5 OR notes ILIKE $5)
               AND ($6::date IS NULL OR statement_period_start >= $6)
               AND ($7::date IS NULL OR statement_period_end <= $7)";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM statements WHERE {filter}"
        ))
        .bind(user_id)
        .bind(&category)
        .bind(&status)
        .bind(&bank)
        .bind(&search)
        .bind(req.period_start_from)
        .bind(req.period_end_to)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let rows = sqlx::query(&format!(
            "SELECT {STATEMENT_COLUMNS} FROM statements WHERE {filter}
             ORDER BY created_at DESC LIMIT $8 OFFSET $9"
        ))
        .bind(user_id)
        .bind(&category)
        .bind(&status)
        .bind(&bank)
        .bind(&search)
        .bind(req.period_start_from)
        .bind(req.period_end_to)
        .bind(req.limit)
        .bind(req.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let statements = rows
            .into_iter()
            .map(Self::parse_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((statements, total))
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: UpdateStatement,
    ) -> Result<Option<Statement>> {
        let row = sqlx::query(&format!(
            "UPDATE statements
             SET category = COALESCE($3, category),
                 bank_name = COALESCE($4, bank_name),
                 account_type = COALESCE($5, account_type),
                 notes = COALESCE($6, notes),
                 updated_at = $7
             WHERE id = $1 AND user_id = $2 AND is_active
             RETURNING {STATEMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .bind(req.category.map(|c| c.as_str().to_string()))
        .bind(&req.bank_name)
        .bind(&req.account_type)
        .bind(&req.notes)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_row).transpose()
    }

    async fn begin_processing(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE statements
             SET status = 'processing', processing_started_at = $2,
                 processing_completed_at = NULL, error_message = NULL, updated_at = $2
             WHERE id = $1 AND status = 'uploaded' AND is_active",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let won = result.rows_affected() == 1;
        debug!(statement_id = %id, won, "statements: begin_processing");
        Ok(won)
    }

    async fn complete_processing(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE statements
             SET status = 'completed', processing_completed_at = $2,
                 error_message = NULL, updated_at = $2
             WHERE id = $1 AND status = 'processing' AND is_active",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn fail_processing(&self, id: Uuid, message: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE statements
             SET status = 'failed', processing_completed_at = $3,
                 error_message = $2, updated_at = $3
             WHERE id = $1 AND status = 'processing' AND is_active",
        )
        .bind(id)
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn reset_for_reanalysis(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE statements
             SET status = 'uploaded', processing_started_at = NULL,
                 processing_completed_at = NULL, error_message = NULL, updated_at = $2
             WHERE id = $1 AND status IN ('completed', 'failed') AND is_active",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn soft_delete(&self, id: Uuid, user_id: Uuid) -> Result<Option<Option<String>>> {
        let row = sqlx::query(
            "UPDATE statements
             SET status = 'deleted', is_active = FALSE, updated_at = $3
             WHERE id = $1 AND user_id = $2 AND is_active
             RETURNING storage_public_id",
        )
        .bind(id)
        .bind(user_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| r.get("storage_public_id")))
    }

    async fn backfill_metadata(&self, id: Uuid, meta: StatementMetadata) -> Result<()> {
        // New non-null values win; existing values survive model silence.
        sqlx::query(
            "UPDATE statements
             SET bank_name = COALESCE($2, bank_name),
                 account_type = COALESCE($3, account_type),
                 account_number_masked = COALESCE($4, account_number_masked),
                 statement_period_start = COALESCE($5, statement_period_start),
                 statement_period_end = COALESCE($6, statement_period_end),
                 updated_at = $7
             WHERE id = $1",
        )
        .bind(id)
        .bind(&meta.bank_name)
        .bind(&meta.account_type)
        .bind(&meta.account_number_masked)
        .bind(meta.statement_period_start)
        .bind(meta.statement_period_end)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail_stuck_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "UPDATE statements
             SET status = 'failed', processing_completed_at = $3,
                 error_message = $2, updated_at = $3
             WHERE status = 'processing' AND is_active
               AND processing_started_at < $1
             RETURNING id",
        )
        .bind(cutoff)
        .bind(finsight_core::defaults::STUCK_PROCESSING_MESSAGE)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(|r| r.get("id")).collect())
    }

    async fn stats(&self, user_id: Uuid) -> Result<StatementStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE status = 'uploaded') AS uploaded,
                    COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                    COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                    COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                    COALESCE(SUM(file_size), 0)::bigint AS total_bytes
             FROM statements WHERE user_id = $1 AND is_active",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let by_category_rows = sqlx::query(
            "SELECT category, COUNT(*) AS count FROM statements
             WHERE user_id = $1 AND is_active GROUP BY category",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut by_category = serde_json::Map::new();
        for r in by_category_rows {
            let category: String = r.get("category");
            let count: i64 = r.get("count");
            by_category.insert(category, count.into());
        }

        Ok(StatementStats {
            total: row.get("total"),
            uploaded: row.get("uploaded"),
            processing: row.get("processing"),
            completed: row.get("completed"),
            failed: row.get("failed"),
            total_bytes: row.get("total_bytes"),
            by_category: by_category.into(),
        })
    }
}
