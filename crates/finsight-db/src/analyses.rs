//! Analysis repository implementation.
//!
//! Analysis rows are immutable after insert; the only mutation is the
//! `is_active` soft-delete flag. Re-analysis deactivates prior rows and
//! inserts a fresh one.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use finsight_core::{
    Analysis, AnalysisRepository, AnalysisStats, CreateAnalysis, Error, ListAnalysesRequest,
    Result,
};

const ANALYSIS_COLUMNS: &str = "id, user_id, statement_id, analysis_type, model_version, \
     processing_time_seconds, total_income, total_expenses, net_cash_flow, opening_balance, \
     closing_balance, financial_health_score, transaction_categories, spending_patterns, \
     income_analysis, anomalies, insights, recommendations, risk_assessment, cash_flow_data, \
     document_info, summary_text, detailed_analysis, is_active, created_at";

/// PostgreSQL implementation of [`AnalysisRepository`].
pub struct PgAnalysisRepository {
    pool: Pool<Postgres>,
}

impl PgAnalysisRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Analysis {
        Analysis {
            id: row.get("id"),
            user_id: row.get("user_id"),
            statement_id: row.get("statement_id"),
            analysis_type: row.get("analysis_type"),
            model_version: row.get("model_version"),
            processing_time_seconds: row.get("processing_time_seconds"),
            total_income: row.get("total_income"),
            total_expenses: row.get("total_expenses"),
            net_cash_flow: row.get("net_cash_flow"),
            opening_balance: row.get("opening_balance"),
            closing_balance: row.get("closing_balance"),
            financial_health_score: row.get("financial_health_score"),
            transaction_categories: row.get("transaction_categories"),
            spending_patterns: row.get("spending_patterns"),
            income_analysis: row.get("income_analysis"),
            anomalies: row.get("anomalies"),
            insights: row.get("insights"),
            recommendations: row.get("recommendations"),
            risk_assessment: row.get("risk_assessment"),
            cash_flow_data: row.get("cash_flow_data"),
            document_info: row.get("document_info"),
            summary_text: row.get("summary_text"),
            detailed_analysis: row.get("detailed_analysis"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl AnalysisRepository for PgAnalysisRepository {
    async fn insert(&self, req: CreateAnalysis) -> Result<Analysis> {
        let id = Uuid::now_v7();
        let row = sqlx::query(&format!(
            "INSERT INTO analyses (id, user_id, statement_id, analysis_type, model_version, \
                 processing_time_seconds, total_income, total_expenses, net_cash_flow, \
                 opening_balance, closing_balance, financial_health_score, \
                 transaction_categories, spending_patterns, income_analysis, anomalies, \
                 insights, recommendations, risk_assessment, cash_flow_data, document_info, \
                 summary_text, detailed_analysis, is_active, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                     $17, $18, $19, $20, $21, $22, $23, TRUE, NOW())
             RETURNING {ANALYSIS_COLUMNS}"
        ))
        .bind(id)
        .bind(req.user_id)
        .bind(req.statement_id)
        .bind(&req.analysis_type)
        .bind(&req.model_version)
        .bind(req.processing_time_seconds)
        .bind(req.total_income)
        .bind(req.total_expenses)
        .bind(req.net_cash_flow)
        .bind(req.opening_balance)
        .bind(req.closing_balance)
        .bind(req.financial_health_score)
        .bind(&req.transaction_categories)
        .bind(&req.spending_patterns)
        .bind(&req.income_analysis)
        .bind(&req.anomalies)
        .bind(&req.insights)
        .bind(&req.recommendations)
        .bind(&req.risk_assessment)
        .bind(&req.cash_flow_data)
        .bind(&req.document_info)
        .bind(&req.summary_text)
        .bind(&req.detailed_analysis)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(analysis_id = %id, statement_id = %req.statement_id, "analyses: inserted");
        Ok(Self::parse_row(row))
    }

    async fn get(&self, id: Uuid, user_id: Uuid) -> Result<Option<Analysis>> {
        let row = sqlx::query(&format!(
            "SELECT {ANALYSIS_COLUMNS} FROM analyses
             WHERE id = $1 AND user_id = $2 AND is_active"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.map(Self::parse_row))
    }

    async fn latest_for_statement(&self, statement_id: Uuid) -> Result<Option<Analysis>> {
        let row = sqlx::query(&format!(
            "SELECT {ANALYSIS_COLUMNS} FROM analyses
             WHERE statement_id = $1 AND is_active
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(statement_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.map(Self::parse_row))
    }

    async fn list(
        &self,
        user_id: Uuid,
        req: ListAnalysesRequest,
    ) -> Result<(Vec<Analysis>, i64)> {
        let filter = "user_id = $1 AND is_active
               AND ($2::uuid IS NULL OR statement_id = $2)
               AND ($3::text IS NULL OR analysis_type = $3)
               AND ($4::double precision IS NULL OR financial_health_score >= $4)";

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM analyses WHERE {filter}"))
                .bind(user_id)
                .bind(req.statement_id)
                .bind(&req.analysis_type)
                .bind(req.min_health_score)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;

        let rows = sqlx::query(&format!(
            "SELECT {ANALYSIS_COLUMNS} FROM analyses WHERE {filter}
             ORDER BY created_at DESC LIMIT $5 OFFSET $6"
        ))
        .bind(user_id)
        .bind(req.statement_id)
        .bind(&req.analysis_type)
        .bind(req.min_health_score)
        .bind(req.limit)
        .bind(req.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok((rows.into_iter().map(Self::parse_row).collect(), total))
    }

    async fn soft_delete(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE analyses SET is_active = FALSE
             WHERE id = $1 AND user_id = $2 AND is_active",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn deactivate_for_statement(&self, statement_id: Uuid) -> Result<i64> {
        let result = sqlx::query(
            "UPDATE analyses SET is_active = FALSE WHERE statement_id = $1 AND is_active",
        )
        .bind(statement_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() as i64)
    }

    async fn stats(&self, user_id: Uuid) -> Result<AnalysisStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    AVG(financial_health_score) AS avg_health_score,
                    COALESCE(SUM(total_income), 0)::double precision AS total_income,
                    COALESCE(SUM(total_expenses), 0)::double precision AS total_expenses,
                    COALESCE(SUM(net_cash_flow), 0)::double precision AS net_cash_flow
             FROM analyses WHERE user_id = $1 AND is_active",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(AnalysisStats {
            total: row.get("total"),
            avg_health_score: row.get("avg_health_score"),
            total_income: row.get("total_income"),
            total_expenses: row.get("total_expenses"),
            net_cash_flow: row.get("net_cash_flow"),
        })
    }
}
