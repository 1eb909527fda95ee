//! PostgreSQL signature store

use super::traits::*;
use crate::error::SignError;
use crate::flow::CompletionStep;
use crate::types::{ClaType, ReferenceType, Signature};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

/// Each record is stored whole as JSONB next to the columns it is queried by.
#[derive(Debug, Clone)]
pub struct PostgresSignatureStore {
    pool: PgPool,
}

fn storage_err(context: &str) -> impl FnOnce(sqlx::Error) -> SignError + '_ {
    move |e| SignError::Storage(format!("postgres {context} failed: {e}"))
}

impl PostgresSignatureStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(storage_err("connect"))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cla_signatures (
                signature_id TEXT PRIMARY KEY,
                reference_type TEXT NOT NULL,
                reference_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                cla_type TEXT NOT NULL,
                envelope_id TEXT NULL,
                signed BOOLEAN NOT NULL,
                approved BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                record JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err("schema create"))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cla_signatures_reference ON cla_signatures (reference_id, project_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err("index create"))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_cla_signatures_envelope ON cla_signatures (envelope_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err("index create"))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cla_completion_steps (
                signature_id TEXT NOT NULL,
                envelope_id TEXT NOT NULL,
                step TEXT NOT NULL,
                completed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (signature_id, envelope_id, step)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err("schema create"))?;

        Ok(())
    }

    async fn fetch_many(&self, query: PgQuery<'_>) -> StoreResult<Vec<Signature>> {
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err("select"))?;
        rows.iter().map(decode_row).collect()
    }
}

fn encode(signature: &Signature) -> StoreResult<serde_json::Value> {
    serde_json::to_value(signature)
        .map_err(|e| SignError::Storage(format!("signature encode failed: {e}")))
}

fn decode_row(row: &PgRow) -> StoreResult<Signature> {
    let record: serde_json::Value = row
        .try_get("record")
        .map_err(|e| SignError::Storage(format!("postgres decode record failed: {e}")))?;
    serde_json::from_value(record)
        .map_err(|e| SignError::Storage(format!("signature decode failed: {e}")))
}

#[async_trait]
impl SignatureStore for PostgresSignatureStore {
    async fn create_signature(&self, signature: &Signature) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO cla_signatures (
                signature_id, reference_type, reference_id, project_id, cla_type,
                envelope_id, signed, approved, created_at, record
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (signature_id) DO NOTHING
            "#,
        )
        .bind(&signature.signature_id)
        .bind(signature.reference_type.as_str())
        .bind(&signature.reference_id)
        .bind(&signature.project_id)
        .bind(signature.cla_type.as_str())
        .bind(&signature.envelope_id)
        .bind(signature.signed)
        .bind(signature.approved)
        .bind(signature.created_at)
        .bind(encode(signature)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err("insert"))?;

        if result.rows_affected() == 0 {
            return Err(SignError::Conflict(format!(
                "signature '{}' already exists",
                signature.signature_id
            )));
        }
        Ok(())
    }

    async fn update_signature(&self, signature: &Signature) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE cla_signatures
            SET envelope_id = $2, signed = $3, approved = $4, record = $5
            WHERE signature_id = $1 AND (signed = false OR $3 = true)
            "#,
        )
        .bind(&signature.signature_id)
        .bind(&signature.envelope_id)
        .bind(signature.signed)
        .bind(signature.approved)
        .bind(encode(signature)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err("update"))?;

        if result.rows_affected() == 0 {
            return match self.get_signature(&signature.signature_id).await? {
                Some(_) => Err(SignError::Conflict(format!(
                    "signature '{}' is signed and cannot be reopened",
                    signature.signature_id
                ))),
                None => Err(SignError::NotFound(format!(
                    "signature '{}'",
                    signature.signature_id
                ))),
            };
        }
        Ok(())
    }

    async fn get_signature(&self, signature_id: &str) -> StoreResult<Option<Signature>> {
        let row = sqlx::query("SELECT record FROM cla_signatures WHERE signature_id = $1")
            .bind(signature_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("select"))?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn get_by_envelope(&self, envelope_id: &str) -> StoreResult<Option<Signature>> {
        let row = sqlx::query(
            "SELECT record FROM cla_signatures WHERE envelope_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(envelope_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err("select"))?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn list_for_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
        project_id: &str,
        cla_type: Option<ClaType>,
    ) -> StoreResult<Vec<Signature>> {
        self.fetch_many(
            sqlx::query(
                r#"
                SELECT record FROM cla_signatures
                WHERE reference_type = $1 AND reference_id = $2 AND project_id = $3
                  AND ($4::TEXT IS NULL OR cla_type = $4)
                ORDER BY created_at ASC
                "#,
            )
            .bind(reference_type.as_str())
            .bind(reference_id.to_string())
            .bind(project_id.to_string())
            .bind(cla_type.map(|kind| kind.as_str().to_string())),
        )
        .await
    }

    async fn list_corporate(
        &self,
        company_id: &str,
        project_id: &str,
    ) -> StoreResult<Vec<Signature>> {
        self.fetch_many(
            sqlx::query(
                r#"
                SELECT record FROM cla_signatures
                WHERE reference_type = 'company' AND cla_type = 'ccla'
                  AND reference_id = $1 AND project_id = $2 AND approved = true
                ORDER BY created_at ASC
                "#,
            )
            .bind(company_id.to_string())
            .bind(project_id.to_string()),
        )
        .await
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Signature>> {
        self.fetch_many(
            sqlx::query(
                r#"
                SELECT record FROM cla_signatures
                WHERE reference_type = 'user' AND reference_id = $1
                ORDER BY created_at ASC
                "#,
            )
            .bind(user_id.to_string()),
        )
        .await
    }

    async fn list_for_project(&self, project_id: &str) -> StoreResult<Vec<Signature>> {
        self.fetch_many(
            sqlx::query(
                "SELECT record FROM cla_signatures WHERE project_id = $1 ORDER BY created_at ASC",
            )
            .bind(project_id.to_string()),
        )
        .await
    }

    async fn mark_signed(
        &self,
        signature_id: &str,
        update: SignedUpdate,
    ) -> StoreResult<MarkSigned> {
        let mut current = self
            .get_signature(signature_id)
            .await?
            .ok_or_else(|| SignError::NotFound(format!("signature '{signature_id}'")))?;
        if current.signed {
            return Ok(MarkSigned::AlreadySigned(current));
        }

        current.signed = true;
        current.signed_on = Some(update.signed_on);
        current.completion_payload = Some(update.completion_payload);
        if update.signer_full_name.is_some() {
            current.signer_full_name = update.signer_full_name;
        }
        current.touch();

        // Guarded on the stored flag so concurrent deliveries flip it once.
        let result = sqlx::query(
            "UPDATE cla_signatures SET signed = true, record = $2 WHERE signature_id = $1 AND signed = false",
        )
        .bind(signature_id)
        .bind(encode(&current)?)
        .execute(&self.pool)
        .await
        .map_err(storage_err("mark signed"))?;

        if result.rows_affected() == 1 {
            return Ok(MarkSigned::Transitioned(current));
        }

        let winner = self
            .get_signature(signature_id)
            .await?
            .ok_or_else(|| SignError::NotFound(format!("signature '{signature_id}'")))?;
        Ok(MarkSigned::AlreadySigned(winner))
    }

    async fn completed_steps(
        &self,
        signature_id: &str,
        envelope_id: &str,
    ) -> StoreResult<Vec<CompletionStep>> {
        let rows = sqlx::query(
            "SELECT step FROM cla_completion_steps WHERE signature_id = $1 AND envelope_id = $2",
        )
        .bind(signature_id)
        .bind(envelope_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err("select steps"))?;

        let mut steps = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row
                .try_get("step")
                .map_err(|e| SignError::Storage(format!("postgres decode step failed: {e}")))?;
            steps.push(CompletionStep::parse(&name)?);
        }
        steps.sort();
        Ok(steps)
    }

    async fn record_step(
        &self,
        signature_id: &str,
        envelope_id: &str,
        step: CompletionStep,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cla_completion_steps (signature_id, envelope_id, step)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(signature_id)
        .bind(envelope_id)
        .bind(step.name())
        .execute(&self.pool)
        .await
        .map_err(storage_err("insert step"))?;
        Ok(())
    }
}
