use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::info;

use super::{
    AiInsightsRow, CaseFileRecord, CaseRecord, CaseStore, FileMetadata, NewCase, StoreError,
};
use crate::models::{CaseStatus, FileCategory, MedicalInsights, PatientData};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cases (
        case_id        TEXT PRIMARY KEY,
        user_id        TEXT NOT NULL,
        patient_name   TEXT NOT NULL,
        patient_age    INTEGER NOT NULL,
        patient_gender TEXT NOT NULL,
        case_summary   TEXT,
        status         TEXT NOT NULL DEFAULT 'processing',
        created_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at     TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS case_files (
        file_id       TEXT PRIMARY KEY,
        case_id       TEXT NOT NULL REFERENCES cases(case_id) ON DELETE CASCADE,
        file_name     TEXT NOT NULL,
        file_type     TEXT NOT NULL,
        file_url      TEXT,
        file_category TEXT NOT NULL,
        text_data     TEXT,
        ai_summary    TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ai_insights (
        case_id                       TEXT PRIMARY KEY REFERENCES cases(case_id) ON DELETE CASCADE,
        comprehensive_summary         TEXT NOT NULL,
        key_findings                  JSONB NOT NULL,
        patient_context               JSONB NOT NULL,
        doctor_notes                  TEXT,
        lab_summary                   TEXT NOT NULL,
        radiology_summary             TEXT NOT NULL,
        case_summary_confidence_score DOUBLE PRECISION NOT NULL,
        soap_subjective               TEXT NOT NULL,
        soap_objective                TEXT NOT NULL,
        soap_assessment               TEXT NOT NULL,
        soap_plan                     TEXT NOT NULL,
        soap_confidence_score         DOUBLE PRECISION NOT NULL,
        primary_diagnosis             TEXT NOT NULL,
        icd_code                      TEXT,
        diagnosis_description         TEXT NOT NULL,
        diagnosis_confidence_score    DOUBLE PRECISION NOT NULL,
        supporting_evidence           JSONB NOT NULL,
        overall_confidence_score      DOUBLE PRECISION NOT NULL,
        generated_at                  TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// Case store backed by Postgres. Tables are created on connect if missing.
#[derive(Clone)]
pub struct PostgresCaseStore {
    pool: PgPool,
}

impl PostgresCaseStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!("postgres case store ready");
        Ok(Self { pool })
    }
}

fn parse_column<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T, StoreError> {
    raw.parse().map_err(StoreError::Backend)
}

fn case_from_row(row: &PgRow) -> Result<CaseRecord, StoreError> {
    let age: i32 = row.try_get("patient_age")?;
    let status: String = row.try_get("status")?;
    Ok(CaseRecord {
        case_id: row.try_get("case_id")?,
        user_id: row.try_get("user_id")?,
        patient: PatientData {
            name: row.try_get("patient_name")?,
            age: u32::try_from(age).unwrap_or_default(),
            gender: row.try_get("patient_gender")?,
        },
        case_summary: row.try_get("case_summary")?,
        status: parse_column(&status)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn file_from_row(row: &PgRow) -> Result<CaseFileRecord, StoreError> {
    let category: String = row.try_get("file_category")?;
    Ok(CaseFileRecord {
        file_id: row.try_get("file_id")?,
        case_id: row.try_get("case_id")?,
        file_name: row.try_get("file_name")?,
        file_type: row.try_get("file_type")?,
        file_url: row.try_get("file_url")?,
        file_category: parse_column::<FileCategory>(&category)?,
        text_data: row.try_get("text_data")?,
        ai_summary: row.try_get("ai_summary")?,
    })
}

fn insights_from_row(row: &PgRow) -> Result<AiInsightsRow, StoreError> {
    let Json(key_findings): Json<Vec<String>> = row.try_get("key_findings")?;
    let Json(patient_context): Json<PatientData> = row.try_get("patient_context")?;
    let Json(supporting_evidence): Json<Vec<String>> = row.try_get("supporting_evidence")?;
    let generated_at: DateTime<Utc> = row.try_get("generated_at")?;

    Ok(AiInsightsRow {
        case_id: row.try_get("case_id")?,
        comprehensive_summary: row.try_get("comprehensive_summary")?,
        key_findings,
        patient_context,
        doctor_notes: row.try_get("doctor_notes")?,
        lab_summary: row.try_get("lab_summary")?,
        radiology_summary: row.try_get("radiology_summary")?,
        case_summary_confidence_score: row.try_get("case_summary_confidence_score")?,
        soap_subjective: row.try_get("soap_subjective")?,
        soap_objective: row.try_get("soap_objective")?,
        soap_assessment: row.try_get("soap_assessment")?,
        soap_plan: row.try_get("soap_plan")?,
        soap_confidence_score: row.try_get("soap_confidence_score")?,
        primary_diagnosis: row.try_get("primary_diagnosis")?,
        icd_code: row.try_get("icd_code")?,
        diagnosis_description: row.try_get("diagnosis_description")?,
        diagnosis_confidence_score: row.try_get("diagnosis_confidence_score")?,
        supporting_evidence,
        overall_confidence_score: row.try_get("overall_confidence_score")?,
        generated_at,
    })
}

#[async_trait]
impl CaseStore for PostgresCaseStore {
    async fn create_case(&self, case: NewCase) -> Result<CaseRecord, StoreError> {
        let age = i32::try_from(case.patient.age)
            .map_err(|_| StoreError::Backend(format!("patient age out of range: {}", case.patient.age)))?;

        let row = sqlx::query(
            r#"
            INSERT INTO cases (case_id, user_id, patient_name, patient_age, patient_gender, case_summary, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'processing')
            RETURNING *
            "#,
        )
        .bind(&case.case_id)
        .bind(&case.user_id)
        .bind(&case.patient.name)
        .bind(age)
        .bind(&case.patient.gender)
        .bind(&case.case_summary)
        .fetch_one(&self.pool)
        .await?;

        case_from_row(&row)
    }

    async fn add_case_file(&self, file: CaseFileRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO case_files (file_id, case_id, file_name, file_type, file_url, file_category, text_data, ai_summary)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&file.file_id)
        .bind(&file.case_id)
        .bind(&file.file_name)
        .bind(&file.file_type)
        .bind(&file.file_url)
        .bind(file.file_category.as_str())
        .bind(&file.text_data)
        .bind(&file.ai_summary)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM cases WHERE case_id = $1")
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(case_from_row).transpose()
    }

    async fn get_case_files(&self, case_id: &str) -> Result<Vec<CaseFileRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM case_files WHERE case_id = $1 ORDER BY file_name")
            .bind(case_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(file_from_row).collect()
    }

    async fn update_case_file_metadata(
        &self,
        file_id: &str,
        metadata: FileMetadata,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE case_files
            SET text_data = COALESCE($2, text_data),
                ai_summary = COALESCE($3, ai_summary)
            WHERE file_id = $1
            "#,
        )
        .bind(file_id)
        .bind(&metadata.text_data)
        .bind(&metadata.ai_summary)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::FileNotFound(file_id.to_string()));
        }
        Ok(())
    }

    async fn update_case_status(&self, case_id: &str, status: CaseStatus) -> Result<(), StoreError> {
        if status == CaseStatus::Processing {
            let current = self
                .get_case(case_id)
                .await?
                .ok_or_else(|| StoreError::CaseNotFound(case_id.to_string()))?;
            return Err(StoreError::InvalidTransition {
                case_id: case_id.to_string(),
                from: current.status,
                to: status,
            });
        }

        // Only a processing case may move, so the guard lives in the WHERE clause.
        let result = sqlx::query(
            "UPDATE cases SET status = $2, updated_at = now() WHERE case_id = $1 AND status = 'processing'",
        )
        .bind(case_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            info!(case_id = %case_id, status = %status, "case status updated");
            return Ok(());
        }

        let current = self
            .get_case(case_id)
            .await?
            .ok_or_else(|| StoreError::CaseNotFound(case_id.to_string()))?;
        Err(StoreError::InvalidTransition {
            case_id: case_id.to_string(),
            from: current.status,
            to: status,
        })
    }

    async fn upload_ai_insights(
        &self,
        case_id: &str,
        insights: &MedicalInsights,
    ) -> Result<AiInsightsRow, StoreError> {
        let row = AiInsightsRow::from_insights(case_id, insights);

        sqlx::query(
            r#"
            INSERT INTO ai_insights (
                case_id, comprehensive_summary, key_findings, patient_context, doctor_notes,
                lab_summary, radiology_summary, case_summary_confidence_score,
                soap_subjective, soap_objective, soap_assessment, soap_plan, soap_confidence_score,
                primary_diagnosis, icd_code, diagnosis_description, diagnosis_confidence_score,
                supporting_evidence, overall_confidence_score, generated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(&row.case_id)
        .bind(&row.comprehensive_summary)
        .bind(Json(row.key_findings.clone()))
        .bind(Json(row.patient_context.clone()))
        .bind(&row.doctor_notes)
        .bind(&row.lab_summary)
        .bind(&row.radiology_summary)
        .bind(row.case_summary_confidence_score)
        .bind(&row.soap_subjective)
        .bind(&row.soap_objective)
        .bind(&row.soap_assessment)
        .bind(&row.soap_plan)
        .bind(row.soap_confidence_score)
        .bind(&row.primary_diagnosis)
        .bind(&row.icd_code)
        .bind(&row.diagnosis_description)
        .bind(row.diagnosis_confidence_score)
        .bind(Json(row.supporting_evidence.clone()))
        .bind(row.overall_confidence_score)
        .bind(row.generated_at)
        .execute(&self.pool)
        .await?;

        info!(case_id = %case_id, "ai insights stored");
        Ok(row)
    }

    async fn get_ai_insights(&self, case_id: &str) -> Result<Option<AiInsightsRow>, StoreError> {
        let row = sqlx::query("SELECT * FROM ai_insights WHERE case_id = $1")
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(insights_from_row).transpose()
    }
}
