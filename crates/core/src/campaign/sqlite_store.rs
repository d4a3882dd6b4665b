//! SQLite-backed campaign store implementation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    Aggregate, Campaign, CampaignStatus, CampaignStore, NewCampaign, Recipient, SendRecord,
    SendStatus, StoreError,
};

/// SQLite-backed campaign store.
pub struct SqliteCampaignStore {
    conn: Mutex<Connection>,
}

impl SqliteCampaignStore {
    /// Create a new SQLite campaign store, creating the database file and
    /// tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite campaign store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                template_id TEXT NOT NULL,
                template_name TEXT NOT NULL,
                status TEXT NOT NULL,
                total INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS send_records (
                campaign_id TEXT NOT NULL,
                phone TEXT NOT NULL,
                variables TEXT NOT NULL,
                status TEXT NOT NULL,
                message_id TEXT,
                error TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_attempt_at TEXT,
                PRIMARY KEY (campaign_id, phone),
                FOREIGN KEY (campaign_id) REFERENCES campaigns(id)
                    DEFERRABLE INITIALLY DEFERRED
            );

            CREATE INDEX IF NOT EXISTS idx_send_records_status
                ON send_records(campaign_id, status);
            CREATE INDEX IF NOT EXISTS idx_campaigns_created_at
                ON campaigns(created_at);
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_campaign(row: &rusqlite::Row) -> rusqlite::Result<Campaign> {
        let id: String = row.get(0)?;
        let template_id: String = row.get(1)?;
        let template_name: String = row.get(2)?;
        let status_str: String = row.get(3)?;
        let total: u32 = row.get(4)?;
        let created_at_str: String = row.get(5)?;
        let updated_at_str: String = row.get(6)?;

        let status = parse_campaign_status(&status_str);

        Ok(Campaign {
            id,
            template_id,
            template_name,
            status,
            total,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<SendRecord> {
        let campaign_id: String = row.get(0)?;
        let phone: String = row.get(1)?;
        let variables_json: String = row.get(2)?;
        let status_str: String = row.get(3)?;
        let message_id: Option<String> = row.get(4)?;
        let error: Option<String> = row.get(5)?;
        let attempts: u32 = row.get(6)?;
        let last_attempt_at_str: Option<String> = row.get(7)?;

        let variables: BTreeMap<String, String> =
            serde_json::from_str(&variables_json).unwrap_or_default();

        Ok(SendRecord {
            campaign_id,
            phone,
            variables,
            status: parse_send_status(&status_str),
            message_id,
            error,
            attempts,
            last_attempt_at: last_attempt_at_str.as_deref().map(parse_timestamp),
        })
    }

    fn get_campaign(conn: &Connection, id: &str) -> Result<Campaign, StoreError> {
        let result = conn.query_row(
            "SELECT id, template_id, template_name, status, total, created_at, updated_at FROM campaigns WHERE id = ?",
            params![id],
            Self::row_to_campaign,
        );
        match result {
            Ok(campaign) => Ok(campaign),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(StoreError::Database(e.to_string())),
        }
    }

    /// Transition a record out of Pending. All terminal writes go through
    /// here so a terminal record is never overwritten.
    fn finalize_record(
        &self,
        campaign_id: &str,
        phone: &str,
        status: SendStatus,
        message_id: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let current: String = conn
            .query_row(
                "SELECT status FROM send_records WHERE campaign_id = ? AND phone = ?",
                params![campaign_id, phone],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::RecordNotFound {
                    campaign_id: campaign_id.to_string(),
                    phone: phone.to_string(),
                },
                e => StoreError::Database(e.to_string()),
            })?;

        if parse_send_status(&current).is_terminal() {
            return Err(StoreError::RecordTerminal {
                campaign_id: campaign_id.to_string(),
                phone: phone.to_string(),
                status: current,
            });
        }

        conn.execute(
            "UPDATE send_records SET status = ?, message_id = ?, error = ? WHERE campaign_id = ? AND phone = ?",
            params![status.as_str(), message_id, error, campaign_id, phone],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn records_with_status(
        &self,
        campaign_id: &str,
        status: SendStatus,
    ) -> Result<Vec<SendRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT campaign_id, phone, variables, status, message_id, error, attempts, last_attempt_at \
                 FROM send_records WHERE campaign_id = ? AND status = ? ORDER BY phone",
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![campaign_id, status.as_str()], Self::row_to_record)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| StoreError::Database(e.to_string()))?);
        }
        Ok(records)
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_campaign_status(s: &str) -> CampaignStatus {
    match s {
        "queued" => CampaignStatus::Queued,
        "processing" => CampaignStatus::Processing,
        "completed" => CampaignStatus::Completed,
        "completed_with_errors" => CampaignStatus::CompletedWithErrors,
        "cancelled" => CampaignStatus::Cancelled,
        "stalled" => CampaignStatus::Stalled,
        _ => CampaignStatus::Queued,
    }
}

fn parse_send_status(s: &str) -> SendStatus {
    match s {
        "pending" => SendStatus::Pending,
        "sent" => SendStatus::Sent,
        "failed" => SendStatus::Failed,
        "cancelled" => SendStatus::Cancelled,
        _ => SendStatus::Pending,
    }
}

impl CampaignStore for SqliteCampaignStore {
    fn create_campaign(
        &self,
        request: NewCampaign,
        recipients: &[Recipient],
    ) -> Result<Campaign, StoreError> {
        let mut conn = self.conn.lock().unwrap();

        let id = request
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = Utc::now();

        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let existing: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM campaigns WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if existing > 0 {
            return Err(StoreError::DuplicateCampaign(id));
        }

        // Last-write-wins on duplicate phones: later rows replace earlier
        // ones, so the deduplicated count is what ends up in the table.
        for recipient in recipients {
            let variables_json = serde_json::to_string(&recipient.variables)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            tx.execute(
                "INSERT OR REPLACE INTO send_records (campaign_id, phone, variables, status, attempts) \
                 VALUES (?, ?, ?, ?, 0)",
                params![id, recipient.phone, variables_json, SendStatus::Pending.as_str()],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        let total: u32 = tx
            .query_row(
                "SELECT COUNT(*) FROM send_records WHERE campaign_id = ?",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tx.execute(
            "INSERT INTO campaigns (id, template_id, template_name, status, total, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                request.template_id,
                request.template_name,
                CampaignStatus::Queued.as_str(),
                total,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tx.commit().map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Campaign {
            id,
            template_id: request.template_id,
            template_name: request.template_name,
            status: CampaignStatus::Queued,
            total,
            created_at: now,
            updated_at: now,
        })
    }

    fn campaign(&self, id: &str) -> Result<Option<Campaign>, StoreError> {
        let conn = self.conn.lock().unwrap();
        match Self::get_campaign(&conn, id) {
            Ok(campaign) => Ok(Some(campaign)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list_campaigns(&self, limit: i64, offset: i64) -> Result<Vec<Campaign>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, template_id, template_name, status, total, created_at, updated_at \
                 FROM campaigns ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit, offset], Self::row_to_campaign)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut campaigns = Vec::new();
        for row in rows {
            campaigns.push(row.map_err(|e| StoreError::Database(e.to_string()))?);
        }
        Ok(campaigns)
    }

    fn set_campaign_status(
        &self,
        id: &str,
        status: CampaignStatus,
    ) -> Result<Campaign, StoreError> {
        let conn = self.conn.lock().unwrap();
        let current = Self::get_campaign(&conn, id)?;

        if current.status.is_terminal() && status != current.status {
            return Err(StoreError::InvalidStatus {
                campaign_id: id.to_string(),
                current_status: current.status.as_str().to_string(),
                operation: format!("transition to {}", status.as_str()),
            });
        }

        let now = Utc::now();
        conn.execute(
            "UPDATE campaigns SET status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), now.to_rfc3339(), id],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Campaign {
            status,
            updated_at: now,
            ..current
        })
    }

    fn pending_records(&self, campaign_id: &str) -> Result<Vec<SendRecord>, StoreError> {
        self.records_with_status(campaign_id, SendStatus::Pending)
    }

    fn failed_records(&self, campaign_id: &str) -> Result<Vec<SendRecord>, StoreError> {
        self.records_with_status(campaign_id, SendStatus::Failed)
    }

    fn record(&self, campaign_id: &str, phone: &str) -> Result<Option<SendRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT campaign_id, phone, variables, status, message_id, error, attempts, last_attempt_at \
             FROM send_records WHERE campaign_id = ? AND phone = ?",
            params![campaign_id, phone],
            Self::row_to_record,
        )
        .optional()
        .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn record_attempt(&self, campaign_id: &str, phone: &str) -> Result<u32, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let updated = conn
            .execute(
                "UPDATE send_records SET attempts = attempts + 1, last_attempt_at = ? \
                 WHERE campaign_id = ? AND phone = ? AND status = 'pending'",
                params![now.to_rfc3339(), campaign_id, phone],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if updated == 0 {
            // The guard only matches pending records, so tell a settled
            // record apart from one that does not exist at all
            let status: Option<String> = conn
                .query_row(
                    "SELECT status FROM send_records WHERE campaign_id = ? AND phone = ?",
                    params![campaign_id, phone],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            return match status {
                Some(status) => Err(StoreError::RecordTerminal {
                    campaign_id: campaign_id.to_string(),
                    phone: phone.to_string(),
                    status,
                }),
                None => Err(StoreError::RecordNotFound {
                    campaign_id: campaign_id.to_string(),
                    phone: phone.to_string(),
                }),
            };
        }

        let attempts: u32 = conn
            .query_row(
                "SELECT attempts FROM send_records WHERE campaign_id = ? AND phone = ?",
                params![campaign_id, phone],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(attempts)
    }

    fn mark_sent(
        &self,
        campaign_id: &str,
        phone: &str,
        message_id: &str,
    ) -> Result<(), StoreError> {
        self.finalize_record(campaign_id, phone, SendStatus::Sent, Some(message_id), None)
    }

    fn mark_failed(&self, campaign_id: &str, phone: &str, error: &str) -> Result<(), StoreError> {
        self.finalize_record(campaign_id, phone, SendStatus::Failed, None, Some(error))
    }

    fn mark_cancelled(&self, campaign_id: &str, phone: &str) -> Result<(), StoreError> {
        self.finalize_record(campaign_id, phone, SendStatus::Cancelled, None, None)
    }

    fn aggregate(&self, campaign_id: &str) -> Result<Aggregate, StoreError> {
        let conn = self.conn.lock().unwrap();

        // Campaign must exist even if it somehow has no records.
        Self::get_campaign(&conn, campaign_id)?;

        let mut stmt = conn
            .prepare(
                "SELECT status, COUNT(*) FROM send_records WHERE campaign_id = ? GROUP BY status",
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![campaign_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut agg = Aggregate::default();
        for row in rows {
            let (status, count) = row.map_err(|e| StoreError::Database(e.to_string()))?;
            match parse_send_status(&status) {
                SendStatus::Pending => agg.pending = count,
                SendStatus::Sent => agg.sent = count,
                SendStatus::Failed => agg.failed = count,
                SendStatus::Cancelled => agg.cancelled = count,
            }
            agg.total += count;
        }

        Ok(agg)
    }
}
