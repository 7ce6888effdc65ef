use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::error::TriageError;
use crate::core::hash::alert_dedupe_key;
use crate::core::types::{
    AlertRecord, Classification, Incident, IncidentFilter, IncidentSort, IncidentStatus,
    NewIncident, Page, StoreStats, ThresholdBand,
};

/// Durable keyed collection of incidents and alert records. The store is
/// the only owner of persisted triage state; pipeline stages hand it
/// finished values and never mutate rows themselves.
pub struct IncidentStore {
    conn: Connection,
}

impl IncidentStore {
    pub fn new(path: &Path) -> Result<Self, TriageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, TriageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), TriageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS incidents (
              seq INTEGER PRIMARY KEY,
              id TEXT NOT NULL UNIQUE,
              reporter_id TEXT NOT NULL,
              channel TEXT NOT NULL,
              category TEXT NOT NULL,
              confidence REAL NOT NULL,
              priority_score REAL NOT NULL,
              status TEXT NOT NULL,
              classification_version INTEGER NOT NULL,
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL,
              data_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_incidents_status ON incidents(status);
            CREATE INDEX IF NOT EXISTS idx_incidents_category ON incidents(category);
            CREATE INDEX IF NOT EXISTS idx_incidents_score ON incidents(priority_score);
            CREATE INDEX IF NOT EXISTS idx_incidents_created ON incidents(created_at);

            CREATE TABLE IF NOT EXISTS alerts (
              dedupe_key TEXT PRIMARY KEY,
              incident_id TEXT NOT NULL,
              band TEXT NOT NULL,
              channel TEXT NOT NULL,
              sent_at TEXT,
              delivered INTEGER NOT NULL DEFAULT 0,
              attempts INTEGER NOT NULL DEFAULT 0,
              last_error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_incident ON alerts(incident_id);
            ",
        )?;
        Ok(())
    }

    /// Persist a fully classified incident. Id assignment comes from a
    /// single store-side sequence; the insert and the sequence read commit
    /// together, so either the whole record is visible or nothing is.
    pub fn create(
        &mut self,
        new: NewIncident,
        now: DateTime<Utc>,
    ) -> Result<Incident, TriageError> {
        let tx = self.conn.transaction()?;
        let seq: i64 =
            tx.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM incidents", [], |row| {
                row.get(0)
            })?;
        let id = format!("inc_{:06}", seq);

        let incident = Incident {
            id: id.clone(),
            reporter_id: new.reporter_id,
            channel: new.channel,
            evidence: new.evidence,
            signals: new.signals,
            classification: new.classification,
            classification_version: 1,
            priority_score: new.priority_score,
            status: IncidentStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let data_json = serde_json::to_string(&incident)?;
        let inserted = tx.execute(
            "INSERT INTO incidents
             (seq, id, reporter_id, channel, category, confidence, priority_score,
              status, classification_version, created_at, updated_at, data_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                seq,
                incident.id,
                incident.reporter_id,
                incident.channel,
                incident.classification.category.as_str(),
                incident.classification.confidence,
                incident.priority_score,
                incident.status.as_str(),
                incident.classification_version as i64,
                timestamp(incident.created_at),
                timestamp(incident.updated_at),
                data_json
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // Sequence assignment makes this unreachable; if it fires
                // anyway the store's integrity assumption is broken.
                tracing::error!("incident id collision on {}", id);
                return Err(TriageError::IdCollision(id));
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit()?;
        Ok(incident)
    }

    pub fn get(&self, id: &str) -> Result<Option<Incident>, TriageError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT data_json FROM incidents WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn list(
        &self,
        filter: &IncidentFilter,
        sort: IncidentSort,
        page: &Page,
    ) -> Result<Vec<Incident>, TriageError> {
        let (where_clause, values) = filter_clauses(filter);
        let order = match sort {
            IncidentSort::PriorityDesc => "priority_score DESC, created_at DESC",
            IncidentSort::CreatedDesc => "created_at DESC",
        };
        let mut sql = format!(
            "SELECT data_json FROM incidents{} ORDER BY {}",
            where_clause, order
        );
        if let Some(limit) = page.limit {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, page.offset));
        } else if page.offset > 0 {
            sql.push_str(&format!(" LIMIT -1 OFFSET {}", page.offset));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| {
            row.get::<_, String>(0)
        })?;
        let mut out = Vec::new();
        for row in rows {
            let json = row?;
            let incident: Incident = serde_json::from_str(&json)?;
            out.push(incident);
        }
        Ok(out)
    }

    pub fn stats(&self, high_cutoff: f64) -> Result<StoreStats, TriageError> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))?;

        let mut by_status = std::collections::BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM incidents GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            by_status.insert(status, count as u64);
        }

        let mut by_category = std::collections::BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT category, COUNT(*) FROM incidents GROUP BY category")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (category, count) = row?;
            by_category.insert(category, count as u64);
        }

        let high_priority_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM incidents WHERE priority_score >= ?1",
            params![high_cutoff],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            total: total as u64,
            by_status,
            by_category,
            high_priority_count: high_priority_count as u64,
        })
    }

    /// Analyst-driven status transition. Returns the updated incident, or
    /// `None` when the id is unknown; illegal edges are rejected without
    /// touching the row.
    pub fn set_status(
        &mut self,
        id: &str,
        to: IncidentStatus,
        auto_resolve_floor: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<Incident>, TriageError> {
        let Some(mut incident) = self.get(id)? else {
            return Ok(None);
        };
        let trivially_non_actionable = incident.classification.category
            == crate::core::types::Category::Unclassified
            && incident.classification.confidence < auto_resolve_floor;
        if !incident
            .status
            .can_transition(to, trivially_non_actionable)
        {
            return Err(TriageError::InvalidTransition(format!(
                "{} -> {} for {}",
                incident.status.as_str(),
                to.as_str(),
                id
            )));
        }
        incident.status = to;
        incident.updated_at = now;
        self.write_back(&incident)?;
        Ok(Some(incident))
    }

    /// Store a fresh classification version with its recomputed score. The
    /// previous result is superseded, never edited in place; status is left
    /// untouched.
    pub fn update_classification(
        &mut self,
        id: &str,
        classification: Classification,
        priority_score: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<Incident>, TriageError> {
        let Some(mut incident) = self.get(id)? else {
            return Ok(None);
        };
        incident.classification = classification;
        incident.classification_version += 1;
        incident.priority_score = priority_score;
        incident.updated_at = now;
        self.write_back(&incident)?;
        Ok(Some(incident))
    }

    fn write_back(&mut self, incident: &Incident) -> Result<(), TriageError> {
        let data_json = serde_json::to_string(incident)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE incidents SET category = ?2, confidence = ?3, priority_score = ?4,
             status = ?5, classification_version = ?6, updated_at = ?7, data_json = ?8
             WHERE id = ?1",
            params![
                incident.id,
                incident.classification.category.as_str(),
                incident.classification.confidence,
                incident.priority_score,
                incident.status.as_str(),
                incident.classification_version as i64,
                timestamp(incident.updated_at),
                data_json
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Insert-if-absent reservation of an alert slot. Returns `true` when
    /// this caller owns the dedupe key and must dispatch; `false` when a
    /// record already exists. Atomic per key, so concurrent triggers cannot
    /// double-dispatch.
    pub fn try_reserve_alert(
        &mut self,
        incident_id: &str,
        band: ThresholdBand,
        channel: &str,
    ) -> Result<bool, TriageError> {
        let key = alert_dedupe_key(incident_id, band);
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO alerts (dedupe_key, incident_id, band, channel)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, incident_id, band.as_str(), channel],
        )?;
        Ok(inserted == 1)
    }

    pub fn mark_alert_delivered(
        &mut self,
        dedupe_key: &str,
        attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<(), TriageError> {
        self.conn.execute(
            "UPDATE alerts SET delivered = 1, attempts = ?2, sent_at = ?3, last_error = NULL
             WHERE dedupe_key = ?1",
            params![dedupe_key, attempts as i64, timestamp(now)],
        )?;
        Ok(())
    }

    pub fn mark_alert_failed(
        &mut self,
        dedupe_key: &str,
        attempts: u32,
        error: &str,
    ) -> Result<(), TriageError> {
        self.conn.execute(
            "UPDATE alerts SET delivered = 0, attempts = ?2, last_error = ?3
             WHERE dedupe_key = ?1",
            params![dedupe_key, attempts as i64, error],
        )?;
        Ok(())
    }

    pub fn alerts_for_incident(&self, incident_id: &str) -> Result<Vec<AlertRecord>, TriageError> {
        let mut stmt = self.conn.prepare(
            "SELECT dedupe_key, incident_id, band, channel, sent_at, delivered, attempts, last_error
             FROM alerts WHERE incident_id = ?1 ORDER BY dedupe_key",
        )?;
        let rows = stmt.query_map(params![incident_id], alert_from_row)?;
        collect_alerts(rows)
    }

    /// Alerts that exhausted their retry budget; surfaced to operators, not
    /// rolled back into incidents.
    pub fn undelivered_alerts(&self) -> Result<Vec<AlertRecord>, TriageError> {
        let mut stmt = self.conn.prepare(
            "SELECT dedupe_key, incident_id, band, channel, sent_at, delivered, attempts, last_error
             FROM alerts WHERE delivered = 0 AND attempts > 0 ORDER BY dedupe_key",
        )?;
        let rows = stmt.query_map([], alert_from_row)?;
        collect_alerts(rows)
    }
}

fn timestamp(dt: DateTime<Utc>) -> String {
    // Fixed-width form so lexicographic SQL comparisons match chronology.
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn filter_clauses(filter: &IncidentFilter) -> (String, Vec<rusqlite::types::Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<rusqlite::types::Value> = Vec::new();

    if let Some(status) = filter.status {
        values.push(status.as_str().to_string().into());
        clauses.push(format!("status = ?{}", values.len()));
    }
    if let Some(category) = filter.category {
        values.push(category.as_str().to_string().into());
        clauses.push(format!("category = ?{}", values.len()));
    }
    if let Some(min_score) = filter.min_score {
        values.push(min_score.into());
        clauses.push(format!("priority_score >= ?{}", values.len()));
    }
    if let Some(channel) = &filter.channel {
        values.push(channel.clone().into());
        clauses.push(format!("channel = ?{}", values.len()));
    }
    if let Some(since) = filter.since {
        values.push(timestamp(since).into());
        clauses.push(format!("created_at >= ?{}", values.len()));
    }
    if let Some(until) = filter.until {
        values.push(timestamp(until).into());
        clauses.push(format!("created_at < ?{}", values.len()));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn alert_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertRecordRow> {
    Ok(AlertRecordRow {
        dedupe_key: row.get(0)?,
        incident_id: row.get(1)?,
        band: row.get(2)?,
        channel: row.get(3)?,
        sent_at: row.get(4)?,
        delivered: row.get::<_, i64>(5)? != 0,
        attempts: row.get::<_, i64>(6)? as u32,
        last_error: row.get(7)?,
    })
}

struct AlertRecordRow {
    dedupe_key: String,
    incident_id: String,
    band: String,
    channel: String,
    sent_at: Option<String>,
    delivered: bool,
    attempts: u32,
    last_error: Option<String>,
}

fn collect_alerts(
    rows: impl Iterator<Item = rusqlite::Result<AlertRecordRow>>,
) -> Result<Vec<AlertRecord>, TriageError> {
    let mut out = Vec::new();
    for row in rows {
        let row = row?;
        let band = ThresholdBand::parse(&row.band)
            .ok_or_else(|| TriageError::Db(format!("unknown alert band: {}", row.band)))?;
        let sent_at = match row.sent_at {
            Some(value) => Some(
                DateTime::parse_from_rfc3339(&value)
                    .map_err(|e| TriageError::Db(format!("bad sent_at: {}", e)))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        out.push(AlertRecord {
            incident_id: row.incident_id,
            dedupe_key: row.dedupe_key,
            band,
            channel: row.channel,
            sent_at,
            delivered: row.delivered,
            attempts: row.attempts,
            last_error: row.last_error,
        });
    }
    Ok(out)
}
