//! [`SqliteStore`] — the SQLite implementation of [`CampusStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use muster_core::{
  activity::{ActivityRecord, NewActivity},
  alert::{Alert, AlertKind, AlertStatus, NewAlert},
  entity::{AlertFlag, Entity, Identifiers, NewEntity},
  store::{CampusStore, EntitySearch},
};

use crate::{
  Error, Result,
  encode::{
    ACTIVITY_COLUMNS, ALERT_COLUMNS, ENTITY_COLUMNS, RawActivity, RawAlert,
    RawEntity, encode_alert_status, encode_dt, encode_entity_kind, encode_json,
    encode_severity, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Encoded row values ──────────────────────────────────────────────────────

/// Entity fields encoded to their column representations, shared by the
/// INSERT and UPDATE statements.
struct EntityRow {
  entity_id:        String,
  created_at:       String,
  entity_type:      String,
  student_id:       Option<String>,
  staff_id:         Option<String>,
  email:            Option<String>,
  card_id:          Option<String>,
  device_hash:      Option<String>,
  face_id:          Option<String>,
  name:             Option<String>,
  name_variants:    String,
  full_name:        Option<String>,
  profile:          String,
  resolved_sources: String,
  last_seen:        Option<String>,
  is_active:        bool,
  alert_status:     String,
}

fn encode_entity(entity: &Entity) -> Result<EntityRow> {
  Ok(EntityRow {
    entity_id:        encode_uuid(entity.entity_id),
    created_at:       encode_dt(entity.created_at),
    entity_type:      encode_entity_kind(entity.kind).to_owned(),
    student_id:       entity.identifiers.student_id.clone(),
    staff_id:         entity.identifiers.staff_id.clone(),
    email:            entity.identifiers.email.clone(),
    card_id:          entity.identifiers.card_id.clone(),
    device_hash:      entity.identifiers.device_hash.clone(),
    face_id:          entity.identifiers.face_id.clone(),
    name:             entity.identifiers.name.clone(),
    name_variants:    encode_json(&entity.identifiers.name_variants)?,
    full_name:        entity.profile.full_name.clone(),
    profile:          encode_json(&entity.profile)?,
    resolved_sources: encode_json(&entity.resolved_sources)?,
    last_seen:        entity.last_seen.as_ref().map(encode_json).transpose()?,
    is_active:        entity.is_active,
    alert_status:     encode_json(&entity.alert_status)?,
  })
}

/// Alert fields encoded to their column representations, shared by the
/// conditional INSERT and the UPDATE statements.
struct AlertRow {
  alert_id:         String,
  entity_id:        String,
  alert_type:       String,
  severity:         String,
  title:            String,
  message:          String,
  details:          String,
  anomaly_score:    Option<f64>,
  status:           String,
  acknowledged_by:  Option<String>,
  acknowledged_at:  Option<String>,
  resolved_by:      Option<String>,
  resolved_at:      Option<String>,
  resolution_notes: Option<String>,
  triggered_at:     String,
}

fn encode_alert(alert: &Alert) -> Result<AlertRow> {
  Ok(AlertRow {
    alert_id:         encode_uuid(alert.alert_id),
    entity_id:        encode_uuid(alert.entity_id),
    alert_type:       alert.kind.discriminant().to_owned(),
    severity:         encode_severity(alert.severity).to_owned(),
    title:            alert.title.clone(),
    message:          alert.message.clone(),
    details:          encode_json(&alert.details)?,
    anomaly_score:    alert.details.anomaly_score,
    status:           encode_alert_status(alert.status).to_owned(),
    acknowledged_by:  alert.acknowledged_by.clone(),
    acknowledged_at:  alert.acknowledged_at.map(encode_dt),
    resolved_by:      alert.resolved_by.clone(),
    resolved_at:      alert.resolved_at.map(encode_dt),
    resolution_notes: alert.resolution_notes.clone(),
    triggered_at:     encode_dt(alert.triggered_at),
  })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Muster campus store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert a fully-built [`Entity`] into the `entities` table.
  async fn insert_entity(&self, entity: &Entity) -> Result<()> {
    let row = encode_entity(entity)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO entities (
             entity_id, created_at, entity_type,
             student_id, staff_id, email, card_id, device_hash, face_id,
             name, name_variants, full_name, profile, resolved_sources,
             last_seen, is_active, alert_status
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                     ?14, ?15, ?16, ?17)",
          rusqlite::params![
            row.entity_id,
            row.created_at,
            row.entity_type,
            row.student_id,
            row.staff_id,
            row.email,
            row.card_id,
            row.device_hash,
            row.face_id,
            row.name,
            row.name_variants,
            row.full_name,
            row.profile,
            row.resolved_sources,
            row.last_seen,
            row.is_active,
            row.alert_status,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── CampusStore impl ────────────────────────────────────────────────────────

impl CampusStore for SqliteStore {
  type Error = Error;

  // ── Entities ──────────────────────────────────────────────────────────────

  async fn add_entity(&self, input: NewEntity) -> Result<Entity> {
    let entity = Entity {
      entity_id:        Uuid::new_v4(),
      created_at:       Utc::now(),
      kind:             input.kind,
      identifiers:      input.identifiers,
      profile:          input.profile,
      resolved_sources: Vec::new(),
      last_seen:        None,
      is_active:        true,
      alert_status:     AlertFlag::default(),
    };

    self.insert_entity(&entity).await?;
    Ok(entity)
  }

  async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawEntity> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_id = ?1"),
              rusqlite::params![id_str],
              RawEntity::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEntity::into_entity).transpose()
  }

  async fn find_by_identifiers(&self, bundle: &Identifiers) -> Result<Vec<Entity>> {
    let pairs: Vec<(&'static str, String)> = bundle
      .lookup_pairs()
      .into_iter()
      .map(|(field, value)| (field, value.to_owned()))
      .collect();

    if pairs.is_empty() {
      return Ok(Vec::new());
    }

    let raws: Vec<RawEntity> = self
      .conn
      .call(move |conn| {
        // Field names come from the fixed lookup set, never from input.
        let conds: Vec<String> = pairs
          .iter()
          .enumerate()
          .map(|(i, (field, _))| format!("{field} = ?{}", i + 1))
          .collect();
        let sql = format!(
          "SELECT {ENTITY_COLUMNS} FROM entities
           WHERE {}
           ORDER BY entity_id",
          conds.join(" OR ")
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params_from_iter(pairs.iter().map(|(_, v)| v)),
            RawEntity::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  async fn find_named_entities(&self) -> Result<Vec<Entity>> {
    let raws: Vec<RawEntity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ENTITY_COLUMNS} FROM entities
           WHERE full_name IS NOT NULL AND full_name != ''
           ORDER BY entity_id"
        ))?;
        let rows = stmt
          .query_map([], RawEntity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  async fn find_active_entities(&self) -> Result<Vec<Entity>> {
    let raws: Vec<RawEntity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ENTITY_COLUMNS} FROM entities
           WHERE is_active = 1
           ORDER BY entity_id"
        ))?;
        let rows = stmt
          .query_map([], RawEntity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  async fn search_entities(&self, query: &EntitySearch) -> Result<Vec<Entity>> {
    let text_pattern = query.text.as_deref().map(|t| format!("%{t}%"));
    let kind_str = query.kind.map(encode_entity_kind).map(str::to_owned);
    let limit_val = query.limit.unwrap_or(100) as i64;

    let raws: Vec<RawEntity> = self
      .conn
      .call(move |conn| {
        let mut conds: Vec<&'static str> = vec![];
        if text_pattern.is_some() {
          conds.push(
            "(student_id LIKE ?1 OR staff_id LIKE ?1 OR email LIKE ?1
              OR card_id LIKE ?1 OR name LIKE ?1 OR full_name LIKE ?1)",
          );
        }
        if kind_str.is_some() {
          conds.push("entity_type = ?2");
        }

        let where_clause = if conds.is_empty() {
          String::new()
        } else {
          format!("WHERE {}", conds.join(" AND "))
        };

        let sql = format!(
          "SELECT {ENTITY_COLUMNS} FROM entities
           {where_clause}
           ORDER BY entity_id
           LIMIT ?3"
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![text_pattern.as_deref(), kind_str.as_deref(), limit_val],
            RawEntity::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  async fn update_entity(&self, entity: &Entity) -> Result<()> {
    let row = encode_entity(entity)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE entities SET
             entity_type = ?2,
             student_id = ?3, staff_id = ?4, email = ?5, card_id = ?6,
             device_hash = ?7, face_id = ?8, name = ?9, name_variants = ?10,
             full_name = ?11, profile = ?12, resolved_sources = ?13,
             last_seen = ?14, is_active = ?15, alert_status = ?16
           WHERE entity_id = ?1",
          rusqlite::params![
            row.entity_id,
            row.entity_type,
            row.student_id,
            row.staff_id,
            row.email,
            row.card_id,
            row.device_hash,
            row.face_id,
            row.name,
            row.name_variants,
            row.full_name,
            row.profile,
            row.resolved_sources,
            row.last_seen,
            row.is_active,
            row.alert_status,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Activities — append-only ──────────────────────────────────────────────

  async fn record_activity(&self, input: NewActivity) -> Result<ActivityRecord> {
    input.validate().map_err(Error::Core)?;

    let record = ActivityRecord {
      activity_id:         Uuid::new_v4(),
      entity_id:           input.entity_id,
      kind:                input.kind,
      timestamp:           input.timestamp,
      location:            input.location,
      source_data:         input.source_data,
      confidence:          input.confidence,
      data_source:         input.data_source,
      source_record_id:    input.source_record_id,
      is_predicted:        false,
      prediction_metadata: None,
    };

    let activity_id_str = encode_uuid(record.activity_id);
    let entity_id_str = encode_uuid(record.entity_id);
    let kind_str = record.kind.discriminant().to_owned();
    let timestamp_str = encode_dt(record.timestamp);
    let location_id = record.location.location_id.clone();
    let location_str = encode_json(&record.location)?;
    let source_data_str = record.source_data.as_ref().map(encode_json).transpose()?;
    let confidence = record.confidence;
    let data_source = record.data_source.clone();
    let source_record_id = record.source_record_id.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO activities (
             activity_id, entity_id, activity_type, timestamp,
             location_id, location, source_data, confidence,
             data_source, source_record_id
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            activity_id_str,
            entity_id_str,
            kind_str,
            timestamp_str,
            location_id,
            location_str,
            source_data_str,
            confidence,
            data_source,
            source_record_id,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn latest_activity(&self, entity_id: Uuid) -> Result<Option<ActivityRecord>> {
    let entity_id_str = encode_uuid(entity_id);

    let raw: Option<RawActivity> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {ACTIVITY_COLUMNS} FROM activities
                 WHERE entity_id = ?1
                 ORDER BY timestamp DESC, activity_id
                 LIMIT 1"
              ),
              rusqlite::params![entity_id_str],
              RawActivity::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawActivity::into_record).transpose()
  }

  async fn activities_before(
    &self,
    entity_id: Uuid,
    before: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<ActivityRecord>> {
    let entity_id_str = encode_uuid(entity_id);
    let before_str = encode_dt(before);
    let limit_val = limit as i64;

    let raws: Vec<RawActivity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACTIVITY_COLUMNS} FROM activities
           WHERE entity_id = ?1 AND timestamp < ?2
           ORDER BY timestamp DESC, activity_id
           LIMIT ?3"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![entity_id_str, before_str, limit_val],
            RawActivity::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawActivity::into_record).collect()
  }

  async fn activities_in_range(
    &self,
    entity_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Vec<ActivityRecord>> {
    let entity_id_str = encode_uuid(entity_id);
    let start_str = encode_dt(start);
    let end_str = encode_dt(end);

    let raws: Vec<RawActivity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACTIVITY_COLUMNS} FROM activities
           WHERE entity_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
           ORDER BY timestamp, activity_id"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![entity_id_str, start_str, end_str],
            RawActivity::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawActivity::into_record).collect()
  }

  async fn activities_with_location(
    &self,
    entity_id: Uuid,
    limit: usize,
  ) -> Result<Vec<ActivityRecord>> {
    let entity_id_str = encode_uuid(entity_id);
    let limit_val = limit as i64;

    let raws: Vec<RawActivity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACTIVITY_COLUMNS} FROM activities
           WHERE entity_id = ?1 AND location_id IS NOT NULL
           ORDER BY timestamp DESC, activity_id
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![entity_id_str, limit_val],
            RawActivity::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawActivity::into_record).collect()
  }

  async fn count_activities(&self, entity_id: Uuid) -> Result<u64> {
    let entity_id_str = encode_uuid(entity_id);

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM activities WHERE entity_id = ?1",
          rusqlite::params![entity_id_str],
          |row| row.get(0),
        )?)
      })
      .await?;

    Ok(count as u64)
  }

  // ── Alerts ────────────────────────────────────────────────────────────────

  async fn create_alert_if_absent(&self, input: NewAlert) -> Result<Option<Alert>> {
    let alert = Alert {
      alert_id:         Uuid::new_v4(),
      entity_id:        input.entity_id,
      kind:             input.kind,
      severity:         input.severity,
      title:            input.title,
      message:          input.message,
      details:          input.details,
      status:           AlertStatus::Active,
      acknowledged_by:  None,
      acknowledged_at:  None,
      resolved_by:      None,
      resolved_at:      None,
      resolution_notes: None,
      triggered_at:     Utc::now(),
    };

    let row = encode_alert(&alert)?;

    // DO NOTHING against the partial unique index makes the dedup check
    // and the insert a single atomic statement.
    let inserted: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO alerts (
             alert_id, entity_id, alert_type, severity, title, message,
             details, anomaly_score, status, acknowledged_by, acknowledged_at,
             resolved_by, resolved_at, resolution_notes, triggered_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                     ?14, ?15)
           ON CONFLICT (entity_id, alert_type) WHERE status = 'active'
           DO NOTHING",
          rusqlite::params![
            row.alert_id,
            row.entity_id,
            row.alert_type,
            row.severity,
            row.title,
            row.message,
            row.details,
            row.anomaly_score,
            row.status,
            row.acknowledged_by,
            row.acknowledged_at,
            row.resolved_by,
            row.resolved_at,
            row.resolution_notes,
            row.triggered_at,
          ],
        )?)
      })
      .await?;

    Ok((inserted > 0).then_some(alert))
  }

  async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawAlert> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE alert_id = ?1"),
              rusqlite::params![id_str],
              RawAlert::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAlert::into_alert).transpose()
  }

  async fn find_active_alert(
    &self,
    entity_id: Uuid,
    kind: AlertKind,
    scored_only: bool,
  ) -> Result<Option<Alert>> {
    let entity_id_str = encode_uuid(entity_id);
    let kind_str = kind.discriminant();

    let raw: Option<RawAlert> = self
      .conn
      .call(move |conn| {
        let score_cond = if scored_only { "AND anomaly_score > 0" } else { "" };
        let sql = format!(
          "SELECT {ALERT_COLUMNS} FROM alerts
           WHERE entity_id = ?1 AND alert_type = ?2 AND status = 'active'
           {score_cond}"
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![entity_id_str, kind_str], RawAlert::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAlert::into_alert).transpose()
  }

  async fn list_alerts(&self, status: Option<AlertStatus>) -> Result<Vec<Alert>> {
    let status_str = status.map(encode_alert_status).map(str::to_owned);

    let raws: Vec<RawAlert> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(s) = status_str {
          let mut stmt = conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts
             WHERE status = ?1
             ORDER BY triggered_at DESC, alert_id"
          ))?;
          stmt
            .query_map(rusqlite::params![s], RawAlert::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts
             ORDER BY triggered_at DESC, alert_id"
          ))?;
          stmt
            .query_map([], RawAlert::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAlert::into_alert).collect()
  }

  async fn alerts_triggered_since(&self, since: DateTime<Utc>) -> Result<Vec<Alert>> {
    let since_str = encode_dt(since);

    let raws: Vec<RawAlert> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ALERT_COLUMNS} FROM alerts
           WHERE triggered_at >= ?1
           ORDER BY triggered_at DESC, alert_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![since_str], RawAlert::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAlert::into_alert).collect()
  }

  async fn update_alert(&self, alert: &Alert) -> Result<()> {
    let row = encode_alert(alert)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE alerts SET
             severity = ?2, title = ?3, message = ?4, details = ?5,
             anomaly_score = ?6, status = ?7,
             acknowledged_by = ?8, acknowledged_at = ?9,
             resolved_by = ?10, resolved_at = ?11, resolution_notes = ?12
           WHERE alert_id = ?1",
          rusqlite::params![
            row.alert_id,
            row.severity,
            row.title,
            row.message,
            row.details,
            row.anomaly_score,
            row.status,
            row.acknowledged_by,
            row.acknowledged_at,
            row.resolved_by,
            row.resolved_at,
            row.resolution_notes,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
