//! SQLite-backed implementation of the [`BookingStore`] trait.
//!
//! Durable persistence for the booking core so that:
//!
//!  - reservations and waiting lists survive restarts
//!  - the `auto_reserve_executed` flag outlives the process (the
//!    idempotence guarantee must hold across restarts)
//!  - the manager and engine operate purely in-memory on top

use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use super::BookingStore;
use crate::model::{MemberBookingPreference, MemberTier, Reservation, Slot, WaitingListEntry};

pub struct SqliteBookingStore {
    pool: SqlitePool,
}

impl SqliteBookingStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `path` and ensure the schema exists.
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        let pool = SqlitePool::connect(path).await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create the tables if they do not exist.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS slots (
                id TEXT PRIMARY KEY,
                start_at INTEGER NOT NULL,
                end_at INTEGER NOT NULL,
                capacity INTEGER NOT NULL,
                access_opens_hours INTEGER NOT NULL,
                priority_enabled INTEGER NOT NULL,
                auto_reserve_enabled INTEGER NOT NULL,
                auto_reserve_executed INTEGER NOT NULL,
                category TEXT NOT NULL
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reservations (
                id TEXT PRIMARY KEY,
                slot_id TEXT NOT NULL,
                member_id TEXT NOT NULL,
                active INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                cancelled_at INTEGER
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS waiting_list (
                id TEXT PRIMARY KEY,
                slot_id TEXT NOT NULL,
                member_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                active INTEGER NOT NULL
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS member_preferences (
                member_id TEXT PRIMARY KEY,
                tier TEXT NOT NULL,
                auto_reserve_enabled INTEGER NOT NULL,
                preferred_category TEXT
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn datetime_from_secs(secs: i64) -> anyhow::Result<chrono::DateTime<chrono::Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {}", secs))
}

#[async_trait]
impl BookingStore for SqliteBookingStore {
    async fn load_slots(&self) -> anyhow::Result<Vec<Slot>> {
        let rows = sqlx::query("SELECT * FROM slots")
            .fetch_all(&self.pool)
            .await?;

        let mut slots = Vec::with_capacity(rows.len());

        for row in rows {
            let id_str: String = row.get("id");
            let category: String = row.get("category");

            slots.push(Slot {
                id: uuid::Uuid::parse_str(&id_str)?,
                start: datetime_from_secs(row.get::<i64, _>("start_at"))?,
                end: datetime_from_secs(row.get::<i64, _>("end_at"))?,
                capacity: row.get::<i64, _>("capacity") as u32,
                access_opens_hours: row.get::<i64, _>("access_opens_hours"),
                priority_enabled: row.get::<bool, _>("priority_enabled"),
                auto_reserve_enabled: row.get::<bool, _>("auto_reserve_enabled"),
                auto_reserve_executed: row.get::<bool, _>("auto_reserve_executed"),
                category,
            });
        }

        Ok(slots)
    }

    async fn load_reservations(&self) -> anyhow::Result<Vec<Reservation>> {
        let rows = sqlx::query("SELECT * FROM reservations")
            .fetch_all(&self.pool)
            .await?;

        let mut reservations = Vec::with_capacity(rows.len());

        for row in rows {
            let id_str: String = row.get("id");
            let slot_str: String = row.get("slot_id");
            let member_str: String = row.get("member_id");

            let cancelled_at = match row.get::<Option<i64>, _>("cancelled_at") {
                Some(secs) => Some(datetime_from_secs(secs)?),
                None => None,
            };

            reservations.push(Reservation {
                id: uuid::Uuid::parse_str(&id_str)?,
                slot_id: uuid::Uuid::parse_str(&slot_str)?,
                member_id: uuid::Uuid::parse_str(&member_str)?,
                active: row.get::<bool, _>("active"),
                created_at: datetime_from_secs(row.get::<i64, _>("created_at"))?,
                cancelled_at,
            });
        }

        Ok(reservations)
    }

    async fn load_waiting_list(&self) -> anyhow::Result<Vec<WaitingListEntry>> {
        let rows = sqlx::query("SELECT * FROM waiting_list")
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());

        for row in rows {
            let id_str: String = row.get("id");
            let slot_str: String = row.get("slot_id");
            let member_str: String = row.get("member_id");

            entries.push(WaitingListEntry {
                id: uuid::Uuid::parse_str(&id_str)?,
                slot_id: uuid::Uuid::parse_str(&slot_str)?,
                member_id: uuid::Uuid::parse_str(&member_str)?,
                position: row.get::<i64, _>("position") as u32,
                active: row.get::<bool, _>("active"),
            });
        }

        Ok(entries)
    }

    async fn load_preferences(&self) -> anyhow::Result<Vec<MemberBookingPreference>> {
        let rows = sqlx::query("SELECT * FROM member_preferences")
            .fetch_all(&self.pool)
            .await?;

        let mut prefs = Vec::with_capacity(rows.len());

        for row in rows {
            let member_str: String = row.get("member_id");
            let tier_str: String = row.get("tier");
            let tier = MemberTier::from_str(&tier_str)
                .map_err(|e| anyhow::anyhow!("invalid tier '{}': {}", tier_str, e))?;

            prefs.push(MemberBookingPreference {
                member_id: uuid::Uuid::parse_str(&member_str)?,
                tier,
                auto_reserve_enabled: row.get::<bool, _>("auto_reserve_enabled"),
                preferred_category: row.get::<Option<String>, _>("preferred_category"),
            });
        }

        Ok(prefs)
    }

    async fn save_slot(&self, slot: &Slot) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO slots (
                id, start_at, end_at, capacity, access_opens_hours,
                priority_enabled, auto_reserve_enabled, auto_reserve_executed,
                category
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                start_at = excluded.start_at,
                end_at = excluded.end_at,
                capacity = excluded.capacity,
                access_opens_hours = excluded.access_opens_hours,
                priority_enabled = excluded.priority_enabled,
                auto_reserve_enabled = excluded.auto_reserve_enabled,
                auto_reserve_executed = excluded.auto_reserve_executed,
                category = excluded.category;
        "#,
        )
        .bind(slot.id.to_string())
        .bind(slot.start.timestamp())
        .bind(slot.end.timestamp())
        .bind(slot.capacity as i64)
        .bind(slot.access_opens_hours)
        .bind(slot.priority_enabled)
        .bind(slot.auto_reserve_enabled)
        .bind(slot.auto_reserve_executed)
        .bind(&slot.category)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_reservation(&self, reservation: &Reservation) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, slot_id, member_id, active, created_at, cancelled_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                slot_id = excluded.slot_id,
                member_id = excluded.member_id,
                active = excluded.active,
                created_at = excluded.created_at,
                cancelled_at = excluded.cancelled_at;
        "#,
        )
        .bind(reservation.id.to_string())
        .bind(reservation.slot_id.to_string())
        .bind(reservation.member_id.to_string())
        .bind(reservation.active)
        .bind(reservation.created_at.timestamp())
        .bind(reservation.cancelled_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_waiting_entry(&self, entry: &WaitingListEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO waiting_list (id, slot_id, member_id, position, active)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                slot_id = excluded.slot_id,
                member_id = excluded.member_id,
                position = excluded.position,
                active = excluded.active;
        "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.slot_id.to_string())
        .bind(entry.member_id.to_string())
        .bind(entry.position as i64)
        .bind(entry.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_preference(&self, pref: &MemberBookingPreference) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO member_preferences (
                member_id, tier, auto_reserve_enabled, preferred_category
            )
            VALUES (?, ?, ?, ?)
            ON CONFLICT(member_id) DO UPDATE SET
                tier = excluded.tier,
                auto_reserve_enabled = excluded.auto_reserve_enabled,
                preferred_category = excluded.preferred_category;
        "#,
        )
        .bind(pref.member_id.to_string())
        .bind(pref.tier.to_string())
        .bind(pref.auto_reserve_enabled)
        .bind(&pref.preferred_category)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
