//! ABOUTME: Event repository with day, format and country filters
//! ABOUTME: Event dates are stored as ISO strings so day filters compare prefixes

use super::{like_pattern, non_blank, write_error, PageRequest};
use chrono::NaiveDate;
use sb_core::{time::today, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument};

const EVENT_COLUMNS: &str =
    "id, title, description, date, format, location, country, registration_url, status";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub date: Option<String>,
    pub format: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub registration_url: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub date: Option<String>,
    pub format: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub registration_url: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub q: Option<String>,
    /// Only events on this calendar day
    pub day: Option<NaiveDate>,
    pub format: Option<String>,
    pub country: Option<String>,
    pub status: Option<String>,
}

pub struct EventRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> EventRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateEventRequest) -> Result<Event> {
        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::Validation("Event title is required".to_string()));
        }

        let id = Id::new().to_string();
        debug!("Creating event with id: {}", id);

        sqlx::query_as::<_, Event>(&format!(
            "INSERT INTO events (id, title, description, date, format, location, country, \
             registration_url, status) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) RETURNING {}",
            EVENT_COLUMNS
        ))
        .bind(id)
        .bind(title)
        .bind(request.description)
        .bind(request.date)
        .bind(request.format)
        .bind(request.location)
        .bind(request.country)
        .bind(request.registration_url)
        .bind(request.status.unwrap_or_else(|| "active".to_string()))
        .fetch_one(self.pool)
        .await
        .map_err(|e| write_error("create event", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Event>> {
        sqlx::query_as::<_, Event>(&format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find event by id: {}", e)))
    }

    /// Filtered page in chronological order
    #[instrument(skip(self))]
    pub async fn search(&self, filter: &EventFilter, page: PageRequest) -> Result<Vec<Event>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM events WHERE 1=1",
            EVENT_COLUMNS
        ));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY date IS NULL, date ASC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        qb.build_query_as::<Event>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to search events: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn count(&self, filter: &EventFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM events WHERE 1=1");
        push_filters(&mut qb, filter);
        qb.build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count events: {}", e)))
    }

    /// Active events from today on, soonest first
    #[instrument(skip(self))]
    pub async fn upcoming(&self, limit: i64) -> Result<Vec<Event>> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE status = 'active' AND date >= ?1 \
             ORDER BY date ASC LIMIT ?2",
            EVENT_COLUMNS
        ))
        .bind(today().format("%Y-%m-%d").to_string())
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list upcoming events: {}", e)))
    }

    /// Other upcoming active events
    #[instrument(skip(self))]
    pub async fn others(&self, exclude_id: &str, limit: i64) -> Result<Vec<Event>> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE id != ?1 AND status = 'active' AND date >= ?2 \
             ORDER BY date ASC LIMIT ?3",
            EVENT_COLUMNS
        ))
        .bind(exclude_id)
        .bind(today().format("%Y-%m-%d").to_string())
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list other events: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn formats(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT format FROM events WHERE format IS NOT NULL AND TRIM(format) != '' \
             ORDER BY format",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list event formats: {}", e)))
    }

    /// Replace every field of an event
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: &str, request: CreateEventRequest) -> Result<Event> {
        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::Validation("Event title is required".to_string()));
        }

        sqlx::query_as::<_, Event>(&format!(
            "UPDATE events SET title = ?1, description = ?2, date = ?3, format = ?4, \
             location = ?5, country = ?6, registration_url = ?7, status = COALESCE(?8, status) \
             WHERE id = ?9 RETURNING {}",
            EVENT_COLUMNS
        ))
        .bind(title)
        .bind(request.description)
        .bind(request.date)
        .bind(request.format)
        .bind(request.location)
        .bind(request.country)
        .bind(request.registration_url)
        .bind(request.status)
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| write_error("update event", e))?
        .ok_or_else(|| Error::NotFound("Event not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete event: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &EventFilter) {
    if let Some(q) = non_blank(&filter.q) {
        qb.push(" AND title LIKE ")
            .push_bind(like_pattern(&q))
            .push(" ESCAPE '\\'");
    }
    if let Some(day) = filter.day {
        qb.push(" AND substr(date, 1, 10) = ")
            .push_bind(day.format("%Y-%m-%d").to_string());
    }
    if let Some(format) = non_blank(&filter.format) {
        qb.push(" AND format = ").push_bind(format);
    }
    if let Some(country) = non_blank(&filter.country) {
        qb.push(" AND country = ").push_bind(country);
    }
    if let Some(status) = non_blank(&filter.status) {
        qb.push(" AND status = ").push_bind(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_db;
    use chrono::Duration;

    fn event(title: &str, date: &str, format: &str) -> CreateEventRequest {
        CreateEventRequest {
            title: title.to_string(),
            date: Some(date.to_string()),
            format: Some(format.to_string()),
            country: Some("Kazakhstan".to_string()),
            ..Default::default()
        }
    }

    fn day_offset(days: i64) -> String {
        (today() + Duration::days(days))
            .format("%Y-%m-%dT18:00:00")
            .to_string()
    }

    #[tokio::test]
    async fn test_day_and_format_filters() {
        let db = create_test_db().await;
        let repo = EventRepository::new(db.pool());

        repo.create(event("Demo Day", "2024-06-01T10:00:00", "offline"))
            .await
            .expect("create");
        repo.create(event("Pitch Night", "2024-06-01T19:00:00", "online"))
            .await
            .expect("create");
        repo.create(event("Hackathon", "2024-06-02T09:00:00", "offline"))
            .await
            .expect("create");

        let june_first = EventFilter {
            day: NaiveDate::from_ymd_opt(2024, 6, 1),
            ..Default::default()
        };
        let found = repo.search(&june_first, PageRequest::default()).await.expect("search");
        let titles: Vec<_> = found.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Demo Day", "Pitch Night"]);

        let offline = EventFilter {
            format: Some("offline".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.count(&offline).await.expect("count"), 2);
        assert_eq!(repo.formats().await.expect("formats"), vec!["offline", "online"]);
    }

    #[tokio::test]
    async fn test_upcoming_skips_past_and_inactive() {
        let db = create_test_db().await;
        let repo = EventRepository::new(db.pool());

        repo.create(event("Past", &day_offset(-3), "offline"))
            .await
            .expect("create");
        let soon = repo
            .create(event("Soon", &day_offset(1), "offline"))
            .await
            .expect("create");
        repo.create(event("Later", &day_offset(10), "online"))
            .await
            .expect("create");
        repo.create(CreateEventRequest {
            status: Some("draft".to_string()),
            ..event("Hidden", &day_offset(2), "online")
        })
        .await
        .expect("create");

        let upcoming = repo.upcoming(3).await.expect("upcoming");
        let titles: Vec<_> = upcoming.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Soon", "Later"]);

        let others = repo.others(&soon.id, 3).await.expect("others");
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].title, "Later");
    }

    #[tokio::test]
    async fn test_update_and_delete_event() {
        let db = create_test_db().await;
        let repo = EventRepository::new(db.pool());
        let created = repo
            .create(event("Meetup", "2024-01-01", "offline"))
            .await
            .expect("create");

        let updated = repo
            .update(&created.id, event("Meetup #2", "2024-02-01", "hybrid"))
            .await
            .expect("update");
        assert_eq!(updated.format.as_deref(), Some("hybrid"));

        assert!(repo.delete(&created.id).await.expect("delete"));
        assert!(matches!(
            repo.update(&created.id, event("Gone", "2024-01-01", "x")).await,
            Err(Error::NotFound(_))
        ));
    }
}
