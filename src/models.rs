use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored account. The password hash never leaves the process; responses use [`PublicUser`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub username: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wire shape of an item; ownership stays implicit in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Item> for ItemView {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            text: item.text,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

/// One contiguous span during which the service was accepting requests.
///
/// `end_time == None` means the span is still open: either this process is
/// running, or a previous one died before it could close it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimePeriod {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RuntimePeriod {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// `start <= to && (end is open || end >= from)`; a missing bound never excludes.
    pub fn overlaps(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
        let started_by_to = to.is_none_or(|to| self.start_time <= to);
        let running_at_from = match (self.end_time, from) {
            (Some(end), Some(from)) => end >= from,
            _ => true,
        };
        started_by_to && running_at_from
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateItemRequest {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemList {
    pub items: Vec<ItemView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemEnvelope {
    pub item: ItemView,
}

#[derive(Debug, Clone, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub const fn ok() -> Self {
        Self { ok: true }
    }
}

/// Raw `from`/`to` query values; parsing happens in the ledger so bad input maps to a 400.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationalTimeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodView {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl From<&RuntimePeriod> for PeriodView {
    fn from(period: &RuntimePeriod) -> Self {
        Self {
            start_time: period.start_time,
            end_time: period.end_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationalTimeReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_seconds: u64,
    pub total_human: String,
    pub periods: Vec<PeriodView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + Duration::seconds(secs)
    }

    fn period(start: i64, end: Option<i64>) -> RuntimePeriod {
        RuntimePeriod {
            id: Uuid::nil(),
            start_time: at(start),
            end_time: end.map(at),
            created_at: at(start),
            updated_at: at(start),
        }
    }

    #[test]
    fn overlap_predicate_is_inclusive_at_both_ends() {
        let closed = period(10, Some(20));
        assert!(closed.overlaps(Some(at(20)), Some(at(30))));
        assert!(closed.overlaps(Some(at(0)), Some(at(10))));
        assert!(!closed.overlaps(Some(at(21)), Some(at(30))));
        assert!(!closed.overlaps(Some(at(0)), Some(at(9))));
        assert!(closed.overlaps(None, None));
    }

    #[test]
    fn open_period_overlaps_any_window_after_its_start() {
        let open = period(10, None);
        assert!(open.overlaps(Some(at(1_000)), Some(at(2_000))));
        assert!(!open.overlaps(Some(at(0)), Some(at(5))));
    }

    #[test]
    fn wire_shapes_use_camel_case_and_hide_secrets() {
        let view = PeriodView::from(&period(0, None));
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["endTime"], json!(null));
        assert!(value.get("startTime").is_some());

        let user = User {
            id: Uuid::nil(),
            username: "test".into(),
            password_hash: "$2b$secret".into(),
            name: "Test User".into(),
            created_at: at(0),
            updated_at: at(0),
        };
        let public = serde_json::to_value(PublicUser::from(&user)).unwrap();
        assert_eq!(
            public,
            json!({ "id": Uuid::nil(), "name": "Test User", "username": "test" })
        );
    }
}
