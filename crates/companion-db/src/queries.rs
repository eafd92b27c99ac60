use crate::models::{
    ConversationRow, MemoryRow, MessageRow, NewMemory, NewPersonality, PersonalityRow,
    SubscriptionRow, UserRow,
};
use crate::{Database, encode_timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use companion_types::models::{Plan, Sender};
use rusqlite::{Connection, Row};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, name, email, password, created_at";
const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, plan, message_limit, active, start_date, end_date, updated_at";
const PERSONALITY_COLUMNS: &str = "id, name, type, description, image_url, greeting, created_at";
const CONVERSATION_COLUMNS: &str = "id, user_id, personality_id, created_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, sender, content, created_at";
const MEMORY_COLUMNS: &str = "id, user_id, conversation_id, personality_id, source_message_id, content, importance, created_at, updated_at";

impl Database {
    // -- Users --

    /// Create a user together with their default free subscription.
    pub fn register_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<UserRow> {
        self.with_tx(|conn| {
            let user = insert_user(conn, name, email, password_hash, now)?;
            upsert_subscription(conn, &user.id, Plan::Free, now)?;
            Ok(user)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    // -- Subscriptions --

    pub fn get_subscription(&self, user_id: &str) -> Result<Option<SubscriptionRow>> {
        self.with_conn(|conn| query_subscription(conn, user_id))
    }

    pub fn upsert_subscription(
        &self,
        user_id: &str,
        plan: Plan,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionRow> {
        self.with_tx(|conn| upsert_subscription(conn, user_id, plan, now))
    }

    /// Partial update. Deactivating stamps `end_date`. `None` when the user
    /// has no subscription.
    pub fn patch_subscription(
        &self,
        user_id: &str,
        active: Option<bool>,
        plan: Option<Plan>,
        now: DateTime<Utc>,
    ) -> Result<Option<SubscriptionRow>> {
        self.with_tx(|conn| {
            if query_subscription(conn, user_id)?.is_none() {
                return Ok(None);
            }
            let ts = encode_timestamp(now);
            if let Some(active) = active {
                let end_date = if active { None } else { Some(ts.as_str()) };
                conn.execute(
                    "UPDATE subscriptions SET active = ?2, end_date = ?3, updated_at = ?4 WHERE user_id = ?1",
                    rusqlite::params![user_id, active, end_date, ts],
                )?;
            }
            if let Some(plan) = plan {
                conn.execute(
                    "UPDATE subscriptions SET plan = ?2, message_limit = ?3, updated_at = ?4 WHERE user_id = ?1",
                    rusqlite::params![user_id, plan.as_str(), plan_limit(plan), ts],
                )?;
            }
            query_subscription(conn, user_id)
        })
    }

    // -- Personalities --

    pub fn list_personalities(&self) -> Result<Vec<PersonalityRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {PERSONALITY_COLUMNS} FROM personalities ORDER BY name ASC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], personality_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_personality(&self, id: &str) -> Result<Option<PersonalityRow>> {
        self.with_conn(|conn| query_personality(conn, id))
    }

    pub fn create_personality(&self, new: &NewPersonality<'_>, now: DateTime<Utc>) -> Result<PersonalityRow> {
        self.with_conn(|conn| {
            let row = PersonalityRow {
                id: Uuid::new_v4().to_string(),
                name: new.name.to_string(),
                kind: new.kind.to_string(),
                description: new.description.to_string(),
                image_url: new.image_url.to_string(),
                greeting: new.greeting.to_string(),
                created_at: encode_timestamp(now),
            };
            conn.execute(
                "INSERT INTO personalities (id, name, type, description, image_url, greeting, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    row.id,
                    row.name,
                    row.kind,
                    row.description,
                    row.image_url,
                    row.greeting,
                    row.created_at
                ],
            )?;
            Ok(row)
        })
    }

    // -- Conversations --

    pub fn find_or_create_conversation(
        &self,
        user_id: &str,
        personality_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(ConversationRow, bool)> {
        self.with_tx(|conn| find_or_create_conversation(conn, user_id, personality_id, now))
    }

    /// The conversation only if `user_id` owns it.
    pub fn get_owned_conversation(&self, id: &str, user_id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_owned_conversation(conn, id, user_id))
    }

    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_id = ?1 ORDER BY created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        conversation_id: &str,
        sender: Sender,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| insert_message(conn, conversation_id, sender, content, now))
    }

    /// Messages of a conversation, oldest first. `limit` caps the count from the start.
    pub fn get_messages(&self, conversation_id: &str, limit: Option<u32>) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, conversation_id, limit))
    }

    pub fn count_user_messages_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<u32> {
        self.with_conn(|conn| count_user_messages_since(conn, user_id, since))
    }

    // -- Memories --

    pub fn insert_memory(&self, new: &NewMemory<'_>, now: DateTime<Utc>) -> Result<MemoryRow> {
        self.with_conn(|conn| insert_memory(conn, new, now))
    }

    pub fn get_memory(&self, id: &str) -> Result<Option<MemoryRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1");
            let row = conn.query_row(&sql, [id], memory_from_row).optional()?;
            Ok(row)
        })
    }

    /// Memories a user holds about one character, most important and most
    /// recently touched first.
    pub fn memories_for_character(&self, user_id: &str, personality_id: &str) -> Result<Vec<MemoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memories
                 WHERE user_id = ?1 AND personality_id = ?2
                 ORDER BY importance DESC, updated_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id, personality_id], memory_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn memories_for_conversation(&self, conversation_id: &str) -> Result<Vec<MemoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memories
                 WHERE conversation_id = ?1
                 ORDER BY importance DESC, updated_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([conversation_id], memory_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn top_memories(&self, user_id: &str, limit: u32) -> Result<Vec<MemoryRow>> {
        self.with_conn(|conn| query_top_memories(conn, user_id, limit))
    }

    /// Returns the updated row, or `None` if no memory has this id.
    pub fn update_memory(
        &self,
        id: &str,
        content: Option<&str>,
        importance: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Option<MemoryRow>> {
        self.with_tx(|conn| {
            let ts = encode_timestamp(now);
            let changed = conn.execute(
                "UPDATE memories
                 SET content = COALESCE(?2, content),
                     importance = COALESCE(?3, importance),
                     updated_at = ?4
                 WHERE id = ?1",
                rusqlite::params![id, content, importance, ts],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], memory_from_row).optional()?)
        })
    }

    pub fn delete_memory(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM memories WHERE id = ?1", [id])? > 0))
    }

    // -- Health --

    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }
}

// Connection-level operations. Exposed so that callers can compose several of
// them inside one `Database::with_tx`.

pub fn insert_user(
    conn: &Connection,
    name: &str,
    email: &str,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<UserRow> {
    let row = UserRow {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        email: email.to_string(),
        password: password_hash.to_string(),
        created_at: encode_timestamp(now),
    };
    conn.execute(
        "INSERT INTO users (id, name, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        (&row.id, &row.name, &row.email, &row.password, &row.created_at),
    )?;
    Ok(row)
}

pub fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    let row = conn.query_row(&sql, [id], user_from_row).optional()?;
    Ok(row)
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
    let row = conn.query_row(&sql, [email], user_from_row).optional()?;
    Ok(row)
}

pub fn query_subscription(conn: &Connection, user_id: &str) -> Result<Option<SubscriptionRow>> {
    let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = ?1");
    let row = conn.query_row(&sql, [user_id], subscription_from_row).optional()?;
    Ok(row)
}

/// Create the subscription, or switch an existing one to `plan` and reactivate it.
pub fn upsert_subscription(
    conn: &Connection,
    user_id: &str,
    plan: Plan,
    now: DateTime<Utc>,
) -> Result<SubscriptionRow> {
    let ts = encode_timestamp(now);
    conn.execute(
        "INSERT INTO subscriptions (id, user_id, plan, message_limit, active, start_date, end_date, updated_at)
         VALUES (?1, ?2, ?3, ?4, 1, ?5, NULL, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
             plan = excluded.plan,
             message_limit = excluded.message_limit,
             active = 1,
             end_date = NULL,
             updated_at = excluded.updated_at",
        rusqlite::params![Uuid::new_v4().to_string(), user_id, plan.as_str(), plan_limit(plan), ts],
    )?;
    query_subscription(conn, user_id)?
        .ok_or_else(|| anyhow::anyhow!("subscription for {} vanished after upsert", user_id))
}

pub fn query_personality(conn: &Connection, id: &str) -> Result<Option<PersonalityRow>> {
    let sql = format!("SELECT {PERSONALITY_COLUMNS} FROM personalities WHERE id = ?1");
    let row = conn.query_row(&sql, [id], personality_from_row).optional()?;
    Ok(row)
}

/// Returns the conversation for (user, personality) and whether it was just created.
pub fn find_or_create_conversation(
    conn: &Connection,
    user_id: &str,
    personality_id: &str,
    now: DateTime<Utc>,
) -> Result<(ConversationRow, bool)> {
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_id = ?1 AND personality_id = ?2"
    );
    if let Some(existing) = conn
        .query_row(&sql, [user_id, personality_id], conversation_from_row)
        .optional()?
    {
        return Ok((existing, false));
    }

    let row = ConversationRow {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        personality_id: personality_id.to_string(),
        created_at: encode_timestamp(now),
    };
    conn.execute(
        "INSERT INTO conversations (id, user_id, personality_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        (&row.id, &row.user_id, &row.personality_id, &row.created_at),
    )?;
    Ok((row, true))
}

pub fn query_owned_conversation(
    conn: &Connection,
    id: &str,
    user_id: &str,
) -> Result<Option<ConversationRow>> {
    let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1 AND user_id = ?2");
    let row = conn.query_row(&sql, [id, user_id], conversation_from_row).optional()?;
    Ok(row)
}

pub fn insert_message(
    conn: &Connection,
    conversation_id: &str,
    sender: Sender,
    content: &str,
    now: DateTime<Utc>,
) -> Result<MessageRow> {
    let row = MessageRow {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_string(),
        sender: sender.as_str().to_string(),
        content: content.to_string(),
        created_at: encode_timestamp(now),
    };
    conn.execute(
        "INSERT INTO messages (id, conversation_id, sender, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        (&row.id, &row.conversation_id, &row.sender, &row.content, &row.created_at),
    )?;
    Ok(row)
}

fn query_messages(conn: &Connection, conversation_id: &str, limit: Option<u32>) -> Result<Vec<MessageRow>> {
    // rowid breaks ties between messages written within the same microsecond
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE conversation_id = ?1
         ORDER BY created_at ASC, rowid ASC
         LIMIT ?2"
    );
    // SQLite treats a negative LIMIT as unbounded
    let limit = limit.map(i64::from).unwrap_or(-1);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params![conversation_id, limit], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// User-sent messages since `since`, across every conversation owned by
/// `user_id` and no others.
pub fn count_user_messages_since(conn: &Connection, user_id: &str, since: DateTime<Utc>) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*)
         FROM messages m
         JOIN conversations c ON c.id = m.conversation_id
         WHERE c.user_id = ?1
           AND m.sender = 'user'
           AND m.created_at >= ?2",
        rusqlite::params![user_id, encode_timestamp(since)],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn insert_memory(conn: &Connection, new: &NewMemory<'_>, now: DateTime<Utc>) -> Result<MemoryRow> {
    let ts = encode_timestamp(now);
    let row = MemoryRow {
        id: Uuid::new_v4().to_string(),
        user_id: new.user_id.to_string(),
        conversation_id: new.conversation_id.map(str::to_string),
        personality_id: new.personality_id.map(str::to_string),
        source_message_id: new.source_message_id.map(str::to_string),
        content: new.content.to_string(),
        importance: new.importance,
        created_at: ts.clone(),
        updated_at: ts,
    };
    conn.execute(
        "INSERT INTO memories (id, user_id, conversation_id, personality_id, source_message_id, content, importance, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            row.id,
            row.user_id,
            row.conversation_id,
            row.personality_id,
            row.source_message_id,
            row.content,
            row.importance,
            row.created_at,
            row.updated_at
        ],
    )?;
    Ok(row)
}

pub fn query_top_memories(conn: &Connection, user_id: &str, limit: u32) -> Result<Vec<MemoryRow>> {
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories
         WHERE user_id = ?1
         ORDER BY importance DESC, updated_at DESC
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params![user_id, limit], memory_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn plan_limit(plan: Plan) -> Option<i64> {
    match plan {
        Plan::Free => Some(15),
        Plan::Basic => Some(150),
        Plan::Premium => None,
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionRow> {
    Ok(SubscriptionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        plan: row.get(2)?,
        message_limit: row.get(3)?,
        active: row.get(4)?,
        start_date: row.get(5)?,
        end_date: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn personality_from_row(row: &Row<'_>) -> rusqlite::Result<PersonalityRow> {
    Ok(PersonalityRow {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        description: row.get(3)?,
        image_url: row.get(4)?,
        greeting: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        personality_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryRow> {
    Ok(MemoryRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        conversation_id: row.get(2)?,
        personality_id: row.get(3)?,
        source_message_id: row.get(4)?,
        content: row.get(5)?,
        importance: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const SUPPORTIVE: &str = "00000000-0000-0000-0000-000000000001";
    const PLAYFUL: &str = "00000000-0000-0000-0000-000000000002";

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, hour, minute, 0).unwrap()
    }

    fn user(db: &Database, email: &str) -> UserRow {
        db.register_user("Sam", email, "hash", at(0, 0)).unwrap()
    }

    #[test]
    fn registration_creates_free_subscription() {
        let db = Database::open_in_memory().unwrap();
        let sam = user(&db, "sam@example.com");

        let sub = db.get_subscription(&sam.id).unwrap().unwrap();
        assert_eq!(sub.plan, "FREE");
        assert_eq!(sub.message_limit, Some(15));
        assert!(sub.active);
        assert!(db.get_user_by_email("sam@example.com").unwrap().is_some());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        user(&db, "sam@example.com");
        assert!(db.register_user("Other", "sam@example.com", "h", at(1, 0)).is_err());
    }

    #[test]
    fn stock_personalities_are_seeded_in_name_order() {
        let db = Database::open_in_memory().unwrap();
        let names: Vec<String> = db.list_personalities().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            [
                "Admirer",
                "Growth Catalyst",
                "Intellectual Equal",
                "Playful Companion",
                "Supportive Partner"
            ]
        );
    }

    #[test]
    fn conversation_is_created_once_per_pair() {
        let db = Database::open_in_memory().unwrap();
        let sam = user(&db, "sam@example.com");

        let (first, created) = db.find_or_create_conversation(&sam.id, SUPPORTIVE, at(9, 0)).unwrap();
        assert!(created);
        let (second, created) = db.find_or_create_conversation(&sam.id, SUPPORTIVE, at(9, 5)).unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        let (other, created) = db.find_or_create_conversation(&sam.id, PLAYFUL, at(9, 6)).unwrap();
        assert!(created);
        assert_ne!(other.id, first.id);
        assert_eq!(db.list_conversations(&sam.id).unwrap().len(), 2);
    }

    #[test]
    fn conversation_requires_known_personality() {
        let db = Database::open_in_memory().unwrap();
        let sam = user(&db, "sam@example.com");
        assert!(db.find_or_create_conversation(&sam.id, "nope", at(9, 0)).is_err());
    }

    #[test]
    fn owned_conversation_lookup_hides_other_users() {
        let db = Database::open_in_memory().unwrap();
        let sam = user(&db, "sam@example.com");
        let kim = user(&db, "kim@example.com");
        let (conv, _) = db.find_or_create_conversation(&sam.id, SUPPORTIVE, at(9, 0)).unwrap();

        assert!(db.get_owned_conversation(&conv.id, &sam.id).unwrap().is_some());
        assert!(db.get_owned_conversation(&conv.id, &kim.id).unwrap().is_none());
    }

    #[test]
    fn messages_come_back_in_creation_order() {
        let db = Database::open_in_memory().unwrap();
        let sam = user(&db, "sam@example.com");
        let (conv, _) = db.find_or_create_conversation(&sam.id, SUPPORTIVE, at(9, 0)).unwrap();

        // Same timestamp: insertion order decides.
        let a = db.insert_message(&conv.id, Sender::User, "first", at(10, 0)).unwrap();
        let b = db.insert_message(&conv.id, Sender::Ai, "second", at(10, 0)).unwrap();
        let earlier = db.insert_message(&conv.id, Sender::User, "earliest", at(8, 0)).unwrap();

        let ids: Vec<String> = db.get_messages(&conv.id, None).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, [earlier.id.clone(), a.id, b.id]);

        let first_two = db.get_messages(&conv.id, Some(2)).unwrap();
        assert_eq!(first_two.len(), 2);
        assert_eq!(first_two[0].id, earlier.id);
    }

    #[test]
    fn daily_count_only_sees_own_user_messages_since_boundary() {
        let db = Database::open_in_memory().unwrap();
        let sam = user(&db, "sam@example.com");
        let kim = user(&db, "kim@example.com");
        let (sam_a, _) = db.find_or_create_conversation(&sam.id, SUPPORTIVE, at(0, 0)).unwrap();
        let (sam_b, _) = db.find_or_create_conversation(&sam.id, PLAYFUL, at(0, 0)).unwrap();
        let (kim_conv, _) = db.find_or_create_conversation(&kim.id, SUPPORTIVE, at(0, 0)).unwrap();

        let midnight = at(0, 0);
        db.insert_message(&sam_a.id, Sender::User, "yesterday", midnight - Duration::seconds(1)).unwrap();
        db.insert_message(&sam_a.id, Sender::User, "at midnight", midnight).unwrap();
        db.insert_message(&sam_a.id, Sender::Ai, "reply", at(0, 1)).unwrap();
        db.insert_message(&sam_b.id, Sender::User, "other persona", at(12, 0)).unwrap();
        db.insert_message(&kim_conv.id, Sender::User, "not sam", at(12, 0)).unwrap();

        assert_eq!(db.count_user_messages_since(&sam.id, midnight).unwrap(), 2);
        assert_eq!(db.count_user_messages_since(&kim.id, midnight).unwrap(), 1);
    }

    #[test]
    fn subscription_upsert_reactivates_and_patch_deactivates() {
        let db = Database::open_in_memory().unwrap();
        let sam = user(&db, "sam@example.com");

        let sub = db.patch_subscription(&sam.id, Some(false), None, at(5, 0)).unwrap().unwrap();
        assert!(!sub.active);
        assert_eq!(sub.end_date.as_deref(), Some(encode_timestamp(at(5, 0)).as_str()));

        let sub = db.upsert_subscription(&sam.id, Plan::Premium, at(6, 0)).unwrap();
        assert!(sub.active);
        assert_eq!(sub.plan, "PREMIUM");
        assert_eq!(sub.message_limit, None);
        assert_eq!(sub.end_date, None);

        let sub = db.patch_subscription(&sam.id, None, Some(Plan::Basic), at(7, 0)).unwrap().unwrap();
        assert_eq!(sub.plan, "BASIC");
        assert_eq!(sub.message_limit, Some(150));
        assert!(sub.active);
    }

    #[test]
    fn patch_without_subscription_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.patch_subscription("ghost", Some(true), None, at(1, 0)).unwrap().is_none());
    }

    #[test]
    fn memories_rank_by_importance_then_recency() {
        let db = Database::open_in_memory().unwrap();
        let sam = user(&db, "sam@example.com");
        let memory = |content: &str, importance: i64, when| {
            db.insert_memory(
                &NewMemory {
                    user_id: &sam.id,
                    conversation_id: None,
                    personality_id: Some(SUPPORTIVE),
                    source_message_id: None,
                    content,
                    importance,
                },
                when,
            )
            .unwrap()
        };
        memory("old low", 1, at(1, 0));
        memory("old high", 5, at(1, 0));
        memory("new high", 5, at(2, 0));
        memory("mid", 3, at(3, 0));

        let order: Vec<String> = db
            .memories_for_character(&sam.id, SUPPORTIVE)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(order, ["new high", "old high", "mid", "old low"]);

        let top: Vec<String> = db.top_memories(&sam.id, 2).unwrap().into_iter().map(|m| m.content).collect();
        assert_eq!(top, ["new high", "old high"]);
    }

    #[test]
    fn memory_update_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let sam = user(&db, "sam@example.com");
        let created = db
            .insert_memory(
                &NewMemory {
                    user_id: &sam.id,
                    conversation_id: None,
                    personality_id: None,
                    source_message_id: None,
                    content: "likes tea",
                    importance: 1,
                },
                at(1, 0),
            )
            .unwrap();

        let updated = db.update_memory(&created.id, None, Some(4), at(2, 0)).unwrap().unwrap();
        assert_eq!(updated.content, "likes tea");
        assert_eq!(updated.importance, 4);
        assert_eq!(updated.updated_at, encode_timestamp(at(2, 0)));

        assert!(db.update_memory("missing", Some("x"), None, at(2, 0)).unwrap().is_none());
        assert!(db.delete_memory(&created.id).unwrap());
        assert!(!db.delete_memory(&created.id).unwrap());
        assert!(db.get_memory(&created.id).unwrap().is_none());
    }
}
