use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            plan            TEXT NOT NULL DEFAULT 'FREE',
            message_limit   INTEGER,
            active          INTEGER NOT NULL DEFAULT 1,
            start_date      TEXT NOT NULL,
            end_date        TEXT,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS personalities (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            type        TEXT NOT NULL,
            description TEXT NOT NULL,
            image_url   TEXT NOT NULL,
            greeting    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            personality_id  TEXT NOT NULL REFERENCES personalities(id),
            created_at      TEXT NOT NULL,
            UNIQUE(user_id, personality_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender          TEXT NOT NULL CHECK (sender IN ('user', 'ai')),
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS memories (
            id                  TEXT PRIMARY KEY,
            user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            conversation_id     TEXT REFERENCES conversations(id) ON DELETE CASCADE,
            personality_id      TEXT REFERENCES personalities(id),
            source_message_id   TEXT REFERENCES messages(id) ON DELETE SET NULL,
            content             TEXT NOT NULL,
            importance          INTEGER NOT NULL DEFAULT 1,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_memories_user
            ON memories(user_id, importance DESC, updated_at DESC);

        -- Seed the stock personas; timestamps use the fixed-width codec format
        INSERT OR IGNORE INTO personalities (id, name, type, description, image_url, greeting, created_at) VALUES
            ('00000000-0000-0000-0000-000000000001', 'Supportive Partner', 'supportive',
             'Nurturing, empathetic, and attentive. Always there to listen.',
             '/images/supportive-partner.jpg', 'Hey you. How are you really doing today?',
             '2026-01-01T00:00:00.000000Z'),
            ('00000000-0000-0000-0000-000000000002', 'Playful Companion', 'playful',
             'Spontaneous, fun-loving, and flirtatious.',
             '/images/playful-companion.jpg', 'Finally! I was getting bored without you.',
             '2026-01-01T00:00:00.000000Z'),
            ('00000000-0000-0000-0000-000000000003', 'Intellectual Equal', 'intellectual',
             'Curious and engaging, with thought-provoking questions.',
             '/images/intellectual-equal.jpg', 'I read something fascinating today. Want to hear it?',
             '2026-01-01T00:00:00.000000Z'),
            ('00000000-0000-0000-0000-000000000004', 'Admirer', 'admirer',
             'Appreciative and affirming. Recognizes your strengths.',
             '/images/admirer.jpg', 'There you are. I was just thinking about you.',
             '2026-01-01T00:00:00.000000Z'),
            ('00000000-0000-0000-0000-000000000005', 'Growth Catalyst', 'growth',
             'Insightful and motivating. Helps you become your best self.',
             '/images/growth-catalyst.jpg', 'Ready to make today count?',
             '2026-01-01T00:00:00.000000Z');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
