//! SQLite schema definition

/// SQL schema for the records database
pub const SCHEMA_SQL: &str = r#"
-- Chatbots: owning tenants of documents and dialogues
CREATE TABLE IF NOT EXISTS chatbots (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    settings_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Documents: uploaded files awaiting or holding an index projection
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    chatbot_id TEXT NOT NULL REFERENCES chatbots(id),
    title TEXT NOT NULL,
    object_key TEXT NOT NULL,
    mime_type TEXT NOT NULL DEFAULT 'application/octet-stream',
    sync_status TEXT NOT NULL DEFAULT 'NOT_SYNCED',
    sync_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Dialogues: authored question/answer pairs
CREATE TABLE IF NOT EXISTS dialogues (
    id TEXT PRIMARY KEY,
    chatbot_id TEXT NOT NULL REFERENCES chatbots(id),
    name TEXT NOT NULL,
    questions_json TEXT NOT NULL,
    answer TEXT NOT NULL,
    sync_status TEXT NOT NULL DEFAULT 'NOT_SYNCED',
    sync_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Sync executions: one durable workflow run per entity, keyed for dedup
CREATE TABLE IF NOT EXISTS sync_executions (
    id TEXT PRIMARY KEY,
    entity_kind TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    state TEXT NOT NULL,
    step TEXT NOT NULL,
    step_data TEXT,
    attempt INTEGER NOT NULL DEFAULT 0,
    next_attempt_at TEXT,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_documents_chatbot ON documents(chatbot_id);
CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(sync_status);
CREATE INDEX IF NOT EXISTS idx_dialogues_chatbot ON dialogues(chatbot_id);
CREATE INDEX IF NOT EXISTS idx_dialogues_status ON dialogues(sync_status);
CREATE INDEX IF NOT EXISTS idx_executions_state ON sync_executions(state);
CREATE INDEX IF NOT EXISTS idx_executions_entity ON sync_executions(entity_id);
"#;
