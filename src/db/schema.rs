use sqlx::PgPool;

const CREATE_CLIENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS clients (
    id          BIGSERIAL PRIMARY KEY,
    name        VARCHAR(128) NOT NULL,
    balance     NUMERIC(20, 2) NOT NULL CHECK (balance >= 0),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id              BIGSERIAL PRIMARY KEY,
    from_client_id  BIGINT NOT NULL REFERENCES clients(id),
    to_client_id    BIGINT NOT NULL REFERENCES clients(id),
    amount          NUMERIC(20, 2) NOT NULL CHECK (amount > 0),
    status          VARCHAR(16) NOT NULL DEFAULT 'pending',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    processed_at    TIMESTAMPTZ,
    CHECK (from_client_id <> to_client_id)
)
"#;

const CREATE_TRANSACTIONS_INDEXES: [&str; 3] = [
    "CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions (status)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_from ON transactions (from_client_id)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_to ON transactions (to_client_id)",
];

const CREATE_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transaction_history (
    id              BIGSERIAL PRIMARY KEY,
    transaction_id  BIGINT NOT NULL REFERENCES transactions(id),
    client_id       BIGINT NOT NULL REFERENCES clients(id),
    delta           NUMERIC(20, 2) NOT NULL,
    balance_before  NUMERIC(20, 2) NOT NULL,
    balance_after   NUMERIC(20, 2) NOT NULL,
    status          VARCHAR(16) NOT NULL,
    event_time      TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_HISTORY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_history_client ON transaction_history (client_id, id)";

// Outbox-style queue consumed with FOR UPDATE SKIP LOCKED
const CREATE_QUEUE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfer_queue (
    id              BIGSERIAL PRIMARY KEY,
    message_id      UUID NOT NULL UNIQUE,
    transaction_id  BIGINT NOT NULL,
    payload         TEXT NOT NULL,
    attempts        INT NOT NULL DEFAULT 0,
    available_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    enqueued_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_QUEUE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_transfer_queue_available ON transfer_queue (available_at, id)";

/// Initialize the bank schema
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing PostgreSQL schema...");

    sqlx::query(CREATE_CLIENTS_TABLE).execute(pool).await?;
    sqlx::query(CREATE_TRANSACTIONS_TABLE).execute(pool).await?;
    for ddl in CREATE_TRANSACTIONS_INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }
    sqlx::query(CREATE_HISTORY_TABLE).execute(pool).await?;
    sqlx::query(CREATE_HISTORY_INDEX).execute(pool).await?;
    sqlx::query(CREATE_QUEUE_TABLE).execute(pool).await?;
    sqlx::query(CREATE_QUEUE_INDEX).execute(pool).await?;

    tracing::info!("PostgreSQL schema initialized successfully");
    Ok(())
}
