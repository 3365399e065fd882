use sqlx::AnyPool;

const STATEMENTS: &[&str] = &[
    // Buyers (identity is owned elsewhere; the engine only checks existence)
    r#"
CREATE TABLE IF NOT EXISTS buyers (
  buyer_id INTEGER PRIMARY KEY,
  name TEXT NOT NULL
);
"#,
    // Batches
    r#"
CREATE TABLE IF NOT EXISTS batches (
  batch_id INTEGER PRIMARY KEY,
  product_id BIGINT NOT NULL,
  section_id BIGINT NOT NULL,
  product_price TEXT NOT NULL,
  initial_quantity BIGINT NOT NULL CHECK (initial_quantity >= 0),
  current_quantity BIGINT NOT NULL
    CHECK (current_quantity >= 0 AND current_quantity <= initial_quantity),
  due_date TEXT NOT NULL
);
"#,
    // Carts
    r#"
CREATE TABLE IF NOT EXISTS carts (
  cart_id INTEGER PRIMARY KEY AUTOINCREMENT,
  buyer_id BIGINT NOT NULL REFERENCES buyers(buyer_id),
  created_date TEXT NOT NULL,
  updated_at_ms BIGINT NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('OPENED','CLOSED')),
  reserved INTEGER NOT NULL CHECK (reserved IN (0,1))
);
"#,
    // Cart lines
    r#"
CREATE TABLE IF NOT EXISTS cart_lines (
  cart_id BIGINT NOT NULL REFERENCES carts(cart_id),
  batch_id BIGINT NOT NULL REFERENCES batches(batch_id),
  position BIGINT NOT NULL,
  quantity BIGINT NOT NULL CHECK (quantity > 0),
  unit_price TEXT NOT NULL,
  PRIMARY KEY (cart_id, batch_id)
);
"#,
    // At most one OPENED cart per buyer.
    r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_carts_open_buyer ON carts(buyer_id) WHERE status = 'OPENED';"#,
    r#"CREATE INDEX IF NOT EXISTS idx_carts_idle ON carts(status, reserved, updated_at_ms);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_batches_due ON batches(due_date);"#,
];

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    for stmt in STATEMENTS {
        sqlx::query(stmt).execute(pool).await?;
    }

    Ok(())
}
