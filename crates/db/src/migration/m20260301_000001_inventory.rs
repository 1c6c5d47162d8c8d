//! Inventory ledger schema.
//!
//! Creates the branch and product catalog tables the ledger references, the
//! per-branch balances, and the append-only movement ledger.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(ENUMS_SQL).await?;
        db.execute_unprepared(CATALOG_SQL).await?;
        db.execute_unprepared(BALANCES_SQL).await?;
        db.execute_unprepared(MOVEMENTS_SQL).await?;
        db.execute_unprepared(IMMUTABILITY_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_SQL).await?;
        Ok(())
    }
}

const ENUMS_SQL: &str = r"
CREATE TYPE movement_type AS ENUM ('ENTRY', 'EXIT', 'TRANSFER', 'ADJUSTMENT');
";

const CATALOG_SQL: &str = r"
CREATE TABLE branches (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(120) NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE products (
    id BIGSERIAL PRIMARY KEY,
    code VARCHAR(60) NOT NULL UNIQUE,
    name VARCHAR(255) NOT NULL,
    sale_price NUMERIC(19, 4) NOT NULL DEFAULT 0,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_products_price CHECK (sale_price >= 0)
);

-- Case-insensitive search over code and name
CREATE INDEX idx_products_code_lower ON products(lower(code));
CREATE INDEX idx_products_name_lower ON products(lower(name));
";

const BALANCES_SQL: &str = r"
CREATE TABLE balances (
    product_id BIGINT NOT NULL REFERENCES products(id),
    branch_id BIGINT NOT NULL REFERENCES branches(id),
    stock NUMERIC(19, 4) NOT NULL DEFAULT 0,
    stock_minimum NUMERIC(19, 4) NOT NULL DEFAULT 0,
    sale_price_override NUMERIC(19, 4),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (product_id, branch_id),
    CONSTRAINT chk_balances_stock CHECK (stock >= 0),
    CONSTRAINT chk_balances_minimum CHECK (stock_minimum >= 0),
    CONSTRAINT chk_balances_price CHECK (sale_price_override IS NULL OR sale_price_override >= 0)
);

-- Branch listings and low-stock scans
CREATE INDEX idx_balances_branch ON balances(branch_id);
CREATE INDEX idx_balances_low_stock ON balances(branch_id)
    WHERE stock_minimum > 0 AND stock <= stock_minimum;
";

const MOVEMENTS_SQL: &str = r"
CREATE TABLE movement_entries (
    id BIGSERIAL PRIMARY KEY,
    product_id BIGINT NOT NULL REFERENCES products(id),
    source_branch_id BIGINT NOT NULL REFERENCES branches(id),
    destination_branch_id BIGINT REFERENCES branches(id),
    movement_type movement_type NOT NULL,
    quantity NUMERIC(19, 4) NOT NULL,
    resulting_balance NUMERIC(19, 4) NOT NULL,
    destination_resulting_balance NUMERIC(19, 4),
    unit_price NUMERIC(19, 4),
    related_document_type VARCHAR(60),
    related_document_id BIGINT,
    actor_id BIGINT NOT NULL,
    authorized BOOLEAN NOT NULL DEFAULT FALSE,
    authorizer_id BIGINT,
    note TEXT,
    recorded_at TIMESTAMPTZ NOT NULL,
    inserted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    external_reference VARCHAR(120),
    -- Magnitudes for ENTRY/EXIT/TRANSFER, signed non-zero for ADJUSTMENT
    CONSTRAINT chk_movement_quantity CHECK (
        (movement_type = 'ADJUSTMENT' AND quantity <> 0)
        OR (movement_type <> 'ADJUSTMENT' AND quantity > 0)
    ),
    CONSTRAINT chk_movement_transfer_shape CHECK (
        (movement_type = 'TRANSFER')
        = (destination_branch_id IS NOT NULL AND destination_resulting_balance IS NOT NULL)
    ),
    CONSTRAINT chk_movement_transfer_distinct CHECK (
        destination_branch_id IS NULL OR destination_branch_id <> source_branch_id
    ),
    CONSTRAINT chk_movement_authorizer CHECK (authorized = (authorizer_id IS NOT NULL)),
    CONSTRAINT chk_movement_document CHECK (
        (related_document_type IS NULL) = (related_document_id IS NULL)
    ),
    CONSTRAINT chk_movement_unit_price CHECK (unit_price IS NULL OR unit_price >= 0)
);

-- Replay order per product
CREATE INDEX idx_movements_product_time ON movement_entries(product_id, recorded_at, id);

-- Per-branch history (either leg of a transfer)
CREATE INDEX idx_movements_source ON movement_entries(source_branch_id, recorded_at);
CREATE INDEX idx_movements_destination ON movement_entries(destination_branch_id, recorded_at)
    WHERE destination_branch_id IS NOT NULL;
";

const IMMUTABILITY_SQL: &str = r"
CREATE OR REPLACE FUNCTION prevent_movement_modification()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'movement_entries is append-only (% on id %)', TG_OP, OLD.id
        USING ERRCODE = 'integrity_constraint_violation';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_movement_entries_immutable
BEFORE UPDATE OR DELETE ON movement_entries
FOR EACH ROW
EXECUTE FUNCTION prevent_movement_modification();
";

const DROP_SQL: &str = r"
DROP TRIGGER IF EXISTS trg_movement_entries_immutable ON movement_entries;
DROP FUNCTION IF EXISTS prevent_movement_modification();
DROP TABLE IF EXISTS movement_entries CASCADE;
DROP TABLE IF EXISTS balances CASCADE;
DROP TABLE IF EXISTS products CASCADE;
DROP TABLE IF EXISTS branches CASCADE;
DROP TYPE IF EXISTS movement_type;
";
