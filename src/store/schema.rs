pub const SCHEMA: &str = r#"
-- Profiles; id is the auth provider's subject id, never generated here
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    full_name TEXT,
    avatar_url TEXT,
    billing_address TEXT,      -- JSON
    updated_at TEXT,
    payment_method TEXT,       -- JSON
    email TEXT
);

-- Payment provider customer mapping, one per user
CREATE TABLE IF NOT EXISTS customers (
    id TEXT PRIMARY KEY REFERENCES users(id),
    provider_customer_id TEXT
);

-- Billing catalog, ids are provider-issued
CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    active INTEGER NOT NULL DEFAULT 0,
    name TEXT,
    description TEXT,
    image TEXT,
    metadata TEXT              -- JSON
);

CREATE TABLE IF NOT EXISTS prices (
    id TEXT PRIMARY KEY,
    product_id TEXT NOT NULL REFERENCES products(id),
    active INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    unit_amount INTEGER,
    currency TEXT NOT NULL CHECK (length(currency) = 3),
    type TEXT NOT NULL CHECK (type IN ('one_time', 'recurring')),
    interval TEXT CHECK (interval IN ('day', 'week', 'month', 'year')),
    interval_count INTEGER,
    trial_period_days INTEGER,
    metadata TEXT              -- JSON
);

-- Latest subscription snapshot written by the billing collaborator
CREATE TABLE IF NOT EXISTS subscriptions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    status TEXT NOT NULL CHECK (status IN (
        'trialing', 'active', 'canceled', 'incomplete',
        'incomplete_expired', 'past_due', 'unpaid'
    )),
    metadata TEXT,             -- JSON
    price_id TEXT REFERENCES prices(id),
    quantity INTEGER,
    cancel_at_period_end INTEGER NOT NULL DEFAULT 0,
    created TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    current_period_start TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    current_period_end TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    ended_at TEXT,
    cancel_at TEXT,
    canceled_at TEXT,
    trial_start TEXT,
    trial_end TEXT
);

-- Content tree: workspace -> folder -> file
CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    workspace_owner TEXT NOT NULL,
    title TEXT NOT NULL,
    icon_id TEXT NOT NULL,
    data TEXT,
    in_trash TEXT,             -- soft-delete marker, free-form
    logo TEXT,
    banner_url TEXT
);

CREATE TABLE IF NOT EXISTS folders (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    title TEXT NOT NULL,
    icon_id TEXT NOT NULL,
    data TEXT,
    in_trash TEXT,
    banner_url TEXT,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    title TEXT NOT NULL,
    icon_id TEXT NOT NULL,
    data TEXT,
    in_trash TEXT,
    banner_url TEXT,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    folder_id TEXT REFERENCES folders(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_workspaces_owner ON workspaces(workspace_owner);
CREATE INDEX IF NOT EXISTS idx_folders_workspace ON folders(workspace_id);
CREATE INDEX IF NOT EXISTS idx_files_workspace ON files(workspace_id);
CREATE INDEX IF NOT EXISTS idx_files_folder ON files(folder_id);
CREATE INDEX IF NOT EXISTS idx_prices_product ON prices(product_id);
CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id);
"#;
