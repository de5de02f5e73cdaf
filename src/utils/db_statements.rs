// This file contains all SQL statements issued by the visitor server.
#![forbid(unsafe_code)]

// ========================= visitors table =========================
// The table is expected to exist already:
//   visitors(id SERIAL PRIMARY KEY, user_agent TEXT NOT NULL, datetime TIMESTAMPTZ NOT NULL)
pub const INSERT_VISITOR: &str = concat!(
    "INSERT INTO visitors (user_agent, datetime) ",
    "VALUES ($1, now()) RETURNING id, datetime",
);
