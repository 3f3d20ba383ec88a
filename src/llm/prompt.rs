//! Dialect-specific prompts for SQL generation.

use crate::db::{Dialect, MetadataSnapshot};
use crate::llm::Message;

const POSTGRES_SYSTEM_PROMPT: &str = r#"You translate questions into PostgreSQL queries.

{schema}

Rules:
1. Produce a single SELECT statement. INSERT, UPDATE, DELETE, DROP, CREATE, ALTER and TRUNCATE are never allowed.
2. Use only tables and columns that appear in the schema above.
3. Qualify every table with its schema (for example public.users).
4. Do not add a LIMIT clause; one is applied automatically.
5. Use PostgreSQL syntax and functions.
6. Use explicit JOIN ... ON clauses when combining tables.

Answer in exactly this format:
SQL: <the query>
Explanation: <one or two sentences describing what the query returns>"#;

const MYSQL_SYSTEM_PROMPT: &str = r#"You translate questions into MySQL queries.

{schema}

Rules:
1. Produce a single SELECT statement. INSERT, UPDATE, DELETE, DROP, CREATE, ALTER and TRUNCATE are never allowed.
2. Use only tables and columns that appear in the schema above.
3. Qualify every table with its database (for example shop.orders).
4. Do not add a LIMIT clause; one is applied automatically.
5. Use MySQL syntax: backticks for identifiers that need quoting, and date functions such as CURDATE(), NOW(), DATE_ADD(), DATE_SUB() and DATEDIFF().
6. Use CONCAT() for string concatenation, never ||.
7. Use explicit JOIN ... ON clauses when combining tables.

Answer in exactly this format:
SQL: <the query>
Explanation: <one or two sentences describing what the query returns>"#;

/// Builds the system prompt for `dialect` with the schema context filled in.
pub fn build_system_prompt(snapshot: &MetadataSnapshot, dialect: Dialect) -> String {
    let template = match dialect {
        Dialect::Postgres => POSTGRES_SYSTEM_PROMPT,
        Dialect::MySql => MYSQL_SYSTEM_PROMPT,
    };
    template.replace("{schema}", &snapshot.format_for_llm())
}

/// Builds the full conversation for one generation request.
pub fn build_messages(prompt: &str, snapshot: &MetadataSnapshot, dialect: Dialect) -> Vec<Message> {
    vec![
        Message::system(build_system_prompt(snapshot, dialect)),
        Message::user(prompt.trim()),
    ]
}
