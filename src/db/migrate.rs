use crate::db::DatabaseProxy;

const SCHEMA: &str = include_str!("../../sql/schema.sql");

/// Applies the embedded schema. Every statement is `IF NOT EXISTS`, so this
/// runs on each startup.
pub async fn apply_schema(proxy: &DatabaseProxy) -> Result<(), sqlx::Error> {
    let statements = split_sql_statements(SCHEMA);
    for statement in &statements {
        sqlx::query(statement).execute(proxy.pool()).await?;
    }
    tracing::debug!(statements = statements.len(), "schema applied");
    Ok(())
}

/// Splits a script on top-level `;`, dropping `--` comment lines.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;

    for line in sql.lines() {
        if !in_single_quote && line.trim_start().starts_with("--") {
            continue;
        }
        for ch in line.chars() {
            match ch {
                '\'' => in_single_quote = !in_single_quote,
                ';' if !in_single_quote => {
                    let statement = current.trim();
                    if !statement.is_empty() {
                        statements.push(statement.to_string());
                    }
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }
        current.push('\n');
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_semicolons_outside_quotes() {
        let sql = "-- header\nCREATE TABLE a (x TEXT DEFAULT 'a;b');\n\nCREATE INDEX i ON a (x);";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("'a;b'"));
        assert!(statements[1].starts_with("CREATE INDEX"));
    }

    #[test]
    fn embedded_schema_creates_every_table() {
        let statements = split_sql_statements(SCHEMA);
        for table in [
            "users",
            "sessions",
            "student_profiles",
            "study_topics",
            "homework_tasks",
            "documents",
            "subscriptions",
        ] {
            let needle = format!("CREATE TABLE IF NOT EXISTS {table} ");
            assert!(
                statements.iter().any(|s| s.starts_with(&needle)),
                "missing table {table}"
            );
        }
        assert!(statements.iter().all(|s| !s.starts_with("--")));
    }
}
