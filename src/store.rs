use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::config::valid_identifier;
use crate::records::PlayerGameweekRecord;

pub const PLAYER_COLUMNS: [&str; 21] = [
    "name",
    "season",
    "position",
    "team",
    "gameweek",
    "minutes",
    "goals_scored",
    "assists",
    "bonus",
    "bps",
    "clean_sheets",
    "saves",
    "penalties_saved",
    "yellow_cards",
    "red_cards",
    "expected_goals",
    "expected_assists",
    "expected_goal_involvements",
    "opponent_team",
    "was_home",
    "total_points",
];

#[derive(Debug, Clone, Default)]
pub struct IngestRun {
    pub table: String,
    pub started_at: String,
    pub seasons_total: usize,
    pub seasons_succeeded: usize,
    pub rows_written: usize,
    pub errors: Vec<String>,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Bookkeeping tables only; player tables are created by [`write_players`].
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            seasons_total INTEGER NOT NULL,
            seasons_succeeded INTEGER NOT NULL,
            rows_written INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Replace `table` wholesale with `records`. Returns the number of rows written.
pub fn write_players(
    conn: &mut Connection,
    table: &str,
    records: &[PlayerGameweekRecord],
) -> Result<usize> {
    let table = checked_table(table)?;
    let tx = conn.transaction().context("begin write transaction")?;
    tx.execute_batch(&format!(
        r#"
        DROP TABLE IF EXISTS {table};
        CREATE TABLE {table} (
            name TEXT NOT NULL,
            season TEXT NOT NULL,
            position TEXT NULL,
            team TEXT NULL,
            gameweek INTEGER NULL,
            minutes INTEGER NULL,
            goals_scored INTEGER NULL,
            assists INTEGER NULL,
            bonus INTEGER NULL,
            bps INTEGER NULL,
            clean_sheets INTEGER NULL,
            saves INTEGER NULL,
            penalties_saved INTEGER NULL,
            yellow_cards INTEGER NULL,
            red_cards INTEGER NULL,
            expected_goals REAL NULL,
            expected_assists REAL NULL,
            expected_goal_involvements REAL NULL,
            opponent_team INTEGER NULL,
            was_home INTEGER NULL,
            total_points INTEGER NULL
        );
        "#
    ))
    .with_context(|| format!("recreate table {table}"))?;

    {
        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                PLAYER_COLUMNS.join(", "),
                (1..=PLAYER_COLUMNS.len())
                    .map(|i| format!("?{i}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
            .context("prepare player insert")?;
        for r in records {
            stmt.execute(params![
                r.name,
                r.season,
                r.position,
                r.team,
                r.gameweek,
                r.minutes,
                r.goals_scored,
                r.assists,
                r.bonus,
                r.bps,
                r.clean_sheets,
                r.saves,
                r.penalties_saved,
                r.yellow_cards,
                r.red_cards,
                r.expected_goals,
                r.expected_assists,
                r.expected_goal_involvements,
                r.opponent_team,
                r.was_home,
                r.total_points,
            ])
            .with_context(|| format!("insert row for {}", r.name))?;
        }
    }
    tx.commit().context("commit player table")?;
    Ok(records.len())
}

/// Every row of `table`, in insertion order. A missing table reads as empty.
pub fn read_players(conn: &Connection, table: &str) -> Result<Vec<PlayerGameweekRecord>> {
    let table = checked_table(table)?;
    if !table_exists(conn, table)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM {table} ORDER BY rowid ASC",
            PLAYER_COLUMNS.join(", ")
        ))
        .context("prepare player select")?;

    let rows = stmt
        .query_map([], |row| {
            Ok(PlayerGameweekRecord {
                name: row.get(0)?,
                season: row.get(1)?,
                position: row.get(2)?,
                team: row.get(3)?,
                gameweek: row.get(4)?,
                minutes: row.get(5)?,
                goals_scored: row.get(6)?,
                assists: row.get(7)?,
                bonus: row.get(8)?,
                bps: row.get(9)?,
                clean_sheets: row.get(10)?,
                saves: row.get(11)?,
                penalties_saved: row.get(12)?,
                yellow_cards: row.get(13)?,
                red_cards: row.get(14)?,
                expected_goals: row.get(15)?,
                expected_assists: row.get(16)?,
                expected_goal_involvements: row.get(17)?,
                opponent_team: row.get(18)?,
                was_home: row.get(19)?,
                total_points: row.get(20)?,
            })
        })
        .context("query player rows")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode player row")?);
    }
    Ok(out)
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .context("check table existence")?;
    Ok(count > 0)
}

/// Column names of `table` in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let table = checked_table(table)?;
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .context("prepare table_info")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .context("query table_info")?;
    let mut out = Vec::new();
    for name in names {
        out.push(name.context("decode column name")?);
    }
    Ok(out)
}

pub fn record_ingest_run(conn: &Connection, run: &IngestRun) -> Result<i64> {
    let errors_json = serde_json::to_string(&run.errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO ingest_runs(table_name, started_at, finished_at, seasons_total, seasons_succeeded, rows_written, errors_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            run.table,
            run.started_at,
            Utc::now().to_rfc3339(),
            run.seasons_total as i64,
            run.seasons_succeeded as i64,
            run.rows_written as i64,
            errors_json,
        ],
    )
    .context("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

/// Timestamp of the latest ingest into `table`, if any.
pub fn last_ingest_at(conn: &Connection, table: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT MAX(finished_at) FROM ingest_runs WHERE table_name = ?1",
        params![table],
        |row| row.get::<_, Option<String>>(0),
    )
    .context("query latest ingest")
}

fn checked_table(table: &str) -> Result<&str> {
    let table = table.trim();
    if !valid_identifier(table) {
        return Err(anyhow!("invalid table name `{table}`"));
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_with_sql_are_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert!(write_players(&mut conn, "x; DROP TABLE ingest_runs", &[]).is_err());
        assert!(read_players(&conn, "bad name").is_err());
    }

    #[test]
    fn missing_table_reads_empty() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(read_players(&conn, "fpl_players").unwrap().is_empty());
    }

    #[test]
    fn ingest_runs_are_recorded() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(last_ingest_at(&conn, "fpl_players").unwrap(), None);
        let run = IngestRun {
            table: "fpl_players".to_string(),
            started_at: Utc::now().to_rfc3339(),
            seasons_total: 2,
            seasons_succeeded: 1,
            rows_written: 10,
            errors: vec!["season 2024-25: http 404".to_string()],
        };
        record_ingest_run(&conn, &run).unwrap();
        assert!(last_ingest_at(&conn, "fpl_players").unwrap().is_some());
    }
}
