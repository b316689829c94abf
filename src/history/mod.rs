//! Query history and term-frequency signals
//!
//! Every recorded query is appended to `query_history` and its terms are
//! counted in `term_frequencies`, bucketed by day so aggregation can be
//! restricted to a trailing window without deleting older rows.

use crate::error::Result;
use crate::storage::Database;
use crate::text;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const SECONDS_PER_DAY: i64 = 86_400;

/// Scope value used for queries without a user or expert context
const ANONYMOUS_SCOPE: &str = "";

/// A single executed query. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEvent {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub result_count: usize,
    #[serde(default = "default_search_type")]
    pub search_type: String,
}

fn default_search_type() -> String {
    "semantic".to_string()
}

impl QueryEvent {
    pub fn new(query: impl Into<String>, scope: Option<&str>) -> Self {
        Self {
            query: query.into(),
            timestamp: Utc::now(),
            scope: scope.map(str::to_string),
            result_count: 0,
            search_type: default_search_type(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_result_count(mut self, count: usize) -> Self {
        self.result_count = count;
        self
    }

    pub fn with_search_type(mut self, search_type: impl Into<String>) -> Self {
        self.search_type = search_type.into();
        self
    }
}

/// A distinct past query with its usage statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryStat {
    pub query: String,
    pub frequency: u64,
    pub last_seen: DateTime<Utc>,
}

/// Persisted query log with derived per-term counters
#[derive(Clone)]
pub struct QueryHistoryStore {
    db: Database,
    horizon_days: i64,
}

impl QueryHistoryStore {
    pub fn new(db: Database, horizon_days: i64) -> Self {
        Self {
            db,
            horizon_days: horizon_days.max(1),
        }
    }

    pub fn horizon_days(&self) -> i64 {
        self.horizon_days
    }

    /// Record a query executed now
    pub fn add_query(
        &self,
        query: &str,
        scope: Option<&str>,
        result_count: usize,
        search_type: &str,
    ) -> Result<()> {
        let event = QueryEvent::new(query, scope)
            .with_result_count(result_count)
            .with_search_type(search_type);
        self.record_query(&event)
    }

    /// Insert the event and increment each of its terms in one transaction.
    ///
    /// Counters use `INSERT .. ON CONFLICT DO UPDATE`, so concurrent writers
    /// never lose increments.
    pub fn record_query(&self, event: &QueryEvent) -> Result<()> {
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;

        let ts = event.timestamp.timestamp();
        tx.execute(
            "INSERT INTO query_history
                 (query, normalized, scope, timestamp, result_count, search_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.query,
                text::normalize_query(&event.query),
                event.scope,
                ts,
                event.result_count as i64,
                event.search_type
            ],
        )?;

        let scope = event.scope.as_deref().unwrap_or(ANONYMOUS_SCOPE);
        let day = ts.div_euclid(SECONDS_PER_DAY);
        {
            let mut upsert = tx.prepare_cached(
                "INSERT INTO term_frequencies (term, scope, day, frequency, last_updated)
                 VALUES (?1, ?2, ?3, 1, ?4)
                 ON CONFLICT (term, scope, day) DO UPDATE SET
                     frequency = frequency + 1,
                     last_updated = MAX(last_updated, excluded.last_updated)",
            )?;
            for term in text::terms(&event.query) {
                upsert.execute(params![term, scope, day, ts])?;
            }
        }

        tx.commit()?;
        tracing::debug!("Recorded query '{}' (scope {:?})", event.query, event.scope);
        Ok(())
    }

    /// Term counts over the trailing horizon.
    ///
    /// With a scope, only that scope's counters are summed; without one,
    /// counters from every scope are summed together.
    pub fn get_term_frequencies(&self, scope: Option<&str>) -> Result<HashMap<String, u64>> {
        self.term_frequencies_at(scope, Utc::now())
    }

    fn term_frequencies_at(
        &self,
        scope: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, u64>> {
        let conn = self.db.get_conn()?;
        let first_day = (now - Duration::days(self.horizon_days))
            .timestamp()
            .div_euclid(SECONDS_PER_DAY);

        let mut frequencies = HashMap::new();
        let mut collect = |term: String, count: i64| {
            frequencies.insert(term, count.max(0) as u64);
        };

        match scope {
            Some(scope) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT term, SUM(frequency) FROM term_frequencies
                     WHERE scope = ?1 AND day >= ?2 GROUP BY term",
                )?;
                let rows = stmt.query_map(params![scope, first_day], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (term, count) = row?;
                    collect(term, count);
                }
            }
            None => {
                let mut stmt = conn.prepare_cached(
                    "SELECT term, SUM(frequency) FROM term_frequencies
                     WHERE day >= ?1 GROUP BY term",
                )?;
                let rows = stmt.query_map(params![first_day], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (term, count) = row?;
                    collect(term, count);
                }
            }
        }

        Ok(frequencies)
    }

    /// Timestamps of earlier runs of the same query (case and spacing
    /// insensitive), newest first
    pub fn get_query_timestamps(&self, query: &str, limit: usize) -> Result<Vec<DateTime<Utc>>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT timestamp FROM query_history WHERE normalized = ?1
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            params![text::normalize_query(query), limit as i64],
            |row| row.get::<_, i64>(0),
        )?;

        let mut timestamps = Vec::new();
        for row in rows {
            if let Some(dt) = Utc.timestamp_opt(row?, 0).single() {
                timestamps.push(dt);
            }
        }
        Ok(timestamps)
    }

    /// Past queries literally starting with `prefix` (case-insensitive),
    /// most frequent first, then most recent, then alphabetical.
    ///
    /// SQLite's `lower()` only folds ASCII, so the prefix test runs here with
    /// the same Unicode folding the predictor applies.
    pub fn get_matching_queries(
        &self,
        prefix: &str,
        scope: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.db.get_conn()?;
        let sql = "SELECT query, COUNT(*) AS freq, MAX(timestamp) AS last_seen
                   FROM query_history
                   WHERE (?1 IS NULL OR scope = ?1)
                   GROUP BY query
                   ORDER BY freq DESC, last_seen DESC, query ASC";

        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![scope], |row| row.get::<_, String>(0))?;

        let mut queries = Vec::new();
        for row in rows {
            let query = row?;
            if text::starts_with_ignore_case(&query, prefix) {
                queries.push(query);
                if queries.len() >= limit {
                    break;
                }
            }
        }
        Ok(queries)
    }

    /// Distinct queries with frequency and last use, oldest first
    pub fn corpus(&self) -> Result<Vec<QueryStat>> {
        self.query_stats(
            "SELECT query, COUNT(*), MAX(timestamp) FROM query_history
             GROUP BY query ORDER BY MIN(id) ASC",
            None,
        )
    }

    /// Most frequent queries, ties broken by recency
    pub fn popular_queries(&self, limit: usize) -> Result<Vec<QueryStat>> {
        self.query_stats(
            "SELECT query, COUNT(*) AS freq, MAX(timestamp) AS last_seen FROM query_history
             GROUP BY query ORDER BY freq DESC, last_seen DESC, query ASC LIMIT ?1",
            Some(limit),
        )
    }

    /// Most recently used distinct queries
    pub fn recent_queries(&self, limit: usize) -> Result<Vec<QueryStat>> {
        self.query_stats(
            "SELECT query, COUNT(*), MAX(timestamp) AS last_seen FROM query_history
             GROUP BY query ORDER BY last_seen DESC, query ASC LIMIT ?1",
            Some(limit),
        )
    }

    fn query_stats(&self, sql: &str, limit: Option<usize>) -> Result<Vec<QueryStat>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare_cached(sql)?;

        let map_row = |row: &rusqlite::Row<'_>| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        };
        let rows = match limit {
            Some(limit) => stmt.query_map(params![limit as i64], map_row)?,
            None => stmt.query_map([], map_row)?,
        };

        let mut stats = Vec::new();
        for row in rows {
            let (query, frequency, last_seen) = row?;
            stats.push(QueryStat {
                query,
                frequency: frequency.max(0) as u64,
                last_seen: Utc
                    .timestamp_opt(last_seen, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            });
        }
        Ok(stats)
    }

    /// Total number of recorded events
    pub fn len(&self) -> Result<usize> {
        let conn = self.db.get_conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM query_history", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Per-tag preference weights for a user
    pub fn get_user_preferences(&self, user_id: &str) -> Result<HashMap<String, f32>> {
        let conn = self.db.get_conn()?;
        let mut stmt =
            conn.prepare_cached("SELECT tag, weight FROM user_preferences WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut prefs = HashMap::new();
        for row in rows {
            let (tag, weight) = row?;
            prefs.insert(tag, weight as f32);
        }
        Ok(prefs)
    }

    /// Add `delta` to each tag's weight, clamping the result to [0, 1]
    pub fn update_user_preferences(&self, user_id: &str, tags: &[String], delta: f32) -> Result<()> {
        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp();
        {
            let mut upsert = tx.prepare_cached(
                "INSERT INTO user_preferences (user_id, tag, weight, updated_at)
                 VALUES (?1, ?2, MIN(MAX(?3, 0.0), 1.0), ?4)
                 ON CONFLICT (user_id, tag) DO UPDATE SET
                     weight = MIN(MAX(weight + ?3, 0.0), 1.0),
                     updated_at = excluded.updated_at",
            )?;
            for tag in tags {
                let tag = tag.trim();
                if tag.is_empty() {
                    continue;
                }
                upsert.execute(params![user_id, tag, delta as f64, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (QueryHistoryStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("history.db")).unwrap();
        (QueryHistoryStore::new(db, 30), temp)
    }

    #[test]
    fn test_terms_are_counted_per_occurrence() {
        let (store, _temp) = store();
        store.add_query("child nutrition", None, 3, "semantic").unwrap();
        store.add_query("child nutrition", None, 3, "semantic").unwrap();

        let freqs = store.get_term_frequencies(None).unwrap();
        assert_eq!(freqs.get("child"), Some(&2));
        assert_eq!(freqs.get("nutrition"), Some(&2));
        assert_eq!(freqs.len(), 2);
    }

    #[test]
    fn test_scoped_and_global_frequencies() {
        let (store, _temp) = store();
        store.add_query("malaria", Some("user-1"), 0, "semantic").unwrap();
        store.add_query("malaria", Some("user-2"), 0, "semantic").unwrap();
        store.add_query("malaria", None, 0, "semantic").unwrap();

        assert_eq!(store.get_term_frequencies(None).unwrap()["malaria"], 3);
        assert_eq!(store.get_term_frequencies(Some("user-1")).unwrap()["malaria"], 1);
        assert!(store.get_term_frequencies(Some("user-3")).unwrap().is_empty());
    }

    #[test]
    fn test_frequencies_outside_horizon_are_excluded() {
        let (store, _temp) = store();
        let old = Utc::now() - Duration::days(45);
        store
            .record_query(&QueryEvent::new("tuberculosis", None).at(old))
            .unwrap();
        store.add_query("tuberculosis", None, 0, "semantic").unwrap();

        assert_eq!(store.get_term_frequencies(None).unwrap()["tuberculosis"], 1);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_matching_queries_order() {
        let (store, _temp) = store();
        for _ in 0..2 {
            store.add_query("maternal mortality", None, 0, "semantic").unwrap();
        }
        for _ in 0..5 {
            store.add_query("maternal health policy", None, 0, "semantic").unwrap();
        }
        store.add_query("health of mothers", None, 0, "semantic").unwrap();

        let matches = store.get_matching_queries("Mater", None, 10).unwrap();
        assert_eq!(matches, vec!["maternal health policy", "maternal mortality"]);

        let limited = store.get_matching_queries("mater", None, 1).unwrap();
        assert_eq!(limited, vec!["maternal health policy"]);
    }

    #[test]
    fn test_matching_queries_prefix_is_literal() {
        let (store, _temp) = store();
        store.add_query("100% coverage", None, 0, "semantic").unwrap();
        store.add_query("1000 genomes", None, 0, "semantic").unwrap();

        assert_eq!(
            store.get_matching_queries("100%", None, 10).unwrap(),
            vec!["100% coverage"]
        );
    }

    #[test]
    fn test_matching_queries_fold_non_ascii_case() {
        let (store, _temp) = store();
        for _ in 0..2 {
            store.add_query("Épidémiologie du paludisme", Some("u1"), 0, "semantic").unwrap();
        }
        store.add_query("épidémies urbaines", Some("u1"), 0, "semantic").unwrap();
        store.add_query("epidemiology", Some("u1"), 0, "semantic").unwrap();

        assert_eq!(
            store.get_matching_queries("éPI", Some("u1"), 10).unwrap(),
            vec!["Épidémiologie du paludisme", "épidémies urbaines"]
        );
        assert!(store.get_matching_queries("épi", Some("u2"), 10).unwrap().is_empty());
        assert!(store.get_matching_queries("épi", Some("u1"), 0).unwrap().is_empty());
    }

    #[test]
    fn test_query_timestamps_newest_first() {
        let (store, _temp) = store();
        let now = Utc::now();
        for days in [3, 1, 2] {
            store
                .record_query(&QueryEvent::new("Vaccine  uptake", None).at(now - Duration::days(days)))
                .unwrap();
        }
        store.add_query("vaccine hesitancy", None, 0, "semantic").unwrap();

        let stamps = store.get_query_timestamps("vaccine uptake", 2).unwrap();
        assert_eq!(stamps.len(), 2);
        assert!(stamps[0] > stamps[1]);
        assert_eq!(stamps[0].timestamp(), (now - Duration::days(1)).timestamp());
    }

    #[test]
    fn test_user_preferences_accumulate_and_clamp() {
        let (store, _temp) = store();
        let tags = vec!["health".to_string(), "policy".to_string()];
        store.update_user_preferences("u1", &tags, 0.4).unwrap();
        store.update_user_preferences("u1", &tags[..1], 0.8).unwrap();

        let prefs = store.get_user_preferences("u1").unwrap();
        assert_eq!(prefs["health"], 1.0);
        assert!((prefs["policy"] - 0.4).abs() < 1e-6);
        assert!(store.get_user_preferences("u2").unwrap().is_empty());
    }

    #[test]
    fn test_corpus_and_popular() {
        let (store, _temp) = store();
        store.add_query("a", None, 0, "semantic").unwrap();
        store.add_query("b", None, 0, "semantic").unwrap();
        store.add_query("b", None, 0, "semantic").unwrap();

        let corpus = store.corpus().unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus[0].query, "a");

        let popular = store.popular_queries(1).unwrap();
        assert_eq!(popular[0].query, "b");
        assert_eq!(popular[0].frequency, 2);
    }
}
