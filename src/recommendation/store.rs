//! SQLite-backed publication graph: works, their topics and their authors
use crate::error::{Result, ScholarError};
use crate::scoring::Work;
use crate::storage::{Database, DbConn};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeSet;

#[derive(Clone)]
pub struct WorkStore {
    db: Database,
}

impl WorkStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or replace a work with its topics and authors
    pub fn upsert_work(&self, work: &Work) -> Result<()> {
        if work.id.trim().is_empty() {
            return Err(ScholarError::InvalidDocument(
                "Work id must not be empty".to_string(),
            ));
        }

        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO works (id, title, publication_year, citation_count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (id) DO UPDATE SET
                 title = excluded.title,
                 publication_year = excluded.publication_year,
                 citation_count = excluded.citation_count",
            params![
                work.id,
                work.title,
                work.publication_year,
                work.citation_count as i64
            ],
        )?;
        tx.execute("DELETE FROM work_topics WHERE work_id = ?1", params![work.id])?;
        tx.execute("DELETE FROM work_authors WHERE work_id = ?1", params![work.id])?;
        {
            let mut topic = tx.prepare_cached(
                "INSERT OR IGNORE INTO work_topics (work_id, topic) VALUES (?1, ?2)",
            )?;
            for t in normalized(&work.topics) {
                topic.execute(params![work.id, t])?;
            }

            let mut author = tx.prepare_cached(
                "INSERT OR IGNORE INTO work_authors (work_id, author_id) VALUES (?1, ?2)",
            )?;
            for a in work.authors.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
                author.execute(params![work.id, a])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_work(&self, id: &str) -> Result<Option<Work>> {
        let conn = self.db.get_conn()?;
        load_work(&conn, id)
    }

    pub fn work_count(&self) -> Result<usize> {
        let conn = self.db.get_conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM works", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Works authored by `author_id`, ordered by id
    pub fn works_by_author(&self, author_id: &str) -> Result<Vec<Work>> {
        let conn = self.db.get_conn()?;
        let ids = query_ids(
            &conn,
            "SELECT work_id FROM work_authors WHERE author_id = ?1 ORDER BY work_id",
            author_id,
        )?;
        load_works(&conn, &ids)
    }

    /// Other works sharing at least one topic with `work_id`
    pub fn works_sharing_topics(&self, work_id: &str) -> Result<Vec<Work>> {
        let conn = self.db.get_conn()?;
        let ids = query_ids(
            &conn,
            "SELECT DISTINCT other.work_id
             FROM work_topics base
             JOIN work_topics other ON other.topic = base.topic
             WHERE base.work_id = ?1 AND other.work_id <> ?1
             ORDER BY other.work_id",
            work_id,
        )?;
        load_works(&conn, &ids)
    }

    /// Co-authors of `author_id` with the number of works they share,
    /// strongest first, ties by author id
    pub fn coauthor_strengths(&self, author_id: &str) -> Result<Vec<(String, u32)>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT other.author_id, COUNT(DISTINCT other.work_id) AS strength
             FROM work_authors mine
             JOIN work_authors other ON other.work_id = mine.work_id
             WHERE mine.author_id = ?1 AND other.author_id <> ?1
             GROUP BY other.author_id
             ORDER BY strength DESC, other.author_id ASC",
        )?;
        let rows = stmt.query_map(params![author_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut strengths = Vec::new();
        for row in rows {
            let (author, n) = row?;
            strengths.push((author, n.max(0) as u32));
        }
        Ok(strengths)
    }

    /// Works by any of `authors` that `exclude_author` did not write
    pub fn works_by_authors_excluding(
        &self,
        authors: &[String],
        exclude_author: &str,
    ) -> Result<Vec<Work>> {
        let conn = self.db.get_conn()?;
        let mut ids = BTreeSet::new();
        {
            let mut stmt = conn.prepare_cached(
                "SELECT w.work_id FROM work_authors w
                 WHERE w.author_id = ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM work_authors own
                       WHERE own.work_id = w.work_id AND own.author_id = ?2
                   )",
            )?;
            for author in authors {
                let rows = stmt.query_map(params![author, exclude_author], |row| {
                    row.get::<_, String>(0)
                })?;
                for row in rows {
                    ids.insert(row?);
                }
            }
        }
        load_works(&conn, &ids.into_iter().collect::<Vec<_>>())
    }
}

fn normalized(topics: &[String]) -> BTreeSet<String> {
    topics
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn query_ids(conn: &DbConn, sql: &str, key: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

fn load_works(conn: &DbConn, ids: &[String]) -> Result<Vec<Work>> {
    let mut works = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(work) = load_work(conn, id)? {
            works.push(work);
        }
    }
    Ok(works)
}

fn load_work(conn: &DbConn, id: &str) -> Result<Option<Work>> {
    let work = conn
        .query_row(
            "SELECT id, title, publication_year, citation_count FROM works WHERE id = ?1",
            params![id],
            |row| {
                Ok(Work {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    publication_year: row.get(2)?,
                    citation_count: row.get::<_, i64>(3)?.max(0) as u64,
                    topics: Vec::new(),
                    authors: Vec::new(),
                })
            },
        )
        .optional()?;

    let Some(mut work) = work else {
        return Ok(None);
    };
    work.topics = query_ids(
        conn,
        "SELECT topic FROM work_topics WHERE work_id = ?1 ORDER BY topic",
        id,
    )?;
    work.authors = query_ids(
        conn,
        "SELECT author_id FROM work_authors WHERE work_id = ?1 ORDER BY author_id",
        id,
    )?;
    Ok(Some(work))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn work(id: &str, year: i32, topics: &[&str], authors: &[&str]) -> Work {
        Work {
            id: id.to_string(),
            title: format!("Work {}", id),
            publication_year: year,
            citation_count: 10,
            topics: topics.iter().map(|s| s.to_string()).collect(),
            authors: authors.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn store() -> (WorkStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("works.db")).unwrap();
        (WorkStore::new(db), temp)
    }

    #[test]
    fn test_upsert_replaces_topics_and_authors() {
        let (store, _temp) = store();
        store.upsert_work(&work("w1", 2020, &["Health"], &["alice"])).unwrap();
        store
            .upsert_work(&work("w1", 2021, &["policy", "health "], &["bob"]))
            .unwrap();

        let loaded = store.get_work("w1").unwrap().unwrap();
        assert_eq!(loaded.publication_year, 2021);
        assert_eq!(loaded.topics, vec!["health", "policy"]);
        assert_eq!(loaded.authors, vec!["bob"]);
        assert_eq!(store.work_count().unwrap(), 1);
        assert!(store.get_work("missing").unwrap().is_none());
    }

    #[test]
    fn test_topic_and_coauthor_queries() {
        let (store, _temp) = store();
        store.upsert_work(&work("w1", 2020, &["health"], &["alice", "bob"])).unwrap();
        store.upsert_work(&work("w2", 2020, &["health", "policy"], &["bob", "carol"])).unwrap();
        store.upsert_work(&work("w3", 2020, &["water"], &["alice", "bob"])).unwrap();
        store.upsert_work(&work("w4", 2020, &["water"], &["bob"])).unwrap();

        let sharing: Vec<String> = store
            .works_sharing_topics("w1")
            .unwrap()
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(sharing, vec!["w2"]);

        assert_eq!(
            store.coauthor_strengths("alice").unwrap(),
            vec![("bob".to_string(), 2)]
        );

        let others: Vec<String> = store
            .works_by_authors_excluding(&["bob".to_string()], "alice")
            .unwrap()
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(others, vec!["w2", "w4"]);
    }
}
