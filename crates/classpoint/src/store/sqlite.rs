//! `SQLite`-backed board store.
//!
//! Several board processes on one machine can share the same database file.
//! Writes made through this handle are pushed to its live queries at once;
//! writes made by other connections are noticed through `PRAGMA data_version`
//! by the change watcher (see [`SqliteStore::spawn_change_watcher`]).
//! Section rosters and attendance marks live in the same file.
//!
//! If the database cannot be read while checking for changes, every live
//! query receives an error and its subscriber falls back to no result. The
//! next successful check re-delivers the full result sets.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::attendance::{
    parse_date, validate_section, AttendanceSheet, AttendanceStatus, Student,
};
use crate::board::{BoardFields, BoardRecord};
use crate::error::{Error, Result};

use super::migrations;
use super::schema::BOARD_COLUMNS;
use super::{AttendanceStore, DocumentStore, LiveQueryFeed, Subscription, TeacherFilter};

/// Board store on top of a `SQLite` database.
#[derive(Debug)]
pub struct SqliteStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
    feed: Arc<LiveQueryFeed>,
    /// Last `data_version` seen by the change watcher.
    data_version: Mutex<Option<i64>>,
    /// Set after a failed check; the next good check republishes.
    resync: AtomicBool,
}

impl SqliteStore {
    /// Open or create a board database at the given path.
    ///
    /// Creates parent directories as needed and brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening board store at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets board processes read while another one writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;")?;
        migrations::initialize_schema(&conn)?;

        info!("Board store opened at {}", path.display());
        Ok(Self::from_connection(path, conn))
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;
        Ok(Self::from_connection(PathBuf::from(":memory:"), conn))
    }

    fn from_connection(path: PathBuf, conn: Connection) -> Self {
        Self {
            path,
            conn: Mutex::new(conn),
            feed: LiveQueryFeed::new(),
            data_version: Mutex::new(None),
            resync: AtomicBool::new(false),
        }
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of open live queries.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.feed.subscriber_count()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-evaluate live queries if another connection changed the database.
    ///
    /// Returns `true` when live queries were re-evaluated.
    ///
    /// # Errors
    ///
    /// Returns an error if `data_version` cannot be read. Every open live
    /// query receives that error as a failed snapshot.
    pub fn refresh(&self) -> Result<bool> {
        let conn = self.lock();
        let version = conn
            .query_row("PRAGMA data_version", [], |row| row.get(0))
            .map_err(Error::from);
        self.observe_version(&conn, version)
    }

    fn observe_version(&self, conn: &Connection, version: Result<i64>) -> Result<bool> {
        let version = match version {
            Ok(version) => version,
            Err(e) => {
                self.resync.store(true, Ordering::SeqCst);
                self.feed.fail_all(&e.to_string());
                return Err(e);
            }
        };

        let mut seen = self
            .data_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let changed = seen.is_some_and(|previous| previous != version);
        *seen = Some(version);
        drop(seen);

        let resync = self.resync.swap(false, Ordering::SeqCst);
        if changed || resync {
            debug!(version, resync, "Re-evaluating live queries");
            self.feed.publish(|filter| query_matching(conn, filter));
        }
        Ok(changed || resync)
    }

    /// Watch for writes from other connections every `interval`.
    ///
    /// The task ends when the store is dropped.
    #[must_use]
    pub fn spawn_change_watcher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("Board store dropped, stopping change watcher");
                    break;
                };
                if let Err(e) = store.refresh() {
                    warn!(error = %e, "Failed to check board store for changes, live queries failed");
                }
            }
        })
    }
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<BoardRecord> {
    Ok(BoardRecord {
        board_id: row.get(0)?,
        display_name: row.get(1)?,
        expected_teacher_name: row.get(2)?,
        last_updated: parse_timestamp(row.get(3)?),
        owner_uid: row.get(4)?,
        location: row.get(5)?,
        created_at: parse_timestamp(row.get(6)?),
    })
}

fn select_one(conn: &Connection, board_id: &str) -> Result<Option<BoardRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {BOARD_COLUMNS} FROM boards WHERE board_id = ?1"),
            [board_id],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

fn query_matching(conn: &Connection, filter: &TeacherFilter) -> Result<Vec<BoardRecord>> {
    if filter.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {BOARD_COLUMNS} FROM boards WHERE expected_teacher_name = ?1 ORDER BY board_id"
    ))?;
    let records = stmt
        .query_map([filter.teacher()], row_to_record)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

fn write_record(conn: &Connection, record: &BoardRecord) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO boards ({BOARD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ),
        params![
            record.board_id,
            record.display_name,
            record.expected_teacher_name,
            record.last_updated.map(|ts| ts.to_rfc3339()),
            record.owner_uid,
            record.location,
            record.created_at.map(|ts| ts.to_rfc3339()),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn upsert(&self, board_id: &str, fields: BoardFields) -> Result<BoardRecord> {
        let mut conn = self.lock();

        // Take the write lock up front; a deferred read-then-write can fail
        // with SQLITE_BUSY_SNAPSHOT when another process commits in between
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut record = select_one(&tx, board_id)?.unwrap_or_else(|| BoardRecord::new(board_id));
        fields.apply_to(&mut record);
        write_record(&tx, &record)?;
        tx.commit()?;
        debug!(board_id, "Upserted board record");

        self.feed.publish(|filter| query_matching(&conn, filter));
        Ok(record)
    }

    async fn get(&self, board_id: &str) -> Result<Option<BoardRecord>> {
        select_one(&self.lock(), board_id)
    }

    async fn delete(&self, board_id: &str) -> Result<bool> {
        let conn = self.lock();
        let affected = conn.execute("DELETE FROM boards WHERE board_id = ?1", [board_id])?;
        if affected > 0 {
            self.feed.publish(|filter| query_matching(&conn, filter));
        }
        Ok(affected > 0)
    }

    async fn list(&self) -> Result<Vec<BoardRecord>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {BOARD_COLUMNS} FROM boards ORDER BY board_id"))?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn boards_owned_by(&self, owner_uid: &str) -> Result<Vec<BoardRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOARD_COLUMNS} FROM boards WHERE owner_uid = ?1 ORDER BY created_at, board_id"
        ))?;
        let records = stmt
            .query_map([owner_uid], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn query(&self, filter: &TeacherFilter) -> Result<Vec<BoardRecord>> {
        query_matching(&self.lock(), filter)
    }

    async fn subscribe(&self, filter: TeacherFilter) -> Result<Subscription> {
        let conn = self.lock();
        let initial = query_matching(&conn, &filter)?;
        Ok(self.feed.register(filter, initial))
    }
}

fn row_to_student(row: &rusqlite::Row) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: parse_timestamp(row.get(2)?).unwrap_or_default(),
    })
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn select_sheet(conn: &Connection, section: &str, date: NaiveDate) -> Result<AttendanceSheet> {
    let mut stmt = conn.prepare_cached(
        "SELECT student_id, status FROM attendance WHERE section = ?1 AND date = ?2",
    )?;
    let rows = stmt
        .query_map(params![section, date_key(date)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut sheet = AttendanceSheet::empty(section, date);
    for (student_id, status) in rows {
        sheet.records.insert(student_id, status.parse()?);
    }
    Ok(sheet)
}

#[async_trait]
impl AttendanceStore for SqliteStore {
    async fn add_student(&self, section: &str, name: &str) -> Result<Student> {
        validate_section(section)?;
        let student = Student::new(name, Utc::now())?;

        self.lock().execute(
            "INSERT INTO students (section, student_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![section, student.id, student.name, student.created_at.to_rfc3339()],
        )?;
        info!(section, student_id = %student.id, "Added student");
        Ok(student)
    }

    async fn remove_student(&self, section: &str, student_id: &str) -> Result<bool> {
        let affected = self.lock().execute(
            "DELETE FROM students WHERE section = ?1 AND student_id = ?2",
            [section, student_id],
        )?;
        Ok(affected > 0)
    }

    async fn students(&self, section: &str) -> Result<Vec<Student>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT student_id, name, created_at FROM students WHERE section = ?1 ORDER BY name, student_id",
        )?;
        let students = stmt
            .query_map([section], row_to_student)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(students)
    }

    async fn mark(
        &self,
        section: &str,
        date: NaiveDate,
        student_id: &str,
        status: AttendanceStatus,
    ) -> Result<AttendanceSheet> {
        let mut conn = self.lock();

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let enrolled = tx
            .query_row(
                "SELECT 1 FROM students WHERE section = ?1 AND student_id = ?2",
                [section, student_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !enrolled {
            return Err(Error::StudentNotFound {
                section: section.to_string(),
                student_id: student_id.to_string(),
            });
        }
        tx.execute(
            "INSERT INTO attendance (section, date, student_id, status, marked_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (section, date, student_id)
             DO UPDATE SET status = excluded.status, marked_at = excluded.marked_at",
            params![
                section,
                date_key(date),
                student_id,
                status.as_str(),
                Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;
        debug!(section, %date, student_id, %status, "Marked attendance");

        select_sheet(&conn, section, date)
    }

    async fn sheet(&self, section: &str, date: NaiveDate) -> Result<AttendanceSheet> {
        select_sheet(&self.lock(), section, date)
    }

    async fn reset_day(&self, section: &str, date: NaiveDate) -> Result<bool> {
        let affected = self.lock().execute(
            "DELETE FROM attendance WHERE section = ?1 AND date = ?2",
            params![section, date_key(date)],
        )?;
        Ok(affected > 0)
    }

    async fn sheets_between(
        &self,
        section: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceSheet>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT date, student_id, status FROM attendance
             WHERE section = ?1 AND date BETWEEN ?2 AND ?3
             ORDER BY date, student_id",
        )?;
        let rows = stmt
            .query_map(params![section, date_key(from), date_key(to)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut by_date: BTreeMap<NaiveDate, AttendanceSheet> = BTreeMap::new();
        for (date, student_id, status) in rows {
            let date = parse_date(&date)?;
            by_date
                .entry(date)
                .or_insert_with(|| AttendanceSheet::empty(section, date))
                .records
                .insert(student_id, status.parse()?);
        }
        Ok(by_date.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::timeout;

    use super::*;
    use crate::resolver::DestinationResolver;

    const WAIT: Duration = Duration::from_secs(2);

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("failed to create test store")
    }

    fn presence(name: &str, teacher: Option<&str>) -> BoardFields {
        BoardFields::presence(name, teacher, Utc::now())
    }

    fn temp_db(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("classpoint_{name}_{}.db", std::process::id()))
    }

    fn cleanup(path: &Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = create_test_store();
        store
            .upsert("room-204", presence("Room 204", Some("Ms. Lee")))
            .await
            .unwrap();

        let record = store.get("room-204").await.unwrap().unwrap();
        assert_eq!(record.display_name.as_deref(), Some("Room 204"));
        assert_eq!(record.expected_teacher_name.as_deref(), Some("Ms. Lee"));
        assert!(record.last_updated.is_some());
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_presence_does_not_clobber_registration() {
        let store = create_test_store();
        let registered = store.register("uid-1", "Room 204", "Block B").await.unwrap();

        store
            .upsert(&registered.board_id, presence("Room 204", Some("Ms. Lee")))
            .await
            .unwrap();

        let record = store.get(&registered.board_id).await.unwrap().unwrap();
        assert_eq!(record.owner_uid.as_deref(), Some("uid-1"));
        assert_eq!(record.location.as_deref(), Some("Block B"));
        assert_eq!(record.created_at, registered.created_at);
        assert_eq!(record.expected_teacher_name.as_deref(), Some("Ms. Lee"));
    }

    #[tokio::test]
    async fn test_clearing_expected_teacher() {
        let store = create_test_store();
        store.upsert("room-204", presence("Room 204", Some("Ms. Lee"))).await.unwrap();
        store.upsert("room-204", presence("Room 204", None)).await.unwrap();

        let record = store.get("room-204").await.unwrap().unwrap();
        assert!(record.expected_teacher_name.is_none());
        assert!(store.query(&TeacherFilter::new("Ms. Lee")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_query_follows_writes() {
        let store = create_test_store();
        let mut sub = store.subscribe(TeacherFilter::new("Ms. Lee")).await.unwrap();
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        store.upsert("room-310", presence("Room 310", Some("Ms. Lee"))).await.unwrap();
        store.upsert("room-204", presence("Room 204", Some("Ms. Lee"))).await.unwrap();
        sub.next().await.unwrap().unwrap();
        let snapshot = sub.next().await.unwrap().unwrap();
        let ids: Vec<_> = snapshot.records.iter().map(|r| r.board_id.as_str()).collect();
        assert_eq!(ids, ["room-204", "room-310"]);

        // Unrelated board, no delivery
        store.upsert("room-101", presence("Room 101", Some("Mr. Singh"))).await.unwrap();
        assert!(sub.try_next().is_none());

        assert!(store.delete("room-310").await.unwrap());
        assert_eq!(sub.next().await.unwrap().unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_filter_returns_nothing() {
        let store = create_test_store();
        store.upsert("room-204", presence("Room 204", None)).await.unwrap();
        assert!(store.query(&TeacherFilter::new("")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_and_owned() {
        let store = create_test_store();
        store.register("uid-1", "Room 204", "Block B").await.unwrap();
        store.register("uid-2", "Room 310", "Block C").await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 2);
        let owned = store.boards_owned_by("uid-2").await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].display_name.as_deref(), Some("Room 310"));
    }

    #[tokio::test]
    async fn test_refresh_sees_other_connection() {
        let path = temp_db("refresh");
        cleanup(&path);

        let store = SqliteStore::open(&path).unwrap();
        let other = SqliteStore::open(&path).unwrap();

        let mut sub = store.subscribe(TeacherFilter::new("Ms. Lee")).await.unwrap();
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        // First refresh only records the version
        assert!(!store.refresh().unwrap());

        other
            .upsert("room-204", presence("Room 204", Some("Ms. Lee")))
            .await
            .unwrap();

        assert!(store.refresh().unwrap());
        let snapshot = sub.next().await.unwrap().unwrap();
        assert_eq!(snapshot.records[0].board_id, "room-204");

        drop(sub);
        drop(store);
        drop(other);
        cleanup(&path);
    }

    async fn resolve(store: &Arc<SqliteStore>, teacher: &str) -> DestinationResolver {
        let mut resolver = DestinationResolver::new(store.clone());
        resolver.watch_destination(Some(teacher)).await;
        resolver
    }

    #[tokio::test]
    async fn test_failed_change_check_clears_then_recovers() {
        let store = Arc::new(create_test_store());
        store
            .upsert("room-310", presence("Room 310", Some("Ms. Lee")))
            .await
            .unwrap();
        let resolver = resolve(&store, "Ms. Lee").await;
        assert_eq!(
            resolver.destination().map(|d| d.location).as_deref(),
            Some("Room 310")
        );

        let mut rx = resolver.subscribe();
        let result = store.observe_version(
            &store.lock(),
            Err(rusqlite::Error::InvalidQuery.into()),
        );
        assert!(result.is_err());
        timeout(WAIT, rx.wait_for(Option::is_none))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.subscriber_count(), 1);

        // The next good check republishes even without a new write
        assert!(store.refresh().unwrap());
        let resolved = timeout(WAIT, rx.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(resolved.map(|d| d.location).as_deref(), Some("Room 310"));
    }

    #[tokio::test]
    async fn test_unreadable_table_fails_closed() {
        let path = temp_db("fail_closed");
        cleanup(&path);

        let store = Arc::new(SqliteStore::open(&path).unwrap());
        store
            .upsert("room-310", presence("Room 310", Some("Ms. Lee")))
            .await
            .unwrap();
        assert!(!store.refresh().unwrap());

        let resolver = resolve(&store, "Ms. Lee").await;
        assert!(resolver.destination().is_some());
        let mut rx = resolver.subscribe();

        let other = Connection::open(&path).unwrap();
        other.execute_batch("DROP TABLE boards").unwrap();

        assert!(store.refresh().unwrap());
        timeout(WAIT, rx.wait_for(Option::is_none))
            .await
            .unwrap()
            .unwrap();

        drop(resolver);
        drop(store);
        drop(other);
        cleanup(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_merges_across_connections() {
        let path = temp_db("concurrent");
        cleanup(&path);

        let first = Arc::new(SqliteStore::open(&path).unwrap());
        let second = Arc::new(SqliteStore::open(&path).unwrap());

        let presence_writes = tokio::spawn({
            let store = first.clone();
            async move {
                for _ in 0..50 {
                    store
                        .upsert("room-204", presence("Room 204", Some("Ms. Lee")))
                        .await
                        .unwrap();
                }
            }
        });
        let owner_writes = tokio::spawn({
            let store = second.clone();
            async move {
                for _ in 0..50 {
                    store
                        .upsert(
                            "room-204",
                            BoardFields {
                                owner_uid: Some("uid-1".to_string()),
                                ..BoardFields::default()
                            },
                        )
                        .await
                        .unwrap();
                }
            }
        });
        presence_writes.await.unwrap();
        owner_writes.await.unwrap();

        let record = first.get("room-204").await.unwrap().unwrap();
        assert_eq!(record.expected_teacher_name.as_deref(), Some("Ms. Lee"));
        assert_eq!(record.owner_uid.as_deref(), Some("uid-1"));

        drop(first);
        drop(second);
        cleanup(&path);
    }

    #[tokio::test]
    async fn test_attendance_marks_merge() {
        let store = create_test_store();
        let asha = store.add_student("grade10-a1", "Asha").await.unwrap();
        let ben = store.add_student("grade10-a1", "Ben").await.unwrap();
        let day = parse_date("2024-03-04").unwrap();

        store.mark("grade10-a1", day, &asha.id, AttendanceStatus::Present).await.unwrap();
        store.mark("grade10-a1", day, &ben.id, AttendanceStatus::Present).await.unwrap();
        let sheet = store
            .mark("grade10-a1", day, &ben.id, AttendanceStatus::Absent)
            .await
            .unwrap();

        assert_eq!(sheet.records.len(), 2);
        assert_eq!(sheet.status(&asha.id), Some(AttendanceStatus::Present));
        assert_eq!(sheet.status(&ben.id), Some(AttendanceStatus::Absent));

        let err = store
            .mark("grade9-b", day, &asha.id, AttendanceStatus::Present)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_attendance_roster_and_range() {
        let store = create_test_store();
        let zoe = store.add_student("grade10-a1", "Zoe").await.unwrap();
        let asha = store.add_student("grade10-a1", "Asha").await.unwrap();

        let roster = store.students("grade10-a1").await.unwrap();
        assert_eq!(roster[0], asha);
        assert_eq!(roster[1].name, "Zoe");

        let march_4 = parse_date("2024-03-04").unwrap();
        let march_9 = parse_date("2024-03-09").unwrap();
        let april_1 = parse_date("2024-04-01").unwrap();
        for day in [march_9, march_4, april_1] {
            store.mark("grade10-a1", day, &zoe.id, AttendanceStatus::Present).await.unwrap();
        }

        let sheets = store
            .sheets_between("grade10-a1", parse_date("2024-03-01").unwrap(), parse_date("2024-03-31").unwrap())
            .await
            .unwrap();
        let dates: Vec<_> = sheets.iter().map(|s| s.date).collect();
        assert_eq!(dates, [march_4, march_9]);

        let report = store.month_report("grade10-a1", 2024, 3).await.unwrap();
        assert_eq!(report.rows[1].present, 2);
        assert_eq!(report.rows[0].present, 0);

        assert!(store.remove_student("grade10-a1", &zoe.id).await.unwrap());
        assert!(store.reset_day("grade10-a1", march_4).await.unwrap());
        assert!(!store.reset_day("grade10-a1", march_4).await.unwrap());
        assert!(store.sheet("grade10-a1", march_4).await.unwrap().is_empty());
        assert_eq!(
            store.sheet("grade10-a1", march_9).await.unwrap().status(&zoe.id),
            Some(AttendanceStatus::Present)
        );
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let nested = std::env::temp_dir().join(format!(
            "classpoint_test_{}/nested/boards.db",
            std::process::id()
        ));
        if let Some(parent) = nested.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }

        let store = SqliteStore::open(&nested).unwrap();
        assert!(nested.exists());
        assert_eq!(store.path(), nested);

        drop(store);
        if let Some(root) = nested.parent().and_then(Path::parent) {
            let _ = std::fs::remove_dir_all(root);
        }
    }

    #[test]
    fn test_path_in_memory() {
        let store = create_test_store();
        assert_eq!(store.path().to_string_lossy(), ":memory:");
    }
}
