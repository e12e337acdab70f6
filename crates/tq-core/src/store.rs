use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray, TimestampNanosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;

use crate::error::Error;
use crate::home::Home;
use crate::item::{QueueItem, ReportType, Status};

const TZ: &str = "+00:00";

fn schema() -> Schema {
    let ts = |nullable: bool| {
        Field::new(
            "_",
            DataType::Timestamp(TimeUnit::Nanosecond, Some(TZ.into())),
            nullable,
        )
    };
    Schema::new(vec![
        Field::new("uid", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("report_type", DataType::Utf8, false),
        Field::new("payload_ref", DataType::Utf8, false),
        Field::new("priority", DataType::Int64, false),
        ts(false).with_name("created_ts"),
        ts(true).with_name("updated_ts"),
        ts(true).with_name("submitted_ts"),
        ts(true).with_name("completed_ts"),
        ts(true).with_name("cancelled_ts"),
        ts(true).with_name("error_ts"),
        Field::new("remote_job_id", DataType::Int64, true),
    ])
}

fn ts_to_nanos(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_nanos_opt().unwrap_or_default()
}

fn nanos_to_ts(ns: i64) -> DateTime<Utc> {
    let secs = ns.div_euclid(1_000_000_000);
    let nsecs = ns.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, nsecs).unwrap_or_default()
}

fn items_to_record_batch(items: &[QueueItem]) -> Result<RecordBatch, Error> {
    let uid: ArrayRef = Arc::new(StringArray::from(
        items.iter().map(|i| i.uid.as_str()).collect::<Vec<_>>(),
    ));
    let name: ArrayRef = Arc::new(StringArray::from(
        items.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
    ));
    let report_type: ArrayRef = Arc::new(StringArray::from(
        items
            .iter()
            .map(|i| i.report_type.to_string())
            .collect::<Vec<_>>(),
    ));
    let payload_ref: ArrayRef = Arc::new(StringArray::from(
        items
            .iter()
            .map(|i| i.payload_ref.to_string_lossy().into_owned())
            .collect::<Vec<_>>(),
    ));
    let priority: ArrayRef = Arc::new(Int64Array::from(
        items.iter().map(|i| i.priority).collect::<Vec<_>>(),
    ));
    let created_ts: ArrayRef = Arc::new(
        TimestampNanosecondArray::from(
            items.iter().map(|i| ts_to_nanos(i.created_ts)).collect::<Vec<_>>(),
        )
        .with_timezone(TZ),
    );
    let opt_ts = |f: fn(&QueueItem) -> Option<DateTime<Utc>>| -> ArrayRef {
        Arc::new(
            TimestampNanosecondArray::from(
                items.iter().map(|i| f(i).map(ts_to_nanos)).collect::<Vec<_>>(),
            )
            .with_timezone(TZ),
        )
    };
    let updated_ts = opt_ts(|i| i.updated_ts);
    let submitted_ts = opt_ts(|i| i.submitted_ts);
    let completed_ts = opt_ts(|i| i.completed_ts);
    let cancelled_ts = opt_ts(|i| i.cancelled_ts);
    let error_ts = opt_ts(|i| i.error_ts);
    let remote_job_id: ArrayRef = Arc::new(Int64Array::from(
        items.iter().map(|i| i.remote_job_id).collect::<Vec<_>>(),
    ));

    RecordBatch::try_new(
        Arc::new(schema()),
        vec![
            uid,
            name,
            report_type,
            payload_ref,
            priority,
            created_ts,
            updated_ts,
            submitted_ts,
            completed_ts,
            cancelled_ts,
            error_ts,
            remote_job_id,
        ],
    )
    .map_err(|e| Error::Corrupt {
        path: Default::default(),
        source: e.into(),
    })
}

fn record_batch_to_items(batch: &RecordBatch) -> Result<Vec<QueueItem>, Error> {
    let col = |name: &str| {
        batch
            .column_by_name(name)
            .unwrap_or_else(|| panic!("missing column {name}"))
    };
    let uid = col("uid").as_any().downcast_ref::<StringArray>().unwrap();
    let name_col = col("name").as_any().downcast_ref::<StringArray>().unwrap();
    let report_type = col("report_type")
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    let payload_ref = col("payload_ref")
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    let priority = col("priority").as_any().downcast_ref::<Int64Array>().unwrap();
    let created_ts = col("created_ts")
        .as_any()
        .downcast_ref::<TimestampNanosecondArray>()
        .unwrap();
    let updated_ts = col("updated_ts")
        .as_any()
        .downcast_ref::<TimestampNanosecondArray>()
        .unwrap();
    let submitted_ts = col("submitted_ts")
        .as_any()
        .downcast_ref::<TimestampNanosecondArray>()
        .unwrap();
    let completed_ts = col("completed_ts")
        .as_any()
        .downcast_ref::<TimestampNanosecondArray>()
        .unwrap();
    let cancelled_ts = col("cancelled_ts")
        .as_any()
        .downcast_ref::<TimestampNanosecondArray>()
        .unwrap();
    let error_ts = col("error_ts")
        .as_any()
        .downcast_ref::<TimestampNanosecondArray>()
        .unwrap();
    let remote_job_id = col("remote_job_id")
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();

    let mut out = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let rt = ReportType::from_str(report_type.value(row)).map_err(|e| Error::Corrupt {
            path: Default::default(),
            source: anyhow::anyhow!(e),
        })?;
        out.push(QueueItem {
            uid: uid.value(row).to_string(),
            name: name_col.value(row).to_string(),
            report_type: rt,
            payload_ref: payload_ref.value(row).into(),
            priority: priority.value(row),
            created_ts: nanos_to_ts(created_ts.value(row)),
            updated_ts: (!updated_ts.is_null(row)).then(|| nanos_to_ts(updated_ts.value(row))),
            submitted_ts: (!submitted_ts.is_null(row))
                .then(|| nanos_to_ts(submitted_ts.value(row))),
            completed_ts: (!completed_ts.is_null(row))
                .then(|| nanos_to_ts(completed_ts.value(row))),
            cancelled_ts: (!cancelled_ts.is_null(row))
                .then(|| nanos_to_ts(cancelled_ts.value(row))),
            error_ts: (!error_ts.is_null(row)).then(|| nanos_to_ts(error_ts.value(row))),
            remote_job_id: (!remote_job_id.is_null(row)).then(|| remote_job_id.value(row)),
            last_error: None,
        });
    }
    Ok(out)
}

/// How `filter`'s `priority_predicates` select rows. Parsed from the
/// relational prefixes `<`, `>`, `<=`, `>=`; bare numbers mean equality.
#[derive(Debug, Clone, Copy)]
pub enum PriorityPredicate {
    Lt(i64),
    Le(i64),
    Gt(i64),
    Ge(i64),
    Eq(i64),
}

impl PriorityPredicate {
    fn matches(self, priority: i64) -> bool {
        match self {
            PriorityPredicate::Lt(v) => priority < v,
            PriorityPredicate::Le(v) => priority <= v,
            PriorityPredicate::Gt(v) => priority > v,
            PriorityPredicate::Ge(v) => priority >= v,
            PriorityPredicate::Eq(v) => priority == v,
        }
    }
}

impl FromStr for PriorityPredicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |rest: &str| {
            rest.trim()
                .parse::<i64>()
                .map_err(|_| format!("invalid priority predicate {s:?}"))
        };
        if let Some(rest) = s.strip_prefix("<=") {
            Ok(PriorityPredicate::Le(parse(rest)?))
        } else if let Some(rest) = s.strip_prefix(">=") {
            Ok(PriorityPredicate::Ge(parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('<') {
            Ok(PriorityPredicate::Lt(parse(rest)?))
        } else if let Some(rest) = s.strip_prefix('>') {
            Ok(PriorityPredicate::Gt(parse(rest)?))
        } else {
            Ok(PriorityPredicate::Eq(parse(s)?))
        }
    }
}

/// Conjunction across filter kinds, disjunction within a kind.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub uids: Option<Vec<String>>,
    pub name_substrings: Option<Vec<String>>,
    pub priority_predicates: Option<Vec<PriorityPredicate>>,
    pub statuses: Option<Vec<Status>>,
}

/// Aggregate metrics returned by `describe()`.
#[derive(Debug, Clone, Default)]
pub struct QueueMetrics {
    pub is_waiting: usize,
    pub submitted: usize,
    pub completed: usize,
    pub canceled: usize,
    pub has_error: usize,
    pub completion_minutes_min: Option<f64>,
    pub completion_minutes_avg: Option<f64>,
    pub completion_minutes_max: Option<f64>,
    pub completion_minutes_stddev: Option<f64>,
}

/// Durable, de-duplicated table of queue items keyed by `uid`.
///
/// One process-wide writer (the daemon) is expected; readers (CLI
/// invocations) may run concurrently. Persisted as a Parquet file so column
/// types — in particular nanosecond timestamps — survive a round trip.
pub struct QueueStore {
    home: Home,
    items: BTreeMap<String, QueueItem>,
}

impl QueueStore {
    pub fn new(home: Home) -> Self {
        Self {
            home,
            items: BTreeMap::new(),
        }
    }

    fn read_table(path: &Path) -> Result<Vec<QueueItem>, Error> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::Corrupt {
                path: path.to_path_buf(),
                source: e.into(),
            })?
            .build()
            .map_err(|e| Error::Corrupt {
                path: path.to_path_buf(),
                source: e.into(),
            })?;

        let mut items = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| Error::Corrupt {
                path: path.to_path_buf(),
                source: e.into(),
            })?;
            items.extend(record_batch_to_items(&batch)?);
        }
        Ok(items)
    }

    fn write_table(path: &Path, items: &[QueueItem]) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let tmp = path.with_extension("parquet.tmp");
        let batch = items_to_record_batch(items)?;
        {
            let file = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
            let mut writer =
                ArrowWriter::try_new(file, batch.schema(), None).map_err(|e| Error::Corrupt {
                    path: tmp.clone(),
                    source: e.into(),
                })?;
            writer.write(&batch).map_err(|e| Error::Corrupt {
                path: tmp.clone(),
                source: e.into(),
            })?;
            writer.close().map_err(|e| Error::Corrupt {
                path: tmp.clone(),
                source: e.into(),
            })?;
        }
        fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;
        Ok(())
    }

    /// Read the on-disk table into memory. Missing file means an empty store.
    pub fn load(&mut self) -> Result<(), Error> {
        let path = self.home.db_path();
        self.items = if path.exists() {
            Self::read_table(&path)?
                .into_iter()
                .map(|i| (i.uid.clone(), i))
                .collect()
        } else {
            BTreeMap::new()
        };
        Ok(())
    }

    /// Read-modify-merge-write: re-read the on-disk table, union with the
    /// in-memory rows keeping the in-memory row on a `uid` collision (a
    /// concurrent writer's addition is preserved, this process's edits win),
    /// then overwrite.
    pub fn flush(&mut self) -> Result<(), Error> {
        let path = self.home.db_path();
        let on_disk = if path.exists() {
            Self::read_table(&path)?
        } else {
            Vec::new()
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut merged: Vec<QueueItem> = Vec::with_capacity(self.items.len() + on_disk.len());
        for item in self.items.values() {
            seen.insert(item.uid.clone());
            merged.push(item.clone());
        }
        for item in on_disk {
            if seen.insert(item.uid.clone()) {
                merged.push(item);
            }
        }

        Self::write_table(&path, &merged)?;
        self.items = merged.into_iter().map(|i| (i.uid.clone(), i)).collect();
        Ok(())
    }

    /// Append a row in memory. Does not flush.
    pub fn insert(&mut self, item: QueueItem) {
        self.items.insert(item.uid.clone(), item);
    }

    /// Replace existing rows sharing a `uid` with the given items, optionally
    /// flushing.
    pub fn upsert(&mut self, items: Vec<QueueItem>, flush: bool) -> Result<(), Error> {
        for item in items {
            self.items.insert(item.uid.clone(), item);
        }
        if flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Up to `n` `IsWaiting` items ordered by `(priority desc, created_ts asc)`.
    pub fn next(&self, n: usize) -> Vec<QueueItem> {
        let mut waiting: Vec<&QueueItem> = self
            .items
            .values()
            .filter(|i| i.status() == Status::IsWaiting)
            .collect();
        waiting.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_ts.cmp(&b.created_ts)));
        waiting.into_iter().take(n).cloned().collect()
    }

    /// Conjunction across filter kinds, disjunction within each kind.
    pub fn filter(&self, filter: &Filter) -> Vec<QueueItem> {
        self.items
            .values()
            .filter(|item| {
                filter
                    .uids
                    .as_ref()
                    .is_none_or(|uids| uids.iter().any(|u| u == &item.uid))
            })
            .filter(|item| {
                filter
                    .name_substrings
                    .as_ref()
                    .is_none_or(|subs| subs.iter().any(|s| item.name.contains(s.as_str())))
            })
            .filter(|item| {
                filter
                    .priority_predicates
                    .as_ref()
                    .is_none_or(|preds| preds.iter().any(|p| p.matches(item.priority)))
            })
            .filter(|item| {
                filter
                    .statuses
                    .as_ref()
                    .is_none_or(|statuses| statuses.contains(&item.status()))
            })
            .cloned()
            .collect()
    }

    /// Totals by status plus min/avg/max/stddev of completion time in
    /// minutes over non-error completed items. Never writes.
    pub fn describe(&self) -> QueueMetrics {
        let mut metrics = QueueMetrics::default();
        let mut durations = Vec::new();

        for item in self.items.values() {
            match item.status() {
                Status::IsWaiting => metrics.is_waiting += 1,
                Status::Submitted => metrics.submitted += 1,
                Status::Completed => {
                    metrics.completed += 1;
                    if let (Some(sub), Some(done)) = (item.submitted_ts, item.completed_ts) {
                        let minutes = (done - sub).num_seconds() as f64 / 60.0;
                        durations.push(minutes);
                    }
                }
                Status::Canceled => metrics.canceled += 1,
                Status::HasError => metrics.has_error += 1,
            }
        }

        if !durations.is_empty() {
            let n = durations.len() as f64;
            let min = durations.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = durations.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let avg = durations.iter().sum::<f64>() / n;
            let stddev = if n > 1.0 {
                let variance = durations.iter().map(|d| (d - avg).powi(2)).sum::<f64>() / (n - 1.0);
                variance.sqrt()
            } else {
                f64::NAN
            };
            metrics.completion_minutes_min = Some(min);
            metrics.completion_minutes_max = Some(max);
            metrics.completion_minutes_avg = Some(avg);
            metrics.completion_minutes_stddev = Some(stddev);
        }

        metrics
    }

    /// Drop all in-memory and on-disk rows. Optionally also removes payload
    /// blobs.
    pub fn purge(&mut self, remove_payloads: bool) -> Result<(), Error> {
        self.items.clear();
        let path = self.home.db_path();
        if path.exists() {
            fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
        }
        if remove_payloads {
            let dir = self.home.payloads_dir();
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
            }
        }
        Ok(())
    }

    pub fn get(&self, uid: &str) -> Option<&QueueItem> {
        self.items.get(uid)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadStore;

    fn env() -> (tempfile::TempDir, Home, PayloadStore) {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::new(dir.path());
        let payloads = PayloadStore::new(home.clone());
        (dir, home, payloads)
    }

    #[test]
    fn round_trip_preserves_fields() {
        let (_dir, home, payloads) = env();
        let mut store = QueueStore::new(home.clone());
        let item = QueueItem::new("job", b"{}", ReportType::RouteAnalysis, 7, &payloads).unwrap();
        let uid = item.uid.clone();
        store.insert(item);
        store.flush().unwrap();

        let mut reloaded = QueueStore::new(home);
        reloaded.load().unwrap();
        let back = reloaded.get(&uid).unwrap();
        assert_eq!(back.uid, uid);
        assert_eq!(back.priority, 7);
        assert_eq!(back.report_type, ReportType::RouteAnalysis);
    }

    #[test]
    fn flush_preserves_concurrent_additions() {
        let (_dir, home, payloads) = env();
        let mut writer_a = QueueStore::new(home.clone());
        let item_a = QueueItem::new("a", b"a", ReportType::RouteAnalysis, 1, &payloads).unwrap();
        writer_a.insert(item_a);
        writer_a.flush().unwrap();

        let mut writer_b = QueueStore::new(home.clone());
        writer_b.load().unwrap();
        let item_b = QueueItem::new("b", b"b", ReportType::RouteAnalysis, 1, &payloads).unwrap();
        writer_b.insert(item_b);
        writer_b.flush().unwrap();

        let mut reader = QueueStore::new(home);
        reader.load().unwrap();
        assert_eq!(reader.len(), 2);
    }

    #[test]
    fn next_orders_by_priority_then_age() {
        let (_dir, home, payloads) = env();
        let mut store = QueueStore::new(home);
        let mut low = QueueItem::new("low", b"1", ReportType::RouteAnalysis, 1, &payloads).unwrap();
        let mut high = QueueItem::new("high", b"2", ReportType::RouteAnalysis, 9, &payloads).unwrap();
        let mid = QueueItem::new("mid", b"3", ReportType::RouteAnalysis, 5, &payloads).unwrap();
        low.created_ts -= chrono::Duration::seconds(10);
        high.created_ts -= chrono::Duration::seconds(5);
        store.insert(low);
        store.insert(high);
        store.insert(mid);

        let ordered: Vec<i64> = store.next(3).iter().map(|i| i.priority).collect();
        assert_eq!(ordered, vec![9, 5, 1]);
    }

    #[test]
    fn tie_break_is_by_age() {
        let (_dir, home, payloads) = env();
        let mut store = QueueStore::new(home);
        let mut older = QueueItem::new("older", b"1", ReportType::RouteAnalysis, 7, &payloads).unwrap();
        let newer = QueueItem::new("newer", b"2", ReportType::RouteAnalysis, 7, &payloads).unwrap();
        older.created_ts -= chrono::Duration::seconds(30);
        store.insert(newer);
        store.insert(older.clone());

        let first = &store.next(2)[0];
        assert_eq!(first.uid, older.uid);
    }

    #[test]
    fn filter_conjuncts_across_kinds() {
        let (_dir, home, payloads) = env();
        let mut store = QueueStore::new(home);
        let a = QueueItem::new("alpha", b"1", ReportType::RouteAnalysis, 3, &payloads).unwrap();
        let b = QueueItem::new("beta", b"2", ReportType::AreaAnalysis, 9, &payloads).unwrap();
        store.insert(a);
        store.insert(b);

        let found = store.filter(&Filter {
            name_substrings: Some(vec!["alp".to_string()]),
            priority_predicates: Some(vec![PriorityPredicate::Ge(2)]),
            ..Default::default()
        });
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "alpha");
    }

    #[test]
    fn purge_clears_store_and_payloads() {
        let (_dir, home, payloads) = env();
        let mut store = QueueStore::new(home.clone());
        let item = QueueItem::new("job", b"{}", ReportType::RouteAnalysis, 1, &payloads).unwrap();
        store.insert(item);
        store.flush().unwrap();

        store.purge(true).unwrap();
        assert!(store.is_empty());
        assert!(!home.db_path().exists());
        assert!(!home.payloads_dir().exists());
    }
}
