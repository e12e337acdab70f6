use tq_core::{QueueItem, QueueMetrics};

/// Minimal column formatter, in the same hand-rolled `format!` style used
/// elsewhere in this stack for status reporting — no table-printing crate.
pub fn print_items(items: &[QueueItem]) {
    if items.is_empty() {
        println!("(no items)");
        return;
    }

    let headers = ["uid", "name", "status", "priority", "created_ts", "remote_job_id"];
    let rows: Vec<[String; 6]> = items
        .iter()
        .map(|i| {
            [
                i.uid.clone(),
                i.name.clone(),
                format!("{:?}", i.status()),
                i.priority.to_string(),
                i.created_ts.to_rfc3339(),
                i.remote_job_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
            .collect();
        padded.join("  ")
    };

    println!("{}", line(&headers.iter().map(|h| h.to_string()).collect::<Vec<_>>()));
    for row in &rows {
        println!("{}", line(row));
    }
}

pub fn print_metrics(metrics: &QueueMetrics) {
    println!("is_waiting:  {}", metrics.is_waiting);
    println!("submitted:   {}", metrics.submitted);
    println!("completed:   {}", metrics.completed);
    println!("canceled:    {}", metrics.canceled);
    println!("has_error:   {}", metrics.has_error);
    match (
        metrics.completion_minutes_min,
        metrics.completion_minutes_avg,
        metrics.completion_minutes_max,
        metrics.completion_minutes_stddev,
    ) {
        (Some(min), Some(avg), Some(max), Some(stddev)) => {
            println!("completion minutes: min={min:.2} avg={avg:.2} max={max:.2} stddev={stddev:.2}");
        }
        _ => println!("completion minutes: (no completed items)"),
    }
}
