use chrono::{DateTime, Utc};
use dealscope_client::{
    AnalysisSummary, PhaseCatalog, PhaseRecord, RunSnapshot, relative_time,
};
use serde_json::Value;

/// Prints phase records as they appear or change, one line per change.
pub struct ProgressPrinter {
    catalog: PhaseCatalog,
    printed: Vec<PhaseRecord>,
    last_done: usize,
}

impl ProgressPrinter {
    pub fn new(catalog: PhaseCatalog) -> Self {
        Self {
            catalog,
            printed: Vec::new(),
            last_done: 0,
        }
    }

    pub fn print(&mut self, snapshot: &RunSnapshot) {
        for line in self.changed_lines(snapshot) {
            println!("{line}");
        }
    }

    fn changed_lines(&mut self, snapshot: &RunSnapshot) -> Vec<String> {
        let mut lines = Vec::new();
        for (index, record) in snapshot.phases.iter().enumerate() {
            if self.printed.get(index) == Some(record) {
                continue;
            }
            lines.push(self.phase_line(record));
        }
        self.printed = snapshot.phases.clone();

        let summary = self.catalog.summarize(snapshot);
        if summary.done_count != self.last_done {
            self.last_done = summary.done_count;
            lines.push(format!(
                "      {}/{} phases done ({}%)",
                summary.done_count,
                summary.total(),
                summary.percent()
            ));
        }
        lines
    }

    fn phase_line(&self, record: &PhaseRecord) -> String {
        let mark = if record.done { "[x]" } else { "[ ]" };
        let label = record
            .step
            .map(|step| match self.catalog.get(step) {
                Some(phase) => format!("{step}. {}: ", phase.name),
                None => format!("{step}. "),
            })
            .unwrap_or_default();
        match record.elapsed_seconds {
            Some(secs) if record.done => format!("{mark} {label}{} ({secs:.1}s)", record.message),
            _ => format!("{mark} {label}{}", record.message),
        }
    }
}

/// Prints the headline parts of a terminal payload.
pub fn print_result(result: &Value) {
    if let Some(secs) = result.get("total_elapsed").and_then(Value::as_f64) {
        println!("\nCompleted in {secs:.1}s");
    }
    if let Some(flags) = result.get("red_flags").and_then(Value::as_array) {
        println!("Red flags: {}", flags.len());
    }
    match result.get("memo").and_then(Value::as_str) {
        Some(memo) => println!("\n{memo}"),
        None => println!(
            "{}",
            serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
        ),
    }
}

pub fn history_line(entry: &AnalysisSummary, now: DateTime<Utc>) -> String {
    let sector = entry
        .sector
        .as_deref()
        .map(|s| format!(" [{s}]"))
        .unwrap_or_default();
    format!(
        "#{:<5} {}{}  {}",
        entry.id,
        entry.company_name,
        sector,
        relative_time(entry.created_at, now)
    )
}

pub fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
