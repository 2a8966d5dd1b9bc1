//! At-exit report, gated by `SEQ_REPORT` (`spec.md` §6 ambient stack).
//!
//! Human-readable text by default; `SEQ_REPORT=json` switches to a
//! `serde_json`-serialized form behind the `report-json` feature, following
//! the teacher's pattern of a small `serde`-derived struct for its own
//! report output rather than hand-building a JSON string.

use crate::future::StrandStats;
use crate::gc::GcStats;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Report {
    pub gc: GcStatsReport,
    pub strands: StrandStatsReport,
}

#[derive(Debug, Serialize)]
pub struct GcStatsReport {
    pub nursery_collections: u64,
    pub full_collections: u64,
    pub objects_freed: u64,
    pub objects_promoted: u64,
    pub nursery_threshold: usize,
}

#[derive(Debug, Serialize)]
pub struct StrandStatsReport {
    pub active: usize,
    pub total_spawned: usize,
    pub total_completed: usize,
    pub peak: usize,
}

impl Report {
    pub fn new(gc: GcStats, strands: StrandStats) -> Self {
        Report {
            gc: GcStatsReport {
                nursery_collections: gc.nursery_collections,
                full_collections: gc.full_collections,
                objects_freed: gc.objects_freed,
                objects_promoted: gc.objects_promoted,
                nursery_threshold: gc.nursery_threshold,
            },
            strands: StrandStatsReport {
                active: strands.active,
                total_spawned: strands.total_spawned,
                total_completed: strands.total_completed,
                peak: strands.peak,
            },
        }
    }

    pub fn render_human(&self) -> String {
        format!(
            "seq report:\n  gc: {} nursery / {} full collections, {} freed, {} promoted (threshold {})\n  strands: {} active, {} spawned, {} completed (peak {})",
            self.gc.nursery_collections,
            self.gc.full_collections,
            self.gc.objects_freed,
            self.gc.objects_promoted,
            self.gc.nursery_threshold,
            self.strands.active,
            self.strands.total_spawned,
            self.strands.total_completed,
            self.strands.peak,
        )
    }

    #[cfg(feature = "report-json")]
    pub fn render_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("Report serialization cannot fail")
    }
}

/// Print the report in the configured format, if `SEQ_REPORT` was set
/// (`spec.md` §6: the report is opt-in, not printed unconditionally).
pub fn maybe_print(format: crate::config::ReportFormat, gc: GcStats, strands: StrandStats) {
    let report = Report::new(gc, strands);
    match format {
        crate::config::ReportFormat::Human => eprintln!("{}", report.render_human()),
        #[cfg(feature = "report-json")]
        crate::config::ReportFormat::Json => eprintln!("{}", report.render_json()),
        #[cfg(not(feature = "report-json"))]
        crate::config::ReportFormat::Json => eprintln!("{}", report.render_human()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_report_contains_counts() {
        let gc = GcStats { nursery_collections: 2, objects_freed: 10, ..Default::default() };
        let strands = StrandStats { active: 1, total_spawned: 3, total_completed: 2, peak: 2 };
        let report = Report::new(gc, strands);
        let text = report.render_human();
        assert!(text.contains("2 nursery"));
        assert!(text.contains("10 freed"));
    }
}
