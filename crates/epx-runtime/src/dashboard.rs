//! Live-proctoring aggregation over session snapshots.
//!
//! Reads snapshots only; never talks to a session task.

use epx_integrity::{AttemptPhase, ViolationRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::SessionSnapshot;

const NORMAL_FLOOR: u8 = 80;
const WARNING_FLOOR: u8 = 60;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBand {
    Normal,
    Warning,
    Critical,
}

impl StatusBand {
    pub fn classify(score: u8, phase: &AttemptPhase) -> Self {
        if matches!(phase, AttemptPhase::ForceSubmitted { .. }) {
            return StatusBand::Critical;
        }
        if score >= NORMAL_FLOOR {
            StatusBand::Normal
        } else if score >= WARNING_FLOOR {
            StatusBand::Warning
        } else {
            StatusBand::Critical
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardRow {
    pub attempt_id: Uuid,
    pub student_id: String,
    pub integrity_score: u8,
    pub attention_score: u8,
    pub violation_count: usize,
    pub last_violation: Option<ViolationRecord>,
    pub elapsed_secs: u64,
    pub phase: AttemptPhase,
    pub status: StatusBand,
}

impl DashboardRow {
    pub fn from_snapshot(s: &SessionSnapshot) -> Self {
        let ig = &s.state.integrity;
        Self {
            attempt_id: s.attempt_id,
            student_id: s.student_id.clone(),
            integrity_score: ig.score,
            attention_score: ig.attention_score,
            violation_count: ig.violations.len(),
            last_violation: ig.last_violation().cloned(),
            elapsed_secs: s.elapsed_secs,
            phase: s.state.phase.clone(),
            status: StatusBand::classify(ig.score, &s.state.phase),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_students: usize,
    /// Attempts not yet submitted.
    pub active_students: usize,
    pub critical_students: usize,
    /// Mean integrity over all rows, rounded half up. Zero when empty.
    pub average_integrity: u8,
}

impl DashboardSummary {
    pub fn from_rows(rows: &[DashboardRow]) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let sum: u64 = rows.iter().map(|r| r.integrity_score as u64).sum();
        let n = rows.len() as u64;
        Self {
            total_students: rows.len(),
            active_students: rows.iter().filter(|r| !r.phase.is_terminal()).count(),
            critical_students: rows
                .iter()
                .filter(|r| r.status == StatusBand::Critical)
                .count(),
            // integer half-up: (2*sum + n) / (2*n)
            average_integrity: ((2 * sum + n) / (2 * n)) as u8,
        }
    }
}

/// Rows ordered by attempt id plus their summary.
pub fn dashboard(snapshots: &[SessionSnapshot]) -> (Vec<DashboardRow>, DashboardSummary) {
    let mut rows: Vec<DashboardRow> = snapshots.iter().map(DashboardRow::from_snapshot).collect();
    rows.sort_by_key(|r| r.attempt_id);
    let summary = DashboardSummary::from_rows(&rows);
    (rows, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use epx_integrity::{AttemptState, ForceSubmitReason};

    fn snap(score: u8, phase: AttemptPhase) -> SessionSnapshot {
        let mut state = AttemptState::new();
        state.integrity.score = score;
        state.phase = phase;
        SessionSnapshot {
            attempt_id: Uuid::new_v4(),
            student_id: format!("stu-{score}"),
            exam_id: None,
            started_at: Utc::now(),
            elapsed_secs: 0,
            state,
            last_decision: None,
            answers: Default::default(),
            ai_analyses: Default::default(),
        }
    }

    #[test]
    fn band_edges() {
        assert_eq!(StatusBand::classify(80, &AttemptPhase::Active), StatusBand::Normal);
        assert_eq!(StatusBand::classify(79, &AttemptPhase::Active), StatusBand::Warning);
        assert_eq!(StatusBand::classify(60, &AttemptPhase::Warned), StatusBand::Warning);
        assert_eq!(StatusBand::classify(59, &AttemptPhase::Warned), StatusBand::Critical);
        let forced = AttemptPhase::ForceSubmitted {
            reason: ForceSubmitReason::SessionTimeout,
        };
        assert_eq!(StatusBand::classify(95, &forced), StatusBand::Critical);
    }

    #[test]
    fn summary_counts_and_rounds() {
        let snaps = vec![
            snap(100, AttemptPhase::Active),
            snap(75, AttemptPhase::Active),
            snap(40, AttemptPhase::Warned),
            snap(90, AttemptPhase::NormallySubmitted),
        ];
        let (rows, summary) = dashboard(&snaps);
        assert_eq!(rows.len(), 4);
        assert_eq!(summary.total_students, 4);
        assert_eq!(summary.active_students, 3);
        assert_eq!(summary.critical_students, 1);
        // 305 / 4 = 76.25
        assert_eq!(summary.average_integrity, 76);
    }

    #[test]
    fn half_rounds_up() {
        let snaps = vec![snap(81, AttemptPhase::Active), snap(82, AttemptPhase::Active)];
        assert_eq!(dashboard(&snaps).1.average_integrity, 82);
    }

    #[test]
    fn empty_dashboard_is_zeroed() {
        let (rows, summary) = dashboard(&[]);
        assert!(rows.is_empty());
        assert_eq!(summary, DashboardSummary::default());
    }
}
