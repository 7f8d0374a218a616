use chrono::{TimeZone, Utc};
use epx_integrity::*;
use epx_submission::*;

#[test]
fn scenario_submission_matches_client_contract() {
    let raw = r#"{
        "examId": "exam-42",
        "answers": {"q1": "Photosynthesis converts light...", "q2": "B"},
        "integrityScore": 100,
        "violations": ["Tab switching detected"],
        "timeUsed": 1800,
        "aiAnalysisResults": {
            "q1": {"aiLikelihood": 80, "confidence": 90, "explanation": "uniform tone", "flags": []},
            "q3": {"aiLikelihood": 20}
        }
    }"#;
    let req: SubmissionRequest = serde_json::from_str(raw).unwrap();
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    let rec = process_submission(req, "current_student", now);

    assert_eq!(rec.final_score, 88);
    assert_eq!(rec.avg_ai_likelihood, 50);
    assert_eq!(rec.status, "submitted");
    assert_eq!(rec.id, format!("submission_{}", now.timestamp_millis()));

    let json = serde_json::to_value(&rec).unwrap();
    assert_eq!(json["finalScore"], 88);
    assert_eq!(json["avgAILikelihood"], 50);
    assert_eq!(json["studentId"], "current_student");
    assert_eq!(json["violations"][0], "Tab switching detected");
}

#[test]
fn scenario_missing_likelihood_counts_as_zero() {
    let raw = r#"{
        "examId": "exam-1",
        "integrityScore": 60,
        "aiAnalysisResults": {"q1": {"confidence": 10}, "q2": {"aiLikelihood": 40}}
    }"#;
    let req: SubmissionRequest = serde_json::from_str(raw).unwrap();

    let rec = process_submission(req, "s", Utc::now());

    // avg = 20 -> floor(20/4) = 5
    assert_eq!(rec.final_score, 55);
    assert_eq!(rec.avg_ai_likelihood, 20);
}

#[test]
fn scenario_final_score_from_engine_state() {
    let cfg = IntegrityConfig::standard_defaults();
    let mut st = AttemptState::new();
    apply_signal(&cfg, &mut st, &Signal::new(SignalKind::TabHidden, 0), 0).unwrap();

    let mut analyses = std::collections::BTreeMap::new();
    analyses.insert(
        "q1".to_string(),
        AiDetection {
            ai_likelihood: 61.0,
            ..AiDetection::default()
        },
    );

    // 95 - floor(61/4) = 95 - 15
    assert_eq!(final_score_for_attempt(&st.integrity, &analyses), 80);
}

#[test]
fn scenario_closed_attempt_is_graded_from_engine_state() {
    let cfg = IntegrityConfig::standard_defaults();
    let mut st = AttemptState::new();
    apply_signal(&cfg, &mut st, &Signal::new(SignalKind::FullscreenExit, 1_000), 60).unwrap();
    let ai = Signal::ai_content(85.0, 2_000).unwrap();
    apply_signal(&cfg, &mut st, &ai, 60).unwrap();
    submit(&mut st).unwrap();

    let answers = std::collections::BTreeMap::from([
        ("q1".to_string(), "Chlorophyll absorbs light energy...".to_string()),
        ("q2".to_string(), "C".to_string()),
    ]);
    let analyses = std::collections::BTreeMap::from([
        (
            "q1".to_string(),
            AiDetection {
                ai_likelihood: 85.0,
                ..AiDetection::default()
            },
        ),
    ]);
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();

    let rec = process_closed_attempt(
        ClosedAttempt {
            attempt_id: "7f1c",
            exam_id: "exam-42",
            student_id: "stu-9",
            integrity: &st.integrity,
            answers: &answers,
            ai_analysis_results: &analyses,
            time_used: 1_200,
        },
        now,
    );

    // 100 - 10 - 15 = 75; penalty floor(85 / 4) = 21
    assert_eq!(rec.integrity_score, 75);
    assert_eq!(rec.final_score, 54);
    assert_eq!(rec.final_score, final_score_for_attempt(&st.integrity, &analyses));
    assert_eq!(rec.avg_ai_likelihood, 85);
    assert_eq!(rec.id, "submission_7f1c");
    assert_eq!(rec.violations.len(), 2);
    assert_eq!(rec.violations[0]["kind"], "fullscreen_exit");
    assert_eq!(rec.violations[1]["score_delta"], -15);
}
