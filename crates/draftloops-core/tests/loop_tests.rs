use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use draftloops_core::{
    ConfigError, Feedback, Generator, LoopError, LoopRunner, Session, SessionConfig,
    SessionOutcome, SessionStatus, SourceDigest,
};
use draftloops_critic::{
    Criterion, Critic, CriticError, CriterionScore, GradeParseError, GradeRequest, Rubric,
    ScoreSheet,
};
use draftloops_logging::{LogFormat, Logger, SessionLine, SessionWriter};
use draftloops_oracle::{OracleError, RetryPolicy};

// ---- scripted collaborators ----

struct ScriptedGenerator {
    calls: AtomicUsize,
    fail_from_call: Option<usize>,
    delay: Option<Duration>,
    saw_feedback: Mutex<Vec<Option<usize>>>,
}

impl ScriptedGenerator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from_call: None,
            delay: None,
            saw_feedback: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call from the `n`th (1-based) onwards
    fn failing_from(n: usize) -> Self {
        Self {
            fail_from_call: Some(n),
            ..Self::new()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        topic: &str,
        _digest: &SourceDigest,
        feedback: Option<&Feedback>,
    ) -> Result<String, OracleError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if matches!(self.fail_from_call, Some(n) if call >= n) {
            return Err(OracleError::Unreachable("connection refused".into()));
        }
        self.saw_feedback
            .lock()
            .unwrap()
            .push(feedback.map(|f| f.iteration));
        Ok(format!("Draft {} about {}", call, topic))
    }
}

#[derive(Clone)]
enum Reply {
    Score(u32),
    Unparseable,
    Down,
}

struct ScriptedCritic {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    interrupt_after: Mutex<Option<(usize, Arc<AtomicBool>)>>,
}

impl ScriptedCritic {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            delay: None,
            interrupt_after: Mutex::new(None),
        }
    }

    fn slow(delay: Duration, replies: Vec<Reply>) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(replies)
        }
    }

    fn scores(scores: &[u32]) -> Self {
        Self::new(scores.iter().map(|s| Reply::Score(*s)).collect())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Raise `flag` once `n` grading calls have been made
    fn interrupt_after(&self, n: usize, flag: Arc<AtomicBool>) {
        *self.interrupt_after.lock().unwrap() = Some((n, flag));
    }
}

/// Split `total` over the rubric in whole points, front-loading the remainder
fn spread(total: u32, rubric: &Rubric) -> ScoreSheet {
    let n = rubric.len() as u32;
    let base = total / n;
    let mut extra = total % n;
    let scores = rubric
        .criteria()
        .iter()
        .map(|c| {
            let mut score = base;
            if extra > 0 {
                score += 1;
                extra -= 1;
            }
            CriterionScore {
                name: c.name.clone(),
                score: f64::from(score.min(c.max_points)),
                max_points: c.max_points,
                comment: format!("{} could be sharper", c.name),
            }
        })
        .collect();
    ScoreSheet {
        scores,
        summary: String::new(),
    }
}

#[async_trait]
impl Critic for ScriptedCritic {
    async fn grade(&self, request: GradeRequest<'_>) -> Result<ScoreSheet, CriticError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((n, ref flag)) = *self.interrupt_after.lock().unwrap() {
            if call >= n {
                flag.store(true, Ordering::SeqCst);
            }
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Unparseable);
        match reply {
            Reply::Score(total) => Ok(spread(total, request.rubric)),
            Reply::Unparseable => Err(GradeParseError::NoGradeBlock.into()),
            Reply::Down => Err(OracleError::Unreachable("critic offline".into()).into()),
        }
    }
}

// ---- helpers ----

fn logger() -> Arc<Logger> {
    Arc::new(Logger::new(LogFormat::Compact))
}

fn digest() -> SourceDigest {
    SourceDigest::new(
        "Episode: The SaaS reset from Acquired",
        "Summary: SaaS multiples compress as AI shifts budgets.",
    )
}

fn config(threshold: f64, max_iterations: usize) -> SessionConfig {
    SessionConfig::new(threshold, max_iterations, Arc::new(Rubric::default()))
        .with_retry(RetryPolicy::new(2, Duration::ZERO))
}

fn session(threshold: f64, max_iterations: usize) -> Session {
    Session::new("AI and SaaS pricing", digest(), config(threshold, max_iterations)).unwrap()
}

fn assert_history_well_formed(session: &Session) {
    let history = session.history();
    assert!(history.len() <= session.max_iterations());
    for (i, entry) in history.iter().enumerate() {
        assert_eq!(entry.iteration(), i + 1, "iterations must be contiguous");

        let grade = &entry.grade;
        assert_eq!(grade.per_criterion.len(), session.rubric().len());
        for (score, criterion) in grade.per_criterion.iter().zip(session.rubric().criteria()) {
            assert_eq!(score.name, criterion.name);
            assert!(score.score >= 0.0 && score.score <= f64::from(criterion.max_points));
        }
        let sum: f64 = grade.per_criterion.iter().map(|s| s.score).sum();
        assert_eq!(grade.total_score, sum);
        assert!((0.0..=100.0).contains(&grade.total_score));
        assert_eq!(grade.accepted, grade.total_score >= session.threshold());
    }
}

// ---- acceptance ----

#[tokio::test]
async fn accepted_on_third_draft() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::scores(&[70, 85, 95]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 3);

    let outcome = runner.run(&mut session).await.unwrap();

    match &outcome {
        SessionOutcome::Accepted { draft } => assert_eq!(draft.iteration, 3),
        other => panic!("expected Accepted, got {:?}", other),
    }
    assert_eq!(session.history().len(), 3);
    assert_eq!(
        *generator.saw_feedback.lock().unwrap(),
        vec![None, Some(1), Some(2)]
    );
    assert_eq!(outcome.exit_code(), 0);
    assert_history_well_formed(&session);
}

#[tokio::test]
async fn accepted_on_second_draft() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::scores(&[84, 92]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 3);

    let outcome = runner.run(&mut session).await.unwrap();

    assert!(outcome.is_accepted());
    assert_eq!(outcome.draft().iteration, 2);
    assert_eq!(session.history().len(), 2);
    assert_eq!(generator.calls(), 2);
    assert_eq!(critic.calls(), 2);
    assert_history_well_formed(&session);
}

#[tokio::test]
async fn first_draft_accepted_leaves_single_entry() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::scores(&[97]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 5);

    let outcome = runner.run(&mut session).await.unwrap();

    assert!(outcome.is_accepted());
    assert_eq!(session.history().len(), 1);
    assert_eq!(generator.calls(), 1);
    assert!(session.is_finalized());
}

#[tokio::test]
async fn threshold_is_inclusive() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::scores(&[91]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 3);

    let outcome = runner.run(&mut session).await.unwrap();
    assert!(outcome.is_accepted());
}

// ---- exhaustion ----

#[tokio::test]
async fn exhausted_returns_best_of_history() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::scores(&[80, 88, 85]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 3);

    let outcome = runner.run(&mut session).await.unwrap();

    match &outcome {
        SessionOutcome::Exhausted { best } => {
            assert_eq!(best.iteration, 2);
            assert_eq!(best.text, "Draft 2 about AI and SaaS pricing");
        }
        other => panic!("expected Exhausted, got {:?}", other),
    }
    assert_eq!(session.history().len(), 3);
    assert_eq!(outcome.exit_code(), 1);
    assert_history_well_formed(&session);
}

#[tokio::test]
async fn exhausted_tie_goes_to_earliest() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::scores(&[85, 70, 85]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 3);

    let outcome = runner.run(&mut session).await.unwrap();
    assert_eq!(outcome.draft().iteration, 1);
}

// ---- grading failures ----

#[tokio::test]
async fn unparseable_grades_score_zero_and_count_toward_cap() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::new(vec![Reply::Unparseable; 4]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 2);

    let outcome = runner.run(&mut session).await.unwrap();

    match &outcome {
        SessionOutcome::Exhausted { best } => assert_eq!(best.iteration, 1),
        other => panic!("expected Exhausted, got {:?}", other),
    }
    assert_eq!(session.history().len(), 2);
    // One retry per draft
    assert_eq!(critic.calls(), 4);
    for entry in session.history() {
        assert_eq!(entry.grade.total_score, 0.0);
        assert!(entry.grade.degraded.is_some());
        assert!(!entry.grade.accepted);
    }
    assert_history_well_formed(&session);
}

#[tokio::test]
async fn reformatted_zero_grade_is_real_not_degraded() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::new(vec![
        Reply::Unparseable,
        Reply::Score(0),
        Reply::Unparseable,
        Reply::Score(0),
    ]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 2);

    let outcome = runner.run(&mut session).await.unwrap();

    match &outcome {
        SessionOutcome::Exhausted { best } => assert_eq!(best.iteration, 1),
        other => panic!("expected Exhausted, got {:?}", other),
    }
    assert_eq!(session.history().len(), 2);
    assert_eq!(critic.calls(), 4);
    for entry in session.history() {
        assert_eq!(entry.grade.total_score, 0.0);
        assert!(entry.grade.degraded.is_none());
    }
    assert_history_well_formed(&session);
}

#[tokio::test]
async fn parse_failure_is_retried_once_with_same_draft() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::new(vec![Reply::Unparseable, Reply::Score(93)]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 3);

    let outcome = runner.run(&mut session).await.unwrap();

    assert!(outcome.is_accepted());
    assert_eq!(generator.calls(), 1);
    assert_eq!(critic.calls(), 2);
    assert_eq!(session.history()[0].grade.total_score, 93.0);
    assert!(session.history()[0].grade.degraded.is_none());
}

#[tokio::test]
async fn critic_outage_degrades_to_zero_without_failing() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::new(vec![Reply::Down, Reply::Down, Reply::Score(95)]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 3);

    let outcome = runner.run(&mut session).await.unwrap();

    // Two attempts on draft 1 both fail, draft 2 is graded normally
    assert_eq!(critic.calls(), 3);
    assert_eq!(session.history()[0].grade.total_score, 0.0);
    assert!(session.history()[0]
        .grade
        .degraded
        .as_deref()
        .unwrap()
        .contains("critic unavailable"));
    assert_eq!(outcome.draft().iteration, 2);
}

#[tokio::test]
async fn transient_critic_failure_is_retried() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::new(vec![Reply::Down, Reply::Score(95)]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 3);

    let outcome = runner.run(&mut session).await.unwrap();

    assert!(outcome.is_accepted());
    assert_eq!(outcome.draft().iteration, 1);
    assert_eq!(critic.calls(), 2);
}

// ---- generator failures ----

#[tokio::test]
async fn failing_generator_is_fatal_with_empty_history() {
    let generator = ScriptedGenerator::failing_from(1);
    let critic = ScriptedCritic::scores(&[95]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 3);

    let err = runner.run(&mut session).await.unwrap_err();

    match &err {
        LoopError::GeneratorFailure { iteration, source } => {
            assert_eq!(*iteration, 1);
            assert!(matches!(source, OracleError::Unreachable(_)));
        }
        other => panic!("expected GeneratorFailure, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 2);
    assert!(session.history().is_empty());
    assert!(!session.is_finalized());
    // Retried up to the policy's attempt budget
    assert_eq!(generator.calls(), 2);
    assert_eq!(critic.calls(), 0);
}

#[tokio::test]
async fn generator_failure_mid_session_keeps_history() {
    // Call 1 succeeds, calls 2 and 3 (draft 2 and its retry) fail
    let generator = ScriptedGenerator::failing_from(2);
    let critic = ScriptedCritic::scores(&[60]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 3);

    let err = runner.run(&mut session).await.unwrap_err();

    assert!(matches!(err, LoopError::GeneratorFailure { iteration: 2, .. }));
    assert_eq!(session.history().len(), 1);

    let record = session.to_record(Some(&err));
    assert_eq!(record.status, SessionStatus::Failed);
    assert_eq!(record.best_iteration, Some(1));
    assert_eq!(record.final_score, Some(60.0));
    assert!(record.error.is_some());
    assert!(record.ended_at.is_some());
}

#[tokio::test]
async fn slow_generator_times_out() {
    let generator = ScriptedGenerator::slow(Duration::from_millis(200));
    let critic = ScriptedCritic::scores(&[95]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let config = config(91.0, 3)
        .with_retry(RetryPolicy::none())
        .with_call_timeout(Duration::from_millis(10));
    let mut session = Session::new("topic", digest(), config).unwrap();

    let err = runner.run(&mut session).await.unwrap_err();

    assert!(matches!(
        err,
        LoopError::GeneratorFailure {
            source: OracleError::Timeout(_),
            ..
        }
    ));
}

#[tokio::test]
async fn slow_critic_times_out_and_degrades() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::slow(Duration::from_millis(200), vec![Reply::Score(95)]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let config = config(91.0, 1)
        .with_retry(RetryPolicy::none())
        .with_call_timeout(Duration::from_millis(10));
    let mut session = Session::new("topic", digest(), config).unwrap();

    let outcome = runner.run(&mut session).await.unwrap();

    match &outcome {
        SessionOutcome::Exhausted { best } => assert_eq!(best.iteration, 1),
        other => panic!("expected Exhausted, got {:?}", other),
    }
    assert_eq!(critic.calls(), 1);
    let grade = &session.history()[0].grade;
    assert_eq!(grade.total_score, 0.0);
    assert!(grade
        .degraded
        .as_deref()
        .unwrap()
        .contains("critic unavailable"));
    assert_history_well_formed(&session);
}

// ---- configuration ----

#[tokio::test]
async fn bad_rubric_fails_before_any_oracle_call() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::scores(&[95]);

    let result = SessionConfig::from_criteria(
        91.0,
        3,
        vec![Criterion::new("Hook", 30), Criterion::new("Body", 30)],
    );

    assert!(matches!(result, Err(ConfigError::Rubric(_))));
    assert_eq!(generator.calls(), 0);
    assert_eq!(critic.calls(), 0);
}

#[test]
fn out_of_range_threshold_is_config_error() {
    let result = Session::new("topic", digest(), config(150.0, 3));
    assert!(matches!(
        result,
        Err(LoopError::Config(ConfigError::Threshold(_)))
    ));

    let result = Session::new("topic", digest(), config(91.0, 0));
    assert!(matches!(
        result,
        Err(LoopError::Config(ConfigError::MaxIterations))
    ));
}

// ---- lifecycle ----

#[tokio::test]
async fn finalized_session_cannot_run_again() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::scores(&[95, 95]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    let mut session = session(91.0, 3);

    runner.run(&mut session).await.unwrap();
    let err = runner.run(&mut session).await.unwrap_err();

    assert!(matches!(err, LoopError::AlreadyFinalized));
    assert_eq!(session.history().len(), 1);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn interrupt_before_first_draft() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::scores(&[95]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    runner.interrupt_handle().store(true, Ordering::SeqCst);
    let mut session = session(91.0, 3);

    let err = runner.run(&mut session).await.unwrap_err();

    assert!(matches!(err, LoopError::Interrupted));
    assert_eq!(err.exit_code(), 130);
    assert_eq!(generator.calls(), 0);
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn interrupt_after_grading_keeps_recorded_history() {
    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::scores(&[70, 80, 95]);
    let runner = LoopRunner::new(&generator, &critic, logger());
    critic.interrupt_after(1, runner.interrupt_handle());
    let mut session = session(91.0, 3);

    let err = runner.run(&mut session).await.unwrap_err();

    assert!(matches!(err, LoopError::Interrupted));
    assert_eq!(session.history().len(), 1);
    assert_eq!(generator.calls(), 1);

    let record = session.to_record(Some(&err));
    assert_eq!(record.status, SessionStatus::Interrupted);
    assert_eq!(record.best_iteration, Some(1));
}

#[tokio::test]
async fn accepted_record_and_audit_file() {
    let dir = tempfile::tempdir().unwrap();
    let writer = Arc::new(SessionWriter::in_dir(dir.path(), "AI and SaaS pricing").unwrap());

    let generator = ScriptedGenerator::new();
    let critic = ScriptedCritic::scores(&[72, 94]);
    let runner =
        LoopRunner::new(&generator, &critic, logger()).with_session_writer(writer.clone());
    let mut session = session(91.0, 3);

    runner.run(&mut session).await.unwrap();

    let record = session.to_record(None);
    assert_eq!(record.status, SessionStatus::Accepted);
    assert_eq!(record.best_iteration, Some(2));
    assert_eq!(record.final_score, Some(94.0));
    assert_eq!(record.final_text(), Some("Draft 2 about AI and SaaS pricing"));
    assert_eq!(record.iterations(), 2);

    let json = serde_json::to_string(&record).unwrap();
    let back: draftloops_core::SessionRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);

    let lines = SessionWriter::read_lines(writer.path()).unwrap();
    assert_eq!(lines.len(), 4);
    assert!(matches!(lines[0], SessionLine::SessionStart { .. }));
    assert!(matches!(
        lines[2],
        SessionLine::Iteration {
            iteration: 2,
            accepted: true,
            ..
        }
    ));
    assert!(matches!(
        &lines[3],
        SessionLine::SessionEnd { status, best_iteration: Some(2), .. } if status == "accepted"
    ));
}
