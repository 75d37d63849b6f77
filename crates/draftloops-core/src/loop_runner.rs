use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, info_span, warn, Instrument};

use draftloops_critic::{
    Critic, CriticError, GradeParseError, GradeRequest, GradeResult, ScoreSheet,
};
use draftloops_logging::{LogEvent, Logger, SessionLine, SessionWriter};
use draftloops_oracle::OracleError;

use crate::error::LoopError;
use crate::outcome::SessionOutcome;
use crate::session::{Draft, Session};
use crate::{Feedback, Generator};

/// Grading attempts per draft when the critic reply cannot be parsed
const GRADE_PARSE_ATTEMPTS: usize = 2;

/// Longest feedback preview put into log events
const FEEDBACK_PREVIEW_CHARS: usize = 200;

/// Drives a session through draft, grade and revise until a draft is
/// accepted or the iteration cap is reached.
pub struct LoopRunner<'a> {
    generator: &'a dyn Generator,
    critic: &'a dyn Critic,
    logger: Arc<Logger>,
    session_writer: Option<Arc<SessionWriter>>,
    interrupted: Arc<AtomicBool>,
}

impl<'a> LoopRunner<'a> {
    pub fn new(generator: &'a dyn Generator, critic: &'a dyn Critic, logger: Arc<Logger>) -> Self {
        Self {
            generator,
            critic,
            logger,
            session_writer: None,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mirror session progress into a JSONL audit file
    pub fn with_session_writer(mut self, writer: Arc<SessionWriter>) -> Self {
        self.session_writer = Some(writer);
        self
    }

    /// Get a handle to signal interruption
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Run `session` to an outcome.
    ///
    /// On error the session keeps every fully graded draft, so the caller can
    /// still persist it with [`Session::to_record`].
    pub async fn run(&self, session: &mut Session) -> Result<SessionOutcome, LoopError> {
        if session.is_finalized() {
            return Err(LoopError::AlreadyFinalized);
        }

        let span = info_span!("session", id = %session.id(), topic = %session.topic());
        let started = Instant::now();

        let result = self.run_inner(session, started).instrument(span).await;

        if let Err(ref e) = result {
            match e {
                LoopError::Interrupted => {
                    info!("Session interrupted");
                    self.logger.log(&LogEvent::Interrupted {
                        iterations: session.history().len(),
                    });
                }
                other => {
                    warn!(error = %other, "Session failed");
                    self.logger.log(&LogEvent::Failed {
                        iteration: session.next_iteration(),
                        error: other.to_string(),
                    });
                }
            }
        }

        self.write_end(session, result.as_ref().err(), started.elapsed());
        result
    }

    async fn run_inner(
        &self,
        session: &mut Session,
        started: Instant,
    ) -> Result<SessionOutcome, LoopError> {
        let generator_label = self.generator.label();
        let critic_label = self.critic.label();

        self.logger.log(&LogEvent::SessionStarted {
            topic: session.topic().to_string(),
            writer: generator_label.clone(),
            critic: critic_label.clone(),
            threshold: session.threshold(),
            max_iterations: session.max_iterations(),
        });
        if let Some(ref writer) = self.session_writer {
            writer.write(&SessionLine::SessionStart {
                timestamp: Utc::now(),
                session_id: session.id().to_string(),
                topic: session.topic().to_string(),
                writer: generator_label,
                critic: critic_label,
                writer_model: None,
                critic_model: None,
                threshold: session.threshold(),
                max_iterations: session.max_iterations(),
            });
        }

        loop {
            // Checked before the first draft and after every grading step
            if self.interrupted.load(Ordering::SeqCst) {
                return Err(LoopError::Interrupted);
            }

            let iteration = session.next_iteration();
            let feedback = session.history().last().map(Feedback::from_entry);

            let draft = self
                .draft(session, iteration, feedback.as_ref())
                .instrument(info_span!("draft", iteration))
                .await?;

            let grade = self
                .grade(session, &draft)
                .instrument(info_span!("grade", iteration))
                .await;

            self.logger.log(&LogEvent::GradingCompleted {
                iteration,
                total_score: grade.total_score,
                letter_grade: grade.letter_grade.to_string(),
                accepted: grade.accepted,
            });
            self.write_iteration(&draft, &grade);

            let accepted = grade.accepted;
            session.record(draft, grade)?;

            if accepted {
                let draft = session.history()[iteration - 1].draft.clone();
                info!(iteration, "Draft accepted");
                self.logger.log(&LogEvent::Accepted {
                    iteration,
                    total_score: session.history()[iteration - 1].grade.total_score,
                    duration_secs: started.elapsed().as_secs_f64(),
                });
                return Ok(session.finalize(SessionOutcome::Accepted { draft })?.clone());
            }

            if iteration >= session.max_iterations() {
                let best = session
                    .best_entry()
                    .unwrap_or(&session.history()[iteration - 1])
                    .clone();
                info!(best_iteration = best.iteration(), "Iteration cap reached");
                self.logger.log(&LogEvent::Exhausted {
                    iterations: iteration,
                    best_iteration: best.iteration(),
                    best_score: best.grade.total_score,
                    duration_secs: started.elapsed().as_secs_f64(),
                });
                return Ok(session
                    .finalize(SessionOutcome::Exhausted { best: best.draft })?
                    .clone());
            }

            let notes = session.history()[iteration - 1].grade.feedback();
            self.logger.log(&LogEvent::Revising {
                iteration,
                feedback_preview: notes.chars().take(FEEDBACK_PREVIEW_CHARS).collect(),
            });
        }
    }

    /// Produce the draft for `iteration`, retrying transient oracle failures
    async fn draft(
        &self,
        session: &Session,
        iteration: usize,
        feedback: Option<&Feedback>,
    ) -> Result<Draft, LoopError> {
        self.logger.log(&LogEvent::DraftStarted {
            iteration,
            revision: feedback.is_some(),
        });

        let generator = self.generator;
        let topic = session.topic();
        let digest = session.digest();
        let limit = session.config().call_timeout;
        let started = Instant::now();

        let text = session
            .config()
            .retry
            .run("writer", move || {
                with_timeout(limit, generator.generate(topic, digest, feedback))
            })
            .await
            .map_err(|source| LoopError::GeneratorFailure { iteration, source })?;

        let draft = Draft::new(iteration, text);
        debug!(iteration, words = draft.word_count(), "Draft written");
        self.logger.log(&LogEvent::DraftCompleted {
            iteration,
            words: draft.word_count(),
            duration_secs: started.elapsed().as_secs_f64(),
        });
        Ok(draft)
    }

    /// Grade `draft`. Never fails: a grade that cannot be obtained becomes a
    /// zero score.
    async fn grade(&self, session: &Session, draft: &Draft) -> GradeResult {
        let iteration = draft.iteration;
        let rubric = session.rubric();
        let threshold = session.threshold();
        let limit = session.config().call_timeout;
        let critic = self.critic;

        self.logger.log(&LogEvent::GradingStarted { iteration });

        let mut previous_error: Option<String> = None;
        let mut attempt = 1;

        loop {
            let mut request = GradeRequest::new(&draft.text, rubric);
            if let Some(ref error) = previous_error {
                request = request.after_error(error);
            }

            let result: Result<Result<ScoreSheet, GradeParseError>, OracleError> = session
                .config()
                .retry
                .run("critic", move || async move {
                    match with_timeout(limit, critic.grade(request)).await {
                        Ok(sheet) => Ok(Ok(sheet)),
                        Err(CriticError::Parse(e)) => Ok(Err(e)),
                        Err(CriticError::Oracle(e)) => Err(e),
                    }
                })
                .await;

            let reason = match result {
                Ok(Ok(sheet)) => return GradeResult::evaluate(sheet, threshold),
                Ok(Err(e)) if attempt < GRADE_PARSE_ATTEMPTS => {
                    warn!(iteration, attempt, error = %e, "Critic reply unreadable, grading again");
                    self.logger.log(&LogEvent::GradeRetry {
                        iteration,
                        error: e.to_string(),
                    });
                    previous_error = Some(e.to_string());
                    attempt += 1;
                    continue;
                }
                Ok(Err(e)) => format!("unreadable grade: {}", e),
                Err(e) => format!("critic unavailable: {}", e),
            };

            warn!(iteration, reason = %reason, "Scoring draft as zero");
            self.logger.log(&LogEvent::GradeDegraded {
                iteration,
                reason: reason.clone(),
            });
            return GradeResult::degraded(rubric, threshold, reason);
        }
    }

    fn write_iteration(&self, draft: &Draft, grade: &GradeResult) {
        if let Some(ref writer) = self.session_writer {
            writer.write(&SessionLine::Iteration {
                iteration: draft.iteration,
                draft: draft.text.clone(),
                total_score: grade.total_score,
                letter_grade: grade.letter_grade.to_string(),
                accepted: grade.accepted,
                feedback: grade.feedback(),
                degraded: grade.degraded.clone(),
                timestamp: Utc::now(),
            });
        }
    }

    fn write_end(&self, session: &Session, failure: Option<&LoopError>, elapsed: Duration) {
        if let Some(ref writer) = self.session_writer {
            let record = session.to_record(failure);
            writer.write(&SessionLine::SessionEnd {
                status: record.status.to_string(),
                iterations: record.iterations(),
                best_iteration: record.best_iteration,
                final_score: record.final_score,
                duration_secs: elapsed.as_secs_f64(),
                timestamp: Utc::now(),
            });
        }
    }
}

/// Bound `fut` by `limit`, mapping expiry to [`OracleError::Timeout`]
async fn with_timeout<T, E, F>(limit: Option<Duration>, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<OracleError>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(limit).into()),
        },
        None => fut.await,
    }
}
