//! Question lifecycle state machine.
//!
//! The machine owns the current question, the single answer submission per
//! round, and the local countdown counter. It is a pure transition function:
//! `handle(input)` mutates internal state and returns [`Effect`]s as data.
//! The driver (the client's transport loop) performs the effects — sending
//! wire messages, emitting events, starting or stopping timers — so every
//! transition is unit-testable without a transport or a runtime.
//!
//! Phase transitions are the only place question and answer data is created
//! or cleared. The countdown is best-effort display state: reaching zero
//! never changes phase, only the server's `question_ended` does.

use crate::event::{GameRegion, QuizWireEvent};
use crate::protocol::{
    ClientMessage, Question, QuestionEndedPayload, QuestionStartedPayload, OPTION_COUNT,
};

/// How long the leaderboard stays up before returning to the waiting state.
pub const RESULTS_DISPLAY_SECONDS: u64 = 10;

/// Discrete lifecycle phase. Exactly one holds at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No round in progress; waiting for the host to start one.
    #[default]
    Waiting,
    /// A question is open and this player has not answered yet.
    QuestionActive,
    /// A question is open and this player's answer is locked in.
    Answered,
    /// The round closed; leaderboard showing. Terminal iff the game is over.
    Results,
}

/// The at-most-one answer recorded for the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSubmission {
    /// Selected option slot, 0..=3.
    pub selected_index: usize,
    /// Client wall-clock timestamp at submission, epoch milliseconds.
    pub submitted_at_epoch_ms: u64,
}

/// Inputs the machine reacts to: server events, local user input, and the
/// driver's timer callbacks.
#[derive(Debug, Clone)]
pub enum LifecycleInput {
    /// Server opened a new round.
    QuestionStarted(QuestionStartedPayload),
    /// Server closed the current round.
    QuestionEnded(QuestionEndedPayload),
    /// The player picked an option. The timestamp is injected by the caller
    /// so transitions stay deterministic under test.
    SubmitAnswer {
        answer_index: usize,
        now_epoch_ms: u64,
    },
    /// One second elapsed on the driver's countdown interval.
    CountdownTick,
    /// The results display interval elapsed.
    ResultsElapsed,
    /// Server verdict for this player's submission.
    AnswerVerdict { correct: bool, response_time_ms: u64 },
}

/// Side effects a transition asks the driver to perform, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Serialize and send a message on the connection channel.
    Send(ClientMessage),
    /// Deliver an event to the embedding application.
    Emit(QuizWireEvent),
    /// (Re)start the 1 Hz countdown feed. Any previous feed is replaced,
    /// never left racing the new one.
    StartCountdown,
    /// Stop the countdown feed.
    StopCountdown,
    /// Arrange a [`LifecycleInput::ResultsElapsed`] after
    /// [`RESULTS_DISPLAY_SECONDS`].
    ScheduleResultsReturn,
    /// Drop any pending results-return timer.
    CancelResultsReturn,
}

/// The question lifecycle state machine. See module docs.
#[derive(Debug, Default)]
pub struct LifecycleMachine {
    phase: Phase,
    question: Option<Question>,
    submission: Option<AnswerSubmission>,
    remaining_seconds: Option<u32>,
    /// This player's id, used to locate their leaderboard row. Adopted from
    /// the session on join or reconnect.
    player_id: Option<String>,
    /// Last `answer_result` verdict, kept for display.
    last_verdict: Option<(bool, u64)>,
    /// Set when the server reports a terminal game status. All further
    /// inputs are absorbed; the final leaderboard stays up.
    game_over: bool,
}

impl LifecycleMachine {
    /// Create a machine in the `Waiting` phase with no question.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The current question, if a round has been received.
    pub fn question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    /// This round's answer submission, if one was made.
    pub fn submission(&self) -> Option<&AnswerSubmission> {
        self.submission.as_ref()
    }

    /// Remaining display seconds on the local countdown.
    pub fn remaining_seconds(&self) -> Option<u32> {
        self.remaining_seconds
    }

    /// Last `answer_result` verdict as `(correct, response_time_ms)`.
    pub fn last_verdict(&self) -> Option<(bool, u64)> {
        self.last_verdict
    }

    /// True once the server reported a terminal game status.
    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Adopt the player id used to locate this player in leaderboards.
    pub fn set_player_id(&mut self, player_id: impl Into<String>) {
        self.player_id = Some(player_id.into());
    }

    /// Run one transition. Returns the effects the driver must perform,
    /// in order. Unknown or ill-timed inputs are absorbed as no-ops.
    pub fn handle(&mut self, input: LifecycleInput) -> Vec<Effect> {
        if self.game_over {
            // Terminal results: the machine stays put permanently.
            return Vec::new();
        }
        match input {
            LifecycleInput::QuestionStarted(payload) => self.on_question_started(payload),
            LifecycleInput::QuestionEnded(payload) => self.on_question_ended(payload),
            LifecycleInput::SubmitAnswer {
                answer_index,
                now_epoch_ms,
            } => self.on_submit(answer_index, now_epoch_ms),
            LifecycleInput::CountdownTick => self.on_tick(),
            LifecycleInput::ResultsElapsed => self.on_results_elapsed(),
            LifecycleInput::AnswerVerdict {
                correct,
                response_time_ms,
            } => {
                self.last_verdict = Some((correct, response_time_ms));
                vec![Effect::Emit(QuizWireEvent::AnswerResult {
                    correct,
                    response_time_ms,
                })]
            }
        }
    }

    /// `Waiting → QuestionActive`. The new question replaces any prior one
    /// wholesale and the submission gate reopens.
    fn on_question_started(&mut self, payload: QuestionStartedPayload) -> Vec<Effect> {
        let question = payload.into_question();
        let time_limit = question.time_limit_seconds;

        self.phase = Phase::QuestionActive;
        self.question = Some(question.clone());
        self.submission = None;
        self.remaining_seconds = Some(time_limit);

        vec![
            // A round can open while the results-return timer is pending;
            // the timer must not fire into the new round.
            Effect::CancelResultsReturn,
            Effect::Emit(QuizWireEvent::QuestionStarted { question }),
            Effect::Emit(QuizWireEvent::ShowRegion(GameRegion::Question)),
            Effect::Emit(QuizWireEvent::CountdownTick {
                remaining_seconds: time_limit,
            }),
            Effect::StartCountdown,
        ]
    }

    /// `QuestionActive → Answered` on the first valid submission. A second
    /// attempt, or an index outside the four option slots, is rejected
    /// silently — no emission, no phase change.
    fn on_submit(&mut self, answer_index: usize, now_epoch_ms: u64) -> Vec<Effect> {
        if self.phase != Phase::QuestionActive
            || self.submission.is_some()
            || answer_index >= OPTION_COUNT
            || self.question.is_none()
        {
            return Vec::new();
        }

        self.phase = Phase::Answered;
        self.submission = Some(AnswerSubmission {
            selected_index: answer_index,
            submitted_at_epoch_ms: now_epoch_ms,
        });

        vec![
            Effect::Send(ClientMessage::SubmitAnswer {
                answer_index,
                timestamp: now_epoch_ms,
            }),
            Effect::Emit(QuizWireEvent::AnswerSubmitted { answer_index }),
        ]
    }

    /// `{QuestionActive, Answered} → Results`, whether or not a submission
    /// exists. Also absorbs a `question_ended` with no matching round
    /// (protocol desync) by going to `Results` without assuming continuity.
    fn on_question_ended(&mut self, payload: QuestionEndedPayload) -> Vec<Effect> {
        self.phase = Phase::Results;
        self.remaining_seconds = None;
        if let Some(question) = &mut self.question {
            question.correct_answer_index = Some(payload.correct_answer_index);
        }

        // 1-based position of this player in the leaderboard. Absent means
        // "unanswered"/no rank, never a fabricated zero.
        let rank = self.player_id.as_deref().and_then(|id| {
            payload
                .leaderboard
                .iter()
                .position(|entry| entry.player_id == id)
                .map(|pos| pos + 1)
        });

        let terminal = payload.game_status.is_terminal();
        let mut effects = vec![
            Effect::StopCountdown,
            Effect::Emit(QuizWireEvent::RoundEnded {
                correct_answer_index: payload.correct_answer_index,
                rank,
                leaderboard: payload.leaderboard,
                game_status: payload.game_status,
            }),
            Effect::Emit(QuizWireEvent::ShowRegion(GameRegion::Leaderboard)),
        ];

        if terminal {
            self.game_over = true;
            effects.push(Effect::Emit(QuizWireEvent::GameOver));
        } else {
            effects.push(Effect::ScheduleResultsReturn);
        }
        effects
    }

    /// Decrement the countdown. Reaching zero stops the feed but never
    /// forces a phase change — only `question_ended` closes a round.
    fn on_tick(&mut self) -> Vec<Effect> {
        if !matches!(self.phase, Phase::QuestionActive | Phase::Answered) {
            return Vec::new();
        }
        let Some(remaining) = self.remaining_seconds else {
            return Vec::new();
        };
        let remaining = remaining.saturating_sub(1);
        self.remaining_seconds = Some(remaining);

        let mut effects = vec![Effect::Emit(QuizWireEvent::CountdownTick {
            remaining_seconds: remaining,
        })];
        if remaining == 0 {
            effects.push(Effect::StopCountdown);
        }
        effects
    }

    /// `Results → Waiting` after the display interval, clearing round data.
    fn on_results_elapsed(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Results {
            return Vec::new();
        }
        self.phase = Phase::Waiting;
        self.question = None;
        self.submission = None;

        vec![
            Effect::Emit(QuizWireEvent::WaitingForNextQuestion),
            Effect::Emit(QuizWireEvent::ShowRegion(GameRegion::Question)),
        ]
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{GameStatus, LeaderboardEntry};

    fn question_started(time_limit: u32) -> LifecycleInput {
        LifecycleInput::QuestionStarted(QuestionStartedPayload {
            question: "Largest planet?".into(),
            options: [
                "Mars".into(),
                "Jupiter".into(),
                "Venus".into(),
                "Saturn".into(),
            ],
            time_limit_seconds: time_limit,
        })
    }

    fn question_ended(correct: usize, status: GameStatus) -> LifecycleInput {
        LifecycleInput::QuestionEnded(QuestionEndedPayload {
            correct_answer_index: correct,
            leaderboard: vec![
                LeaderboardEntry {
                    player_id: "P1".into(),
                    name: "Alice".into(),
                    score: 900,
                },
                LeaderboardEntry {
                    player_id: "P2".into(),
                    name: "Bob".into(),
                    score: 400,
                },
            ],
            game_status: status,
        })
    }

    fn submit(index: usize) -> LifecycleInput {
        LifecycleInput::SubmitAnswer {
            answer_index: index,
            now_epoch_ms: 1_700_000_000_000,
        }
    }

    fn sent_messages(effects: &[Effect]) -> Vec<&ClientMessage> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn starts_waiting_with_no_question() {
        let machine = LifecycleMachine::new();
        assert_eq!(machine.phase(), Phase::Waiting);
        assert!(machine.question().is_none());
        assert!(machine.submission().is_none());
    }

    #[test]
    fn question_started_opens_round_and_starts_countdown() {
        let mut machine = LifecycleMachine::new();
        let effects = machine.handle(question_started(30));

        assert_eq!(machine.phase(), Phase::QuestionActive);
        assert_eq!(machine.remaining_seconds(), Some(30));
        assert!(effects.contains(&Effect::StartCountdown));
        assert!(effects.contains(&Effect::CancelResultsReturn));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Emit(QuizWireEvent::QuestionStarted { .. }))));
    }

    #[test]
    fn first_submission_sends_exactly_once() {
        let mut machine = LifecycleMachine::new();
        machine.handle(question_started(30));

        let effects = machine.handle(submit(2));
        assert_eq!(machine.phase(), Phase::Answered);
        assert_eq!(
            sent_messages(&effects),
            vec![&ClientMessage::SubmitAnswer {
                answer_index: 2,
                timestamp: 1_700_000_000_000,
            }]
        );
    }

    #[test]
    fn second_submission_is_a_silent_noop() {
        let mut machine = LifecycleMachine::new();
        machine.handle(question_started(30));
        machine.handle(submit(0));

        let effects = machine.handle(submit(3));
        assert!(effects.is_empty());
        assert_eq!(machine.phase(), Phase::Answered);
        assert_eq!(machine.submission().unwrap().selected_index, 0);
    }

    #[test]
    fn out_of_range_index_never_reaches_the_network() {
        let mut machine = LifecycleMachine::new();
        machine.handle(question_started(30));

        for bad in [OPTION_COUNT, 7, usize::MAX] {
            let effects = machine.handle(submit(bad));
            assert!(effects.is_empty(), "index {bad} must be rejected silently");
        }
        assert_eq!(machine.phase(), Phase::QuestionActive);
        assert!(machine.submission().is_none());
    }

    #[test]
    fn submission_while_waiting_is_a_noop() {
        let mut machine = LifecycleMachine::new();
        let effects = machine.handle(submit(1));
        assert!(effects.is_empty());
        assert_eq!(machine.phase(), Phase::Waiting);
    }

    #[test]
    fn question_ended_closes_round_with_rank() {
        let mut machine = LifecycleMachine::new();
        machine.set_player_id("P1");
        machine.handle(question_started(30));
        machine.handle(submit(2));

        let effects = machine.handle(question_ended(1, GameStatus::Results));
        assert_eq!(machine.phase(), Phase::Results);
        assert_eq!(machine.question().unwrap().correct_answer_index, Some(1));
        assert_eq!(machine.submission().unwrap().selected_index, 2);
        assert!(effects.contains(&Effect::StopCountdown));
        assert!(effects.contains(&Effect::ScheduleResultsReturn));

        let round_ended = effects
            .iter()
            .find_map(|e| match e {
                Effect::Emit(QuizWireEvent::RoundEnded {
                    correct_answer_index,
                    rank,
                    ..
                }) => Some((*correct_answer_index, *rank)),
                _ => None,
            })
            .unwrap();
        assert_eq!(round_ended, (1, Some(1)));
    }

    #[test]
    fn question_ended_without_submission_still_closes_round() {
        let mut machine = LifecycleMachine::new();
        machine.set_player_id("P9");
        machine.handle(question_started(30));

        let effects = machine.handle(question_ended(1, GameStatus::Results));
        assert_eq!(machine.phase(), Phase::Results);
        assert!(machine.submission().is_none());

        // P9 is not in the leaderboard: no rank, never a false zero.
        let rank = effects.iter().find_map(|e| match e {
            Effect::Emit(QuizWireEvent::RoundEnded { rank, .. }) => Some(*rank),
            _ => None,
        });
        assert_eq!(rank, Some(None));
    }

    #[test]
    fn desync_question_ended_is_absorbed() {
        let mut machine = LifecycleMachine::new();
        // No question_started was ever received.
        let effects = machine.handle(question_ended(0, GameStatus::Results));
        assert_eq!(machine.phase(), Phase::Results);
        assert!(machine.question().is_none());
        assert!(effects.contains(&Effect::ScheduleResultsReturn));
    }

    #[test]
    fn results_return_to_waiting_after_interval() {
        let mut machine = LifecycleMachine::new();
        machine.handle(question_started(30));
        machine.handle(question_ended(1, GameStatus::Results));

        let effects = machine.handle(LifecycleInput::ResultsElapsed);
        assert_eq!(machine.phase(), Phase::Waiting);
        assert!(machine.question().is_none());
        assert!(machine.submission().is_none());
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Emit(QuizWireEvent::WaitingForNextQuestion))));
    }

    #[test]
    fn results_elapsed_outside_results_is_a_noop() {
        let mut machine = LifecycleMachine::new();
        machine.handle(question_started(30));
        let effects = machine.handle(LifecycleInput::ResultsElapsed);
        assert!(effects.is_empty());
        assert_eq!(machine.phase(), Phase::QuestionActive);
    }

    #[test]
    fn terminal_status_keeps_results_permanently() {
        let mut machine = LifecycleMachine::new();
        machine.handle(question_started(30));
        let effects = machine.handle(question_ended(1, GameStatus::Finished));

        assert!(machine.is_game_over());
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Emit(QuizWireEvent::GameOver))));
        assert!(!effects.contains(&Effect::ScheduleResultsReturn));

        // Nothing moves the machine after the terminal round.
        assert!(machine.handle(LifecycleInput::ResultsElapsed).is_empty());
        assert!(machine.handle(question_started(20)).is_empty());
        assert_eq!(machine.phase(), Phase::Results);
    }

    #[test]
    fn countdown_ticks_down_and_stops_at_zero() {
        let mut machine = LifecycleMachine::new();
        machine.handle(question_started(2));

        let effects = machine.handle(LifecycleInput::CountdownTick);
        assert_eq!(machine.remaining_seconds(), Some(1));
        assert!(!effects.contains(&Effect::StopCountdown));

        let effects = machine.handle(LifecycleInput::CountdownTick);
        assert_eq!(machine.remaining_seconds(), Some(0));
        assert!(effects.contains(&Effect::StopCountdown));

        // Zero does not close the round.
        assert_eq!(machine.phase(), Phase::QuestionActive);
    }

    #[test]
    fn countdown_keeps_running_after_answer() {
        let mut machine = LifecycleMachine::new();
        machine.handle(question_started(5));
        machine.handle(submit(1));

        let effects = machine.handle(LifecycleInput::CountdownTick);
        assert_eq!(machine.remaining_seconds(), Some(4));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Emit(QuizWireEvent::CountdownTick { .. }))));
    }

    #[test]
    fn tick_outside_a_round_is_a_noop() {
        let mut machine = LifecycleMachine::new();
        assert!(machine.handle(LifecycleInput::CountdownTick).is_empty());
    }

    #[test]
    fn new_question_replaces_old_round_wholesale() {
        let mut machine = LifecycleMachine::new();
        machine.handle(question_started(30));
        machine.handle(submit(3));
        machine.handle(question_ended(0, GameStatus::Results));

        // Next round arrives before the results interval elapses.
        let effects = machine.handle(question_started(20));
        assert_eq!(machine.phase(), Phase::QuestionActive);
        assert!(machine.submission().is_none());
        assert_eq!(machine.remaining_seconds(), Some(20));
        assert!(effects.contains(&Effect::CancelResultsReturn));

        // The gate reopened: a fresh submission goes out.
        let effects = machine.handle(submit(1));
        assert_eq!(sent_messages(&effects).len(), 1);
    }

    #[test]
    fn answer_verdict_is_stored_and_surfaced() {
        let mut machine = LifecycleMachine::new();
        machine.handle(question_started(30));
        machine.handle(submit(1));

        let effects = machine.handle(LifecycleInput::AnswerVerdict {
            correct: true,
            response_time_ms: 512,
        });
        assert_eq!(machine.last_verdict(), Some((true, 512)));
        assert_eq!(
            effects,
            vec![Effect::Emit(QuizWireEvent::AnswerResult {
                correct: true,
                response_time_ms: 512,
            })]
        );
    }

    #[test]
    fn many_rounds_keep_one_submission_each() {
        let mut machine = LifecycleMachine::new();
        for round in 0..5 {
            machine.handle(question_started(10));
            let mut sends = 0;
            for attempt in 0..4 {
                let effects = machine.handle(submit(attempt));
                sends += sent_messages(&effects).len();
            }
            assert_eq!(sends, 1, "round {round} must send exactly one answer");
            machine.handle(question_ended(0, GameStatus::Results));
            machine.handle(LifecycleInput::ResultsElapsed);
        }
    }
}
