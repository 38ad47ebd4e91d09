//! Participant Stream Sequencer
//!
//! Drives a round's participants strictly one at a time: each participant's
//! prompt depends on the previous participant's completed output, so the
//! sequencer awaits a finish reason before advancing. Every stream writes
//! through the resumption buffer under its deterministic key, and a resume
//! after a reload continues from the next incomplete participant index
//! rather than from the beginning.

use crate::ports::generation::{GenerationGateway, PromptMessage};
use crate::ports::message_store::{MessageStore, StoreError};
use crate::ports::progress::RoundProgressNotifier;
use crate::ports::stream_buffer::{StartOutcome, StreamBuffer};
use crate::retry::RetryPolicy;
use crate::use_cases::attach_stream::AttachStreamUseCase;
use roundtable_domain::{
    ConversationMode, FinishReason, Message, MessageBody, Round, RoundNumber, StreamEvent,
    StreamKey, StreamPayload,
};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors from the participant sequencer
#[derive(Error, Debug)]
pub enum SequencerError {
    #[error("Generation failed for participant {participant}: {reason}")]
    GenerationFailed { participant: usize, reason: String },

    #[error("Stream {0} is owned by another producer and never completed")]
    StreamStalled(String),

    #[error("Buffered payload for {0} stayed malformed")]
    MalformedBuffer(String),

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Use case for streaming a round's participants in priority order
pub struct StreamParticipantsUseCase<S: MessageStore, B: StreamBuffer, G: GenerationGateway> {
    messages: Arc<S>,
    buffer: Arc<B>,
    gateway: Arc<G>,
}

impl<S, B, G> StreamParticipantsUseCase<S, B, G>
where
    S: MessageStore,
    B: StreamBuffer,
    G: GenerationGateway,
{
    pub fn new(messages: Arc<S>, buffer: Arc<B>, gateway: Arc<G>) -> Self {
        Self {
            messages,
            buffer,
            gateway,
        }
    }

    pub async fn execute(
        &self,
        round: &mut Round,
        progress: &dyn RoundProgressNotifier,
        cancel: &CancellationToken,
    ) -> Result<(), SequencerError> {
        let thread = round.thread().clone();
        let number = round.number();
        let participants = round.snapshot().participants.clone();
        let mode = round.snapshot().mode;

        let mut transcript = self.messages.thread_messages(&thread).await?;
        let start = next_incomplete_index(&transcript, number, participants.len());
        if start > 0 {
            info!(thread = %thread, round = %number, start, "resuming participant sequence");
        }

        for participant in &participants[start..] {
            if cancel.is_cancelled() {
                return Err(SequencerError::Cancelled);
            }

            let index = participant.index;
            round.set_current_participant(Some(index));
            progress.on_participant_start(participant);

            let key = StreamKey::participant(thread.clone(), number, index);
            let payload = match self
                .produce(&key, participant, &transcript, number, mode, progress, cancel)
                .await
            {
                Ok(payload) => payload,
                Err(e) => {
                    progress.on_participant_complete(participant, false);
                    round.set_current_participant(None);
                    return Err(e);
                }
            };

            let message = Message::assistant(
                thread.clone(),
                number,
                index,
                payload.text,
                Some(payload.finish_reason),
            );
            self.messages.append(&thread, message.clone()).await?;
            transcript.push(message);
            progress.on_participant_complete(participant, true);
        }

        round.set_current_participant(None);
        Ok(())
    }

    /// Produce the terminal payload for one participant stream, whichever
    /// way it can be obtained: a fresh generation, the buffered result of
    /// an earlier attempt, or attaching to a producer already running.
    async fn produce(
        &self,
        key: &StreamKey,
        participant: &roundtable_domain::Participant,
        transcript: &[Message],
        number: RoundNumber,
        mode: ConversationMode,
        progress: &dyn RoundProgressNotifier,
        cancel: &CancellationToken,
    ) -> Result<StreamPayload, SequencerError> {
        // One retry after clearing a malformed buffered payload.
        for _ in 0..2 {
            match self.buffer.start(key).await {
                StartOutcome::Started => {
                    let context = build_context(transcript, number, mode);
                    return self
                        .generate_into_buffer(key, participant, &context, progress)
                        .await;
                }
                StartOutcome::Buffered { payload, .. } => match StreamPayload::parse(&payload) {
                    Ok(payload) => return Ok(payload),
                    Err(e) => {
                        warn!(key = %key, error = %e, "clearing malformed buffered payload");
                        self.buffer.fail(key).await;
                        continue;
                    }
                },
                StartOutcome::Conflict => {
                    let attach = AttachStreamUseCase::new(self.buffer.clone());
                    return attach
                        .attach(key, &RetryPolicy::resume_poll(), cancel)
                        .await
                        .map(|attached| attached.payload)
                        .map_err(|_| SequencerError::StreamStalled(key.to_string()));
                }
            }
        }
        Err(SequencerError::MalformedBuffer(key.to_string()))
    }

    async fn generate_into_buffer(
        &self,
        key: &StreamKey,
        participant: &roundtable_domain::Participant,
        context: &[PromptMessage],
        progress: &dyn RoundProgressNotifier,
    ) -> Result<StreamPayload, SequencerError> {
        let mut handle = match self.gateway.generate(&participant.model, context).await {
            Ok(handle) => handle,
            Err(e) => {
                self.buffer.fail(key).await;
                return Err(SequencerError::GenerationFailed {
                    participant: participant.index,
                    reason: e.to_string(),
                });
            }
        };

        let mut full = String::new();
        while let Some(event) = handle.receiver.recv().await {
            match event {
                StreamEvent::Delta(chunk) => {
                    self.buffer.append_chunk(key, &chunk).await;
                    progress.on_stream_chunk(&participant.id, &chunk);
                    full.push_str(&chunk);
                }
                StreamEvent::Completed(text) => {
                    if full.is_empty() {
                        full = text;
                    }
                    let payload = StreamPayload::new(full, FinishReason::Stop);
                    self.buffer.complete(key, &payload.to_json()).await;
                    return Ok(payload);
                }
                StreamEvent::Error(reason) => {
                    self.buffer.fail(key).await;
                    return Err(SequencerError::GenerationFailed {
                        participant: participant.index,
                        reason,
                    });
                }
            }
        }

        // Channel closed without a terminal event: transport dropped
        self.buffer.fail(key).await;
        Err(SequencerError::GenerationFailed {
            participant: participant.index,
            reason: "stream ended without completion".to_string(),
        })
    }
}

/// The next participant index without a completed deterministic message.
///
/// Resume after a reload starts here, never at `p0`.
pub fn next_incomplete_index(
    transcript: &[Message],
    round: RoundNumber,
    participant_count: usize,
) -> usize {
    for index in 0..participant_count {
        let complete = transcript.iter().any(|m| {
            m.round == round
                && m.id.is_deterministic()
                && m.participant_index() == Some(index)
                && m.finish_reason().is_some()
        });
        if !complete {
            return index;
        }
    }
    participant_count
}

/// Accumulate the generation context for the participant about to stream.
///
/// All prior-round messages, then the current round's user message,
/// pre-search results, and the completed assistant messages so far.
pub fn build_context(
    transcript: &[Message],
    round: RoundNumber,
    mode: ConversationMode,
) -> Vec<PromptMessage> {
    let mut context = vec![PromptMessage::system(system_prompt(mode))];

    for message in transcript {
        let current_round = message.round == round;
        match &message.body {
            MessageBody::User { content } => {
                context.push(PromptMessage::user(content.clone()));
            }
            MessageBody::Assistant {
                content,
                finish_reason,
                ..
            } => {
                // Only completed answers feed the next prompt
                if !current_round || finish_reason.is_some() {
                    context.push(PromptMessage::assistant(content.clone()));
                }
            }
            MessageBody::PreSearch { content, .. } => {
                context.push(PromptMessage::system(format!(
                    "Web search results for the current question:\n{}",
                    content
                )));
            }
            MessageBody::Moderator { content, .. } => {
                if !current_round {
                    context.push(PromptMessage::assistant(content.clone()));
                }
            }
        }
    }

    context
}

fn system_prompt(mode: ConversationMode) -> String {
    let base = "You are one of several AI participants answering the user in turn.";
    match mode {
        ConversationMode::Standard => base.to_string(),
        ConversationMode::Debate => format!(
            "{} Engage directly with the answers given before yours, noting where you agree or disagree.",
            base
        ),
    }
}
