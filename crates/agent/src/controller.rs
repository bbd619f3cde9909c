//! Turn controller
//!
//! The state machine for one call:
//!
//! ```text
//! IDLE ─ greeting ─▶ SPEAKING ─▶ LISTENING ─▶ THINKING ─▶ SPEAKING ─▶ ...
//!                        ▲   barge-in / silence / hangup loop back │
//!                        └──────────────────────────────────────────┘
//! ```
//!
//! Each phase is a nested `select!` loop that keeps draining connection
//! events while awaiting collaborator results, so a hangup cancels in-flight
//! work by dropping its future, and caller audio is never blocked behind an
//! LLM or TTS call.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use call_agent_config::{SilenceEscalation, TurnConfig};
use call_agent_core::{
    pcm16_to_wire_frames, CallFinalRecord, CallOutcome, CallSession, CallState, Message, Result,
    SessionStore, Speaker, StageLatency, SttSink, TenantConfig, ToolCallLogRecord, ToolCallRecord,
    ToolInvocation, TranscriptEvent, Turn, TurnRecord, FRAME_DURATION_MS, GenerateRequest,
};
use call_agent_llm::{ContextAssembler, Scenario};
use call_agent_persistence::AsyncCallLogger;
use call_agent_pipeline::SpeechBridge;
use call_agent_protocol::{Frame, OutboundQueue};
use call_agent_tools::ToolRegistry;

use crate::events::CallEvent;

/// Shared collaborators handed to every controller.
#[derive(Clone)]
pub struct ControllerDeps {
    pub bridge: Arc<SpeechBridge>,
    pub tools: Arc<ToolRegistry>,
    pub logger: AsyncCallLogger,
    pub store: Arc<dyn SessionStore>,
}

enum ListenOutcome {
    Utterance(TranscriptEvent),
    Silence,
    Hangup,
    SttClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpeakOutcome {
    Completed,
    BargedIn,
    Hangup,
}

struct SpeakResult {
    outcome: SpeakOutcome,
    tts_ms: u64,
}

/// The caller-turn under construction during a thinking phase.
struct TurnDraft {
    response: String,
    tool_calls: Vec<ToolCallRecord>,
    llm_ms: u64,
}

enum ThinkOutcome {
    Respond(TurnDraft),
    Transfer(TurnDraft),
    Fallback(TurnDraft),
    Hangup,
    Fatal,
}

/// Drives one call session from greeting to closed.
pub struct TurnController {
    session: CallSession,
    tenant: Arc<TenantConfig>,
    config: TurnConfig,
    session_ttl: Duration,
    deps: ControllerDeps,
    outbound: Arc<OutboundQueue>,
    assembler: Option<ContextAssembler>,
    stt_sink: Option<Box<dyn SttSink>>,
    stt_rx: Option<mpsc::Receiver<TranscriptEvent>>,
    store_degraded: bool,
    external_failures: u8,
    torn_down: bool,
}

impl TurnController {
    pub fn new(
        session: CallSession,
        tenant: Arc<TenantConfig>,
        config: TurnConfig,
        session_ttl: Duration,
        deps: ControllerDeps,
        outbound: Arc<OutboundQueue>,
    ) -> Self {
        Self {
            session,
            tenant,
            config,
            session_ttl,
            deps,
            outbound,
            assembler: None,
            stt_sink: None,
            stt_rx: None,
            store_degraded: false,
            external_failures: 0,
            torn_down: false,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    /// Run the call to completion. Consumes the controller; teardown runs
    /// exactly once on every exit path.
    pub async fn run(mut self, mut events: mpsc::Receiver<CallEvent>) -> CallOutcome {
        let outcome = self.drive(&mut events).await;
        self.teardown(outcome).await;
        outcome
    }

    async fn drive(&mut self, events: &mut mpsc::Receiver<CallEvent>) -> CallOutcome {
        match self
            .deps
            .bridge
            .open_stt(self.session.id, &self.tenant.language)
            .await
        {
            Ok(handle) => {
                self.stt_sink = Some(handle.sink);
                self.stt_rx = Some(handle.transcripts);
            }
            Err(e) => {
                tracing::error!(session_id = %self.session.id, error = %e, "cannot open stt stream");
                return self.fail(events).await;
            }
        }

        if let Err(e) = self.session.transition(CallState::Active) {
            tracing::error!(session_id = %self.session.id, error = %e, "activation failed");
            return CallOutcome::Failed;
        }
        self.persist().await;

        let greeting = self.tenant.greeting.clone();
        match self.speak(events, &greeting, true).await {
            Ok(result) if result.outcome == SpeakOutcome::Hangup => {
                return CallOutcome::CallerHangup;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(session_id = %self.session.id, error = %e, "greeting failed");
                return self.fail(events).await;
            }
        }

        let mut silence_strikes: u8 = 0;
        loop {
            match self.listen(events).await {
                ListenOutcome::Utterance(transcript) => {
                    silence_strikes = 0;
                    tracing::debug!(
                        session_id = %self.session.id,
                        confidence = transcript.confidence,
                        "final transcript: {}",
                        transcript.text
                    );
                    match self.think(events, &transcript).await {
                        ThinkOutcome::Respond(draft) | ThinkOutcome::Fallback(draft) => {
                            let response = draft.response.clone();
                            match self.speak(events, &response, true).await {
                                Ok(result) => {
                                    let hangup = result.outcome == SpeakOutcome::Hangup;
                                    self.log_exchange(&transcript, draft, result.tts_ms).await;
                                    if hangup {
                                        return CallOutcome::Completed;
                                    }
                                }
                                Err(e) => {
                                    tracing::error!(session_id = %self.session.id, error = %e, "response playback failed");
                                    self.log_exchange(&transcript, draft, 0).await;
                                    return self.fail(events).await;
                                }
                            }
                        }
                        ThinkOutcome::Transfer(draft) => {
                            let line = self.config.transfer_text.clone();
                            let tts_ms = match self.speak(events, &line, false).await {
                                Ok(result) => result.tts_ms,
                                Err(_) => 0,
                            };
                            self.log_exchange(&transcript, draft, tts_ms).await;
                            return CallOutcome::Transferred;
                        }
                        ThinkOutcome::Hangup => return CallOutcome::CallerHangup,
                        ThinkOutcome::Fatal => return self.fail(events).await,
                    }
                }
                ListenOutcome::Silence => {
                    silence_strikes += 1;
                    if silence_strikes == 1 {
                        // Exactly one reprompt turn, outside the scenario flow
                        self.log_reprompt().await;
                        let line = self.config.reprompt_text.clone();
                        match self.speak(events, &line, true).await {
                            Ok(result) if result.outcome == SpeakOutcome::Hangup => {
                                return CallOutcome::CallerHangup;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::error!(session_id = %self.session.id, error = %e, "reprompt failed");
                                return self.fail(events).await;
                            }
                        }
                    } else {
                        // Second consecutive timeout escalates, never loops
                        return self.escalate_silence(events).await;
                    }
                }
                ListenOutcome::Hangup => {
                    return if self.session.turn_count() > 0 {
                        CallOutcome::Completed
                    } else {
                        CallOutcome::CallerHangup
                    };
                }
                ListenOutcome::SttClosed => {
                    tracing::warn!(session_id = %self.session.id, "stt stream closed mid-call, reopening");
                    match self
                        .deps
                        .bridge
                        .open_stt(self.session.id, &self.tenant.language)
                        .await
                    {
                        Ok(handle) => {
                            self.stt_sink = Some(handle.sink);
                            self.stt_rx = Some(handle.transcripts);
                        }
                        Err(e) => {
                            tracing::error!(session_id = %self.session.id, error = %e, "stt reopen failed");
                            return self.fail(events).await;
                        }
                    }
                }
            }
        }
    }

    /// LISTENING: feed caller audio into STT until a final transcript, a
    /// silence timeout, or a hangup.
    async fn listen(&mut self, events: &mut mpsc::Receiver<CallEvent>) -> ListenOutcome {
        let timeout = Duration::from_millis(self.config.silence_timeout_ms);
        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        let Self {
            stt_sink,
            stt_rx,
            session,
            ..
        } = self;
        let (Some(sink), Some(rx)) = (stt_sink.as_mut(), stt_rx.as_mut()) else {
            return ListenOutcome::SttClosed;
        };

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(CallEvent::Audio(frame)) => {
                        session.touch();
                        let _ = sink.push(&frame).await;
                    }
                    Some(CallEvent::Hangup) | None => return ListenOutcome::Hangup,
                },
                transcript = rx.recv() => match transcript {
                    Some(event) if event.is_final => return ListenOutcome::Utterance(event),
                    Some(_partial) => {
                        // Transcript activity defers the silence reprompt
                        sleep.as_mut().reset(tokio::time::Instant::now() + timeout);
                    }
                    None => return ListenOutcome::SttClosed,
                },
                () = &mut sleep => return ListenOutcome::Silence,
            }
        }
    }

    /// THINKING: call the model, dispatch tool rounds sequentially, end in a
    /// spoken response, a transfer, or a scripted fallback.
    async fn think(
        &mut self,
        events: &mut mpsc::Receiver<CallEvent>,
        utterance: &TranscriptEvent,
    ) -> ThinkOutcome {
        if self.assembler.is_none() {
            let mut scenario = Scenario::infer(&utterance.text);
            if scenario == Scenario::Full {
                if let Some(parsed) = self
                    .tenant
                    .default_scenario
                    .as_deref()
                    .and_then(Scenario::parse)
                {
                    scenario = parsed;
                }
            }
            tracing::info!(
                session_id = %self.session.id,
                scenario = scenario.as_str(),
                "scenario selected"
            );
            self.assembler = Some(ContextAssembler::new(scenario, &self.tenant, None));
        }

        self.session
            .history
            .push(Message::user(utterance.text.as_str()));

        let mut tool_records: Vec<ToolCallRecord> = Vec::new();
        let mut llm_ms = 0u64;

        for _round in 0..self.config.max_tool_rounds {
            let request = GenerateRequest {
                system: self
                    .assembler
                    .as_ref()
                    .map(ContextAssembler::render)
                    .unwrap_or_default(),
                messages: self.session.history.clone(),
                tools: self.deps.tools.definitions_for(&self.tenant.enabled_tools),
            };

            let started = Instant::now();
            let result = {
                let Self {
                    deps, stt_sink, ..
                } = &mut *self;
                let generate = deps.bridge.generate(request);
                tokio::pin!(generate);
                loop {
                    tokio::select! {
                        result = &mut generate => break Some(result),
                        event = events.recv() => match event {
                            Some(CallEvent::Audio(frame)) => {
                                // The caller may keep talking while we think;
                                // keep STT fed so nothing is lost
                                if let Some(sink) = stt_sink.as_mut() {
                                    let _ = sink.push(&frame).await;
                                }
                            }
                            // Dropping the pinned future cancels the call;
                            // a late result has nowhere to land
                            Some(CallEvent::Hangup) | None => break None,
                        }
                    }
                }
            };
            llm_ms += started.elapsed().as_millis() as u64;

            let Some(result) = result else {
                return ThinkOutcome::Hangup;
            };

            let response = match result {
                Ok(response) => {
                    self.external_failures = 0;
                    response
                }
                Err(e) => {
                    // The bridge already retried once
                    tracing::warn!(session_id = %self.session.id, error = %e, "model failed, using scripted fallback");
                    self.external_failures += 1;
                    if self.external_failures >= 2 {
                        return ThinkOutcome::Fatal;
                    }
                    return ThinkOutcome::Fallback(TurnDraft {
                        response: self.config.fallback_text.clone(),
                        tool_calls: tool_records,
                        llm_ms,
                    });
                }
            };

            if response.tool_calls.is_empty() {
                let text = response
                    .text
                    .unwrap_or_else(|| self.config.fallback_text.clone());
                self.session.history.push(Message::assistant(text.as_str()));
                return ThinkOutcome::Respond(TurnDraft {
                    response: text,
                    tool_calls: tool_records,
                    llm_ms,
                });
            }

            // Sequential dispatch: results land in the model context in
            // invocation order
            for invocation in &response.tool_calls {
                let (record, transfer) = self.invoke_tool(invocation).await;
                tool_records.push(record);
                if transfer {
                    return ThinkOutcome::Transfer(TurnDraft {
                        response: self.config.transfer_text.clone(),
                        tool_calls: tool_records,
                        llm_ms,
                    });
                }
            }
        }

        tracing::warn!(
            session_id = %self.session.id,
            rounds = self.config.max_tool_rounds,
            "tool rounds exhausted without a response"
        );
        ThinkOutcome::Fallback(TurnDraft {
            response: self.config.fallback_text.clone(),
            tool_calls: tool_records,
            llm_ms,
        })
    }

    /// Execute one tool invocation: retry once on failure, record and log it
    /// with timing regardless of the eventual pipeline outcome, and expand
    /// the live prompt.
    async fn invoke_tool(&mut self, invocation: &ToolInvocation) -> (ToolCallRecord, bool) {
        let name = invocation.name.clone();
        let arguments = invocation.arguments.clone();
        let started = Instant::now();

        let result = if !self.tenant.allows_tool(&name) {
            Err(call_agent_core::ToolError::Execution(format!(
                "tool {name} is not enabled for this tenant"
            )))
        } else {
            match self.deps.tools.execute(&name, arguments.clone()).await {
                Ok(output) => Ok(output),
                Err(first) => {
                    tracing::warn!(session_id = %self.session.id, tool = %name, error = %first, "tool failed, retrying once");
                    self.deps.tools.execute(&name, arguments.clone()).await
                }
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("call_agent_tool_duration_ms").record(duration_ms as f64);

        let (record, transfer) = match result {
            Ok(output) => {
                self.session.note_tool(&name);
                if let Some(assembler) = self.assembler.as_mut() {
                    assembler.note_tool(&name);
                }
                self.session.history.push(Message::assistant(
                    format!("[tool_call] {name} {arguments}").as_str(),
                ));
                self.session.history.push(Message::tool(output.text.as_str()));
                (
                    ToolCallRecord {
                        name: name.clone(),
                        arguments,
                        result: output.text,
                        duration_ms,
                        success: true,
                    },
                    output.transfer,
                )
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session.id, tool = %name, error = %e, "tool failed twice");
                self.session
                    .history
                    .push(Message::tool(format!("tool {name} failed: {e}").as_str()));
                (
                    ToolCallRecord {
                        name: name.clone(),
                        arguments,
                        result: e.to_string(),
                        duration_ms,
                        success: false,
                    },
                    false,
                )
            }
        };

        self.deps.logger.append_tool_call(ToolCallLogRecord {
            session_id: self.session.id,
            tenant: self.session.tenant.clone(),
            turn_number: self.session.turn_count() + 1,
            call: record.clone(),
            timestamp: Utc::now(),
        });

        (record, transfer)
    }

    /// SPEAKING: synthesize and pace frames onto the wire at the 20 ms
    /// cadence. The cancel check sits between frame writes, so at most one
    /// frame follows a barge-in signal.
    async fn speak(
        &mut self,
        events: &mut mpsc::Receiver<CallEvent>,
        text: &str,
        allow_barge_in: bool,
    ) -> Result<SpeakResult> {
        let started = Instant::now();
        let audio = self
            .deps
            .bridge
            .synthesize(text, &self.tenant.language)
            .await?;
        let tts_ms = started.elapsed().as_millis() as u64;

        let frames = pcm16_to_wire_frames(&audio);
        tracing::debug!(
            session_id = %self.session.id,
            frames = frames.len(),
            "speaking: {text}"
        );

        let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_DURATION_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let barge_in_energy = self.config.barge_in_energy_db;
        let Self {
            outbound, stt_sink, ..
        } = self;
        let mut pending = frames.into_iter();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match pending.next() {
                        Some(payload) => outbound.push(Frame::Audio { payload }),
                        None => return Ok(SpeakResult { outcome: SpeakOutcome::Completed, tts_ms }),
                    }
                }
                event = events.recv() => match event {
                    Some(CallEvent::Audio(frame)) => {
                        if allow_barge_in && !frame.is_likely_silence(barge_in_energy) {
                            let discarded = outbound.clear();
                            metrics::counter!("call_agent_barge_ins_total").increment(1);
                            tracing::debug!(discarded, "barge-in, playback cancelled");
                            // The interrupting audio opens the next utterance
                            if let Some(sink) = stt_sink.as_mut() {
                                let _ = sink.push(&frame).await;
                            }
                            return Ok(SpeakResult { outcome: SpeakOutcome::BargedIn, tts_ms });
                        }
                    }
                    Some(CallEvent::Hangup) | None => {
                        return Ok(SpeakResult { outcome: SpeakOutcome::Hangup, tts_ms });
                    }
                },
            }
        }
    }

    async fn escalate_silence(&mut self, events: &mut mpsc::Receiver<CallEvent>) -> CallOutcome {
        match self.config.silence_escalation {
            SilenceEscalation::Transfer => {
                tracing::info!(session_id = %self.session.id, "silence escalation: transferring to operator");
                let line = self.config.transfer_text.clone();
                let _ = self.speak(events, &line, false).await;
                CallOutcome::Transferred
            }
            SilenceEscalation::HangUp => {
                tracing::info!(session_id = %self.session.id, "silence escalation: ending call");
                let line = self.config.goodbye_text.clone();
                let _ = self.speak(events, &line, false).await;
                CallOutcome::SilenceTimeout
            }
        }
    }

    /// Unrecoverable failure: apologize if audio still works, then hang up.
    /// The caller is never left in silence without an end-of-call action.
    async fn fail(&mut self, events: &mut mpsc::Receiver<CallEvent>) -> CallOutcome {
        let line = self.config.apology_text.clone();
        if let Err(e) = self.speak(events, &line, false).await {
            tracing::error!(session_id = %self.session.id, error = %e, "apology playback failed");
        }
        CallOutcome::Failed
    }

    /// Log one caller-opened exchange and refresh the session snapshot.
    async fn log_exchange(&mut self, utterance: &TranscriptEvent, draft: TurnDraft, tts_ms: u64) {
        let latency = StageLatency {
            stt_ms: utterance.latency_ms,
            llm_ms: draft.llm_ms,
            tts_ms,
        };
        metrics::histogram!("call_agent_stt_latency_ms").record(latency.stt_ms as f64);
        metrics::histogram!("call_agent_llm_latency_ms").record(latency.llm_ms as f64);
        metrics::histogram!("call_agent_turn_latency_ms").record(latency.total_ms() as f64);

        let turn = Turn {
            number: self.session.next_turn_number(),
            speaker: Speaker::Caller,
            content: utterance.text.clone(),
            response: Some(draft.response),
            latency,
            tool_calls: draft.tool_calls,
            timestamp: Utc::now(),
        };
        self.deps.logger.append_turn(TurnRecord {
            session_id: self.session.id,
            tenant: self.session.tenant.clone(),
            turn,
        });
        self.session.touch();
        self.persist().await;
    }

    /// Log the agent-opened reprompt turn.
    async fn log_reprompt(&mut self) {
        let turn = Turn {
            number: self.session.next_turn_number(),
            speaker: Speaker::Agent,
            content: self.config.reprompt_text.clone(),
            response: None,
            latency: StageLatency::default(),
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
        };
        self.deps.logger.append_turn(TurnRecord {
            session_id: self.session.id,
            tenant: self.session.tenant.clone(),
            turn,
        });
        self.persist().await;
    }

    /// Upsert the session snapshot; a store failure degrades the session to
    /// in-memory for the rest of the call.
    async fn persist(&mut self) {
        let snapshot = self.session.snapshot();
        if let Err(e) = self.deps.store.upsert(&snapshot, self.session_ttl).await {
            if !self.store_degraded {
                self.store_degraded = true;
                tracing::warn!(
                    session_id = %self.session.id,
                    error = %e,
                    "session store unavailable, continuing in-memory"
                );
            }
        }
    }

    /// The single idempotent teardown routine every exit path converges on.
    async fn teardown(&mut self, outcome: CallOutcome) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if self.session.state() != CallState::Closed {
            if self.session.state() != CallState::Closing {
                let _ = self.session.transition(CallState::Closing);
            }
            let _ = self.session.transition(CallState::Closed);
        }

        // Explicit end-of-call on the wire, then release the queue
        self.outbound.push(Frame::Hangup);
        self.outbound.close();

        // Cancel the STT stream; a late transcript has no receiver
        if let Some(mut sink) = self.stt_sink.take() {
            sink.close().await;
        }
        self.stt_rx.take();

        if let Err(e) = self.deps.store.delete(self.session.id).await {
            tracing::warn!(session_id = %self.session.id, error = %e, "store delete failed");
        }

        self.deps.logger.finalize_call(CallFinalRecord {
            session_id: self.session.id,
            tenant: self.session.tenant.clone(),
            caller_id: self.session.caller_id.clone(),
            outcome,
            turn_count: self.session.turn_count(),
            tools_called: self.session.tools_called().iter().cloned().collect(),
            started_at: self.session.started_at,
            ended_at: Utc::now(),
        });

        tracing::info!(
            session_id = %self.session.id,
            tenant = %self.session.tenant,
            outcome = %outcome,
            turns = self.session.turn_count(),
            "call closed"
        );
    }
}
