//! End-to-end turn-controller tests with scripted collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use call_agent_agent::{CallEvent, ControllerDeps, TurnController};
use call_agent_config::{SilenceEscalation, TurnConfig};
use call_agent_core::{
    AudioFrame, CallOutcome, CallSession, Error, GenerateRequest, GenerateResponse, LanguageModel,
    Result, Speaker, SpeechToText, SttSink, SttStreamHandle, TenantConfig, TextToSpeech,
    SessionStore, ToolInvocation, TranscriptEvent, FRAME_BYTES, FRAME_SAMPLES,
};
use call_agent_persistence::{AsyncCallLogger, InMemorySessionStore, MemoryCallLogSink};
use call_agent_pipeline::SpeechBridge;
use call_agent_protocol::{Frame, OutboundQueue};
use call_agent_tools::{create_retail_registry, StubRetailBackend};

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

/// Emits one scripted final transcript per loud frame pushed into the sink.
struct ScriptedStt {
    script: Arc<Mutex<VecDeque<TranscriptEvent>>>,
}

impl ScriptedStt {
    fn new(utterances: &[&str]) -> Self {
        let script = utterances
            .iter()
            .map(|text| TranscriptEvent::final_result(*text, 0.92, 180))
            .collect();
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }
}

#[async_trait]
impl SpeechToText for ScriptedStt {
    async fn open_stream(&self, _session_id: Uuid, _language: &str) -> Result<SttStreamHandle> {
        let (tx, rx) = mpsc::channel(16);
        Ok(SttStreamHandle {
            sink: Box::new(ScriptedSink {
                script: Arc::clone(&self.script),
                tx,
            }),
            transcripts: rx,
        })
    }

    fn model_name(&self) -> &str {
        "scripted-stt"
    }
}

struct ScriptedSink {
    script: Arc<Mutex<VecDeque<TranscriptEvent>>>,
    tx: mpsc::Sender<TranscriptEvent>,
}

#[async_trait]
impl SttSink for ScriptedSink {
    async fn push(&mut self, frame: &AudioFrame) -> Result<()> {
        if !frame.is_likely_silence(-50.0) {
            let next = self.script.lock().pop_front();
            if let Some(event) = next {
                let _ = self.tx.send(event).await;
            }
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) {}
}

/// Pops one scripted result per generate call and records every request.
struct ScriptedLlm {
    script: Mutex<VecDeque<Result<GenerateResponse>>>,
    requests: Arc<Mutex<Vec<GenerateRequest>>>,
}

impl ScriptedLlm {
    fn new(script: Vec<Result<GenerateResponse>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn text(reply: &str) -> Result<GenerateResponse> {
        Ok(GenerateResponse {
            text: Some(reply.to_string()),
            tool_calls: Vec::new(),
        })
    }

    fn tool(name: &str, arguments: serde_json::Value) -> Result<GenerateResponse> {
        Ok(GenerateResponse {
            text: None,
            tool_calls: vec![ToolInvocation {
                name: name.to_string(),
                arguments,
            }],
        })
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        self.requests.lock().push(request);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Llm("script exhausted".into())))
    }

    fn model_name(&self) -> &str {
        "scripted-llm"
    }
}

/// Returns `frames_per_phrase` wire frames of audio and records every
/// synthesized line.
struct ScriptedTts {
    spoken: Arc<Mutex<Vec<String>>>,
    frames_per_phrase: usize,
}

#[async_trait]
impl TextToSpeech for ScriptedTts {
    async fn synthesize(&self, text: &str, _language: &str) -> Result<Vec<u8>> {
        self.spoken.lock().push(text.to_string());
        Ok(vec![0x11u8; FRAME_BYTES * self.frames_per_phrase])
    }

    fn model_name(&self) -> &str {
        "scripted-tts"
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    events_tx: mpsc::Sender<CallEvent>,
    outbound: Arc<OutboundQueue>,
    sink: Arc<MemoryCallLogSink>,
    store: Arc<InMemorySessionStore>,
    spoken: Arc<Mutex<Vec<String>>>,
    llm_requests: Arc<Mutex<Vec<GenerateRequest>>>,
    session_id: Uuid,
    worker: tokio::task::JoinHandle<()>,
    call: tokio::task::JoinHandle<CallOutcome>,
}

fn tenant() -> TenantConfig {
    TenantConfig {
        slug: "kolesoplus".into(),
        name: "КолесоПлюс".into(),
        extensions: vec!["101".into()],
        enabled_tools: Default::default(),
        greeting: "Вітаю! Ви зателефонували до КолесоПлюс.".into(),
        prompt_suffix: "Працюємо щодня з 9 до 20.".into(),
        operator_extension: Some("0".into()),
        language: "uk".into(),
        default_scenario: None,
    }
}

fn launch(
    utterances: &[&str],
    llm_script: Vec<Result<GenerateResponse>>,
    config: TurnConfig,
) -> Harness {
    let stt = Arc::new(ScriptedStt::new(utterances));
    let llm = Arc::new(ScriptedLlm::new(llm_script));
    let llm_requests = Arc::clone(&llm.requests);
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let tts = Arc::new(ScriptedTts {
        spoken: Arc::clone(&spoken),
        frames_per_phrase: 2,
    });
    let bridge = Arc::new(SpeechBridge::new(stt, llm, tts, 16));

    let tools = Arc::new(create_retail_registry(Arc::new(StubRetailBackend::new())));
    let sink = Arc::new(MemoryCallLogSink::new());
    let (logger, handle) =
        AsyncCallLogger::spawn(sink.clone(), 64, Duration::from_millis(1));
    let store = Arc::new(InMemorySessionStore::new());

    let session_id = Uuid::new_v4();
    let session = CallSession::new(session_id, "kolesoplus", "380501234567");
    let outbound = OutboundQueue::new(256);
    let (events_tx, events_rx) = mpsc::channel(64);

    let controller = TurnController::new(
        session,
        Arc::new(tenant()),
        config,
        Duration::from_secs(60),
        ControllerDeps {
            bridge,
            tools,
            logger,
            store: store.clone() as Arc<dyn call_agent_core::SessionStore>,
        },
        Arc::clone(&outbound),
    );
    let call = tokio::spawn(controller.run(events_rx));

    Harness {
        events_tx,
        outbound,
        sink,
        store,
        spoken,
        llm_requests,
        session_id,
        worker: handle.worker,
        call,
    }
}

fn loud_frame() -> AudioFrame {
    AudioFrame::new(vec![0.4; FRAME_SAMPLES], 0)
}

impl Harness {
    async fn send_speech(&self) {
        self.events_tx
            .send(CallEvent::Audio(loud_frame()))
            .await
            .unwrap();
    }

    async fn hangup(&self) {
        self.events_tx.send(CallEvent::Hangup).await.unwrap();
    }

    /// Await the call outcome and flush the log worker.
    async fn finish(self) -> (CallOutcome, Arc<MemoryCallLogSink>, Arc<InMemorySessionStore>) {
        let outcome = self.call.await.unwrap();
        // All logger clones live in the controller, which has completed
        self.worker.await.unwrap();
        (outcome, self.sink, self.store)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// The reference end-to-end flow: greeting, "Де мій заказ?", one tool call,
/// spoken answer, hangup. Exactly one turn and one tool call are logged and
/// the session closes exactly once.
#[tokio::test]
async fn order_status_call_end_to_end() {
    let harness = launch(
        &["Де мій заказ?"],
        vec![
            ScriptedLlm::tool("get_order_status", serde_json::json!({"order_id": "A-10234"})),
            ScriptedLlm::text("Ваше замовлення A-10234 вже в дорозі, доставка 10 серпня."),
        ],
        TurnConfig::default(),
    );

    // Let the greeting play, then the caller speaks
    tokio::time::sleep(Duration::from_millis(250)).await;
    harness.send_speech().await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    harness.hangup().await;

    let session_id = harness.session_id;
    let spoken = Arc::clone(&harness.spoken);
    let (outcome, sink, store) = harness.finish().await;

    assert_eq!(outcome, CallOutcome::Completed);

    // Exactly one turn, one tool call, one final record
    assert_eq!(sink.total_turns(), 1);
    assert_eq!(sink.total_tool_calls(), 1);
    assert_eq!(sink.total_finals(), 1);

    let bucket = call_agent_persistence::partition_bucket(chrono::Utc::now());
    let turns = sink.turns(&bucket);
    assert_eq!(turns[0].turn.number, 1);
    assert_eq!(turns[0].turn.speaker, Speaker::Caller);
    assert_eq!(turns[0].turn.content, "Де мій заказ?");
    assert!(turns[0].turn.response.as_deref().unwrap().contains("A-10234"));
    assert_eq!(turns[0].turn.tool_calls.len(), 1);
    assert!(turns[0].turn.tool_calls[0].success);

    let finals = sink.finals(&bucket);
    assert_eq!(finals[0].outcome, CallOutcome::Completed);
    assert_eq!(finals[0].tools_called, vec!["get_order_status".to_string()]);

    // Store entry deleted on normal close
    assert!(store.get(session_id).await.unwrap().is_none());

    // Greeting and answer both reached the caller
    let lines = spoken.lock();
    assert!(lines[0].contains("КолесоПлюс"));
    assert!(lines.iter().any(|l| l.contains("в дорозі")));
}

/// Caller audio during playback cancels synthesis and queued frames; the
/// interrupted utterance is processed next.
#[tokio::test]
async fn barge_in_stops_playback() {
    let mut config = TurnConfig::default();
    // Long greeting so the barge-in lands mid-playback
    config.outbound_queue_frames = 512;

    let stt = Arc::new(ScriptedStt::new(&["Не треба, де моє замовлення?"]));
    let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text(
        "Зараз перевірю ваше замовлення.",
    )]));
    let spoken = Arc::new(Mutex::new(Vec::new()));
    // 100 frames = 2 s of greeting playback
    let tts = Arc::new(ScriptedTts {
        spoken: Arc::clone(&spoken),
        frames_per_phrase: 100,
    });
    let bridge = Arc::new(SpeechBridge::new(stt, llm, tts, 16));
    let tools = Arc::new(create_retail_registry(Arc::new(StubRetailBackend::new())));
    let sink = Arc::new(MemoryCallLogSink::new());
    let (logger, handle) = AsyncCallLogger::spawn(sink.clone(), 64, Duration::from_millis(1));
    let store = Arc::new(InMemorySessionStore::new());
    let outbound = OutboundQueue::new(512);
    let (events_tx, events_rx) = mpsc::channel(64);

    let controller = TurnController::new(
        CallSession::new(Uuid::new_v4(), "kolesoplus", "380501234567"),
        Arc::new(tenant()),
        config,
        Duration::from_secs(60),
        ControllerDeps {
            bridge,
            tools,
            logger,
            store: store as Arc<dyn call_agent_core::SessionStore>,
        },
        Arc::clone(&outbound),
    );
    let call = tokio::spawn(controller.run(events_rx));

    // Interrupt 200 ms into the 2 s greeting
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(outbound.len() > 3, "greeting should be mid-playback");
    events_tx.send(CallEvent::Audio(loud_frame())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Queued greeting audio was discarded; at most a frame or two follow
    // the cancellation signal
    assert!(
        outbound.len() <= 3,
        "queued playback not cancelled: {} frames",
        outbound.len()
    );

    // The interrupted utterance got a response (we are LISTENING again)
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(spoken.lock().iter().any(|l| l.contains("перевірю")));

    events_tx.send(CallEvent::Hangup).await.unwrap();
    let outcome = call.await.unwrap();
    handle.worker.await.unwrap();
    assert_eq!(outcome, CallOutcome::Completed);
}

/// No transcript activity injects exactly one reprompt turn; a second
/// consecutive timeout escalates instead of looping.
#[tokio::test(start_paused = true)]
async fn silence_reprompts_once_then_escalates() {
    let harness = launch(&[], vec![], TurnConfig::default());

    let spoken = Arc::clone(&harness.spoken);
    let (outcome, sink, _store) = harness.finish().await;

    // Default escalation hands the call to an operator
    assert_eq!(outcome, CallOutcome::Transferred);

    // Exactly one reprompt turn, agent-opened
    let bucket = call_agent_persistence::partition_bucket(chrono::Utc::now());
    let turns = sink.turns(&bucket);
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].turn.speaker, Speaker::Agent);
    assert!(turns[0].turn.response.is_none());

    // Greeting, one reprompt, one transfer announcement; no reprompt loop
    let lines = spoken.lock();
    let reprompts = lines
        .iter()
        .filter(|l| l.contains("Ви ще на лінії"))
        .count();
    assert_eq!(reprompts, 1);
    assert!(lines.iter().any(|l| l.contains("оператором")));
}

/// Silence escalation can be configured to end the call instead.
#[tokio::test(start_paused = true)]
async fn silence_escalation_hangs_up_when_configured() {
    let mut config = TurnConfig::default();
    config.silence_escalation = SilenceEscalation::HangUp;

    let harness = launch(&[], vec![], config);
    let (outcome, sink, _store) = harness.finish().await;

    assert_eq!(outcome, CallOutcome::SilenceTimeout);
    let bucket = call_agent_persistence::partition_bucket(chrono::Utc::now());
    assert_eq!(sink.finals(&bucket)[0].outcome, CallOutcome::SilenceTimeout);
}

/// A model that fails (after the bridge's retry) produces the scripted
/// fallback line; the call continues instead of dying.
#[tokio::test]
async fn llm_failure_falls_back_to_scripted_line() {
    let harness = launch(
        &["Де мій заказ?"],
        vec![
            Err(Error::Llm("service down".into())),
            Err(Error::Llm("service down".into())),
        ],
        TurnConfig::default(),
    );

    tokio::time::sleep(Duration::from_millis(250)).await;
    harness.send_speech().await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    harness.hangup().await;

    let spoken = Arc::clone(&harness.spoken);
    let (outcome, sink, _store) = harness.finish().await;

    // The call survived the failure and was completed by the caller
    assert_eq!(outcome, CallOutcome::Completed);
    assert_eq!(sink.total_turns(), 1);
    assert!(spoken.lock().iter().any(|l| l.contains("не розчула")));
}

/// Invoking a tool outside the active scenario pulls its module into the
/// live prompt for every subsequent model call.
#[tokio::test]
async fn scenario_drift_expands_prompt_for_rest_of_call() {
    let harness = launch(
        &["Де мій заказ?", "А підберіть ще шини 205 55 16"],
        vec![
            // First exchange: order-status scenario, but the model reaches
            // for the tire-search tool
            ScriptedLlm::tool(
                "search_tires",
                serde_json::json!({"width": 205, "profile": 55, "diameter": 16}),
            ),
            ScriptedLlm::text("Можу запропонувати Nokian або Michelin."),
            // Second exchange
            ScriptedLlm::text("Nokian Hakkapeliitta R5, 4600 гривень за шину."),
        ],
        TurnConfig::default(),
    );

    tokio::time::sleep(Duration::from_millis(250)).await;
    harness.send_speech().await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    harness.send_speech().await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    harness.hangup().await;

    let requests = Arc::clone(&harness.llm_requests);
    let (outcome, sink, _store) = harness.finish().await;
    assert_eq!(outcome, CallOutcome::Completed);
    assert_eq!(sink.total_turns(), 2);

    let requests = requests.lock();
    assert_eq!(requests.len(), 3);
    // Scenario base prompt: orders only
    assert!(requests[0].system.contains("## Orders"));
    assert!(!requests[0].system.contains("## Tire search"));
    // After search_tires, the module joins the prompt and persists
    assert!(requests[1].system.contains("## Tire search"));
    assert!(requests[2].system.contains("## Tire search"));
}

/// The transfer tool is terminal: announcement, Transferred outcome, one
/// logged turn carrying the tool call.
#[tokio::test]
async fn operator_transfer_is_terminal() {
    let harness = launch(
        &["Дайте людину, у мене скарга!"],
        vec![ScriptedLlm::tool(
            "transfer_to_operator",
            serde_json::json!({"reason": "complaint"}),
        )],
        TurnConfig::default(),
    );

    tokio::time::sleep(Duration::from_millis(250)).await;
    harness.send_speech().await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let spoken = Arc::clone(&harness.spoken);
    let (outcome, sink, _store) = harness.finish().await;

    assert_eq!(outcome, CallOutcome::Transferred);
    assert_eq!(sink.total_turns(), 1);
    assert_eq!(sink.total_tool_calls(), 1);
    assert!(spoken.lock().iter().any(|l| l.contains("з'єдную")));

    let bucket = call_agent_persistence::partition_bucket(chrono::Utc::now());
    assert_eq!(sink.finals(&bucket)[0].outcome, CallOutcome::Transferred);
}

/// Any frame sequence ending in a hangup closes the session exactly once,
/// releases the queue, and emits the wire hangup.
#[tokio::test]
async fn hangup_mid_greeting_closes_exactly_once() {
    let harness = launch(&[], vec![], TurnConfig::default());

    // Interleave some audio with an early hangup
    for _ in 0..5 {
        harness
            .events_tx
            .send(CallEvent::Audio(AudioFrame::new(
                vec![0.0; FRAME_SAMPLES],
                0,
            )))
            .await
            .unwrap();
    }
    harness.hangup().await;

    let outbound = Arc::clone(&harness.outbound);
    let session_id = harness.session_id;
    let store = Arc::clone(&harness.store);

    let (outcome, sink, _) = harness.finish().await;
    assert_eq!(outcome, CallOutcome::CallerHangup);

    // Exactly one terminal record; queue closed with a wire hangup emitted
    assert_eq!(sink.total_finals(), 1);
    assert!(outbound.is_closed());
    let mut saw_hangup = false;
    while let Some(frame) = outbound.pop().await {
        if frame == Frame::Hangup {
            saw_hangup = true;
        }
    }
    assert!(saw_hangup);
    assert!(store.get(session_id).await.unwrap().is_none());
}
