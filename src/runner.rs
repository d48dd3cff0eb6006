//! `MonitorApp`: wires ingestion, the planner loop, the policy engine, the
//! store, and the decision bus into the operations named on the external
//! interface. Grounded in `runtime/bootstrap.py: process_event` for the
//! per-event pipeline shape and `app/main.py`'s route handlers for the
//! control/read surface (the HTTP layer itself is an out-of-scope
//! collaborator; this module is what it would call into).

use std::sync::Arc;

use chrono::{Local, Utc};
use serde_json::json;

use crate::analyzers::ocr::OcrOutcome;
use crate::analyzers::{headlines, ocr, url};
use crate::capabilities::judge::JudgeBackend;
use crate::capabilities::ocr::OcrBackend;
use crate::error::IngestError;
use crate::graph::NextTool;
use crate::guardian::{GuardianGuidance, GuardianHandle};
use crate::models::{ChildProfile, Decision, DecisionMessage, Event, EventInput, HeadlineAgentSummary};
use crate::planner::{self, MonitorState, PlannerAdvisor};
use crate::policy::{PolicyEngine, PolicyInput};
use crate::scorer;
use crate::store::SqliteStore;
use crate::types::{Action, Strictness};
use crate::bus::DecisionBus;

/// 10 years, the "effectively indefinite" pause horizon used when `pause` is
/// called with no (or a non-positive) minute count.
const INDEFINITE_PAUSE_MINUTES: i64 = 10 * 365 * 24 * 60;

const SETTING_PAUSED_UNTIL: &str = "paused_until";
const SETTING_GUARDIAN_FEEDBACK: &str = "guardian_feedback";

pub struct MonitorApp {
    store: SqliteStore,
    policy: PolicyEngine,
    advisor: Arc<dyn PlannerAdvisor>,
    judge: Arc<dyn JudgeBackend>,
    ocr_backend: Arc<dyn OcrBackend>,
    bus: Arc<DecisionBus>,
    guardian: Option<Arc<dyn GuardianHandle>>,
    ocr_confidence_threshold: f64,
    parent_pin: String,
}

impl MonitorApp {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: SqliteStore,
        policy: PolicyEngine,
        advisor: Arc<dyn PlannerAdvisor>,
        judge: Arc<dyn JudgeBackend>,
        ocr_backend: Arc<dyn OcrBackend>,
        bus: Arc<DecisionBus>,
        guardian: Option<Arc<dyn GuardianHandle>>,
        ocr_confidence_threshold: f64,
        parent_pin: String,
    ) -> Self {
        MonitorApp {
            store,
            policy,
            advisor,
            judge,
            ocr_backend,
            bus,
            guardian,
            ocr_confidence_threshold,
            parent_pin,
        }
    }

    pub fn subscribe_decisions(&self) -> flume::Receiver<DecisionMessage> {
        self.bus.subscribe()
    }

    /// Ingest a brand-new event and run it through the full pipeline.
    #[tracing::instrument(skip(self, input), fields(child_id = %input.child_id), err)]
    pub async fn ingest(&self, input: EventInput) -> Result<DecisionMessage, IngestError> {
        if input.child_id.trim().is_empty() {
            return Err(IngestError::MissingChildId);
        }
        if input.kind.trim().is_empty() {
            return Err(IngestError::MissingKind);
        }
        let data_json: serde_json::Value = serde_json::from_str(&input.data_json)?;

        let event = self
            .store
            .insert_event(
                &input.child_id,
                input.ts,
                &input.kind,
                input.url.as_deref(),
                input.title.as_deref(),
                input.tab_id.as_deref(),
                input.referrer.as_deref(),
                &data_json,
            )
            .await?;

        self.run_pipeline(event, false).await
    }

    /// Resubmit an existing event with a replaced `data_json` (the path that
    /// supplies screenshots for OCR). Forces the planner through OCR first.
    #[tracing::instrument(skip(self, data_json), fields(event_id = %event_id), err)]
    pub async fn ingest_upgrade(&self, event_id: &str, data_json: String) -> Result<DecisionMessage, IngestError> {
        let data_json: serde_json::Value = serde_json::from_str(&data_json)?;
        let event = self
            .store
            .upgrade_event(event_id, &data_json)
            .await
            .map_err(|err| match err {
                crate::store::StoreError::EventNotFound(id) => IngestError::UnknownEvent(id),
                other => IngestError::Store(other),
            })?;

        self.run_pipeline(event, true).await
    }

    async fn run_pipeline(&self, event: Event, is_upgrade: bool) -> Result<DecisionMessage, IngestError> {
        let profile = self.load_profile(&event.child_id).await?;
        let guidance = self.load_guidance().await?;
        let mut state = MonitorState::new(event, profile, is_upgrade);

        loop {
            let outcome = planner::step(self.advisor.as_ref(), &mut state).await;
            match outcome.next_tool {
                NextTool::Headline => self.run_headline(&mut state).await?,
                NextTool::UrlLlm => self.run_url(&mut state, guidance.clone()).await?,
                NextTool::Ocr => self.run_ocr(&mut state, guidance.clone()).await?,
                NextTool::Policy | NextTool::Stop => break,
            }
        }

        self.finalize(state, is_upgrade).await
    }

    async fn load_profile(&self, child_id: &str) -> Result<ChildProfile, IngestError> {
        self.store.ensure_child_profile(child_id).await?;
        self.store
            .get_child(child_id)
            .await?
            .ok_or_else(|| IngestError::UnknownEvent(child_id.to_string()))
    }

    async fn load_guidance(&self) -> Result<Option<String>, IngestError> {
        let Some(raw) = self.store.get_setting(SETTING_GUARDIAN_FEEDBACK).await? else {
            return Ok(None);
        };
        let guidance: GuardianGuidance = match serde_json::from_str(&raw) {
            Ok(g) => g,
            Err(_) => return Ok(None),
        };
        if guidance.guidance.is_empty() {
            Ok(None)
        } else {
            Ok(Some(guidance.guidance))
        }
    }

    async fn run_headline(&self, state: &mut MonitorState) -> Result<(), IngestError> {
        if state.headline_result.is_some() {
            return Ok(());
        }
        let result = headlines::analyze(&state.event, &state.profile);
        let action = result.action.clone();
        let scores_json = json!({
            "risk": result.risk.as_str(),
            "flags": &result.flags,
            "fast_scores": result.fast_scores,
        });
        state.fast_scores = Some(result.fast_scores);
        state.headline_result = Some(result);

        self.store
            .insert_analysis(&state.event.id, "headlines", "1.0", &scores_json, Some(&action), 0)
            .await?;
        Ok(())
    }

    async fn run_url(&self, state: &mut MonitorState, guidance: Option<String>) -> Result<(), IngestError> {
        let shortcircuit = state
            .headline_result
            .as_ref()
            .map(|h| h.is_confident_shortcircuit())
            .unwrap_or(false);

        if shortcircuit {
            if state.judge_output.is_none() {
                let headline = state.headline_result.as_ref().expect("checked above");
                let synthesized = url::synthesize_from_headline(headline);
                state.confidence = synthesized.confidence;
                state.judge_output = Some(synthesized);
            }
            return Ok(());
        }

        let result = url::analyze(
            self.judge.as_ref(),
            &state.event,
            &state.profile,
            state.fast_scores,
            state.ocr_text.as_deref(),
            guidance,
            self.ocr_confidence_threshold,
        )
        .await;

        self.store
            .insert_analysis(
                &state.event.id,
                "llm_judge",
                "1.0",
                &serde_json::to_value(&result.judge_output)?,
                Some(&result.judge_output.action),
                0,
            )
            .await?;

        state.fast_scores = Some(result.fast_scores);
        state.confidence = result.confidence;
        state.need_ocr = result.need_ocr;
        state.judge_output = Some(result.judge_output);
        Ok(())
    }

    async fn run_ocr(&self, state: &mut MonitorState, guidance: Option<String>) -> Result<(), IngestError> {
        let (has_run, outcome) = ocr::analyze(
            self.ocr_backend.as_ref(),
            self.judge.as_ref(),
            &state.event,
            &state.profile,
            state.has_ocr_run,
            state.fast_scores,
            guidance,
            self.ocr_confidence_threshold,
        )
        .await;
        state.has_ocr_run = has_run;

        match outcome {
            OcrOutcome::AlreadyRun | OcrOutcome::RanNoText => {}
            OcrOutcome::NeedsScreenshot => {
                state.needs_screenshot = true;
            }
            OcrOutcome::Rejudged { ocr_text, result } => {
                state.ocr_text = Some(match state.ocr_text.take() {
                    Some(existing) => format!("{existing}\n{ocr_text}"),
                    None => ocr_text,
                });
                self.store
                    .insert_analysis(
                        &state.event.id,
                        "ocr_judge",
                        "1.0",
                        &serde_json::to_value(&result.judge_output)?,
                        Some(&result.judge_output.action),
                        0,
                    )
                    .await?;
                state.fast_scores = Some(result.fast_scores);
                state.confidence = result.confidence;
                state.need_ocr = result.need_ocr;
                state.judge_output = Some(result.judge_output);
            }
        }
        Ok(())
    }

    async fn finalize(&self, state: MonitorState, is_upgrade: bool) -> Result<DecisionMessage, IngestError> {
        let fast_scores = state
            .fast_scores
            .unwrap_or_else(|| scorer::analyze_event_fast(&state.event, state.ocr_text.as_deref()));

        let paused_until_ms = self
            .store
            .get_setting(SETTING_PAUSED_UNTIL)
            .await?
            .and_then(|raw| raw.parse().ok());
        let now = Utc::now();

        let policy_input = PolicyInput {
            event: &state.event,
            fast_scores,
            judge_output: state.judge_output.as_ref(),
            profile: &state.profile,
            headline_result: state.headline_result.as_ref(),
            paused_until_ms,
            now_ms: now.timestamp_millis(),
            // Quiet-hours/schedule rules compare against device-local wall
            // clock, matching `policy/engine.py`'s `datetime.now()`; `now_ms`
            // above stays epoch-UTC for storage/cursor purposes.
            now_local: Local::now().naive_local(),
        };
        let policy_output = self.policy.decide(&policy_input);

        let decision = self
            .store
            .insert_decision(
                &state.event.id,
                &self.policy.policy_version,
                &policy_output.action.to_string(),
                &policy_output.reason,
                &policy_output.categories,
            )
            .await?;

        let message = self.build_message(&decision, &state.event, is_upgrade, state.needs_screenshot, state.confidence, state.headline_result.as_ref());
        self.bus.publish(message.clone());
        Ok(message)
    }

    fn build_message(
        &self,
        decision: &Decision,
        event: &Event,
        upgrade: bool,
        needs_ocr: bool,
        confidence: f64,
        headline: Option<&headlines::HeadlineResult>,
    ) -> DecisionMessage {
        DecisionMessage {
            decision_id: decision.id.clone(),
            event_id: decision.event_id.clone(),
            action: decision.action.clone(),
            reason: decision.reason.clone(),
            categories: decision.categories.clone(),
            upgrade,
            needs_ocr,
            confidence,
            url: event.url.clone(),
            title: event.title.clone(),
            ts: event.ts,
            child_id: event.child_id.clone(),
            headline_agent: headline.map(|h| HeadlineAgentSummary {
                risk: h.risk.as_str().to_string(),
                flags: h.flags.clone(),
                confidence: h.confidence,
                action: h.action.clone(),
            }),
            manual_flagged: decision.manual_flagged,
            manual_action: decision.manual_action.clone(),
            original_action: decision.original_action.clone(),
        }
    }

    /// Record (or extend) a pause. `minutes` of `None` or `<= 0` is treated
    /// as an effectively indefinite horizon.
    #[tracing::instrument(skip(self, pin), err)]
    pub async fn pause(&self, pin: &str, minutes: Option<i64>) -> Result<i64, IngestError> {
        if pin != self.parent_pin {
            return Err(IngestError::WrongPin);
        }
        let horizon_minutes = match minutes {
            Some(m) if m > 0 => m,
            _ => INDEFINITE_PAUSE_MINUTES,
        };
        let until_ms = Utc::now().timestamp_millis() + horizon_minutes * 60 * 1000;
        self.store.set_setting(SETTING_PAUSED_UNTIL, &until_ms.to_string()).await?;
        Ok(until_ms)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn resume(&self) -> Result<(), IngestError> {
        self.store.delete_setting(SETTING_PAUSED_UNTIL).await?;
        Ok(())
    }

    /// Apply a guardian override and publish the updated decision. Triggers
    /// a non-blocking guardian-feedback refresh: the override response does
    /// not wait on it.
    #[tracing::instrument(skip(self), fields(decision_id = %decision_id), err)]
    pub async fn override_decision(&self, decision_id: &str, action: &str) -> Result<DecisionMessage, IngestError> {
        action.parse::<Action>().map_err(|_| IngestError::InvalidAction(action.to_string()))?;

        let (decision, event) = self
            .store
            .override_decision(decision_id, action)
            .await?
            .ok_or_else(|| IngestError::UnknownDecision(decision_id.to_string()))?;

        let message = self.build_message(&decision, &event, false, false, 0.0, None);
        self.bus.publish(message.clone());

        if let Some(guardian) = self.guardian.clone() {
            tokio::spawn(async move {
                if let Err(err) = guardian.refresh_once().await {
                    tracing::warn!(error = %err, "failed to refresh guardian feedback after override");
                }
            });
        }

        Ok(message)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn list_events(&self, child_id: Option<&str>, limit: i64) -> Result<Vec<Event>, IngestError> {
        Ok(self.store.get_recent_events(child_id, limit).await?)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn list_decisions(&self, child_id: Option<&str>, limit: i64) -> Result<Vec<(Decision, Event)>, IngestError> {
        Ok(self.store.get_recent_decisions(child_id, limit).await?)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn list_children(&self) -> Result<Vec<ChildProfile>, IngestError> {
        Ok(self.store.list_children().await?)
    }

    /// Update strictness and/or age for a child, creating the profile if it
    /// doesn't exist yet, and mark it as the active child.
    #[tracing::instrument(skip(self), err)]
    pub async fn update_child_settings(
        &self,
        child_id: &str,
        strictness: Option<Strictness>,
        age: Option<i32>,
    ) -> Result<ChildProfile, IngestError> {
        if let Some(age) = age {
            if !(3..=18).contains(&age) {
                return Err(IngestError::AgeOutOfRange(age));
            }
        }
        self.store.ensure_child_profile(child_id).await?;
        self.store.update_child_profile(child_id, strictness, age).await?;
        self.store.set_active_child(child_id).await?;
        self.store
            .get_child(child_id)
            .await?
            .ok_or_else(|| IngestError::UnknownEvent(child_id.to_string()))
    }
}
