//! Shared application state

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use voicebridge_core::CallRegistry;
use voicebridge_inference::InferenceClient;
use voicebridge_llm::RealtimeConfig;
use voicebridge_pipeline::{PipelineConfig, SummarizerConfig};
use voicebridge_platform::PlatformClient;

use crate::settings::Settings;

/// What the incoming webhook learned about a call, held until the audio
/// WebSocket for that call opens.
#[derive(Debug, Clone, Default)]
pub struct PendingCall {
    pub caller: String,
    pub assistant_id: String,
    pub organization_id: String,
}

/// State shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<CallRegistry>,
    pub inference: InferenceClient,
    pub platform: PlatformClient,
    /// Calls announced by webhook but whose stream has not opened yet.
    pub pending_calls: Arc<Mutex<HashMap<String, PendingCall>>>,
}

impl AppState {
    pub fn new(settings: Settings, inference: InferenceClient, platform: PlatformClient) -> Self {
        Self {
            settings: Arc::new(settings),
            registry: Arc::new(CallRegistry::new()),
            inference,
            platform,
            pending_calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Per-call pipeline settings derived from the process settings.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            realtime: RealtimeConfig {
                api_key: self.settings.openai_api_key.clone(),
                model: self.settings.openai_model.clone(),
                temperature: self.settings.openai_temperature,
                max_response_tokens: self.settings.openai_max_tokens,
                ..RealtimeConfig::default()
            },
            summarizer: SummarizerConfig {
                api_key: self.settings.openai_api_key.clone(),
                ..SummarizerConfig::default()
            },
            silence_timeout_secs: self.settings.silence_timeout_secs,
            max_duration_secs: self.settings.max_call_duration_secs,
        }
    }
}
