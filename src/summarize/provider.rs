use serde::{Deserialize, Serialize};

/// Hosted text generation services speaking the chat-completions protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    Openai,
    Grok,
}

pub struct ProviderConfig {
    pub api_url: &'static str,
    pub model: &'static str,
    pub env_var: &'static str,
}

impl Provider {
    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Gemini => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                model: "gemini-1.5-flash",
                env_var: "GEMINI_API_KEY",
            },
            Provider::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-4o-mini",
                env_var: "OPENAI_API_KEY",
            },
            Provider::Grok => ProviderConfig {
                api_url: "https://api.x.ai/v1/chat/completions",
                model: "grok-2-latest",
                env_var: "XAI_API_KEY",
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::Openai => "OpenAI",
            Provider::Grok => "Grok",
        }
    }
}
