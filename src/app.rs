use std::sync::Arc;

use crate::compiler::{self, CompiledConfig};
use crate::config::Config;
use crate::dispatch::ChatDispatcher;
use crate::error::Result;
use crate::profile::Profile;
use crate::retry::RetryPolicy;
use crate::tools::ToolRegistry;
use crate::transport::{CompletionsTransport, Transport};

/// Everything derived from the profile at startup. Read-only afterwards and
/// shared between requests without locking.
#[derive(Debug)]
pub struct AppBundle {
    pub profile: Arc<Profile>,
    pub compiled: CompiledConfig,
    pub tools: Arc<ToolRegistry>,
    /// Why the placeholder persona is being served, if it is.
    pub profile_error: Option<String>,
}

impl AppBundle {
    /// Load the configured profile and compile it. Never fails: a broken
    /// profile yields the placeholder persona.
    pub fn initialize(config: &Config) -> Self {
        let (profile, error) = Profile::load_or_placeholder(&config.profile.path);
        let mut bundle = Self::from_profile(profile);
        bundle.profile_error = error.map(|e| e.to_string());
        bundle
    }

    pub fn from_profile(profile: Profile) -> Self {
        let compiled = compiler::compile(&profile);
        let profile = Arc::new(profile);
        Self {
            tools: Arc::new(ToolRegistry::new(Arc::clone(&profile))),
            profile,
            compiled,
            profile_error: None,
        }
    }

    pub fn dispatcher(&self, config: &Config, transport: Arc<dyn Transport>) -> ChatDispatcher {
        ChatDispatcher::new(
            transport,
            Arc::clone(&self.tools),
            self.compiled.system_prompt.as_str(),
            &config.model,
            config.request_timeout(),
        )
    }

    /// The live model dispatcher, or `None` when no API key is configured.
    pub fn live_dispatcher(&self, config: &Config) -> Result<Option<ChatDispatcher>> {
        if !config.has_api_key() {
            return Ok(None);
        }
        let transport = CompletionsTransport::new(
            config.completions_url(),
            config.model.api_key.clone(),
            RetryPolicy::ExponentialBackoff(config.retry.clone()),
        )?;
        Ok(Some(self.dispatcher(config, Arc::new(transport))))
    }
}
