//! Shared command setup

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tally_core::{
    ai::{AIBackend, AIClient},
    cache::open_store,
    categorize::Categorizer,
    classifier::ExternalClassifier,
    config::ClassifierConfig,
    prompts::PromptTemplate,
    rules::RuleSet,
};
use tracing::info;

/// File locations shared by every command
pub struct Paths {
    pub rules: PathBuf,
    pub cache: PathBuf,
    pub config: Option<PathBuf>,
}

/// Load the category rule set
pub fn load_rules(path: &Path) -> Result<RuleSet> {
    RuleSet::load(path).with_context(|| format!("Failed to load rule set from {}", path.display()))
}

/// Build the categorizer, with the external tier only when a client is given
///
/// An unreachable remote classifier fails here, before any row is touched.
pub async fn build_categorizer(paths: &Paths, ai: Option<AIClient>) -> Result<Categorizer> {
    let rules = load_rules(&paths.rules)?;
    let config = ClassifierConfig::load_from(paths.config.as_deref())
        .context("Failed to load classifier config")?;

    let categorizer = Categorizer::new(rules).with_fuzzy_threshold(config.fuzzy_threshold);

    let Some(client) = ai else {
        return Ok(categorizer);
    };
    if !client.health_check().await {
        bail!(
            "Remote classifier ({}) is not reachable at {}. Check the server, or pass --no-remote to use keyword rules only",
            client.backend_name(),
            client.host()
        );
    }

    let cache = open_store(&paths.cache)
        .with_context(|| format!("Failed to open vendor cache {}", paths.cache.display()))?;
    let prompt = PromptTemplate::load().context("Failed to load classification prompt")?;
    if prompt.is_override() {
        info!(version = prompt.metadata.version, "Using prompt override");
    }

    info!(
        backend = client.backend_name(),
        model = %client.model(),
        host = %client.host(),
        "Remote classifier enabled"
    );

    let external = ExternalClassifier::new(client, cache, prompt, &config);
    Ok(categorizer.with_external(external))
}
