use std::collections::HashMap;

use screener_core::FeatureVector;

/// Tags assigned to one symbol, with confidence in the assignment.
#[derive(Debug, Clone, Default)]
pub struct ThemeTags {
    pub tags: Vec<String>,
    /// In [0, 1]; feeds the stage-3 confidence blend.
    pub confidence: f64,
}

/// Collaborator interface for thematic tagging. The keyword tagging engine
/// itself lives outside this crate; the funnel only consumes its output.
pub trait ThemeTagger: Send + Sync {
    fn tag(&self, symbol: &str, features: &FeatureVector) -> ThemeTags;
}

/// Tagger that knows nothing. Used when no tagging collaborator is wired.
#[derive(Debug, Default)]
pub struct NoopTagger;

impl ThemeTagger for NoopTagger {
    fn tag(&self, _symbol: &str, _features: &FeatureVector) -> ThemeTags {
        ThemeTags::default()
    }
}

/// Fixed symbol-to-tags table, for wiring and tests.
#[derive(Debug, Default)]
pub struct StaticTagger {
    map: HashMap<String, Vec<String>>,
}

impl StaticTagger {
    pub fn new(map: HashMap<String, Vec<String>>) -> Self {
        Self { map }
    }
}

impl ThemeTagger for StaticTagger {
    fn tag(&self, symbol: &str, _features: &FeatureVector) -> ThemeTags {
        match self.map.get(symbol) {
            Some(tags) => ThemeTags {
                tags: tags.clone(),
                confidence: 1.0,
            },
            None => ThemeTags::default(),
        }
    }
}
