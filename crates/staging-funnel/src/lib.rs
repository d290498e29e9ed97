//! Three-stage screening funnel: a micro price gate, a short-window data
//! check, and a deep-history pass with full features, risk assessment, and
//! cross-sectional scoring. Expensive fetches run only for symbols that
//! survived every cheaper upstream check.

pub mod funnel;
pub mod output;
pub mod risk;
pub mod rows;
pub mod scoring;
pub mod tagger;

#[cfg(test)]
mod tests;

pub use funnel::{FunnelOutput, StagingFunnel};
pub use output::{OutputRow, OutputTable};
pub use risk::{assess_risk, RiskAssessment, RiskLevel};
pub use rows::{Stage1Row, Stage2Row, Stage3Row};
pub use scoring::{ScoreInput, ScoringEngine};
pub use tagger::{NoopTagger, StaticTagger, ThemeTagger, ThemeTags};
