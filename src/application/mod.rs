//! Application layer - diagnostic loop, report generation and rendering

pub mod orchestrator;
pub mod recommendations;
pub mod render;
pub mod report;

pub use orchestrator::{DiagnosticOrchestrator, OrchestratorError, OrchestratorSettings, OrchestratorStatus};
pub use recommendations::{merge_recommendations, CycleSections};
pub use render::{export_summary, render_report, render_summary, SUMMARY_FILE};
pub use report::{action_items, Report, ReportGenerator};
