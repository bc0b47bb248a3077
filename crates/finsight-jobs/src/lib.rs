//! # finsight-jobs
//!
//! Background job processing for finsight: the queue worker, the analysis
//! orchestrator it dispatches to, and the stuck-processing sweeper.
//!
//! ## Architecture
//!
//! - [`worker::JobWorker`] polls the queue and runs claimed jobs
//!   concurrently, each under a timeout.
//! - [`handler::JobHandler`] implementations do the actual work:
//!   [`analysis_handler::AnalysisJobHandler`] drives the extraction
//!   pipeline, [`unlink_handler::StorageUnlinkHandler`] removes orphaned
//!   storage objects.
//! - [`orchestrator::AnalysisOrchestrator`] owns the statement status
//!   machine for a single analysis run.
//! - [`sweeper::Sweeper`] reaps statements stuck in `processing`.
//!
//! Everything operates on the repository traits from `finsight-core`, so
//! the whole pipeline is testable against the in-memory fakes in
//! [`testing`].

pub mod analysis_handler;
pub mod batch;
pub mod handler;
pub mod orchestrator;
pub mod sweeper;
pub mod testing;
pub mod unlink_handler;
pub mod worker;

pub use analysis_handler::{AnalysisJobHandler, AnalysisJobPayload};
pub use batch::{submit_analysis, submit_batch, BatchSubmission, SkippedStatement, SubmittedJob};
pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler, ProgressCallback};
pub use orchestrator::AnalysisOrchestrator;
pub use sweeper::Sweeper;
pub use unlink_handler::StorageUnlinkHandler;
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
