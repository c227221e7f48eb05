//! Composition of streaming stages into one pipeline with one outcome.
//!
//! A pipeline is a [`Source`], any number of [`Transform`]s and a [`Sink`],
//! connected in order by bounded byte channels. All stages run as tasks on
//! the tokio runtime. [`Pipeline::run`] resolves exactly once: with the
//! first stage failure, or with success after every stage (the sink last
//! of all) has completed.

mod channel;

pub use channel::{CHUNK_SIZE, Inlet, InletReader, Outlet, OutletWriter, channel};

use channel::EndOfStream;

use crate::error::{Error, Result};
use crate::log::{OperationContext, OperationLog};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::io::Write;
use std::mem;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;

/// Stable name of a stage, used to attribute failures.
pub type StageId = &'static str;

type StageFuture = BoxFuture<'static, Result<()>>;

/// First stage of a pipeline: produces bytes.
pub struct Source {
    id: StageId,
    start: Box<dyn FnOnce(Outlet) -> StageFuture + Send>,
}

impl Source {
    pub fn new<F, Fut>(id: StageId, body: F) -> Self
    where
        F: FnOnce(Outlet) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            id,
            start: Box::new(move |outlet| body(outlet).boxed()),
        }
    }

    /// A source whose body does blocking I/O through a `Write` handle.
    pub fn blocking<F>(id: StageId, body: F) -> Self
    where
        F: FnOnce(&mut OutletWriter) -> Result<()> + Send + 'static,
    {
        Self::new(id, move |outlet| {
            run_blocking(move || {
                let mut writer = outlet.into_writer();
                body(&mut writer)?;
                writer.flush()?;
                Ok(())
            })
        })
    }

    pub fn id(&self) -> StageId {
        self.id
    }
}

/// Middle stage of a pipeline: consumes bytes and produces bytes.
pub struct Transform {
    id: StageId,
    start: Box<dyn FnOnce(Inlet, Outlet) -> StageFuture + Send>,
}

impl Transform {
    pub fn new<F, Fut>(id: StageId, body: F) -> Self
    where
        F: FnOnce(Inlet, Outlet) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            id,
            start: Box::new(move |inlet, outlet| body(inlet, outlet).boxed()),
        }
    }

    pub fn blocking<F>(id: StageId, body: F) -> Self
    where
        F: FnOnce(&mut InletReader, &mut OutletWriter) -> Result<()> + Send + 'static,
    {
        Self::new(id, move |inlet, outlet| {
            run_blocking(move || {
                let mut reader = inlet.into_reader();
                let mut writer = outlet.into_writer();
                body(&mut reader, &mut writer)?;
                writer.flush()?;
                Ok(())
            })
        })
    }

    pub fn id(&self) -> StageId {
        self.id
    }
}

/// Last stage of a pipeline: consumes bytes. Its successful completion is
/// what completes the pipeline.
pub struct Sink {
    id: StageId,
    start: Box<dyn FnOnce(Inlet) -> StageFuture + Send>,
}

impl Sink {
    pub fn new<F, Fut>(id: StageId, body: F) -> Self
    where
        F: FnOnce(Inlet) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            id,
            start: Box::new(move |inlet| body(inlet).boxed()),
        }
    }

    pub fn blocking<F>(id: StageId, body: F) -> Self
    where
        F: FnOnce(&mut InletReader) -> Result<()> + Send + 'static,
    {
        Self::new(id, move |inlet| {
            run_blocking(move || {
                let mut reader = inlet.into_reader();
                body(&mut reader)
            })
        })
    }

    pub fn id(&self) -> StageId {
        self.id
    }
}

async fn run_blocking<F>(body: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    match tokio::task::spawn_blocking(body).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(Error::Internal(panic_message(err.into_panic()))),
        Err(err) => Err(Error::Internal(err.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("stage panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("stage panicked: {msg}")
    } else {
        "stage panicked".to_string()
    }
}

/// A stage failure, attributed to the stage that produced it.
///
/// Displays as the original error's message.
#[derive(thiserror::Error, Debug)]
#[error("{source}")]
pub struct StageFailure {
    stage: StageId,
    context: OperationContext,
    source: Error,
}

impl StageFailure {
    pub fn stage(&self) -> StageId {
        self.stage
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    pub fn error(&self) -> &Error {
        &self.source
    }

    pub fn into_error(self) -> Error {
        self.source
    }
}

/// Closes the stage's output cleanly only once the stage returned `Ok`.
/// A failed, panicked or aborted stage drops `end`, which downstream reads
/// as an aborted upstream.
fn ending_with(end: EndOfStream, stage: StageFuture) -> StageFuture {
    async move {
        stage.await?;
        end.send().await;
        Ok(())
    }
    .boxed()
}

struct Connected {
    id: StageId,
    future: StageFuture,
}

/// Stages connected so far, waiting for a sink.
pub struct Pipeline {
    stages: Vec<Connected>,
    tail: Inlet,
}

impl Pipeline {
    pub fn from_source(source: Source) -> Self {
        let (outlet, inlet) = channel();
        let end = outlet.end_of_stream();
        Self {
            stages: vec![Connected {
                id: source.id,
                future: ending_with(end, (source.start)(outlet)),
            }],
            tail: inlet,
        }
    }

    /// Appends a transform after the stages connected so far.
    pub fn through(mut self, transform: Transform) -> Self {
        let (outlet, inlet) = channel();
        let end = outlet.end_of_stream();
        let input = mem::replace(&mut self.tail, inlet);
        self.stages.push(Connected {
            id: transform.id,
            future: ending_with(end, (transform.start)(input, outlet)),
        });
        self
    }

    /// Identifiers of the stages connected so far, in order.
    pub fn stage_ids(&self) -> Vec<StageId> {
        self.stages.iter().map(|s| s.id).collect()
    }

    /// Connects `sink`, runs every stage and resolves with the pipeline's
    /// single outcome.
    ///
    /// Failures are logged through `log` as `Error in {stage} operation`
    /// with `context` attached. Only the first one is returned.
    pub async fn run(
        self,
        sink: Sink,
        context: &OperationContext,
        log: &OperationLog,
    ) -> Result<(), StageFailure> {
        let Pipeline { mut stages, tail } = self;
        stages.push(Connected {
            id: sink.id,
            future: (sink.start)(tail),
        });

        let mut tasks = JoinSet::new();
        for Connected { id, future } in stages {
            tasks.spawn(async move {
                let result = AssertUnwindSafe(future)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(Error::Internal(panic_message(payload))));
                (id, result)
            });
        }

        // A stage that failed only because a neighbour hung up or aborted
        // waits here until that neighbour reports.
        let mut consequential: Option<(StageId, Error)> = None;

        while let Some(joined) = tasks.join_next().await {
            let (stage, result) = match joined {
                Ok(outcome) => outcome,
                Err(err) => ("runtime", Err(Error::Internal(err.to_string()))),
            };
            match result {
                Ok(()) => tracing::debug!(stage, "stage completed"),
                Err(err) if err.is_consequential() => {
                    tracing::debug!(stage, error = %err, "stage stopped by a neighbour");
                    if consequential.is_none() {
                        consequential = Some((stage, err));
                    }
                }
                Err(err) => {
                    tasks.abort_all();
                    log_failure(log, stage, context, &err);
                    while let Some(joined) = tasks.try_join_next() {
                        if let Ok((other, Err(later))) = joined {
                            if !later.is_consequential() {
                                log_failure(log, other, context, &later);
                            }
                        }
                    }
                    return Err(StageFailure {
                        stage,
                        context: context.clone(),
                        source: err,
                    });
                }
            }
        }

        if let Some((stage, err)) = consequential {
            log_failure(log, stage, context, &err);
            return Err(StageFailure {
                stage,
                context: context.clone(),
                source: err,
            });
        }
        Ok(())
    }
}

fn log_failure(log: &OperationLog, stage: StageId, context: &OperationContext, err: &Error) {
    log.failure(stage, format!("Error in {stage} operation"), context, err);
}
